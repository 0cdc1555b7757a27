use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, Svo2Error};
use crate::extract::{ChannelSelector, VIDEO_SELECTOR, resolve_channel};
use crate::imu::imu_from_svo2;
use crate::metadata::Metadata;
use crate::mux::Mp4Writer;
use crate::npy::{write_keyframes_npy, write_npz_file};
use crate::source::{McapSource, MessageSource};
use crate::video::{mp4_from_svo2, raw_from_svo2};

/// What `convert` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Side-by-side stream remuxed into MP4
    Mp4,
    /// Annex B elementary stream
    Raw,
    /// IMU samples as `.npz`
    Imu,
}

impl OutputMode {
    /// Infer the mode from the output file extension.
    pub fn from_extension(path: impl AsRef<Path>) -> Result<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "mp4" => Ok(OutputMode::Mp4),
            "h265" | "hevc" | "265" | "h264" | "264" => Ok(OutputMode::Raw),
            "npz" => Ok(OutputMode::Imu),
            _ => Err(Svo2Error::Configuration(format!(
                "Cannot infer mode from extension '.{ext}'. Specify --mode mp4, raw, or imu."
            ))),
        }
    }
}

impl FromStr for OutputMode {
    type Err = Svo2Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(OutputMode::Mp4),
            "raw" | "h265" | "h264" => Ok(OutputMode::Raw),
            "imu" => Ok(OutputMode::Imu),
            other => Err(Svo2Error::Configuration(format!(
                "unknown mode '{other}' (expected mp4, raw or imu)"
            ))),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Mp4 => write!(f, "mp4"),
            OutputMode::Raw => write!(f, "raw"),
            OutputMode::Imu => write!(f, "imu"),
        }
    }
}

/// Options for converting an SVO2 recording
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Path to the input .svo2 file
    pub input_path: String,
    /// Path to the output file
    pub output_path: String,
    /// Output mode; inferred from the output extension when `None`
    pub mode: Option<OutputMode>,
    /// Also save per-frame last key-frame indices as `.npy` (mp4 mode)
    pub keyframes_path: Option<String>,
    /// Show progress spinner
    pub show_progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertOutcome {
    Mp4 { frames: usize },
    Raw { frames: u64, bytes: u64 },
    Imu { samples: usize },
}

impl ConvertOptions {
    pub fn resolved_mode(&self) -> Result<OutputMode> {
        match self.mode {
            Some(mode) => Ok(mode),
            None => OutputMode::from_extension(&self.output_path),
        }
    }
}

/// Convert an SVO2 file according to `options`.
pub fn convert_svo2(options: &ConvertOptions) -> Result<ConvertOutcome> {
    let mode = options.resolved_mode()?;
    let source = McapSource::open(&options.input_path)?;
    tracing::info!(
        "Converting {} -> {} (mode: {mode})",
        options.input_path,
        options.output_path
    );
    convert_source(&source, mode, options)
}

/// Same as [`convert_svo2`] over an already opened source.
pub fn convert_source(
    source: &impl MessageSource,
    mode: OutputMode,
    options: &ConvertOptions,
) -> Result<ConvertOutcome> {
    let output = Path::new(&options.output_path);
    match mode {
        OutputMode::Mp4 => {
            let metadata = Metadata::extract(source)?;
            let keyframes = mp4_from_svo2(
                source,
                Some(&metadata),
                |config| Mp4Writer::create(output, config),
                options.show_progress,
            )?;
            if keyframes.is_empty() {
                tracing::warn!("No video frames found; {} was not written", output.display());
            }
            if let Some(path) = &options.keyframes_path {
                write_keyframes_npy(path, &keyframes)?;
            }
            Ok(ConvertOutcome::Mp4 {
                frames: keyframes.len(),
            })
        }
        OutputMode::Raw => {
            resolve_channel(source, &ChannelSelector::new(VIDEO_SELECTOR))?;
            let mut sink = BufWriter::new(File::create(output)?);
            tracing::info!("Writing to: {}", output.display());
            let stats = raw_from_svo2(source, None, &mut sink, options.show_progress)?;
            Ok(ConvertOutcome::Raw {
                frames: stats.message_count,
                bytes: stats.total_bytes,
            })
        }
        OutputMode::Imu => {
            let metadata = match Metadata::extract(source) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    tracing::warn!("SVO2 metadata unavailable ({e}); falling back to the sensors selector");
                    None
                }
            };
            let archive = imu_from_svo2(source, metadata.as_ref(), options.show_progress)?;
            write_npz_file(output, &archive)?;
            Ok(ConvertOutcome::Imu {
                samples: archive.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures::{HEVC_KEYFRAME, HEVC_SLICE, SvoBuilder, imu_record};

    fn options(output: &Path) -> ConvertOptions {
        ConvertOptions {
            input_path: "unused.svo2".into(),
            output_path: output.to_string_lossy().into_owned(),
            mode: None,
            keyframes_path: None,
            show_progress: false,
        }
    }

    #[test]
    fn infers_mode_from_extension() {
        assert_eq!(OutputMode::from_extension("a/b.MP4").unwrap(), OutputMode::Mp4);
        for ext in ["h265", "hevc", "h264", "264", "265"] {
            assert_eq!(
                OutputMode::from_extension(format!("out.{ext}")).unwrap(),
                OutputMode::Raw
            );
        }
        assert_eq!(OutputMode::from_extension("imu.npz").unwrap(), OutputMode::Imu);
        let err = OutputMode::from_extension("out.avi").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(OutputMode::from_extension("noext").is_err());
    }

    #[test]
    fn explicit_mode_wins_over_extension() {
        let mut opts = options(Path::new("out.bin"));
        assert!(opts.resolved_mode().is_err());
        opts.mode = Some("imu".parse().unwrap());
        assert_eq!(opts.resolved_mode().unwrap(), OutputMode::Imu);
    }

    #[test]
    fn raw_conversion_writes_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("video.h265");
        let src = SvoBuilder::new(8).with_frames(&[1, 2]).build();
        let outcome = convert_source(&src, OutputMode::Raw, &options(&out)).unwrap();
        assert!(matches!(outcome, ConvertOutcome::Raw { frames: 2, .. }));
        let written = std::fs::read(&out).unwrap();
        assert_eq!(written, [HEVC_KEYFRAME, HEVC_SLICE].concat());
    }

    #[test]
    fn imu_conversion_writes_npz() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("imu.npz");
        let src = SvoBuilder::new(8)
            .with_imu(imu_record(1, [0.0; 3], [0.0; 3]))
            .with_imu(imu_record(2, [0.0; 3], [0.0; 3]))
            .build();
        let outcome = convert_source(&src, OutputMode::Imu, &options(&out)).unwrap();
        assert_eq!(outcome, ConvertOutcome::Imu { samples: 2 });
        assert!(out.exists());
    }

    #[test]
    fn imu_conversion_without_metadata_uses_sensors_selector() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("imu.npz");
        let src = crate::source::MemorySource::new()
            .with_channel(1, "Camera_SN8/sensors", "")
            .with_message(1, 1, imu_record(1, [0.0; 3], [0.0; 3]));
        let outcome = convert_source(&src, OutputMode::Imu, &options(&out)).unwrap();
        assert_eq!(outcome, ConvertOutcome::Imu { samples: 1 });
        assert!(out.exists());
    }

    #[test]
    fn empty_video_writes_no_mp4_but_keyframes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("video.mp4");
        let kf = dir.path().join("kf.npy");
        let mut opts = options(&out);
        opts.keyframes_path = Some(kf.to_string_lossy().into_owned());
        let src = SvoBuilder::new(8).build();
        let outcome = convert_source(&src, OutputMode::Mp4, &opts).unwrap();
        assert_eq!(outcome, ConvertOutcome::Mp4 { frames: 0 });
        assert!(!out.exists());
        let npy = std::fs::read(&kf).unwrap();
        let header_len = 10 + u16::from_le_bytes([npy[8], npy[9]]) as usize;
        assert!(String::from_utf8_lossy(&npy).contains("'shape': (0,)"));
        assert_eq!(npy.len(), header_len);
    }

    fn mp4_with_keyframes(timestamps: &[u64]) -> (ConvertOutcome, Vec<u8>, Vec<u8>) {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("video.mp4");
        let kf = dir.path().join("kf.npy");
        let mut opts = options(&out);
        opts.keyframes_path = Some(kf.to_string_lossy().into_owned());
        let src = SvoBuilder::new(8).with_frames(timestamps).build();
        let outcome = convert_source(&src, OutputMode::Mp4, &opts).unwrap();
        (outcome, std::fs::read(&out).unwrap(), std::fs::read(&kf).unwrap())
    }

    #[test]
    fn mp4_conversion_writes_hevc_track_and_keyframes() {
        let base = 1_700_000_000_000_000_000;
        let (outcome, mp4, npy) = mp4_with_keyframes(&[base, base + 33_333_333, base + 66_666_666]);
        assert_eq!(outcome, ConvertOutcome::Mp4 { frames: 3 });
        for fourcc in [b"ftyp", b"moov", b"mdat", b"hvc1"] {
            assert!(mp4.windows(4).any(|w| w == fourcc), "missing {fourcc:?}");
        }
        let header_len = 10 + u16::from_le_bytes([npy[8], npy[9]]) as usize;
        assert_eq!(npy.len(), header_len + 3 * 4);
        assert!(npy[header_len..].iter().all(|&b| b == 0));
    }

    #[test]
    fn mp4_conversion_survives_duplicate_timestamps() {
        let base = 1_700_000_000_000_000_000;
        let (outcome, mp4, _) = mp4_with_keyframes(&[base, base, base + 1_000, base + 33_333_333]);
        assert_eq!(outcome, ConvertOutcome::Mp4 { frames: 4 });
        assert!(mp4.windows(4).any(|w| w == b"hvc1"));
    }
}
