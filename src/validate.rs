//! Validate command - Check an SVO2 file end to end without writing output

use serde::Serialize;

use crate::codec::VideoCodec;
use crate::error::Result;
use crate::imu::imu_from_svo2;
use crate::metadata::Metadata;
use crate::source::{McapSource, MessageSource};
use crate::video::{DiscardWriter, TimestampReport, reconstruct};

#[derive(Debug, Clone, Serialize)]
pub struct VideoCheck {
    pub codec: Option<VideoCodec>,
    pub frames: usize,
    pub keyframes: usize,
    /// Frames whose PTS had to be pushed forward.
    pub corrections: u64,
    pub timestamps: Option<TimestampReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub file: String,
    pub version: String,
    pub serial_number: u32,
    pub resolution: (u32, u32),
    pub warnings: Vec<String>,
    pub video: VideoCheck,
    /// IMU sample count, or the reason decoding failed.
    pub imu: std::result::Result<usize, String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.warnings.is_empty()
            && self.video.corrections == 0
            && self.video.timestamps.as_ref().is_none_or(TimestampReport::is_consistent)
            && self.imu.is_ok()
    }

    pub fn print(&self) {
        let status = if self.passed() { "PASSED" } else { "FAILED" };
        println!("Validation of {}: {}", self.file, status);
        println!(
            "SVO2 {} - serial {} - {}x{}",
            self.version, self.serial_number, self.resolution.0, self.resolution.1
        );
        match self.video.codec {
            Some(codec) => println!(
                "Video: {} frames ({} key-frames), codec {}",
                self.video.frames, self.video.keyframes, codec
            ),
            None => println!("Video: no frames"),
        }
        if self.video.corrections > 0 {
            println!("[WARN] {} non-monotonic frame timestamps", self.video.corrections);
        }
        match &self.video.timestamps {
            Some(TimestampReport::CountMismatch { reference, footer }) => {
                println!("[WARN] footer index lists {reference} frames, stream has {footer}")
            }
            Some(TimestampReport::ValueMismatch { total, .. }) => {
                println!("[WARN] {total} frame timestamps differ from the footer index")
            }
            Some(TimestampReport::MissingReference) => {
                println!("[WARN] footer index has no video timestamps")
            }
            _ => {}
        }
        for w in &self.warnings {
            println!("[WARN] {w}");
        }
        match &self.imu {
            Ok(n) => println!("IMU: {n} samples"),
            Err(e) => println!("[ERROR] IMU: {e}"),
        }
    }
}

/// Run every decoder over `source`. Fatal only for metadata and video
/// framing errors.
pub fn validate_source(label: &str, source: &impl MessageSource) -> Result<ValidationReport> {
    let metadata = Metadata::extract(source)?;
    let warnings = metadata
        .consistency_check()
        .iter()
        .map(ToString::to_string)
        .collect();
    let rec = reconstruct(source, &metadata, |_| Ok(DiscardWriter::default()), false)?;
    let imu = imu_from_svo2(source, Some(&metadata), false)
        .map(|a| a.len())
        .map_err(|e| e.to_string());

    Ok(ValidationReport {
        file: label.to_string(),
        version: metadata.version.clone(),
        serial_number: metadata.header.serial_number,
        resolution: (metadata.header.width, metadata.header.height),
        warnings,
        video: VideoCheck {
            codec: rec.config.as_ref().map(|c| c.codec),
            frames: rec.pts.len(),
            keyframes: rec.keyframes,
            corrections: rec.corrections,
            timestamps: rec.timestamp_report,
        },
        imu,
    })
}

/// Validate an .svo2 file and print the report
pub fn validate_svo2(path: &str) -> Result<ValidationReport> {
    let source = McapSource::open(path)?;
    let report = validate_source(path, &source)?;
    report.print();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{SvoBuilder, imu_record};

    #[test]
    fn clean_recording_passes() {
        let src = SvoBuilder::new(42)
            .with_frames(&[1_000_000, 34_000_000, 67_000_000])
            .with_imu(imu_record(1, [0.0; 3], [0.0; 3]))
            .build();
        let report = validate_source("clean.svo2", &src).unwrap();
        assert!(report.passed(), "{report:?}");
        assert_eq!(report.video.frames, 3);
        assert_eq!(report.video.keyframes, 1);
        assert_eq!(report.video.codec, Some(VideoCodec::Hevc));
        assert_eq!(report.imu, Ok(1));
    }

    #[test]
    fn problems_are_collected_not_fatal() {
        let src = SvoBuilder::new(42)
            .with_extra_channel("Camera_SN7/other", vec![])
            .with_frames(&[5_000, 5_000])
            .with_imu(vec![0u8; 8])
            .build();
        let report = validate_source("bad.svo2", &src).unwrap();
        assert!(!report.passed());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.video.corrections, 1);
        assert!(report.imu.is_err());
    }
}
