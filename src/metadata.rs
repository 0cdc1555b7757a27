//! SVO2 metadata carried by the `svo_header` / `svo_footer` control
//! messages.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::Matrix3;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, Svo2Error};
use crate::records::{FileHeader, decode_base64, decode_f32_block};
use crate::source::{ChannelInfo, MessageSource};

pub const HEADER_TOPIC: &str = "svo_header";
pub const FOOTER_TOPIC: &str = "svo_footer";

/// Each calibration blob holds two row-major 3x3 matrices.
pub const CALIBRATION_FLOATS: usize = 18;

static CAMERA_CHANNEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Camera_SN(\d+)/(.*)").expect("camera channel pattern"));

#[derive(Debug, Deserialize)]
struct HeaderRecord {
    #[serde(default)]
    header: String,
    #[serde(rename = "Calib_acc", default)]
    calib_acc: String,
    #[serde(rename = "Calib_gyro", default)]
    calib_gyro: String,
    #[serde(default)]
    imu_frequency_hz: f64,
    zed_sdk_version: Option<String>,
    version: Option<String>,
}

/// Soft disagreement between redundant fields. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyWarning {
    UnexpectedChannelName {
        channel: String,
    },
    SerialMismatch {
        channel: String,
        channel_serial: u64,
        header_serial: u32,
    },
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyWarning::UnexpectedChannelName { channel } => {
                write!(f, "channel name has unexpected pattern: {channel}")
            }
            ConsistencyWarning::SerialMismatch {
                channel,
                channel_serial,
                header_serial,
            } => write!(
                f,
                "serial number mismatch: channel {channel} ({channel_serial}) vs {header_serial} (from header)"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    /// IMU sampling frequency in Hz.
    pub imu_frequency: f64,
    pub zed_sdk_version: String,
    /// SVO2 file format version, e.g. "2.0.3".
    pub version: String,
    #[serde(serialize_with = "rows")]
    pub calib_acc_matrix1: Matrix3<f32>,
    #[serde(serialize_with = "rows")]
    pub calib_acc_matrix2: Matrix3<f32>,
    #[serde(serialize_with = "rows")]
    pub calib_gyro_matrix1: Matrix3<f32>,
    #[serde(serialize_with = "rows")]
    pub calib_gyro_matrix2: Matrix3<f32>,
    pub header: FileHeader,
    /// Topic name to channel id.
    pub channels: BTreeMap<String, u16>,
    /// Topic name to footer-reported timestamps (ns since epoch).
    #[serde(serialize_with = "timestamp_spans")]
    pub timestamps: BTreeMap<String, Vec<u64>>,
}

impl Metadata {
    /// Read the footer and header control messages and decode them.
    ///
    /// Only the first message of each control channel is consulted. The
    /// serial-number cross-check runs before returning and only logs.
    pub fn extract(source: &impl MessageSource) -> Result<Self> {
        let declared = source.channels()?;
        let channels: BTreeMap<String, u16> =
            declared.iter().map(|c| (c.topic.clone(), c.id)).collect();

        let footer_raw = read_control_message(source, &declared, FOOTER_TOPIC)?;
        let header_raw = read_control_message(source, &declared, HEADER_TOPIC)?;

        let mut timestamps: BTreeMap<String, Vec<u64>> = serde_json::from_slice(&footer_raw)?;
        timestamps.retain(|topic, _| {
            let known = channels.contains_key(topic);
            if !known {
                tracing::debug!("dropping footer timestamps for undeclared channel {topic}");
            }
            known
        });

        let header: HeaderRecord = serde_json::from_slice(&header_raw)?;
        let file_header = FileHeader::from_base64(&header.header)?;
        let (calib_acc_matrix1, calib_acc_matrix2) = calibration_pair("Calib_acc", &header.calib_acc)?;
        let (calib_gyro_matrix1, calib_gyro_matrix2) =
            calibration_pair("Calib_gyro", &header.calib_gyro)?;

        let metadata = Self {
            imu_frequency: header.imu_frequency_hz,
            zed_sdk_version: header.zed_sdk_version.unwrap_or_else(|| "unknown".into()),
            version: header.version.unwrap_or_else(|| "unknown".into()),
            calib_acc_matrix1,
            calib_acc_matrix2,
            calib_gyro_matrix1,
            calib_gyro_matrix2,
            header: file_header,
            channels,
            timestamps,
        };
        tracing::info!(
            serial = metadata.header.serial_number,
            width = metadata.header.width,
            height = metadata.header.height,
            fps = metadata.header.fps,
            version = %metadata.version,
            "decoded SVO2 metadata"
        );
        metadata.consistency_check();
        Ok(metadata)
    }

    /// Check that every `Camera_SN<n>/...` channel names the header's serial.
    pub fn consistency_check(&self) -> Vec<ConsistencyWarning> {
        let mut warnings = Vec::new();
        for channel in self.channels.keys() {
            if !channel.starts_with("Camera") {
                continue;
            }
            let serial = CAMERA_CHANNEL
                .captures(channel)
                .and_then(|caps| caps[1].parse::<u64>().ok());
            match serial {
                None => warnings.push(ConsistencyWarning::UnexpectedChannelName {
                    channel: channel.clone(),
                }),
                Some(s) if s != u64::from(self.header.serial_number) => {
                    warnings.push(ConsistencyWarning::SerialMismatch {
                        channel: channel.clone(),
                        channel_serial: s,
                        header_serial: self.header.serial_number,
                    })
                }
                Some(_) => {}
            }
        }
        for w in &warnings {
            tracing::warn!("{w}");
        }
        warnings
    }

    pub fn camera_topic(&self, suffix: &str) -> String {
        format!("Camera_SN{}/{}", self.header.serial_number, suffix)
    }

    /// Topic of the side-by-side stereo video stream.
    pub fn video_topic(&self) -> String {
        self.camera_topic("side_by_side")
    }

    pub fn sensors_topic(&self) -> String {
        self.camera_topic("sensors")
    }

    pub fn timestamps_for(&self, topic: &str) -> Option<&[u64]> {
        self.timestamps.get(topic).map(Vec::as_slice)
    }
}

fn read_control_message(
    source: &impl MessageSource,
    declared: &[ChannelInfo],
    topic: &str,
) -> Result<Vec<u8>> {
    let channel = declared
        .iter()
        .find(|c| c.topic == topic)
        .ok_or_else(|| Svo2Error::MissingChannel(topic.to_string()))?;
    match source.messages(Some(channel.id))?.next() {
        Some(msg) => Ok(msg?.data.into_owned()),
        None => Err(Svo2Error::MissingChannel(topic.to_string())),
    }
}

fn calibration_pair(name: &'static str, encoded: &str) -> Result<(Matrix3<f32>, Matrix3<f32>)> {
    let raw = decode_base64(encoded)?;
    let floats = decode_f32_block(name, &raw, CALIBRATION_FLOATS)?;
    Ok((
        Matrix3::from_row_slice(&floats[..9]),
        Matrix3::from_row_slice(&floats[9..]),
    ))
}

fn rows<S: Serializer>(m: &Matrix3<f32>, s: S) -> std::result::Result<S::Ok, S::Error> {
    let rows: [[f32; 3]; 3] = std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]));
    rows.serialize(s)
}

#[derive(Serialize)]
struct TimestampSpan {
    count: usize,
    first: Option<u64>,
    last: Option<u64>,
}

fn timestamp_spans<S: Serializer>(
    ts: &BTreeMap<String, Vec<u64>>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    let spans: BTreeMap<&str, TimestampSpan> = ts
        .iter()
        .map(|(k, v)| {
            (
                k.as_str(),
                TimestampSpan {
                    count: v.len(),
                    first: v.first().copied(),
                    last: v.last().copied(),
                },
            )
        })
        .collect();
    spans.serialize(s)
}
