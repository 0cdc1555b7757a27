//! ZED IMU records from the `sensors` channel.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::{Result, Svo2Error};
use crate::extract::{ChannelSelector, SENSORS_SELECTOR, message_spinner, resolve_channel};
use crate::metadata::Metadata;
use crate::records::FieldType;
use crate::source::{ChannelInfo, MessageSource};

const TIMESTAMP_OFFSET: usize = 0x10;
const AVEL_OFFSET: usize = 0x58;
const ACCEL_OFFSET: usize = 0x64;

/// Smallest record holding every decoded field.
pub const IMU_RECORD_MIN_LEN: usize = 0x70;

/// Decoded fields of the sensor record, with their byte offsets.
pub const IMU_FIELDS: &[(&str, FieldType, usize, usize)] = &[
    ("timestamp_ns", FieldType::U64, TIMESTAMP_OFFSET, 1),
    ("avel", FieldType::F32, AVEL_OFFSET, 3),
    ("accel", FieldType::F32, ACCEL_OFFSET, 3),
];

/// One IMU measurement, uncalibrated, in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImuSample {
    pub timestamp_ns: u64,
    /// Linear acceleration, m/s^2.
    pub accel: [f32; 3],
    /// Angular velocity, deg/s.
    pub avel: [f32; 3],
}

fn read_vec3(raw: &[u8], offset: usize) -> [f32; 3] {
    let mut out = [0f32; 3];
    LittleEndian::read_f32_into(&raw[offset..offset + 12], &mut out);
    out
}

impl ImuSample {
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        if raw.len() < IMU_RECORD_MIN_LEN {
            return Err(Svo2Error::malformed(
                "IMU record",
                format!("{} bytes, need at least {IMU_RECORD_MIN_LEN}", raw.len()),
            ));
        }
        Ok(Self {
            timestamp_ns: LittleEndian::read_u64(&raw[TIMESTAMP_OFFSET..]),
            accel: read_vec3(raw, ACCEL_OFFSET),
            avel: read_vec3(raw, AVEL_OFFSET),
        })
    }

    /// Seconds since epoch.
    pub fn timestamp(&self) -> f64 {
        self.timestamp_ns as f64 / 1e9
    }
}

/// Column-oriented IMU series, ready for `.npz` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImuArchive {
    pub timestamp: Vec<f64>,
    pub accel: Vec<[f32; 3]>,
    pub avel: Vec<[f32; 3]>,
}

impl ImuArchive {
    pub fn push(&mut self, sample: &ImuSample) {
        self.timestamp.push(sample.timestamp());
        self.accel.push(sample.accel);
        self.avel.push(sample.avel);
    }

    pub fn len(&self) -> usize {
        self.timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }
}

fn sensors_channel(source: &impl MessageSource, metadata: Option<&Metadata>) -> Result<ChannelInfo> {
    if let Some(m) = metadata
        && let Some(channel) = source.find_topic(&m.sensors_topic())?
    {
        return Ok(channel);
    }
    resolve_channel(source, &ChannelSelector::new(SENSORS_SELECTOR))
}

/// Decode every record on the sensors channel.
pub fn imu_from_svo2(
    source: &impl MessageSource,
    metadata: Option<&Metadata>,
    show_progress: bool,
) -> Result<ImuArchive> {
    let channel = sensors_channel(source, metadata)?;
    tracing::info!("Reading IMU records from {} (ID: {})", channel.topic, channel.id);
    let pb = message_spinner(show_progress);

    let mut archive = ImuArchive::default();
    for msg in source.messages(Some(channel.id))? {
        let msg = msg?;
        if msg.data.is_empty() {
            continue;
        }
        archive.push(&ImuSample::from_raw(&msg.data)?);
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    tracing::info!("Decoded {} IMU samples", archive.len());
    Ok(archive)
}
