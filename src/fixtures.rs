//! Synthetic SVO2 recordings for unit tests.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::metadata::{FOOTER_TOPIC, HEADER_TOPIC};
use crate::records::tests::{sample_footer, sample_header};
use crate::records::{FileHeader, FixedRecord, FrameFooter};
use crate::source::MemorySource;

/// VPS, SPS, PPS and an IDR_W_RADL slice; enough for muxide to build `hvcC`.
pub(crate) const HEVC_KEYFRAME: &[u8] = &[
    0, 0, 0, 1, 0x40, 0x01, 0x0c, 0x01, 0xff, 0xff, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90,
    0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x00, 0x5d, 0x95, 0x98, 0x09, //
    0, 0, 0, 1, 0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00, 0x03,
    0x00, 0x00, 0x03, 0x00, 0x5d, 0xa0, 0x02, 0x80, 0x80, 0x2d, 0x16, 0x59, 0x59, 0xa4, 0x93,
    0x24, 0xb8, //
    0, 0, 0, 1, 0x44, 0x01, 0xc0, 0x73, 0xc0, 0x4c, 0x90, //
    0, 0, 0, 1, 0x26, 0x01, 0xaf, 0x06, 0xb8, 0x63, 0xef, 0x3e, 0xb6, 0xb4, 0x8e, 0x19,
];
/// TRAIL_R slice.
pub(crate) const HEVC_SLICE: &[u8] = &[
    0, 0, 0, 1, 0x02, 0x01, 0xd0, 0x10, 0xf3, 0x95, 0x27, 0x41, 0xfe, 0xfc,
];
pub(crate) const AVC_KEYFRAME: &[u8] = &[0, 0, 0, 1, 0x67, 0x64, 0x00, 0x28];

/// `[u32 reserved][u32 size][payload][footer]`
pub(crate) fn frame_message(payload: &[u8], footer: &FrameFooter) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len() + FrameFooter::SIZE);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&footer.encode());
    out
}

pub(crate) fn imu_record(timestamp_ns: u64, accel: [f32; 3], avel: [f32; 3]) -> Vec<u8> {
    let mut out = vec![0u8; 0x80];
    out[0x10..0x18].copy_from_slice(&timestamp_ns.to_le_bytes());
    for (i, v) in avel.iter().enumerate() {
        out[0x58 + 4 * i..0x5c + 4 * i].copy_from_slice(&v.to_le_bytes());
    }
    for (i, v) in accel.iter().enumerate() {
        out[0x64 + 4 * i..0x68 + 4 * i].copy_from_slice(&v.to_le_bytes());
    }
    out
}

pub(crate) struct SvoBuilder {
    header: FileHeader,
    frames: Vec<(Vec<u8>, FrameFooter)>,
    imu: Vec<Vec<u8>>,
    extra_channels: Vec<(String, Vec<u64>)>,
    footer_video_timestamps: Option<Vec<u64>>,
    calibration_floats: usize,
}

impl SvoBuilder {
    pub(crate) fn new(serial: u32) -> Self {
        Self {
            header: sample_header(serial),
            frames: Vec::new(),
            imu: Vec::new(),
            extra_channels: Vec::new(),
            footer_video_timestamps: None,
            calibration_floats: 18,
        }
    }

    pub(crate) fn with_extra_channel(mut self, topic: &str, timestamps: Vec<u64>) -> Self {
        self.extra_channels.push((topic.to_string(), timestamps));
        self
    }

    pub(crate) fn with_calibration_floats(mut self, count: usize) -> Self {
        self.calibration_floats = count;
        self
    }

    pub(crate) fn with_frame(mut self, payload: &[u8], footer: FrameFooter) -> Self {
        self.frames.push((payload.to_vec(), footer));
        self
    }

    /// One frame per timestamp; the first is a key-frame.
    pub(crate) fn with_frames(mut self, timestamps: &[u64]) -> Self {
        for (i, &ts) in timestamps.iter().enumerate() {
            let payload = if i == 0 { HEVC_KEYFRAME } else { HEVC_SLICE };
            let mut footer = sample_footer(ts, i as u32);
            footer.payload_size = payload.len() as u32;
            self.frames.push((payload.to_vec(), footer));
        }
        self
    }

    pub(crate) fn with_footer_video_timestamps(mut self, timestamps: Vec<u64>) -> Self {
        self.footer_video_timestamps = Some(timestamps);
        self
    }

    pub(crate) fn with_imu(mut self, record: Vec<u8>) -> Self {
        self.imu.push(record);
        self
    }

    pub(crate) fn video_topic(&self) -> String {
        format!("Camera_SN{}/side_by_side", self.header.serial_number)
    }

    pub(crate) fn build(self) -> MemorySource {
        let serial = self.header.serial_number;
        let video_topic = self.video_topic();
        let sensors_topic = format!("Camera_SN{serial}/sensors");

        let mut src = MemorySource::new()
            .with_channel(1, HEADER_TOPIC, "json")
            .with_channel(2, FOOTER_TOPIC, "json")
            .with_channel(3, &video_topic, "")
            .with_channel(4, &sensors_topic, "");
        for (i, (topic, _)) in self.extra_channels.iter().enumerate() {
            src = src.with_channel(10 + i as u16, topic, "");
        }

        let calib: Vec<u8> = (0..self.calibration_floats)
            .flat_map(|i| (i as f32).to_le_bytes())
            .collect();
        let header_json = serde_json::json!({
            "header": STANDARD.encode(self.header.encode()),
            "Calib_acc": STANDARD.encode(&calib),
            "Calib_gyro": STANDARD.encode(&calib),
            "imu_frequency_hz": 200,
            "zed_sdk_version": "5.0.1",
            "version": "2.0.3",
        });
        src.push(1, 0, serde_json::to_vec(&header_json).unwrap_or_default());

        let mut footer_map = serde_json::Map::new();
        let video_ts = self
            .footer_video_timestamps
            .unwrap_or_else(|| self.frames.iter().map(|(_, f)| f.timestamp).collect());
        footer_map.insert(video_topic, serde_json::json!(video_ts));
        for (topic, ts) in &self.extra_channels {
            footer_map.insert(topic.clone(), serde_json::json!(ts));
        }

        let mut imu = self.imu.into_iter();
        for (payload, footer) in &self.frames {
            src.push(3, footer.timestamp, frame_message(payload, footer));
            if let Some(record) = imu.next() {
                src.push(4, footer.timestamp, record);
            }
        }
        for record in imu {
            src.push(4, 0, record);
        }

        let footer_bytes = serde_json::to_vec(&serde_json::Value::Object(footer_map)).unwrap_or_default();
        src.push(2, u64::MAX, footer_bytes);
        src
    }
}
