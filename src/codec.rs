//! Elementary-stream codec detection from the first bytes of a frame.

use std::fmt;

use serde::Serialize;

/// Only the leading bytes of a payload are inspected.
pub const SNIFF_WINDOW: usize = 128;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VideoCodec {
    /// H.264 / AVC
    Avc,
    /// H.265 / HEVC
    Hevc,
}

impl VideoCodec {
    /// Conventional file extension for a raw Annex B stream.
    pub fn extension(&self) -> &'static str {
        match self {
            VideoCodec::Avc => "h264",
            VideoCodec::Hevc => "h265",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoCodec::Avc => write!(f, "h264"),
            VideoCodec::Hevc => write!(f, "hevc"),
        }
    }
}

/// Classify a payload as HEVC or AVC from the NAL header following the
/// first `00 00 00 01` start code.
///
/// HEVC VPS/SPS/PPS (types 32..=34) win over AVC SPS/PPS (7, 8); anything
/// else, including a missing start code, is reported as HEVC.
pub fn detect_codec(sample: &[u8]) -> VideoCodec {
    let window = &sample[..sample.len().min(SNIFF_WINDOW)];
    let Some(start) = window.windows(4).position(|w| w == &START_CODE[..]) else {
        return VideoCodec::Hevc;
    };
    let Some(&nal) = window.get(start + 4) else {
        return VideoCodec::Hevc;
    };

    let hevc_type = (nal & 0x7E) >> 1;
    let avc_type = nal & 0x1F;
    if (32..=34).contains(&hevc_type) {
        VideoCodec::Hevc
    } else if avc_type == 7 || avc_type == 8 {
        VideoCodec::Avc
    } else {
        VideoCodec::Hevc
    }
}
