//! Fixed-layout binary records embedded in SVO2 messages.
//!
//! Every record is described twice: once as an ordered field table
//! (used for documentation, the `schema` command and size checks) and
//! once as a Rust struct with explicit little-endian decode/encode. All
//! fields are packed without alignment gaps; where the on-disk record
//! carries trailing padding it is an explicit field so that
//! decode-then-encode reproduces the input byte for byte.
//!
//! Fields whose meaning has not been confirmed are carried through as
//! plain integers/floats. They are never interpreted by this crate.

use std::io;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::{Result, Svo2Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U32,
    I32,
    U64,
    F32,
}

impl FieldType {
    pub const fn width(self) -> usize {
        match self {
            FieldType::U32 | FieldType::I32 | FieldType::F32 => 4,
            FieldType::U64 => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::U32 => "u32",
            FieldType::I32 => "i32",
            FieldType::U64 => "u64",
            FieldType::F32 => "f32",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

const fn field(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec { name, ty }
}

/// Sum of the field widths of a layout.
pub const fn layout_size(layout: &[FieldSpec]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < layout.len() {
        total += layout[i].ty.width();
        i += 1;
    }
    total
}

/// Field offsets in layout order.
pub fn layout_offsets(layout: &[FieldSpec]) -> Vec<(usize, &FieldSpec)> {
    let mut offset = 0;
    layout
        .iter()
        .map(|f| {
            let at = offset;
            offset += f.ty.width();
            (at, f)
        })
        .collect()
}

use FieldType::{F32, I32, U32, U64};

pub const FILE_HEADER_LAYOUT: &[FieldSpec] = &[
    field("width", U32),
    field("height", U32),
    field("serial_number", U32),
    field("fps", U32),
    field("frame_counter", U32),
    field("bit_depth", U32),
    field("exposure_mode", U32),
    field("exposure_time", U32),
    field("camera_model", U32),
    field("r00", F32),
    field("r01", F32),
    field("r02", F32),
    field("tx", F32),
    field("r10", F32),
    field("r11", F32),
    field("r12", F32),
    field("ty", F32),
    field("r20", F32),
    field("r21", F32),
    field("r22", F32),
    field("tz", F32),
    field("ts_sec", U32),
    field("ts_nsec", U32),
    field("imu_status", U32),
    field("scale", F32),
    field("lens_id", U32),
    field("isp_gain", U32),
    field("isp_wb_r", U32),
    field("isp_wb_b", U32),
    field("isp_gamma", U32),
    field("sync_status", U32),
    field("padding", U32),
];

pub const FRAME_FOOTER_LAYOUT: &[FieldSpec] = &[
    field("width", U32),
    field("height", U32),
    field("magic", U32),
    field("reserved_0", I32),
    field("reserved_1", I32),
    field("reserved_2", I32),
    field("timestamp", U64),
    field("payload_size", U32),
    field("frame_type", I32),
    field("last_keyframe_index", I32),
    field("frame_id", U32),
    field("keyframe_id", I32),
    field("padding", U32),
];

/// A record with a fixed byte size and a positional little-endian layout.
pub trait FixedRecord: Sized {
    const NAME: &'static str;
    const LAYOUT: &'static [FieldSpec];
    const SIZE: usize = layout_size(Self::LAYOUT);

    fn read_fields(rdr: &mut &[u8]) -> io::Result<Self>;

    fn write_fields(&self, out: &mut Vec<u8>);

    /// Decode a record from a buffer of exactly [`Self::SIZE`] bytes.
    fn decode(buf: &[u8]) -> Result<Self> {
        let length_error = || Svo2Error::RecordLength {
            record: Self::NAME,
            expected: Self::SIZE,
            actual: buf.len(),
        };
        if buf.len() != Self::SIZE {
            return Err(length_error());
        }
        let mut rdr = buf;
        Self::read_fields(&mut rdr).map_err(|_| length_error())
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.write_fields(&mut out);
        out
    }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// SVO2 file header (128 bytes), shipped base64-encoded in `svo_header`.
///
/// Only `width`, `height`, `serial_number` and `fps` are confirmed. The
/// 3x4 `transform` block does not match the stereo extrinsics reported
/// by the vendor calibration file and is kept as an independent value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileHeader {
    /// Width of a single camera image in pixels.
    pub width: u32,
    pub height: u32,
    pub serial_number: u32,
    pub fps: u32,
    pub frame_counter: u32,
    pub bit_depth: u32,
    pub exposure_mode: u32,
    pub exposure_time: u32,
    pub camera_model: u32,
    /// Row-major `[R | t]`.
    pub transform: [[f32; 4]; 3],
    pub ts_sec: u32,
    pub ts_nsec: u32,
    pub imu_status: u32,
    pub scale: f32,
    pub lens_id: u32,
    pub isp_gain: u32,
    pub isp_wb_r: u32,
    pub isp_wb_b: u32,
    pub isp_gamma: u32,
    pub sync_status: u32,
    pub padding: u32,
}

impl FixedRecord for FileHeader {
    const NAME: &'static str = "FileHeader";
    const LAYOUT: &'static [FieldSpec] = FILE_HEADER_LAYOUT;

    fn read_fields(rdr: &mut &[u8]) -> io::Result<Self> {
        let width = rdr.read_u32::<LittleEndian>()?;
        let height = rdr.read_u32::<LittleEndian>()?;
        let serial_number = rdr.read_u32::<LittleEndian>()?;
        let fps = rdr.read_u32::<LittleEndian>()?;
        let frame_counter = rdr.read_u32::<LittleEndian>()?;
        let bit_depth = rdr.read_u32::<LittleEndian>()?;
        let exposure_mode = rdr.read_u32::<LittleEndian>()?;
        let exposure_time = rdr.read_u32::<LittleEndian>()?;
        let camera_model = rdr.read_u32::<LittleEndian>()?;
        let mut transform = [[0f32; 4]; 3];
        for row in transform.iter_mut() {
            for v in row.iter_mut() {
                *v = rdr.read_f32::<LittleEndian>()?;
            }
        }
        Ok(Self {
            width,
            height,
            serial_number,
            fps,
            frame_counter,
            bit_depth,
            exposure_mode,
            exposure_time,
            camera_model,
            transform,
            ts_sec: rdr.read_u32::<LittleEndian>()?,
            ts_nsec: rdr.read_u32::<LittleEndian>()?,
            imu_status: rdr.read_u32::<LittleEndian>()?,
            scale: rdr.read_f32::<LittleEndian>()?,
            lens_id: rdr.read_u32::<LittleEndian>()?,
            isp_gain: rdr.read_u32::<LittleEndian>()?,
            isp_wb_r: rdr.read_u32::<LittleEndian>()?,
            isp_wb_b: rdr.read_u32::<LittleEndian>()?,
            isp_gamma: rdr.read_u32::<LittleEndian>()?,
            sync_status: rdr.read_u32::<LittleEndian>()?,
            padding: rdr.read_u32::<LittleEndian>()?,
        })
    }

    fn write_fields(&self, out: &mut Vec<u8>) {
        for v in [
            self.width,
            self.height,
            self.serial_number,
            self.fps,
            self.frame_counter,
            self.bit_depth,
            self.exposure_mode,
            self.exposure_time,
            self.camera_model,
        ] {
            put_u32(out, v);
        }
        for row in &self.transform {
            for &v in row {
                put_f32(out, v);
            }
        }
        put_u32(out, self.ts_sec);
        put_u32(out, self.ts_nsec);
        put_u32(out, self.imu_status);
        put_f32(out, self.scale);
        for v in [
            self.lens_id,
            self.isp_gain,
            self.isp_wb_r,
            self.isp_wb_b,
            self.isp_gamma,
            self.sync_status,
            self.padding,
        ] {
            put_u32(out, v);
        }
    }
}

impl FileHeader {
    pub fn from_base64(data: &str) -> Result<Self> {
        Self::decode(&decode_base64(data)?)
    }
}

/// Frame-type tag the recorder writes for key-frames.
pub const KEYFRAME_TYPE: i32 = 3;

/// Trailer appended to every `side_by_side` video message (56 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameFooter {
    pub width: u32,
    pub height: u32,
    /// Observed as `0x5c002c00`.
    pub magic: u32,
    pub reserved: [i32; 3],
    /// Capture time in nanoseconds since the epoch.
    pub timestamp: u64,
    pub payload_size: u32,
    pub frame_type: i32,
    pub last_keyframe_index: i32,
    pub frame_id: u32,
    pub keyframe_id: i32,
    pub padding: u32,
}

impl FixedRecord for FrameFooter {
    const NAME: &'static str = "FrameFooter";
    const LAYOUT: &'static [FieldSpec] = FRAME_FOOTER_LAYOUT;

    fn read_fields(rdr: &mut &[u8]) -> io::Result<Self> {
        Ok(Self {
            width: rdr.read_u32::<LittleEndian>()?,
            height: rdr.read_u32::<LittleEndian>()?,
            magic: rdr.read_u32::<LittleEndian>()?,
            reserved: [
                rdr.read_i32::<LittleEndian>()?,
                rdr.read_i32::<LittleEndian>()?,
                rdr.read_i32::<LittleEndian>()?,
            ],
            timestamp: rdr.read_u64::<LittleEndian>()?,
            payload_size: rdr.read_u32::<LittleEndian>()?,
            frame_type: rdr.read_i32::<LittleEndian>()?,
            last_keyframe_index: rdr.read_i32::<LittleEndian>()?,
            frame_id: rdr.read_u32::<LittleEndian>()?,
            keyframe_id: rdr.read_i32::<LittleEndian>()?,
            padding: rdr.read_u32::<LittleEndian>()?,
        })
    }

    fn write_fields(&self, out: &mut Vec<u8>) {
        put_u32(out, self.width);
        put_u32(out, self.height);
        put_u32(out, self.magic);
        for &v in &self.reserved {
            put_i32(out, v);
        }
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        put_u32(out, self.payload_size);
        put_i32(out, self.frame_type);
        put_i32(out, self.last_keyframe_index);
        put_u32(out, self.frame_id);
        put_i32(out, self.keyframe_id);
        put_u32(out, self.padding);
    }
}

impl FrameFooter {
    pub fn is_keyframe(&self) -> bool {
        self.frame_type == KEYFRAME_TYPE
    }
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(data.trim())?)
}

/// Interpret `buf` as exactly `count` little-endian f32 values.
pub fn decode_f32_block(record: &'static str, buf: &[u8], count: usize) -> Result<Vec<f32>> {
    if buf.len() != count * 4 {
        return Err(Svo2Error::RecordLength {
            record,
            expected: count * 4,
            actual: buf.len(),
        });
    }
    Ok(buf
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    pub(crate) fn sample_header(serial: u32) -> FileHeader {
        FileHeader {
            width: 1920,
            height: 1080,
            serial_number: serial,
            fps: 30,
            frame_counter: 0,
            bit_depth: 8,
            exposure_mode: 0,
            exposure_time: 1000,
            camera_model: 2001,
            transform: [
                [1.0, 0.0, 0.0, 120.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            ts_sec: 0,
            ts_nsec: 0,
            imu_status: 1,
            scale: 1.0,
            lens_id: 5,
            isp_gain: 0,
            isp_wb_r: 0,
            isp_wb_b: 0,
            isp_gamma: 0,
            sync_status: 1,
            padding: 0,
        }
    }

    pub(crate) fn sample_footer(timestamp: u64, frame_id: u32) -> FrameFooter {
        FrameFooter {
            width: 1920,
            height: 1080,
            magic: 0x5c00_2c00,
            reserved: [1, 2, -1],
            timestamp,
            payload_size: 0,
            frame_type: if frame_id == 0 { KEYFRAME_TYPE } else { 0 },
            last_keyframe_index: 0,
            frame_id,
            keyframe_id: -1,
            padding: 0,
        }
    }

    #[test]
    fn layouts_match_record_sizes() {
        assert_eq!(FileHeader::SIZE, 128);
        assert_eq!(FILE_HEADER_LAYOUT.len(), 32);
        assert_eq!(FrameFooter::SIZE, 56);
        let offsets = layout_offsets(FRAME_FOOTER_LAYOUT);
        let (ts_offset, ts) = offsets[6];
        assert_eq!(ts.name, "timestamp");
        assert_eq!(ts_offset, 24);
    }

    #[test]
    fn header_fields_land_at_documented_offsets() {
        let header = sample_header(40735594);
        let bytes = header.encode();
        assert_eq!(bytes.len(), 128);
        assert_eq!(&bytes[8..12], &40735594u32.to_le_bytes());
        assert_eq!(&bytes[48..52], &120.0f32.to_le_bytes());
        assert_eq!(FileHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn header_from_base64() {
        let header = sample_header(123);
        let encoded = STANDARD.encode(header.encode());
        assert_eq!(FileHeader::from_base64(&encoded).unwrap().serial_number, 123);
        assert!(matches!(
            FileHeader::from_base64(""),
            Err(Svo2Error::RecordLength { actual: 0, .. })
        ));
    }

    #[test]
    fn footer_keyframe_tag() {
        let footer = sample_footer(5, 0);
        assert!(footer.is_keyframe());
        assert!(!sample_footer(5, 1).is_keyframe());
        let bytes = footer.encode();
        assert_eq!(&bytes[24..32], &5u64.to_le_bytes());
    }

    #[test]
    fn f32_block_requires_exact_length() {
        let buf: Vec<u8> = (0..18).flat_map(|i| (i as f32).to_le_bytes()).collect();
        let floats = decode_f32_block("Calib_acc", &buf, 18).unwrap();
        assert_eq!(floats[17], 17.0);
        assert!(decode_f32_block("Calib_acc", &buf[..70], 18).is_err());
    }

    proptest! {
        #[test]
        fn header_roundtrips_any_128_bytes(bytes in proptest::collection::vec(any::<u8>(), 128)) {
            let header = FileHeader::decode(&bytes).unwrap();
            prop_assert_eq!(header.encode(), bytes);
        }

        #[test]
        fn footer_roundtrips_any_56_bytes(bytes in proptest::collection::vec(any::<u8>(), 56)) {
            let footer = FrameFooter::decode(&bytes).unwrap();
            prop_assert_eq!(footer.encode(), bytes);
        }

        #[test]
        fn header_rejects_other_lengths(len in 0usize..512) {
            prop_assume!(len != 128);
            let bytes = vec![0u8; len];
            let is_length_error = matches!(
                FileHeader::decode(&bytes),
                Err(Svo2Error::RecordLength { expected: 128, .. })
            );
            prop_assert!(is_length_error);
        }
    }
}
