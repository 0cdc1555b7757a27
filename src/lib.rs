//! svo2extract - Read Stereolabs ZED SVO2 recordings without the ZED SDK
//!
//! An SVO2 file is an MCAP container. This library decodes the metadata the
//! camera stores next to the streams and turns the streams into ordinary
//! files.
//!
//! # Features
//!
//! - **Metadata**: `svo_header` / `svo_footer` decoding, IMU calibration
//!   matrices, serial-number consistency checks
//! - **Video**: side-by-side H.264/H.265 as a raw Annex B stream or remuxed
//!   into MP4; the microsecond timeline is kept strictly increasing on the
//!   MP4's 90 kHz track timescale
//! - **IMU**: per-sample timestamps, acceleration and angular velocity,
//!   exportable as NumPy `.npz`
//! - **Intrinsics**: stereo calibration from the ZED `SN<serial>.conf` file
//! - **Raw channels**: copy any channel by id or topic substring
//!
//! # Example
//!
//! ```rust,no_run
//! use svo2extract::{ConvertOptions, OutputMode, convert_svo2};
//!
//! let options = ConvertOptions {
//!     input_path: "recording.svo2".to_string(),
//!     output_path: "recording.mp4".to_string(),
//!     mode: Some(OutputMode::Mp4),
//!     keyframes_path: Some("keyframes.npy".to_string()),
//!     show_progress: true,
//! };
//!
//! convert_svo2(&options)?;
//! # Ok::<(), svo2extract::Svo2Error>(())
//! ```

pub mod cli;
pub mod codec;
pub mod convert;
pub mod error;
pub mod extract;
pub mod imu;
pub mod intrinsics;
pub mod metadata;
pub mod mux;
pub mod npy;
pub mod records;
pub mod schema;
pub mod source;
pub mod validate;
pub mod video;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export main types for convenience
pub use codec::{VideoCodec, detect_codec};
pub use convert::{ConvertOptions, OutputMode, convert_svo2};
pub use error::{ErrorKind, Result, Svo2Error};
pub use extract::{ChannelSelector, ExtractStats, extract_channel};
pub use imu::{ImuArchive, ImuSample, imu_from_svo2};
pub use intrinsics::{Intrinsics, ResolutionMode, StereoIntrinsics};
pub use metadata::{ConsistencyWarning, Metadata};
pub use records::{FileHeader, FixedRecord, FrameFooter};
pub use source::{McapSource, MemorySource, MessageSource};
pub use video::{ContainerWriter, mp4_from_svo2, raw_from_svo2};
