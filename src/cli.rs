use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "svo2extract",
    about = "Extract video, IMU and calibration from Stereolabs SVO2 (MCAP) recordings",
    version
)]
pub struct Cli {
    /// Only log warnings and errors, hide progress spinners
    #[arg(short = 'q', long = "quiet", global = true, action = ArgAction::SetTrue)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List channels, encodings, message counts and time span of a recording
    Inspect {
        /// Path to the .svo2 file
        input: String,
    },

    /// Copy the raw payloads of one channel to a file
    Extract {
        /// Path to the .svo2 file
        input: String,
        /// Output file
        output: String,
        /// Channel id, or a substring of the channel topic
        #[arg(short = 'c', long = "channel")]
        channel: String,
    },

    /// Write the side-by-side video as an Annex B elementary stream
    Video {
        /// Path to the .svo2 file
        input: String,
        /// Output path (default: <input stem>_video.h265)
        output: Option<String>,
        /// Keep the per-frame framing and footers (copy the channel as stored)
        #[arg(long = "framed")]
        framed: bool,
    },

    /// Copy the raw sensors channel to a file
    Sensors {
        /// Path to the .svo2 file
        input: String,
        /// Output path (default: <input stem>_sensors.bin)
        output: Option<String>,
    },

    /// Convert a recording to MP4, a raw stream or an IMU .npz
    Convert {
        /// Path to the .svo2 file
        input: String,
        /// Output path; its extension selects the mode unless --mode is given
        output: String,
        /// Output mode: mp4, raw or imu
        #[arg(long = "mode")]
        mode: Option<String>,
        /// Save per-frame last key-frame indices to this .npy (mp4 mode)
        #[arg(long = "keyframes")]
        keyframes: Option<String>,
    },

    /// Print decoded SVO2 metadata as JSON
    Metadata {
        /// Path to the .svo2 file
        input: String,
    },

    /// Print stereo intrinsics from a ZED calibration file as JSON
    Intrinsics {
        /// Path to the SN<serial>.conf file
        conf: String,
        /// Camera mode: FHD1200, FHD or SVGA
        #[arg(long = "mode", conflicts_with = "height", required_unless_present = "height")]
        mode: Option<String>,
        /// Image height used to infer the mode (1200, 1080 or 600)
        #[arg(long = "height")]
        height: Option<u32>,
    },

    /// Show the binary record layouts (FileHeader, FrameFooter, IMU)
    Schema {},

    /// Check a recording end to end without writing output
    Validate {
        /// Path to the .svo2 file
        input: String,
    },
}
