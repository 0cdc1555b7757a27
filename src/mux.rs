//! MP4 container output through muxide.
//!
//! muxide stores video samples on a fixed 90 kHz media timescale, so packets
//! arriving in microseconds are snapped to that grid before being written.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use muxide::api::{Muxer, MuxerBuilder};

use crate::codec::VideoCodec;
use crate::error::{Result, Svo2Error};
use crate::video::{ContainerWriter, Packet, StreamConfig};

/// Ticks per second of the MP4 video track.
pub const MEDIA_TIMESCALE: u32 = 90_000;

fn mux_err(stage: &str, e: impl std::fmt::Display) -> Svo2Error {
    Svo2Error::Mux(format!("{stage}: {e}"))
}

fn muxide_codec(codec: VideoCodec) -> muxide::api::VideoCodec {
    match codec {
        VideoCodec::Avc => muxide::api::VideoCodec::H264,
        VideoCodec::Hevc => muxide::api::VideoCodec::H265,
    }
}

pub struct Mp4Writer<W: Write> {
    muxer: Muxer<W>,
    time_base: (u32, u32),
    last_ticks: Option<i64>,
    corrections: u64,
}

impl<W: Write> Mp4Writer<W> {
    pub fn new(writer: W, config: &StreamConfig) -> Result<Self> {
        let muxer = MuxerBuilder::new(writer)
            .video(
                muxide_codec(config.codec),
                config.width,
                config.height,
                f64::from(config.fps),
            )
            .build()
            .map_err(|e| mux_err("open", e))?;
        Ok(Self {
            muxer,
            time_base: config.time_base,
            last_ticks: None,
            corrections: 0,
        })
    }

    /// Packets whose tick had to be moved forward.
    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    /// Map a packet time onto the media timescale, keeping ticks strictly increasing.
    fn next_ticks(&mut self, pts: i64) -> i64 {
        let (num, den) = self.time_base;
        let exact = pts as f64 * f64::from(num) * f64::from(MEDIA_TIMESCALE) / f64::from(den);
        let mut ticks = exact.round() as i64;
        if let Some(last) = self.last_ticks {
            if ticks <= last {
                tracing::warn!(
                    "PTS {pts} collapses onto MP4 tick {ticks} (last {last}); using {}",
                    last + 1
                );
                ticks = last + 1;
                self.corrections += 1;
            }
        }
        self.last_ticks = Some(ticks);
        ticks
    }
}

impl Mp4Writer<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, config: &StreamConfig) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        tracing::info!("Writing to: {}", path.as_ref().display());
        Self::new(BufWriter::new(file), config)
    }
}

impl<W: Write> ContainerWriter for Mp4Writer<W> {
    fn write_packet(&mut self, packet: &Packet<'_>) -> Result<()> {
        let ticks = self.next_ticks(packet.pts_us);
        let seconds = ticks as f64 / f64::from(MEDIA_TIMESCALE);
        self.muxer
            .write_video(seconds, packet.data, packet.keyframe)
            .map_err(|e| mux_err("write_video", e))
    }

    fn finish(self) -> Result<()> {
        let stats = self.muxer.finish_with_stats().map_err(|e| mux_err("finish", e))?;
        tracing::info!(
            "MP4 finished: {} frames, {:.1}s, {} bytes",
            stats.video_frames,
            stats.duration_secs,
            stats.bytes_written
        );
        if self.corrections > 0 {
            tracing::warn!("{} packets were moved forward on the 90 kHz grid", self.corrections);
        }
        Ok(())
    }
}
