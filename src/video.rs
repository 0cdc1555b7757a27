//! Side-by-side video stream: unframing, timeline reconstruction and
//! remuxing into a container.

use std::io::Write;

use serde::Serialize;

use crate::codec::{VideoCodec, detect_codec};
use crate::error::{Result, Svo2Error};
use crate::extract::{ChannelSelector, ExtractStats, VIDEO_SELECTOR, copy_channel, message_spinner};
use crate::metadata::Metadata;
use crate::records::{FixedRecord, FrameFooter};
use crate::source::{ChannelInfo, MessageSource};

/// Reserved word + payload size word.
const FRAME_PREFIX: usize = 8;

/// How many divergent timestamps are reported by [`check_timestamps`].
pub const MISMATCH_SAMPLE: usize = 10;

pub const PIXEL_FORMAT: &str = "yuv420p";

/// Packet timestamps are expressed in microseconds.
pub const TIME_BASE: (u32, u32) = (1, 1_000_000);

/// One unframed `side_by_side` message.
#[derive(Debug, Clone)]
pub struct VideoFrame<'a> {
    pub reserved: u32,
    pub payload: &'a [u8],
    pub footer: FrameFooter,
}

impl<'a> VideoFrame<'a> {
    /// Split `[u32 reserved][u32 size][payload][FrameFooter]`.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < FRAME_PREFIX + FrameFooter::SIZE {
            return Err(Svo2Error::malformed(
                "video frame",
                format!(
                    "{} bytes is shorter than the minimum framed size {}",
                    data.len(),
                    FRAME_PREFIX + FrameFooter::SIZE
                ),
            ));
        }
        let reserved = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        let payload_end = FRAME_PREFIX
            .checked_add(size)
            .filter(|end| end + FrameFooter::SIZE <= data.len())
            .ok_or_else(|| {
                Svo2Error::malformed(
                    "video frame",
                    format!(
                        "declared payload of {size} bytes does not fit in a {} byte message",
                        data.len()
                    ),
                )
            })?;
        let footer_end = payload_end + FrameFooter::SIZE;
        if footer_end < data.len() {
            tracing::debug!("ignoring {} trailing bytes after frame footer", data.len() - footer_end);
        }
        let footer = FrameFooter::decode(&data[payload_end..footer_end])?;
        if footer.payload_size as usize != size {
            tracing::debug!(
                frame_id = footer.frame_id,
                "footer payload_size {} differs from framed size {size}",
                footer.payload_size
            );
        }
        Ok(Self {
            reserved,
            payload: &data[FRAME_PREFIX..payload_end],
            footer,
        })
    }
}

/// Zero-based, strictly increasing microsecond timeline.
#[derive(Debug, Clone)]
pub struct Timeline {
    origin: u64,
    last_pts: i64,
    corrections: u64,
}

impl Timeline {
    pub fn new(origin_ns: u64) -> Self {
        Self {
            origin: origin_ns,
            last_pts: -1,
            corrections: 0,
        }
    }

    /// PTS for a footer timestamp, clamped to `last + 1` when it would not
    /// advance.
    pub fn next_pts(&mut self, timestamp_ns: u64, frame_index: usize) -> i64 {
        let mut pts = ((i128::from(timestamp_ns) - i128::from(self.origin)) / 1000) as i64;
        if pts <= self.last_pts {
            tracing::warn!(
                "Non-monotonic timestamp at frame {frame_index}: {pts} <= {}. Correcting.",
                self.last_pts
            );
            pts = self.last_pts + 1;
            self.corrections += 1;
        }
        self.last_pts = pts;
        pts
    }

    pub fn corrections(&self) -> u64 {
        self.corrections
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamConfig {
    pub codec: VideoCodec,
    /// Both cameras side by side.
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: &'static str,
    pub time_base: (u32, u32),
}

#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    /// Presentation time in [`TIME_BASE`] units.
    pub pts_us: i64,
    pub data: &'a [u8],
    pub keyframe: bool,
}

/// Sink for timestamped video packets.
pub trait ContainerWriter {
    fn write_packet(&mut self, packet: &Packet<'_>) -> Result<()>;

    fn finish(self) -> Result<()>
    where
        Self: Sized;
}

/// Accepts and drops every packet.
#[derive(Debug, Default)]
pub struct DiscardWriter {
    pub packets: u64,
}

impl ContainerWriter for DiscardWriter {
    fn write_packet(&mut self, _packet: &Packet<'_>) -> Result<()> {
        self.packets += 1;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimestampMismatch {
    pub index: usize,
    pub reference: u64,
    pub footer: u64,
}

/// Outcome of comparing footer timestamps against the metadata index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TimestampReport {
    Consistent { count: usize },
    MissingReference,
    CountMismatch { reference: usize, footer: usize },
    ValueMismatch { total: usize, first: Vec<TimestampMismatch> },
}

impl TimestampReport {
    pub fn is_consistent(&self) -> bool {
        matches!(self, TimestampReport::Consistent { .. })
    }
}

/// Compare per-frame footer timestamps with the metadata's copy. Only logs.
pub fn check_timestamps(reference: Option<&[u64]>, footer: &[u64]) -> TimestampReport {
    let Some(reference) = reference else {
        tracing::debug!("SVO2 metadata has no timestamps for the video channel");
        return TimestampReport::MissingReference;
    };
    if reference.len() != footer.len() {
        tracing::warn!(
            "Frame count mismatch between SVO2 metadata and frame footers: {} vs {}",
            reference.len(),
            footer.len()
        );
        return TimestampReport::CountMismatch {
            reference: reference.len(),
            footer: footer.len(),
        };
    }
    let divergent: Vec<usize> = reference
        .iter()
        .zip(footer)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, _)| i)
        .collect();
    if divergent.is_empty() {
        return TimestampReport::Consistent {
            count: footer.len(),
        };
    }
    let first: Vec<TimestampMismatch> = divergent
        .iter()
        .take(MISMATCH_SAMPLE)
        .map(|&index| TimestampMismatch {
            index,
            reference: reference[index],
            footer: footer[index],
        })
        .collect();
    tracing::warn!("Timestamps from SVO2 metadata do not match frame footers.");
    tracing::warn!(
        "First {} mismatches ({} total): {:?}",
        first.len(),
        divergent.len(),
        first.iter().map(|m| m.index).collect::<Vec<_>>()
    );
    tracing::warn!("SVO2 Metadata: {:?}", first.iter().map(|m| m.reference).collect::<Vec<_>>());
    tracing::warn!("Frame Footers: {:?}", first.iter().map(|m| m.footer).collect::<Vec<_>>());
    TimestampReport::ValueMismatch {
        total: divergent.len(),
        first,
    }
}

/// Everything learned while replaying the video channel.
#[derive(Debug, Clone, Serialize)]
pub struct Reconstruction {
    pub config: Option<StreamConfig>,
    /// `last_keyframe_index` of every frame, in arrival order.
    pub keyframe_indices: Vec<i32>,
    pub footer_timestamps: Vec<u64>,
    pub pts: Vec<i64>,
    /// Frames flagged as key-frames by their footer.
    pub keyframes: usize,
    pub corrections: u64,
    pub timestamp_report: Option<TimestampReport>,
}

impl Reconstruction {
    fn empty() -> Self {
        Self {
            config: None,
            keyframe_indices: Vec::new(),
            footer_timestamps: Vec::new(),
            pts: Vec::new(),
            keyframes: 0,
            corrections: 0,
            timestamp_report: None,
        }
    }
}

/// Replay the side-by-side channel into a writer created by `open`.
///
/// `open` is only called once the first frame has been read, so an empty
/// channel produces no output at all.
pub fn reconstruct<S, W, F>(
    source: &S,
    metadata: &Metadata,
    open: F,
    show_progress: bool,
) -> Result<Reconstruction>
where
    S: MessageSource,
    W: ContainerWriter,
    F: FnOnce(&StreamConfig) -> Result<W>,
{
    let topic = metadata.video_topic();
    let Some(channel) = source.find_topic(&topic)? else {
        tracing::warn!("video channel {topic} is not declared; nothing to mux");
        return Ok(Reconstruction::empty());
    };

    let mut messages = source.messages(Some(channel.id))?;
    let Some(first) = messages.next() else {
        tracing::info!("video channel {topic} has no messages; nothing to mux");
        return Ok(Reconstruction::empty());
    };
    let first = first?;
    let first_frame = VideoFrame::parse(&first.data)?;
    let codec = detect_codec(first_frame.payload);
    let config = StreamConfig {
        codec,
        width: metadata.header.width.saturating_mul(2),
        height: metadata.header.height,
        fps: metadata.header.fps,
        pixel_format: PIXEL_FORMAT,
        time_base: TIME_BASE,
    };
    tracing::info!(
        "Muxing {topic}: codec={codec} {}x{} @ {} fps",
        config.width,
        config.height,
        config.fps
    );
    let mut timeline = Timeline::new(first_frame.footer.timestamp);
    let mut writer = open(&config)?;

    let pb = message_spinner(show_progress);
    let mut out = Reconstruction::empty();
    for (i, msg) in std::iter::once(Ok(first)).chain(messages).enumerate() {
        let msg = msg?;
        let frame = VideoFrame::parse(&msg.data)?;
        let pts = timeline.next_pts(frame.footer.timestamp, i);
        let keyframe = frame.footer.is_keyframe();
        writer.write_packet(&Packet {
            pts_us: pts,
            data: frame.payload,
            keyframe,
        })?;
        out.keyframes += usize::from(keyframe);
        out.footer_timestamps.push(frame.footer.timestamp);
        out.keyframe_indices.push(frame.footer.last_keyframe_index);
        out.pts.push(pts);
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    writer.finish()?;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    out.corrections = timeline.corrections();
    out.timestamp_report = Some(check_timestamps(
        metadata.timestamps_for(&topic),
        &out.footer_timestamps,
    ));
    out.config = Some(config);
    tracing::info!(
        "Muxed {} frames ({} timestamp corrections)",
        out.pts.len(),
        out.corrections
    );
    Ok(out)
}

/// Remux the side-by-side stream and return each frame's last key-frame
/// index. Metadata is extracted from `source` when not supplied.
pub fn mp4_from_svo2<S, W, F>(
    source: &S,
    metadata: Option<&Metadata>,
    open: F,
    show_progress: bool,
) -> Result<Vec<i32>>
where
    S: MessageSource,
    W: ContainerWriter,
    F: FnOnce(&StreamConfig) -> Result<W>,
{
    let extracted;
    let metadata = match metadata {
        Some(m) => m,
        None => {
            extracted = Metadata::extract(source)?;
            &extracted
        }
    };
    Ok(reconstruct(source, metadata, open, show_progress)?.keyframe_indices)
}

fn video_channel(source: &impl MessageSource, metadata: Option<&Metadata>) -> Result<ChannelInfo> {
    if let Some(m) = metadata
        && let Some(channel) = source.find_topic(&m.video_topic())?
    {
        return Ok(channel);
    }
    crate::extract::resolve_channel(source, &ChannelSelector::new(VIDEO_SELECTOR))
}

/// Concatenate the encoded payloads of the video channel into an Annex B
/// elementary stream, dropping framing and footers.
pub fn raw_from_svo2<W: Write>(
    source: &impl MessageSource,
    metadata: Option<&Metadata>,
    sink: &mut W,
    show_progress: bool,
) -> Result<ExtractStats> {
    let channel = video_channel(source, metadata)?;
    copy_channel(source, &channel, sink, show_progress, |data| {
        VideoFrame::parse(data).map(|f| f.payload)
    })
}
