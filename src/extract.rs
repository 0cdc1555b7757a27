//! Raw channel extraction: copy every payload of one channel to a sink.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::error::{Result, Svo2Error};
use crate::source::{ChannelInfo, MessageSource};

pub const VIDEO_SELECTOR: &str = "side_by_side";
pub const SENSORS_SELECTOR: &str = "sensors";

/// Channel id (exact) or topic substring.
///
/// Declared channels are tried in id order and the first match wins, so
/// `"sensors"` picks `Camera_SN1/sensors` over a later
/// `Camera_SN1/integrated_sensors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSelector(String);

impl ChannelSelector {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn matches(&self, channel: &ChannelInfo) -> bool {
        channel.topic.contains(&self.0) || channel.id.to_string() == self.0
    }

    pub fn resolve<'a>(&self, channels: &'a [ChannelInfo]) -> Option<&'a ChannelInfo> {
        channels.iter().find(|c| self.matches(c))
    }
}

impl From<&str> for ChannelSelector {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for ChannelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    pub channel: String,
    pub channel_id: u16,
    pub encoding: String,
    pub message_count: u64,
    pub total_bytes: u64,
}

pub(crate) fn message_spinner(enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {pos} msgs {msg}") {
        pb.set_style(style);
    }
    Some(pb)
}

pub fn resolve_channel(source: &impl MessageSource, selector: &ChannelSelector) -> Result<ChannelInfo> {
    let channels = source.channels()?;
    selector
        .resolve(&channels)
        .cloned()
        .ok_or_else(|| Svo2Error::ChannelNotFound(selector.to_string()))
}

/// Copy the payloads of `channel` to `sink` in arrival order, passing each
/// through `transform` first. Empty payloads are skipped.
pub fn copy_channel<W, F>(
    source: &impl MessageSource,
    channel: &ChannelInfo,
    sink: &mut W,
    show_progress: bool,
    mut transform: F,
) -> Result<ExtractStats>
where
    W: Write,
    F: for<'b> FnMut(&'b [u8]) -> Result<&'b [u8]>,
{
    tracing::info!("Extracting channel: {} (ID: {})", channel.topic, channel.id);
    let pb = message_spinner(show_progress);

    let mut stats = ExtractStats {
        channel: channel.topic.clone(),
        channel_id: channel.id,
        encoding: channel.message_encoding.clone(),
        message_count: 0,
        total_bytes: 0,
    };
    for msg in source.messages(Some(channel.id))? {
        let msg = msg?;
        if msg.data.is_empty() {
            continue;
        }
        let bytes = transform(msg.data.as_ref())?;
        sink.write_all(bytes)?;
        stats.message_count += 1;
        stats.total_bytes += bytes.len() as u64;
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    sink.flush()?;

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    tracing::info!(
        "Extracted {} messages ({} bytes) from {}",
        stats.message_count,
        stats.total_bytes,
        stats.channel
    );
    Ok(stats)
}

/// Resolve `selector` and copy the matching channel's payloads unchanged.
pub fn extract_channel<W: Write>(
    source: &impl MessageSource,
    selector: &ChannelSelector,
    sink: &mut W,
    show_progress: bool,
) -> Result<ExtractStats> {
    let channel = resolve_channel(source, selector)?;
    copy_channel(source, &channel, sink, show_progress, |d| Ok(d))
}

/// Like [`extract_channel`], creating `output` only once the channel is known.
pub fn extract_channel_to_path(
    source: &impl MessageSource,
    selector: &ChannelSelector,
    output: impl AsRef<Path>,
    show_progress: bool,
) -> Result<ExtractStats> {
    let channel = resolve_channel(source, selector)?;
    let mut file = File::create(output.as_ref())?;
    tracing::info!("Writing to: {}", output.as_ref().display());
    copy_channel(source, &channel, &mut file, show_progress, |d| Ok(d))
}

/// The `side_by_side` channel exactly as stored, framing included.
pub fn extract_video_channel(
    source: &impl MessageSource,
    output: impl AsRef<Path>,
    show_progress: bool,
) -> Result<ExtractStats> {
    extract_channel_to_path(source, &VIDEO_SELECTOR.into(), output, show_progress)
}

pub fn extract_sensors(
    source: &impl MessageSource,
    output: impl AsRef<Path>,
    show_progress: bool,
) -> Result<ExtractStats> {
    extract_channel_to_path(source, &SENSORS_SELECTOR.into(), output, show_progress)
}
