//! Timestamped message containers: the MCAP reader SVO2 files are built
//! on, an in-memory equivalent, and the `inspect` listing.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use prettytable::{Table, row};
use serde::Serialize;

use crate::error::{Result, Svo2Error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: u16,
    pub topic: String,
    pub message_encoding: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceStatistics {
    pub message_count: u64,
    pub message_start_time: u64,
    pub message_end_time: u64,
    pub channel_message_counts: BTreeMap<u16, u64>,
}

/// One (channel, timestamp, payload) record.
#[derive(Debug, Clone)]
pub struct Message<'a> {
    pub channel_id: u16,
    pub log_time: u64,
    pub publish_time: u64,
    pub data: Cow<'a, [u8]>,
}

pub type MessageIter<'a> = Box<dyn Iterator<Item = Result<Message<'a>>> + 'a>;

/// An ordered, replayable sequence of channel-tagged messages.
pub trait MessageSource {
    /// Declared channels, ascending by id.
    fn channels(&self) -> Result<Vec<ChannelInfo>>;

    fn statistics(&self) -> Result<Option<SourceStatistics>> {
        Ok(None)
    }

    /// Iterate messages front to back, optionally restricted to one channel.
    /// Each call starts again from the first message.
    fn messages(&self, channel: Option<u16>) -> Result<MessageIter<'_>>;

    fn find_topic(&self, topic: &str) -> Result<Option<ChannelInfo>> {
        Ok(self.channels()?.into_iter().find(|c| c.topic == topic))
    }
}

/// A memory-mapped MCAP file.
pub struct McapSource {
    path: PathBuf,
    mapped: Mmap,
}

impl McapSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // SAFETY: the mapping is read-only and lives as long as `self`.
        let mapped = unsafe { Mmap::map(&file)? };
        Ok(Self { path, mapped })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn summary_parts(&self) -> Result<(Vec<ChannelInfo>, Option<SourceStatistics>)> {
        let summary = mcap::Summary::read(&self.mapped)?.ok_or_else(|| {
            Svo2Error::malformed(
                "container summary",
                format!("{} has no summary section", self.path.display()),
            )
        })?;
        let mut channels: Vec<ChannelInfo> = summary
            .channels
            .values()
            .map(|c| ChannelInfo {
                id: c.id,
                topic: c.topic.clone(),
                message_encoding: c.message_encoding.clone(),
            })
            .collect();
        channels.sort_by_key(|c| c.id);
        let stats = summary.stats.map(|s| SourceStatistics {
            message_count: s.message_count,
            message_start_time: s.message_start_time,
            message_end_time: s.message_end_time,
            channel_message_counts: s.channel_message_counts,
        });
        Ok((channels, stats))
    }
}

impl MessageSource for McapSource {
    fn channels(&self) -> Result<Vec<ChannelInfo>> {
        Ok(self.summary_parts()?.0)
    }

    fn statistics(&self) -> Result<Option<SourceStatistics>> {
        Ok(self.summary_parts()?.1)
    }

    fn messages(&self, channel: Option<u16>) -> Result<MessageIter<'_>> {
        let stream = mcap::MessageStream::new(&self.mapped)?;
        Ok(Box::new(stream.filter_map(move |m| match m {
            Ok(m) if channel.is_none_or(|id| id == m.channel.id) => Some(Ok(Message {
                channel_id: m.channel.id,
                log_time: m.log_time,
                publish_time: m.publish_time,
                data: m.data,
            })),
            Ok(_) => None,
            Err(e) => Some(Err(e.into())),
        })))
    }
}

/// Messages held in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    channels: Vec<ChannelInfo>,
    messages: Vec<(u16, u64, Vec<u8>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, id: u16, topic: &str, encoding: &str) -> Self {
        self.channels.push(ChannelInfo {
            id,
            topic: topic.to_string(),
            message_encoding: encoding.to_string(),
        });
        self.channels.sort_by_key(|c| c.id);
        self
    }

    pub fn with_message(mut self, channel_id: u16, log_time: u64, data: impl Into<Vec<u8>>) -> Self {
        self.push(channel_id, log_time, data);
        self
    }

    pub fn push(&mut self, channel_id: u16, log_time: u64, data: impl Into<Vec<u8>>) {
        self.messages.push((channel_id, log_time, data.into()));
    }
}

impl MessageSource for MemorySource {
    fn channels(&self) -> Result<Vec<ChannelInfo>> {
        Ok(self.channels.clone())
    }

    fn statistics(&self) -> Result<Option<SourceStatistics>> {
        let mut stats = SourceStatistics {
            message_count: self.messages.len() as u64,
            ..Default::default()
        };
        stats.message_start_time = self.messages.iter().map(|m| m.1).min().unwrap_or(0);
        stats.message_end_time = self.messages.iter().map(|m| m.1).max().unwrap_or(0);
        for (id, _, _) in &self.messages {
            *stats.channel_message_counts.entry(*id).or_default() += 1;
        }
        Ok(Some(stats))
    }

    fn messages(&self, channel: Option<u16>) -> Result<MessageIter<'_>> {
        Ok(Box::new(
            self.messages
                .iter()
                .filter(move |(id, _, _)| channel.is_none_or(|c| c == *id))
                .map(|(id, t, data)| {
                    Ok(Message {
                        channel_id: *id,
                        log_time: *t,
                        publish_time: *t,
                        data: Cow::Borrowed(data.as_slice()),
                    })
                }),
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub id: u16,
    pub topic: String,
    pub encoding: String,
    pub messages: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub file: String,
    pub format: &'static str,
    pub statistics: Option<SourceStatistics>,
    pub channels: Vec<ChannelSummary>,
}

pub fn list_channels(label: &str, source: &impl MessageSource) -> Result<SourceInfo> {
    let statistics = source.statistics()?;
    let channels = source
        .channels()?
        .into_iter()
        .map(|c| ChannelSummary {
            messages: statistics
                .as_ref()
                .and_then(|s| s.channel_message_counts.get(&c.id).copied())
                .unwrap_or(0),
            id: c.id,
            topic: c.topic,
            encoding: c.message_encoding,
        })
        .collect();
    Ok(SourceInfo {
        file: label.to_string(),
        format: "MCAP (SVO2)",
        statistics,
        channels,
    })
}

pub fn print_source_info(info: &SourceInfo) {
    println!("File: {}", info.file);
    println!("Format: {}", info.format);
    match &info.statistics {
        Some(s) => {
            let duration = s.message_end_time.saturating_sub(s.message_start_time) as f64 / 1e9;
            println!(
                "Start (ns): {}, End (ns): {}, Duration (s): {:.6}, Total messages: {}\n",
                s.message_start_time, s.message_end_time, duration, s.message_count
            );
        }
        None => println!("Statistics: unavailable\n"),
    }

    let mut table = Table::new();
    table.add_row(row!["ID", "Topic", "Encoding", "Messages"]);
    for c in &info.channels {
        table.add_row(row![c.id, c.topic, c.encoding, c.messages]);
    }
    table.printstd();
}

pub fn inspect(path: &str) -> Result<()> {
    let source = McapSource::open(path)?;
    let info = list_channels(path, &source)?;
    print_source_info(&info);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_channel_source() -> MemorySource {
        MemorySource::new()
            .with_channel(2, "side_by_side", "")
            .with_channel(1, "sensors", "")
            .with_message(1, 10, vec![1, 2])
            .with_message(2, 11, vec![3])
            .with_message(1, 12, vec![4])
    }

    #[test]
    fn channels_are_sorted_by_id() {
        let src = two_channel_source();
        let ids: Vec<u16> = src.channels().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn messages_filter_and_replay() {
        let src = two_channel_source();
        let first: Vec<u64> = src.messages(Some(1)).unwrap().map(|m| m.unwrap().log_time).collect();
        let again: Vec<u64> = src.messages(Some(1)).unwrap().map(|m| m.unwrap().log_time).collect();
        assert_eq!(first, vec![10, 12]);
        assert_eq!(first, again);
        assert_eq!(src.messages(None).unwrap().count(), 3);
    }

    #[test]
    fn listing_counts_messages_per_channel() {
        let info = list_channels("mem", &two_channel_source()).unwrap();
        assert_eq!(info.channels[0].topic, "sensors");
        assert_eq!(info.channels[0].messages, 2);
        assert_eq!(info.channels[1].messages, 1);
        let stats = info.statistics.unwrap();
        assert_eq!((stats.message_start_time, stats.message_end_time), (10, 12));
    }
}
