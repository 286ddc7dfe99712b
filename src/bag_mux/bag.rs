//! Random access into recorded bags.
//!
//! An MCAP file written with chunks carries, in its summary section, one
//! chunk index per chunk and, after every chunk, a message index per channel
//! giving each message's log time and offset inside the decompressed chunk.
//! [`McapBag`] turns those into one locator per message so any message can
//! be read directly, without streaming through the ones before it.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use mcap::records::{ChunkIndex, MessageIndexEntry};
use mcap::Summary;
use memmap::Mmap;
use tracing::debug;

use super::error::{MuxError, Result};
use super::io;
use super::record::{BagRecord, ChannelInfo};
use super::sensors::timestamp::Timestamp;

/// The slice of bag access the merge needs: a message count, positional
/// reads and the time of the first message.
pub trait BagSource {
    fn path(&self) -> &Utf8Path;

    /// Number of messages, which is also one past the last readable index.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads message `index` in chronological order.
    fn read_at(&self, index: usize) -> Result<BagRecord>;

    /// Log time of message 0. Must not be called on an empty source.
    fn first_timestamp(&self) -> Result<Timestamp> {
        Ok(self.read_at(0)?.log_time)
    }
}

struct MessageLocator {
    chunk: usize,
    entry: MessageIndexEntry,
}

/// A memory-mapped MCAP file and the index of its messages.
pub struct McapBag {
    path: Utf8PathBuf,
    mapped: Mmap,
    // Only the channel table is kept; chunk indexes live alongside.
    summary: Summary<'static>,
    chunk_indexes: Vec<ChunkIndex>,
    locators: Vec<MessageLocator>,
    channels: HashMap<u16, Arc<ChannelInfo>>,
}

impl McapBag {
    /// Maps `path` and indexes it from its summary and message indexes.
    ///
    /// Chunk bodies are not touched. A bag whose statistics record zero
    /// messages is reported as [`MuxError::EmptyStream`] so callers can skip
    /// it. Messages the index cannot reach make the bag unreadable.
    pub fn open<P: AsRef<Utf8Path>>(path: P) -> Result<McapBag> {
        let path = path.as_ref().to_path_buf();
        let mapped = io::map_mcap(&path)?;

        let mut summary = Summary::read(&mapped)
            .map_err(|e| MuxError::unreadable(&path, e))?
            .ok_or_else(|| {
                MuxError::unreadable(&path, "no summary section, the bag was not closed properly")
            })?;
        let chunk_indexes = std::mem::take(&mut summary.chunk_indexes);

        let mut locators = Vec::new();
        for (chunk, chunk_index) in chunk_indexes.iter().enumerate() {
            // Chunks holding only schemas and channels have no message index.
            if chunk_index.message_index_offsets.is_empty() {
                continue;
            }
            let indexes = summary
                .read_message_indexes(&mapped, chunk_index)
                .map_err(|e| MuxError::unreadable(&path, e))?;
            for (_channel, entries) in indexes {
                locators.extend(
                    entries
                        .into_iter()
                        .map(|entry| MessageLocator { chunk, entry }),
                );
            }
        }
        // Message indexes are per channel; interleave them back into file order.
        locators.sort_by_key(|l| {
            (
                l.entry.log_time,
                chunk_indexes[l.chunk].chunk_start_offset,
                l.entry.offset,
            )
        });

        let message_count = summary.stats.as_ref().map(|stats| stats.message_count);
        match message_count {
            Some(count) if count != locators.len() as u64 => {
                return Err(MuxError::unreadable(
                    &path,
                    format!(
                        "summary reports {} messages but the message indexes locate {}",
                        count,
                        locators.len()
                    ),
                ));
            }
            Some(0) => return Err(MuxError::EmptyStream { path }),
            // Without statistics an empty index does not prove an empty bag.
            None if locators.is_empty() => {
                return Err(MuxError::unreadable(
                    &path,
                    "no message index locates any message and there are no statistics \
                     to confirm the bag is empty (unchunked or unindexed bag?)",
                ));
            }
            _ => {}
        }

        let channels = summary
            .channels
            .iter()
            .map(|(id, channel)| (*id, Arc::new(ChannelInfo::from(channel.as_ref()))))
            .collect();
        let owned_summary = Summary {
            channels: summary
                .channels
                .values()
                .map(|channel| (channel.id, Arc::new(owned_channel(channel))))
                .collect(),
            ..Default::default()
        };
        drop(summary);

        debug!(
            "Indexed {}: {} messages in {} chunks",
            path,
            locators.len(),
            chunk_indexes.len()
        );

        Ok(McapBag {
            path,
            mapped,
            summary: owned_summary,
            chunk_indexes,
            locators,
            channels,
        })
    }

    /// Log times of the first and last message.
    pub fn time_range(&self) -> (Timestamp, Timestamp) {
        let first = self.locators.first().map_or(0, |l| l.entry.log_time);
        let last = self.locators.last().map_or(0, |l| l.entry.log_time);
        (Timestamp::new(first), Timestamp::new(last))
    }

    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.channels.values().map(|c| c.topic.as_str()).collect();
        topics.sort_unstable();
        topics.dedup();
        topics
    }
}

impl BagSource for McapBag {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn len(&self) -> usize {
        self.locators.len()
    }

    fn read_at(&self, index: usize) -> Result<BagRecord> {
        let locator = self
            .locators
            .get(index)
            .ok_or_else(|| MuxError::IndexOutOfRange {
                path: self.path.clone(),
                index,
                len: self.locators.len(),
            })?;
        let chunk_index = &self.chunk_indexes[locator.chunk];
        let message = self
            .summary
            .seek_message(&self.mapped, chunk_index, &locator.entry)
            .map_err(|e| MuxError::corrupt(&self.path, index, e))?;
        let channel = self
            .channels
            .get(&message.channel.id)
            .cloned()
            .ok_or_else(|| {
                MuxError::corrupt(
                    &self.path,
                    index,
                    format!("unknown channel {}", message.channel.id),
                )
            })?;
        Ok(BagRecord {
            channel,
            sequence: message.sequence,
            log_time: Timestamp::new(message.log_time),
            publish_time: Timestamp::new(message.publish_time),
            data: message.data.into_owned(),
        })
    }

    fn first_timestamp(&self) -> Result<Timestamp> {
        // The message index already carries the log time.
        self.locators
            .first()
            .map(|l| Timestamp::new(l.entry.log_time))
            .ok_or_else(|| MuxError::EmptyStream {
                path: self.path.clone(),
            })
    }
}

fn owned_channel(channel: &mcap::Channel<'_>) -> mcap::Channel<'static> {
    mcap::Channel {
        id: channel.id,
        topic: channel.topic.clone(),
        schema: channel.schema.as_ref().map(|schema| {
            Arc::new(mcap::Schema {
                id: schema.id,
                name: schema.name.clone(),
                encoding: schema.encoding.clone(),
                data: Cow::Owned(schema.data.to_vec()),
            })
        }),
        message_encoding: channel.message_encoding.clone(),
        metadata: channel.metadata.clone(),
    }
}
