use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use mcap::records::MessageHeader;
use mcap::{Compression, Writer};
use tracing::{debug, warn};

use super::error::{MuxError, Result};
use super::record::{BagRecord, ChannelInfo, SchemaInfo};
use super::sensors::timestamp::Timestamp;

/// Destination of the merged records.
///
/// `finalize` flushes and closes the output. It is called exactly once per
/// run, whether the run succeeded or not; writes after it fail.
pub trait RecordSink {
    fn write(&mut self, record: &BagRecord) -> Result<()>;
    fn finalize(&mut self) -> Result<SinkSummary>;
}

impl<T: RecordSink + ?Sized> RecordSink for &mut T {
    fn write(&mut self, record: &BagRecord) -> Result<()> {
        (**self).write(record)
    }

    fn finalize(&mut self) -> Result<SinkSummary> {
        (**self).finalize()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTally {
    pub topic: String,
    pub type_name: String,
    pub serialization_format: String,
    pub offered_qos_profiles: String,
    pub message_count: u64,
}

/// What ended up in the output, used to describe the bag in `metadata.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub message_count: u64,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    /// Keyed by topic and type name.
    pub topics: BTreeMap<(String, String), TopicTally>,
}

impl SinkSummary {
    pub fn record(&mut self, record: &BagRecord) {
        self.message_count += 1;
        self.start_time = Some(match self.start_time {
            Some(start) if start.is_before(&record.log_time) => start,
            _ => record.log_time,
        });
        self.end_time = Some(match self.end_time {
            Some(end) if record.log_time.is_before(&end) => end,
            _ => record.log_time,
        });

        let channel = &record.channel;
        let key = (channel.topic.clone(), channel.schema_name().to_string());
        self.topics
            .entry(key)
            .or_insert_with(|| TopicTally {
                topic: channel.topic.clone(),
                type_name: channel.schema_name().to_string(),
                serialization_format: channel.message_encoding.clone(),
                offered_qos_profiles: channel
                    .metadata
                    .get("offered_qos_profiles")
                    .cloned()
                    .unwrap_or_default(),
                message_count: 0,
            })
            .message_count += 1;
    }

    pub fn duration(&self) -> u64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.timestamp - start.timestamp,
            _ => 0,
        }
    }
}

/// Writes records to a rosbag2 MCAP file.
///
/// Schemas and channels are registered the first time a record needs them.
/// Inputs that describe a channel identically share one output channel, so
/// sequence numbers are reassigned per output channel, counting from 1.
pub struct McapSink {
    path: Utf8PathBuf,
    writer: Option<Writer<BufWriter<File>>>,
    schemas: HashMap<SchemaInfo, u16>,
    channels: HashMap<Arc<ChannelInfo>, u16>,
    sequences: HashMap<u16, u32>,
    summary: SinkSummary,
}

impl McapSink {
    pub fn create<P: AsRef<Utf8Path>>(path: P, compression: Option<Compression>) -> Result<McapSink> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| MuxError::output(&path, e))?;
        let writer = mcap::WriteOptions::new()
            .compression(compression)
            .profile("ros2")
            .library(&format!("rosbag_mux-{}", env!("CARGO_PKG_VERSION")))
            .use_chunks(true)
            .emit_message_indexes(true)
            .create(BufWriter::new(file))
            .map_err(|e| MuxError::output(&path, e))?;
        debug!("Writing merged bag to {}", path);
        Ok(McapSink {
            path,
            writer: Some(writer),
            schemas: HashMap::new(),
            channels: HashMap::new(),
            sequences: HashMap::new(),
            summary: SinkSummary::default(),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn channel_id(&mut self, channel: &Arc<ChannelInfo>) -> Result<u16> {
        if let Some(id) = self.channels.get(channel) {
            return Ok(*id);
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| MuxError::output(&self.path, "bag already finalized"))?;

        let schema_id = match &channel.schema {
            Some(schema) => match self.schemas.get(schema) {
                Some(id) => *id,
                None => {
                    let id = writer
                        .add_schema(&schema.name, &schema.encoding, &schema.data)
                        .map_err(|e| MuxError::output(&self.path, e))?;
                    self.schemas.insert(schema.clone(), id);
                    id
                }
            },
            // Schema id 0 means schemaless.
            None => 0,
        };
        let id = writer
            .add_channel(
                schema_id,
                &channel.topic,
                &channel.message_encoding,
                &channel.metadata,
            )
            .map_err(|e| MuxError::output(&self.path, e))?;
        debug!(
            "Registered channel {} for {} ({})",
            id,
            channel.topic,
            channel.schema_name()
        );
        self.channels.insert(Arc::clone(channel), id);
        Ok(id)
    }
}

impl RecordSink for McapSink {
    fn write(&mut self, record: &BagRecord) -> Result<()> {
        let channel_id = self.channel_id(&record.channel)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| MuxError::output(&self.path, "bag already finalized"))?;
        let sequence = self.sequences.entry(channel_id).or_insert(0);
        *sequence = sequence.wrapping_add(1);
        let header = MessageHeader {
            channel_id,
            sequence: *sequence,
            log_time: record.log_time.timestamp,
            publish_time: record.publish_time.timestamp,
        };
        writer
            .write_to_known_channel(&header, &record.data)
            .map_err(|e| MuxError::output(&self.path, e))?;
        self.summary.record(record);
        Ok(())
    }

    fn finalize(&mut self) -> Result<SinkSummary> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| MuxError::output(&self.path, "bag already finalized"))?;
        writer
            .finish()
            .map_err(|e| MuxError::output(&self.path, e))?;
        debug!(
            "Closed {} with {} messages",
            self.path, self.summary.message_count
        );
        Ok(std::mem::take(&mut self.summary))
    }
}

impl Drop for McapSink {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            warn!("{} dropped before being finalized, closing it", self.path);
            if let Err(e) = writer.finish() {
                warn!("Failed to close {}: {}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag_mux::bag::{BagSource, McapBag};
    use crate::bag_mux::test_fixtures::{point_stamp, BagFixture, FixtureMessage, MemoryBag};

    fn records(messages: &[FixtureMessage]) -> Vec<BagRecord> {
        let bag = MemoryBag::new("memory", messages);
        (0..bag.len()).map(|i| bag.read_at(i).unwrap()).collect()
    }

    fn channel_count(path: &Utf8Path) -> usize {
        let mapped = crate::bag_mux::io::map_mcap(path).unwrap();
        mcap::Summary::read(&mapped).unwrap().unwrap().channels.len()
    }

    #[test]
    fn written_bag_reads_back() {
        let fixture = BagFixture::new();
        let path = fixture.path("out.mcap");
        let input = records(&[
            FixtureMessage::point("/points", 10),
            FixtureMessage::tf(20),
            FixtureMessage::raw("/raw", 30, vec![1, 2, 3]),
            FixtureMessage::point("/points", 40),
        ]);

        let mut sink = McapSink::create(&path, None).unwrap();
        for record in &input {
            sink.write(record).unwrap();
        }
        let summary = sink.finalize().unwrap();
        assert_eq!(summary.message_count, 4);
        assert_eq!(summary.start_time, Some(Timestamp::new(10)));
        assert_eq!(summary.end_time, Some(Timestamp::new(40)));
        assert_eq!(summary.duration(), 30);
        let points = &summary.topics[&(
            "/points".to_string(),
            "geometry_msgs/msg/PointStamped".to_string(),
        )];
        assert_eq!(points.message_count, 2);
        assert_eq!(points.serialization_format, "cdr");
        assert!(points.offered_qos_profiles.contains("depth: 10"));

        let bag = McapBag::open(&path).unwrap();
        assert_eq!(bag.len(), 4);
        let sequences = [1, 1, 1, 2];
        for (i, expected) in input.iter().enumerate() {
            let record = bag.read_at(i).unwrap();
            assert_eq!(record.topic(), expected.topic());
            assert_eq!(record.sequence, sequences[i]);
            assert_eq!(record.log_time, expected.log_time);
            assert_eq!(record.data, expected.data);
            assert_eq!(*record.channel, *expected.channel);
        }
        assert_eq!(point_stamp(&bag.read_at(3).unwrap().data), Timestamp::new(40));
    }

    #[test]
    fn identical_channels_from_different_inputs_are_shared() {
        let fixture = BagFixture::new();
        let path = fixture.path("shared.mcap");
        let first = records(&[FixtureMessage::point("/points", 1)]);
        let second = records(&[FixtureMessage::point("/points", 2)]);
        assert!(!Arc::ptr_eq(&first[0].channel, &second[0].channel));
        let other = records(&[FixtureMessage::point("/other", 3)]);

        let mut sink = McapSink::create(&path, Some(Compression::Zstd)).unwrap();
        for record in first.iter().chain(&second).chain(&other) {
            sink.write(record).unwrap();
        }
        sink.finalize().unwrap();
        assert_eq!(channel_count(&path), 2);
        let bag = McapBag::open(&path).unwrap();
        assert_eq!(bag.len(), 3);
        // Both inputs start at sequence 0; the shared channel counts on.
        assert_eq!(first[0].sequence, second[0].sequence);
        let points: Vec<u32> = (0..bag.len())
            .map(|i| bag.read_at(i).unwrap())
            .filter(|r| r.topic() == "/points")
            .map(|r| r.sequence)
            .collect();
        assert_eq!(points, vec![1, 2]);
    }

    #[test]
    fn finalize_only_once() {
        let fixture = BagFixture::new();
        let path = fixture.path("once.mcap");
        let record = records(&[FixtureMessage::tf(5)]).remove(0);

        let mut sink = McapSink::create(&path, None).unwrap();
        sink.write(&record).unwrap();
        sink.finalize().unwrap();
        assert!(matches!(sink.finalize(), Err(MuxError::Output { .. })));
        assert!(matches!(sink.write(&record), Err(MuxError::Output { .. })));
    }

    #[test]
    fn dropped_sink_still_closes_the_bag() {
        let fixture = BagFixture::new();
        let path = fixture.path("dropped.mcap");
        {
            let mut sink = McapSink::create(&path, None).unwrap();
            for record in records(&vec![FixtureMessage::raw("/raw", 1, vec![0]); 3]) {
                sink.write(&record).unwrap();
            }
        }
        assert_eq!(McapBag::open(&path).unwrap().len(), 3);
    }

    #[test]
    fn empty_output_is_a_valid_bag() {
        let fixture = BagFixture::new();
        let path = fixture.path("empty.mcap");
        let mut sink = McapSink::create(&path, None).unwrap();
        let summary = sink.finalize().unwrap();
        assert_eq!(summary, SinkSummary::default());
        assert_eq!(summary.duration(), 0);
        assert!(matches!(
            McapBag::open(&path),
            Err(MuxError::EmptyStream { .. })
        ));
    }
}
