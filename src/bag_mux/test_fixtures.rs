//! Synthetic bags and in-memory doubles for tests.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use camino::{Utf8Path, Utf8PathBuf};
use cdr_encoding::{from_bytes, to_vec};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use super::bag::BagSource;
use super::error::{MuxError, Result};
use super::record::{BagRecord, ChannelInfo, SchemaInfo};
use super::sensors::basic::Point;
use super::sensors::header::Header;
use super::sensors::tf::{self, TFMessage, Transform, TransformStamped};
use super::sensors::timestamp::Timestamp;
use super::sensors::utils::{encapsulation, CdrEndian, ENCAPSULATION_LEN};
use super::sink::{RecordSink, SinkSummary};

pub(crate) const POINT_SCHEMA_NAME: &str = "geometry_msgs/msg/PointStamped";
pub(crate) const POINT_SCHEMA_DEF: &str = "std_msgs/Header header\ngeometry_msgs/Point point\n================================================================================\nMSG: std_msgs/Header\nbuiltin_interfaces/Time stamp\nstring frame_id\n================================================================================\nMSG: builtin_interfaces/Time\nint32 sec\nuint32 nanosec\n================================================================================\nMSG: geometry_msgs/Point\nfloat64 x\nfloat64 y\nfloat64 z\n";
pub(crate) const ROS1_POINT_SCHEMA_DEF: &str =
    "Header header\ngeometry_msgs/Point point\n================================================================================\nMSG: std_msgs/Header\nuint32 seq\ntime stamp\nstring frame_id\n";
pub(crate) const SENSOR_QOS: &str = "- history: 1\n  depth: 10\n  reliability: 1\n  durability: 2\n";

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub(crate) struct PointStamped {
    pub header: Header,
    pub point: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FixtureKind {
    Point,
    Tf,
    Ros1Point,
    Raw,
}

#[derive(Debug, Clone)]
pub(crate) struct FixtureMessage {
    pub topic: String,
    pub kind: FixtureKind,
    pub log_time: u64,
    pub raw: Vec<u8>,
}

impl FixtureMessage {
    /// `PointStamped` whose header carries `log_time`.
    pub fn point(topic: &str, log_time: u64) -> Self {
        Self::new(topic, FixtureKind::Point, log_time)
    }

    /// `/tf` message with two transforms stamped at `log_time`.
    pub fn tf(log_time: u64) -> Self {
        Self::new("/tf", FixtureKind::Tf, log_time)
    }

    pub fn ros1_point(topic: &str, log_time: u64) -> Self {
        Self::new(topic, FixtureKind::Ros1Point, log_time)
    }

    /// Schema-less payload.
    pub fn raw(topic: &str, log_time: u64, raw: Vec<u8>) -> Self {
        FixtureMessage {
            raw,
            ..Self::new(topic, FixtureKind::Raw, log_time)
        }
    }

    fn new(topic: &str, kind: FixtureKind, log_time: u64) -> Self {
        FixtureMessage {
            topic: topic.to_string(),
            kind,
            log_time,
            raw: Vec::new(),
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        let stamp = Timestamp::new(self.log_time);
        match self.kind {
            FixtureKind::Point => point_payload(stamp),
            FixtureKind::Tf => tf_payload(stamp),
            FixtureKind::Ros1Point => ros1_point_payload(stamp),
            FixtureKind::Raw => self.raw.clone(),
        }
    }

    pub fn channel(&self) -> ChannelInfo {
        let mut metadata = BTreeMap::new();
        metadata.insert("offered_qos_profiles".to_string(), SENSOR_QOS.to_string());
        let (encoding, schema) = match self.kind {
            FixtureKind::Point => ("cdr", Some(ros2_schema(POINT_SCHEMA_NAME, POINT_SCHEMA_DEF))),
            FixtureKind::Tf => ("cdr", Some(ros2_schema(tf::SCHEMA_NAME, tf::SCHEMA_DEF))),
            FixtureKind::Ros1Point => (
                "ros1",
                Some(SchemaInfo {
                    name: "geometry_msgs/PointStamped".to_string(),
                    encoding: "ros1msg".to_string(),
                    data: ROS1_POINT_SCHEMA_DEF.as_bytes().to_vec(),
                }),
            ),
            FixtureKind::Raw => ("application/octet-stream", None),
        };
        ChannelInfo::new(&self.topic, encoding, metadata, schema)
    }
}

fn ros2_schema(name: &str, def: &str) -> SchemaInfo {
    SchemaInfo {
        name: name.to_string(),
        encoding: "ros2msg".to_string(),
        data: def.as_bytes().to_vec(),
    }
}

pub(crate) fn point_payload(stamp: Timestamp) -> Vec<u8> {
    let msg = PointStamped {
        header: Header::new(stamp, "map").unwrap(),
        point: Point {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        },
    };
    let mut buffer = encapsulation(CdrEndian::Little).to_vec();
    buffer.extend(to_vec::<PointStamped, LittleEndian>(&msg).unwrap());
    buffer
}

pub(crate) fn tf_payload(stamp: Timestamp) -> Vec<u8> {
    let mut tf_message = TFMessage::new();
    for (frame_id, child) in [("odom", "base_link"), ("base_link", "lidar")] {
        tf_message.add(TransformStamped {
            header: Header::new(stamp, frame_id).unwrap(),
            child_frame_id: child.to_string(),
            transform: Transform::identity(),
        });
    }
    tf_message.to_cdr(CdrEndian::Little).unwrap()
}

pub(crate) fn ros1_point_payload(stamp: Timestamp) -> Vec<u8> {
    let (sec, nsec) = stamp.get_sec_nsec();
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);
    cursor.write_u32::<LittleEndian>(7).unwrap();
    cursor.write_u32::<LittleEndian>(sec as u32).unwrap();
    cursor.write_u32::<LittleEndian>(nsec).unwrap();
    cursor.write_u32::<LittleEndian>(3).unwrap();
    cursor.write_all(b"map").unwrap();
    for v in [1.0f64, 2.0, 3.0] {
        cursor.write_f64::<LittleEndian>(v).unwrap();
    }
    buffer
}

/// Header stamp of a CDR `PointStamped` payload.
pub(crate) fn point_stamp(data: &[u8]) -> Timestamp {
    let (msg, _) = from_bytes::<PointStamped, LittleEndian>(&data[ENCAPSULATION_LEN..]).unwrap();
    msg.header.get_timestamp()
}

/// Header stamps of every transform in a CDR `TFMessage` payload.
pub(crate) fn tf_stamps(data: &[u8]) -> Vec<Timestamp> {
    let (msg, _) = TFMessage::from_cdr(data).unwrap();
    msg.transforms
        .iter()
        .map(|t| t.header.get_timestamp())
        .collect()
}

/// Scratch directory that writes MCAP bags and is removed on drop.
pub(crate) struct BagFixture {
    temp_dir: TempDir,
}

impl BagFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.temp_dir.path().join(name))
            .expect("temp dir should be UTF-8")
    }

    /// Writes a chunked, fully indexed bag with small chunks.
    pub fn write_bag(&self, name: &str, messages: &[FixtureMessage]) -> Utf8PathBuf {
        let options = mcap::WriteOptions::new()
            .compression(None)
            .profile("ros2")
            .use_chunks(true)
            .chunk_size(Some(256))
            .emit_message_indexes(true);
        self.write_with(name, options, messages)
    }

    /// Writes messages outside of chunks, so there is nothing to index.
    pub fn write_unchunked_bag(&self, name: &str, messages: &[FixtureMessage]) -> Utf8PathBuf {
        let options = mcap::WriteOptions::new()
            .compression(None)
            .profile("ros2")
            .use_chunks(false);
        self.write_with(name, options, messages)
    }

    pub fn write_with(
        &self,
        name: &str,
        options: mcap::WriteOptions,
        messages: &[FixtureMessage],
    ) -> Utf8PathBuf {
        let path = self.path(name);
        let mut writer = options
            .create(BufWriter::new(File::create(&path).unwrap()))
            .unwrap();
        let mut channels: HashMap<(String, FixtureKind), u16> = HashMap::new();
        let mut sequences: HashMap<u16, u32> = HashMap::new();
        for message in messages {
            let key = (message.topic.clone(), message.kind);
            let channel_id = match channels.get(&key) {
                Some(id) => *id,
                None => {
                    let info = message.channel();
                    let schema_id = match &info.schema {
                        Some(schema) => writer
                            .add_schema(&schema.name, &schema.encoding, &schema.data)
                            .unwrap(),
                        None => 0,
                    };
                    let id = writer
                        .add_channel(
                            schema_id,
                            &info.topic,
                            &info.message_encoding,
                            &info.metadata,
                        )
                        .unwrap();
                    channels.insert(key, id);
                    id
                }
            };
            let sequence = sequences.entry(channel_id).or_insert(0);
            *sequence += 1;
            let header = mcap::records::MessageHeader {
                channel_id,
                sequence: *sequence,
                log_time: message.log_time,
                publish_time: message.log_time,
            };
            writer
                .write_to_known_channel(&header, &message.payload())
                .unwrap();
        }
        writer.finish().unwrap();
        path
    }
}

/// [`BagSource`] over records held in memory, optionally failing at one index.
pub(crate) struct MemoryBag {
    path: Utf8PathBuf,
    records: Vec<BagRecord>,
    corrupt_at: Option<usize>,
}

impl MemoryBag {
    pub fn new(name: &str, messages: &[FixtureMessage]) -> Self {
        let mut channels: HashMap<(String, FixtureKind), Arc<ChannelInfo>> = HashMap::new();
        let records = messages
            .iter()
            .enumerate()
            .map(|(i, m)| BagRecord {
                channel: channels
                    .entry((m.topic.clone(), m.kind))
                    .or_insert_with(|| Arc::new(m.channel()))
                    .clone(),
                sequence: i as u32,
                log_time: Timestamp::new(m.log_time),
                publish_time: Timestamp::new(m.log_time),
                data: m.payload(),
            })
            .collect();
        MemoryBag {
            path: Utf8PathBuf::from(name),
            records,
            corrupt_at: None,
        }
    }

    /// Raw records stamped at `times` on one schema-less topic.
    pub fn from_times(name: &str, times: &[u64]) -> Self {
        let messages: Vec<_> = times
            .iter()
            .map(|t| FixtureMessage::raw(&format!("/{}", name), *t, name.as_bytes().to_vec()))
            .collect();
        Self::new(name, &messages)
    }

    pub fn corrupt_at(mut self, index: usize) -> Self {
        self.corrupt_at = Some(index);
        self
    }

    /// Cuts the payload of record `index` down to `len` bytes.
    pub fn truncate_payload(&mut self, index: usize, len: usize) {
        self.records[index].data.truncate(len);
    }

}

impl BagSource for MemoryBag {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn read_at(&self, index: usize) -> Result<BagRecord> {
        if self.corrupt_at == Some(index) {
            return Err(MuxError::corrupt(&self.path, index, "bad record header"));
        }
        self.records
            .get(index)
            .cloned()
            .ok_or_else(|| MuxError::IndexOutOfRange {
                path: self.path.clone(),
                index,
                len: self.records.len(),
            })
    }

    fn first_timestamp(&self) -> Result<Timestamp> {
        self.records
            .first()
            .map(|r| r.log_time)
            .ok_or_else(|| MuxError::EmptyStream {
                path: self.path.clone(),
            })
    }
}

/// [`RecordSink`] that keeps everything it is given.
#[derive(Default)]
pub(crate) struct MemorySink {
    pub records: Vec<BagRecord>,
    pub finalize_calls: usize,
}

impl MemorySink {
    pub fn log_times(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.log_time.timestamp).collect()
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, record: &BagRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn finalize(&mut self) -> Result<SinkSummary> {
        self.finalize_calls += 1;
        let mut summary = SinkSummary::default();
        for record in &self.records {
            summary.record(record);
        }
        Ok(summary)
    }
}
