//! rosbag2 `metadata.yaml` describing the merged bag.

use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use super::error::{MuxError, Result};
use super::sink::SinkSummary;

pub const METADATA_FILE: &str = "metadata.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartingTime {
    nanoseconds_since_epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Duration {
    nanoseconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct File {
    path: String,
    starting_time: StartingTime,
    duration: Duration,
    message_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TopicWithMessageCount {
    pub(crate) topic_metadata: TopicMetadata,
    pub(crate) message_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TopicMetadata {
    pub(crate) name: String,
    #[serde(rename = "type")]
    pub(crate) type_: String,
    pub(crate) serialization_format: String,
    pub(crate) offered_qos_profiles: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RosbagInfo {
    version: u8,
    storage_identifier: String,
    relative_file_paths: Vec<String>,
    duration: Duration,
    starting_time: StartingTime,
    pub(crate) message_count: u64,
    compression_format: String,
    compression_mode: String,
    ros_distro: String,
    files: Vec<File>,
    pub(crate) topics_with_message_count: Vec<TopicWithMessageCount>,
}

impl RosbagInfo {
    pub fn new(filename: String, summary: &SinkSummary) -> RosbagInfo {
        let duration = Duration {
            nanoseconds: summary.duration(),
        };
        let starting_time = StartingTime {
            nanoseconds_since_epoch: summary.start_time.map_or(0, |t| t.timestamp),
        };
        let files = vec![File {
            path: filename.clone(),
            starting_time: starting_time.clone(),
            duration: duration.clone(),
            message_count: summary.message_count,
        }];

        let topics_with_message_count = summary
            .topics
            .values()
            .map(|tally| TopicWithMessageCount {
                topic_metadata: TopicMetadata {
                    name: tally.topic.clone(),
                    type_: tally.type_name.clone(),
                    serialization_format: tally.serialization_format.clone(),
                    offered_qos_profiles: tally.offered_qos_profiles.clone(),
                },
                message_count: tally.message_count,
            })
            .collect();

        RosbagInfo {
            version: 5,
            storage_identifier: "mcap".to_string(),
            relative_file_paths: vec![filename],
            duration,
            starting_time,
            message_count: summary.message_count,
            // Chunk compression is internal to MCAP, rosbag2 reports none.
            compression_format: "".to_string(),
            compression_mode: "".to_string(),
            ros_distro: "rosbag_mux".to_string(),
            files,
            topics_with_message_count,
        }
    }

    pub fn save_metadata<P: AsRef<Utf8Path>>(&self, path: P) -> Result<()> {
        let mut wrapper = BTreeMap::new();
        wrapper.insert("rosbag2_bagfile_information", self);
        let yaml_string =
            serde_yaml::to_string(&wrapper).map_err(|e| MuxError::output(path.as_ref(), e))?;
        fs::write(path.as_ref(), yaml_string).map_err(|e| MuxError::output(path.as_ref(), e))?;
        Ok(())
    }
}

/// Writes `metadata.yaml` next to the bag at `bag_path`.
pub fn save_metadata_file(bag_path: &Utf8Path, summary: &SinkSummary) -> Result<Utf8PathBuf> {
    let filename = bag_path
        .file_name()
        .ok_or_else(|| MuxError::output(bag_path, "bag path has no file name"))?;
    let info = RosbagInfo::new(filename.to_string(), summary);
    let metadata_path = bag_path
        .parent()
        .unwrap_or_else(|| Utf8Path::new(""))
        .join(METADATA_FILE);
    info.save_metadata(&metadata_path)?;
    Ok(metadata_path)
}
