use std::collections::BTreeMap;
use std::sync::Arc;

use super::sensors::timestamp::Timestamp;

/// Wire encoding of a channel's payloads, as far as rebasing cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireEncoding {
    /// ROS 2 CDR with a 4-byte encapsulation header.
    Cdr,
    /// ROS 1 serialization, little endian.
    Ros1,
    #[default]
    Opaque,
}

/// Which timestamped fields a channel's payloads expose.
///
/// Derived from the schema text once per channel, so a payload is only ever
/// rewritten where its type says the field exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PayloadLayout {
    pub encoding: WireEncoding,
    /// The message starts with a `std_msgs/Header`.
    pub header: bool,
    /// The message starts with a `geometry_msgs/TransformStamped[]`.
    pub transforms: bool,
}

const HEADER_TYPES: &[&str] = &["std_msgs/Header", "std_msgs/msg/Header", "Header"];
const TRANSFORM_LIST_TYPES: &[&str] = &[
    "geometry_msgs/TransformStamped[]",
    "geometry_msgs/msg/TransformStamped[]",
];

impl PayloadLayout {
    pub fn detect(message_encoding: &str, schema: Option<&SchemaInfo>) -> PayloadLayout {
        let encoding = match message_encoding {
            "cdr" => WireEncoding::Cdr,
            "ros1" => WireEncoding::Ros1,
            _ => WireEncoding::Opaque,
        };
        let first_field = schema
            .filter(|s| s.encoding == "ros2msg" || s.encoding == "ros1msg")
            .and_then(|s| first_field(&s.data));

        match (encoding, first_field) {
            (WireEncoding::Opaque, _) | (_, None) => PayloadLayout::default(),
            (encoding, Some((ty, name))) => PayloadLayout {
                encoding,
                header: name == "header" && HEADER_TYPES.contains(&ty),
                transforms: name == "transforms" && TRANSFORM_LIST_TYPES.contains(&ty),
            },
        }
    }

    #[inline]
    pub fn is_opaque(&self) -> bool {
        !self.header && !self.transforms
    }
}

/// First serialized field of a `.msg` definition as `(type, name)`.
///
/// Comments, blank lines and constants are skipped; the search stops at the
/// first embedded definition.
fn first_field(definition: &[u8]) -> Option<(&str, &str)> {
    let text = std::str::from_utf8(definition).ok()?;
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("===") || line.starts_with("MSG:") {
            return None;
        }
        if line.contains('=') {
            continue;
        }
        let mut parts = line.split_whitespace();
        return Some((parts.next()?, parts.next()?));
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaInfo {
    pub name: String,
    pub encoding: String,
    pub data: Vec<u8>,
}

/// Owned description of the channel a record was logged on.
///
/// Two inputs that describe a channel identically end up on the same output
/// channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelInfo {
    pub topic: String,
    pub message_encoding: String,
    pub metadata: BTreeMap<String, String>,
    pub schema: Option<SchemaInfo>,
    pub layout: PayloadLayout,
}

impl ChannelInfo {
    pub fn new(
        topic: &str,
        message_encoding: &str,
        metadata: BTreeMap<String, String>,
        schema: Option<SchemaInfo>,
    ) -> ChannelInfo {
        let layout = PayloadLayout::detect(message_encoding, schema.as_ref());
        ChannelInfo {
            topic: topic.to_string(),
            message_encoding: message_encoding.to_string(),
            metadata,
            schema,
            layout,
        }
    }

    pub fn schema_name(&self) -> &str {
        self.schema.as_ref().map(|s| s.name.as_str()).unwrap_or("")
    }
}

impl From<&mcap::Channel<'_>> for ChannelInfo {
    fn from(channel: &mcap::Channel<'_>) -> Self {
        let schema = channel.schema.as_ref().map(|schema| SchemaInfo {
            name: schema.name.clone(),
            encoding: schema.encoding.clone(),
            data: schema.data.to_vec(),
        });
        ChannelInfo::new(
            &channel.topic,
            &channel.message_encoding,
            channel.metadata.clone(),
            schema,
        )
    }
}

/// One message read out of a bag.
#[derive(Debug, Clone, PartialEq)]
pub struct BagRecord {
    pub channel: Arc<ChannelInfo>,
    pub sequence: u32,
    /// Merge key.
    pub log_time: Timestamp,
    pub publish_time: Timestamp,
    pub data: Vec<u8>,
}

impl BagRecord {
    #[inline]
    pub fn topic(&self) -> &str {
        &self.channel.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag_mux::sensors::tf;

    fn ros2_schema(name: &str, def: &str) -> SchemaInfo {
        SchemaInfo {
            name: name.to_string(),
            encoding: "ros2msg".to_string(),
            data: def.as_bytes().to_vec(),
        }
    }

    #[test]
    fn header_first_is_detected() {
        let schema = ros2_schema(
            "geometry_msgs/msg/PointStamped",
            "# a point\n\nstd_msgs/Header header\ngeometry_msgs/Point point\n",
        );
        let layout = PayloadLayout::detect("cdr", Some(&schema));
        assert_eq!(layout.encoding, WireEncoding::Cdr);
        assert!(layout.header);
        assert!(!layout.transforms);
    }

    #[test]
    fn tf_message_is_detected() {
        let schema = ros2_schema(tf::SCHEMA_NAME, tf::SCHEMA_DEF);
        let layout = PayloadLayout::detect("cdr", Some(&schema));
        assert!(layout.transforms);
        assert!(!layout.header);
    }

    #[test]
    fn constants_do_not_count_as_fields() {
        let schema = SchemaInfo {
            name: "sensor_msgs/NavSatFix".to_string(),
            encoding: "ros1msg".to_string(),
            data: b"uint8 COVARIANCE_TYPE_UNKNOWN=0\nHeader header\nfloat64 latitude\n".to_vec(),
        };
        let layout = PayloadLayout::detect("ros1", Some(&schema));
        assert_eq!(layout.encoding, WireEncoding::Ros1);
        assert!(layout.header);
    }

    #[test]
    fn header_elsewhere_or_unknown_encoding_is_opaque() {
        let nested = ros2_schema(
            "my_msgs/msg/Wrapped",
            "float64 value\nstd_msgs/Header header\n",
        );
        assert!(PayloadLayout::detect("cdr", Some(&nested)).is_opaque());

        let header_first = ros2_schema("my_msgs/msg/Stamped", "std_msgs/Header header\n");
        assert!(PayloadLayout::detect("json", Some(&header_first)).is_opaque());
        assert!(PayloadLayout::detect("cdr", None).is_opaque());

        let idl = SchemaInfo {
            encoding: "ros2idl".to_string(),
            ..header_first
        };
        assert!(PayloadLayout::detect("cdr", Some(&idl)).is_opaque());
    }

    #[test]
    fn definition_without_fields_has_none() {
        assert_eq!(first_field(b"# only a comment\n"), None);
        assert_eq!(
            first_field(b"================\nMSG: std_msgs/Header\nbuiltin_interfaces/Time stamp\n"),
            None
        );
    }
}
