use super::basic::{Quaternion, Vector3};
use super::header::Header;
use super::utils::{encapsulation, read_encapsulation, CdrEndian, ENCAPSULATION_LEN};
use byteorder::{BigEndian, LittleEndian};
use cdr_encoding::{from_bytes, to_vec};
use serde::{Deserialize, Serialize};

pub const SCHEMA_NAME: &str = "tf2_msgs/msg/TFMessage";

pub const SCHEMA_DEF: &str = "geometry_msgs/TransformStamped[] transforms\n================================================================================\nMSG: geometry_msgs/TransformStamped\nstd_msgs/Header header\nstring child_frame_id\ngeometry_msgs/Transform transform\n================================================================================\nMSG: std_msgs/Header\nbuiltin_interfaces/Time stamp\nstring frame_id\n================================================================================\nMSG: builtin_interfaces/Time\nint32 sec\nuint32 nanosec\n================================================================================\nMSG: geometry_msgs/Transform\ngeometry_msgs/Vector3 translation\ngeometry_msgs/Quaternion rotation\n================================================================================\nMSG: geometry_msgs/Vector3\nfloat64 x\nfloat64 y\nfloat64 z\n================================================================================\nMSG: geometry_msgs/Quaternion\nfloat64 x\nfloat64 y\nfloat64 z\nfloat64 w\n";

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct Transform {
    pub translation: Vector3,
    pub rotation: Quaternion,
}

impl Transform {
    /// Serialized size of `geometry_msgs/Transform` on the ROS 1 wire.
    pub const ROS1_LEN: usize = Vector3::WIRE_LEN + Quaternion::WIRE_LEN;

    pub fn identity() -> Transform {
        Transform {
            translation: Vector3::zero(),
            rotation: Quaternion::identity(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct TransformStamped {
    pub header: Header,
    pub child_frame_id: String,
    pub transform: Transform,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
pub struct TFMessage {
    pub transforms: Vec<TransformStamped>,
}

impl TFMessage {
    pub fn new() -> TFMessage {
        TFMessage {
            transforms: Vec::new(),
        }
    }

    pub fn add(&mut self, tf_stamped: TransformStamped) {
        self.transforms.push(tf_stamped);
    }

    /// Decodes an encapsulated CDR payload, returning the byte order it used.
    pub fn from_cdr(data: &[u8]) -> Result<(TFMessage, CdrEndian), String> {
        let endian = read_encapsulation(data)
            .ok_or_else(|| "missing or unknown CDR encapsulation".to_string())?;
        let body = &data[ENCAPSULATION_LEN..];
        let (message, _consumed_byte_count) = match endian {
            CdrEndian::Little => from_bytes::<TFMessage, LittleEndian>(body),
            CdrEndian::Big => from_bytes::<TFMessage, BigEndian>(body),
        }
        .map_err(|e| e.to_string())?;
        Ok((message, endian))
    }

    /// Encodes with an encapsulation header for `endian`.
    pub fn to_cdr(&self, endian: CdrEndian) -> Result<Vec<u8>, String> {
        let serialized = match endian {
            CdrEndian::Little => to_vec::<TFMessage, LittleEndian>(self),
            CdrEndian::Big => to_vec::<TFMessage, BigEndian>(self),
        }
        .map_err(|e| e.to_string())?;
        let mut buffer = Vec::with_capacity(ENCAPSULATION_LEN + serialized.len());
        buffer.extend_from_slice(&encapsulation(endian));
        buffer.extend_from_slice(&serialized);
        Ok(buffer)
    }
}
