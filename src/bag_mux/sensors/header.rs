use super::timestamp::{Timestamp, NANOS_PER_SEC};
use serde::{Deserialize, Serialize};

/// `std_msgs/Header` as laid out on the ROS 2 (CDR) wire.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct Header {
    pub stamp_sec: i32,
    pub stamp_nsec: u32,
    pub frame_id: String,
}

impl Header {
    pub fn new(timestamp: Timestamp, frame_id: &str) -> Option<Header> {
        let (stamp_sec, stamp_nsec) = ros2_stamp(timestamp)?;
        Some(Header {
            stamp_sec,
            stamp_nsec,
            frame_id: frame_id.to_string(),
        })
    }

    /// Returns the timestamp of this [`Header`].
    #[inline]
    pub fn get_timestamp(&self) -> Timestamp {
        Timestamp::new((self.stamp_sec as u64) * NANOS_PER_SEC + (self.stamp_nsec as u64))
    }
}

/// `builtin_interfaces/Time` fields for `timestamp`, if the seconds fit an `int32`.
#[inline]
pub fn ros2_stamp(timestamp: Timestamp) -> Option<(i32, u32)> {
    let (sec, nsec) = timestamp.get_sec_nsec();
    Some((i32::try_from(sec).ok()?, nsec))
}

/// ROS 1 `time` fields for `timestamp`, if the seconds fit a `uint32`.
#[inline]
pub fn ros1_stamp(timestamp: Timestamp) -> Option<(u32, u32)> {
    let (sec, nsec) = timestamp.get_sec_nsec();
    Some((u32::try_from(sec).ok()?, nsec))
}

#[test]
fn header_stamp_round_trips_through_timestamp() {
    let t = Timestamp::new(1_700_000_000_123_456_789);
    let header = Header::new(t, "base_link").unwrap();
    assert_eq!(header.stamp_sec, 1_700_000_000);
    assert_eq!(header.stamp_nsec, 123_456_789);
    assert_eq!(header.get_timestamp(), t);
}

#[test]
fn stamps_past_field_range_are_rejected() {
    let far = Timestamp::new((i32::MAX as u64 + 1) * NANOS_PER_SEC);
    assert_eq!(ros2_stamp(far), None);
    assert_eq!(ros1_stamp(far), Some((i32::MAX as u32 + 1, 0)));
}
