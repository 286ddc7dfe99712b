use std::io::{Cursor, Seek, SeekFrom};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use super::record::{BagRecord, WireEncoding};
use super::sensors::header::{ros1_stamp, ros2_stamp};
use super::sensors::tf::{TFMessage, Transform};
use super::sensors::timestamp::{TimeOffset, Timestamp};
use super::sensors::utils::{read_encapsulation, skip_ros1_string, CdrEndian};

/// Default upper bound of the per-stream jitter.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(100);

/// Bytes from the start of a payload to its header stamp, for both wire
/// encodings: the CDR encapsulation or the ROS 1 `seq` field come first.
const HEADER_STAMP_OFFSET: usize = 4;
const HEADER_STAMP_END: usize = HEADER_STAMP_OFFSET + 8;

#[derive(Debug, Error)]
pub enum RebaseError {
    #[error("shifting {time} by {offset} leaves the representable time range")]
    TimeOverflow { time: Timestamp, offset: TimeOffset },
    #[error("stamp {0} does not fit the message header")]
    StampOverflow(Timestamp),
    #[error("{0}")]
    Payload(String),
}

/// Random nudge added to each stream's offset so that bags recorded with the
/// same start time do not tie on every message.
///
/// The order of records that still tie exactly is otherwise unspecified.
pub struct Jitter {
    max: Duration,
    rng: StdRng,
}

impl Jitter {
    /// Uniform in `[0, max]`. A fixed `seed` makes runs reproducible.
    pub fn new(max: Duration, seed: Option<u64>) -> Jitter {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Jitter { max, rng }
    }

    /// Always zero.
    pub fn none() -> Jitter {
        Jitter::new(Duration::ZERO, Some(0))
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sample(&mut self) -> Duration {
        let max = self.max.as_nanos().min(u64::MAX as u128) as u64;
        Duration::from_nanos(self.rng.gen_range(0..=max))
    }
}

/// Constant shift applied to every record of one stream.
#[derive(Debug, Clone, Copy)]
pub struct TimeRebaser {
    offset: TimeOffset,
}

impl TimeRebaser {
    /// Offset that moves `first` onto `base_time + jitter`.
    pub fn new(
        base_time: Timestamp,
        first: Timestamp,
        jitter: Duration,
    ) -> Result<TimeRebaser, RebaseError> {
        let offset = TimeOffset::rebase(base_time, first, jitter).ok_or(
            RebaseError::TimeOverflow {
                time: first,
                offset: TimeOffset::default(),
            },
        )?;
        Ok(TimeRebaser { offset })
    }

    pub fn offset(&self) -> TimeOffset {
        self.offset
    }

    /// Shifts the record's log and publish times and rewrites the header and
    /// transform stamps its channel layout declares to the new log time.
    pub fn rebase(&self, mut record: BagRecord) -> Result<BagRecord, RebaseError> {
        record.log_time = self.shift(record.log_time)?;
        record.publish_time = self.shift(record.publish_time)?;

        let layout = record.channel.layout;
        if layout.header {
            restamp_header(layout.encoding, &mut record.data, record.log_time)?;
        }
        if layout.transforms {
            match layout.encoding {
                WireEncoding::Cdr => {
                    record.data = restamp_cdr_transforms(&record.data, record.log_time)?
                }
                WireEncoding::Ros1 => restamp_ros1_transforms(&mut record.data, record.log_time)?,
                WireEncoding::Opaque => {}
            }
        }
        Ok(record)
    }

    #[inline]
    fn shift(&self, time: Timestamp) -> Result<Timestamp, RebaseError> {
        time.checked_shift(self.offset)
            .ok_or(RebaseError::TimeOverflow {
                time,
                offset: self.offset,
            })
    }
}

fn restamp_header(
    encoding: WireEncoding,
    data: &mut [u8],
    stamp: Timestamp,
) -> Result<(), RebaseError> {
    if data.len() < HEADER_STAMP_END {
        debug!("Payload of {} bytes is too short for a header, left as is", data.len());
        return Ok(());
    }
    let endian = read_encapsulation(data);
    let field = &mut data[HEADER_STAMP_OFFSET..HEADER_STAMP_END];
    match encoding {
        WireEncoding::Cdr => {
            let (sec, nsec) = ros2_stamp(stamp).ok_or(RebaseError::StampOverflow(stamp))?;
            match endian {
                Some(CdrEndian::Little) => {
                    LittleEndian::write_i32(&mut field[..4], sec);
                    LittleEndian::write_u32(&mut field[4..], nsec);
                }
                Some(CdrEndian::Big) => {
                    BigEndian::write_i32(&mut field[..4], sec);
                    BigEndian::write_u32(&mut field[4..], nsec);
                }
                None => {
                    return Err(RebaseError::Payload(
                        "missing or unknown CDR encapsulation".to_string(),
                    ))
                }
            }
        }
        WireEncoding::Ros1 => {
            let (sec, nsec) = ros1_stamp(stamp).ok_or(RebaseError::StampOverflow(stamp))?;
            LittleEndian::write_u32(&mut field[..4], sec);
            LittleEndian::write_u32(&mut field[4..], nsec);
        }
        WireEncoding::Opaque => {}
    }
    Ok(())
}

fn restamp_cdr_transforms(data: &[u8], stamp: Timestamp) -> Result<Vec<u8>, RebaseError> {
    let (sec, nsec) = ros2_stamp(stamp).ok_or(RebaseError::StampOverflow(stamp))?;
    let (mut tf_message, endian) = TFMessage::from_cdr(data)
        .map_err(|e| RebaseError::Payload(format!("transform list does not decode: {}", e)))?;
    for transform in &mut tf_message.transforms {
        transform.header.stamp_sec = sec;
        transform.header.stamp_nsec = nsec;
    }
    tf_message
        .to_cdr(endian)
        .map_err(|e| RebaseError::Payload(format!("transform list does not encode: {}", e)))
}

/// ROS 1 has no alignment, so the stamps are patched in place while walking
/// the list.
fn restamp_ros1_transforms(data: &mut [u8], stamp: Timestamp) -> Result<(), RebaseError> {
    let (sec, nsec) = ros1_stamp(stamp).ok_or(RebaseError::StampOverflow(stamp))?;
    let len = data.len() as u64;
    let mut cursor = Cursor::new(data);
    let walk = |cursor: &mut Cursor<&mut [u8]>| -> Result<(), std::io::Error> {
        let count = cursor.read_u32::<LittleEndian>()?;
        for _ in 0..count {
            cursor.seek(SeekFrom::Current(4))?; // seq
            if cursor.position() + 8 > len {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            cursor.write_u32::<LittleEndian>(sec)?;
            cursor.write_u32::<LittleEndian>(nsec)?;
            skip_ros1_string(cursor)?; // frame_id
            skip_ros1_string(cursor)?; // child_frame_id
            cursor.seek(SeekFrom::Current(Transform::ROS1_LEN as i64))?;
            if cursor.position() > len {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
        }
        Ok(())
    };
    walk(&mut cursor)
        .map_err(|e| RebaseError::Payload(format!("transform list does not decode: {}", e)))
}
