use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Byte order announced by a CDR encapsulation header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdrEndian {
    Big,
    Little,
}

/// Size of the representation header in front of every CDR payload.
pub const ENCAPSULATION_LEN: usize = 4;

/// Reads the representation identifier of a CDR payload.
///
/// Only plain CDR is accepted. Parameter-list CDR starts its body with a
/// parameter header instead of the first field, so it is `None` like any
/// other representation.
pub fn read_encapsulation(data: &[u8]) -> Option<CdrEndian> {
    if data.len() < ENCAPSULATION_LEN {
        return None;
    }
    match (data[0], data[1]) {
        (0x00, 0x00) => Some(CdrEndian::Big),
        (0x00, 0x01) => Some(CdrEndian::Little),
        _ => None,
    }
}

pub fn encapsulation(endian: CdrEndian) -> [u8; ENCAPSULATION_LEN] {
    match endian {
        CdrEndian::Big => [0x00, 0x00, 0x00, 0x00],
        CdrEndian::Little => [0x00, 0x01, 0x00, 0x00],
    }
}

/// Steps over a ROS 1 string (`uint32` length followed by the bytes, no
/// terminator and no padding).
pub fn skip_ros1_string(cursor: &mut Cursor<&mut [u8]>) -> Result<(), std::io::Error> {
    let len = cursor.read_u32::<LittleEndian>()?;
    let end = cursor.position() + len as u64;
    if end > cursor.get_ref().len() as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("string of {} bytes runs past the payload", len),
        ));
    }
    cursor.set_position(end);
    Ok(())
}

#[test]
fn encapsulation_round_trip() {
    assert_eq!(
        read_encapsulation(&encapsulation(CdrEndian::Little)),
        Some(CdrEndian::Little)
    );
    assert_eq!(
        read_encapsulation(&encapsulation(CdrEndian::Big)),
        Some(CdrEndian::Big)
    );
    assert_eq!(read_encapsulation(&[0x00, 0x02, 0, 0]), None);
    assert_eq!(read_encapsulation(&[0x00, 0x03, 0, 0]), None);
    assert_eq!(read_encapsulation(&[0x00, 0x07, 0, 0]), None);
    assert_eq!(read_encapsulation(&[0x00]), None);
}

#[test]
fn ros1_string_skip_checks_bounds() {
    let mut data = vec![3u8, 0, 0, 0, b'a', b'b', b'c', 0xFF];
    let mut cursor = Cursor::new(data.as_mut_slice());
    skip_ros1_string(&mut cursor).unwrap();
    assert_eq!(cursor.position(), 7);

    let mut short = vec![9u8, 0, 0, 0, b'a'];
    let mut cursor = Cursor::new(short.as_mut_slice());
    assert!(skip_ros1_string(&mut cursor).is_err());
}
