//! Length-prefixed strings.
//!
//! Two encodings share the same length convention: the length is a
//! stop-bit signed integer, `-1` meaning "absent" (`None`) and `0` meaning
//! present-but-empty. The 8-bit form stores one byte per character and
//! rejects anything outside Latin-1; the UTF-8 form stores the raw UTF-8
//! byte length and the encoded bytes directly.

use crate::bytes::Bytes;
use crate::codec::stopbit;
use crate::error::{BytesError, Result};

pub fn write_8bit(bytes: &mut Bytes, value: Option<&str>) -> Result<()> {
    match value {
        None => stopbit::write_signed(bytes, -1),
        Some(s) => {
            if s.chars().any(|c| c as u32 > 0xFF) {
                return Err(BytesError::InvalidArgument(
                    "8-bit string contains a character outside Latin-1",
                ));
            }
            stopbit::write_signed(bytes, s.chars().count() as i64)?;
            for ch in s.chars() {
                bytes.write_byte(ch as u8)?;
            }
            Ok(())
        }
    }
}

/// Reads a length-prefixed 8-bit string. In lenient mode, an absent
/// (`-1`-length) string reads back as `Some("")` rather than `None`,
/// matching the convention [`read_utf8`] and the rest of the lenient
/// read paths use — an absent value and an empty one are the same thing
/// under the empty-string identity.
pub fn read_8bit(bytes: &mut Bytes, lenient: bool) -> Result<Option<String>> {
    let len = stopbit::read_signed(bytes)?;
    if len < 0 {
        return Ok(if lenient { Some(String::new()) } else { None });
    }
    let len = len as usize;
    let mut s = String::with_capacity(len);
    for _ in 0..len {
        s.push(bytes.read_byte()? as char);
    }
    Ok(Some(s))
}

/// Reads ISO-8859-1 bytes into `dst` up to and including a `stop` byte,
/// appending one `char` per byte read and consuming the stop byte
/// without appending it. Unlike [`read_8bit`] this has no length prefix
/// or absent/present distinction — the caller supplies the delimiter.
///
/// In lenient mode, running out of input before `stop` turns up just
/// ends the scan with whatever was collected; in strict mode the same
/// situation is a read underflow.
pub fn parse_8bit(bytes: &mut Bytes, dst: &mut String, stop: u8, lenient: bool) -> Result<()> {
    loop {
        if bytes.remaining() == 0 {
            if lenient {
                return Ok(());
            }
            return Err(BytesError::ReadUnderflow {
                position: bytes.read_position(),
                requested: 1,
                limit: bytes.read_limit(),
            });
        }
        let b = bytes.read_byte()?;
        if b == stop {
            return Ok(());
        }
        dst.push(b as char);
    }
}

pub fn write_utf8(bytes: &mut Bytes, value: Option<&str>) -> Result<()> {
    match value {
        None => stopbit::write_signed(bytes, -1),
        Some(s) => {
            stopbit::write_signed(bytes, s.len() as i64)?;
            bytes.write_bytes(s.as_bytes())
        }
    }
}

/// Reads a length-prefixed UTF-8 string. In lenient mode, an absent
/// (`-1`-length) string reads back as `Some("")` rather than `None`, and
/// invalid byte sequences are replaced with U+FFFD instead of failing.
pub fn read_utf8(bytes: &mut Bytes, lenient: bool) -> Result<Option<String>> {
    let len = stopbit::read_signed(bytes)?;
    if len < 0 {
        return Ok(if lenient { Some(String::new()) } else { None });
    }
    let len = len as usize;
    let mut buf = vec![0u8; len];
    bytes.read_bytes(&mut buf)?;
    match String::from_utf8(buf) {
        Ok(s) => Ok(Some(s)),
        Err(e) => {
            if lenient {
                Ok(Some(String::from_utf8_lossy(e.as_bytes()).into_owned()))
            } else {
                Err(BytesError::InvalidUtf8)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_bit_round_trips_present_and_absent() {
        let mut b = Bytes::heap(32);
        write_8bit(&mut b, Some("hello")).unwrap();
        write_8bit(&mut b, None).unwrap();
        write_8bit(&mut b, Some("")).unwrap();
        assert_eq!(read_8bit(&mut b, false).unwrap(), Some("hello".to_string()));
        assert_eq!(read_8bit(&mut b, false).unwrap(), None);
        assert_eq!(read_8bit(&mut b, false).unwrap(), Some(String::new()));
    }

    #[test]
    fn eight_bit_lenient_read_treats_absent_as_empty() {
        let mut b = Bytes::heap(32);
        write_8bit(&mut b, None).unwrap();
        assert_eq!(read_8bit(&mut b, true).unwrap(), Some(String::new()));
    }

    #[test]
    fn eight_bit_rejects_non_latin1() {
        let mut b = Bytes::heap(32);
        assert!(write_8bit(&mut b, Some("héllo \u{1F600}")).is_err());
    }

    #[test]
    fn utf8_round_trips_multibyte_text() {
        let mut b = Bytes::heap(64);
        write_utf8(&mut b, Some("héllo 🎉")).unwrap();
        assert_eq!(
            read_utf8(&mut b, false).unwrap(),
            Some("héllo 🎉".to_string())
        );
    }

    #[test]
    fn utf8_rejects_invalid_sequences_unless_lenient() {
        let mut strict = Bytes::heap(32);
        stopbit::write_signed(&mut strict, 2).unwrap();
        strict.write_byte(0xFF).unwrap();
        strict.write_byte(0xFE).unwrap();
        assert!(matches!(
            read_utf8(&mut strict, false),
            Err(BytesError::InvalidUtf8)
        ));

        let mut lenient = Bytes::heap(32);
        stopbit::write_signed(&mut lenient, 2).unwrap();
        lenient.write_byte(0xFF).unwrap();
        lenient.write_byte(0xFE).unwrap();
        assert_eq!(read_utf8(&mut lenient, true).unwrap(), Some("\u{FFFD}\u{FFFD}".to_string()));
    }

    #[test]
    fn utf8_lenient_read_treats_absent_as_empty() {
        let mut b = Bytes::heap(32);
        write_utf8(&mut b, None).unwrap();
        assert_eq!(read_utf8(&mut b, true).unwrap(), Some(String::new()));
    }

    #[test]
    fn parse_8bit_reads_up_to_stop_byte() {
        let mut b = Bytes::heap(32);
        b.write_bytes(b"hello\0world").unwrap();
        let mut dst = String::new();
        parse_8bit(&mut b, &mut dst, 0, false).unwrap();
        assert_eq!(dst, "hello");
        assert_eq!(b.remaining(), 5);
    }

    #[test]
    fn parse_8bit_strict_errors_when_stop_never_found() {
        let mut b = Bytes::heap(32);
        b.write_bytes(b"no stop here").unwrap();
        let mut dst = String::new();
        assert!(matches!(
            parse_8bit(&mut b, &mut dst, 0, false),
            Err(BytesError::ReadUnderflow { .. })
        ));
    }

    #[test]
    fn parse_8bit_lenient_stops_at_end_of_input() {
        let mut b = Bytes::heap(32);
        b.write_bytes(b"no stop here").unwrap();
        let mut dst = String::new();
        parse_8bit(&mut b, &mut dst, 0, true).unwrap();
        assert_eq!(dst, "no stop here");
    }
}
