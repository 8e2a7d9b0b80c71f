//! Nullable ASCII Strings
//!
//! ```text
//!   null      [7f]                      length -1
//!   ""        [00]                      length 0
//!   "AB"      [02] [41] [42]            length, then one byte per char
//! ```
//!
//! The length prefix is a compact signed integer (see [`super::compact`]),
//! so the null marker is the single byte `0x7f` and can never collide with a
//! real length.

use crate::wire::compact::{compacted_length, read_compact_i64, write_compact_i64};
use crate::wire::error::{WireError, WireResult};
use bytes::{Buf, BufMut};

/// Length prefix reserved for a `null` string.
pub const NULL_STRING_LENGTH: i64 = -1;

/// Returns the number of bytes `s` occupies when encoded.
pub fn ascii_string_length(s: Option<&str>) -> usize {
    match s {
        None => compacted_length(NULL_STRING_LENGTH),
        Some(s) => compacted_length(s.len() as i64) + s.len(),
    }
}

/// Writes a nullable ASCII string, returning the number of bytes written.
///
/// Strings containing non-ASCII characters are rejected, as is a destination
/// that cannot hold the whole encoding. In both cases nothing is written.
pub fn write_ascii_string<B: BufMut>(buf: &mut B, s: Option<&str>) -> WireResult<usize> {
    let Some(s) = s else {
        return write_compact_i64(buf, NULL_STRING_LENGTH);
    };

    if let Some(index) = s.bytes().position(|b| !b.is_ascii()) {
        return Err(WireError::NotAscii {
            index,
            byte: s.as_bytes()[index],
        });
    }

    let needed = ascii_string_length(Some(s));
    if buf.remaining_mut() < needed {
        return Err(WireError::Capacity {
            needed,
            available: buf.remaining_mut(),
        });
    }

    let prefix = write_compact_i64(buf, s.len() as i64)?;
    buf.put_slice(s.as_bytes());
    Ok(prefix + s.len())
}

/// Reads one nullable ASCII string, returning it and the bytes consumed.
pub fn read_ascii_string<B: Buf>(buf: &mut B) -> WireResult<(Option<String>, usize)> {
    let (length, prefix) = read_compact_i64(buf)?;

    if length == NULL_STRING_LENGTH {
        return Ok((None, prefix));
    }
    if length < 0 {
        return Err(WireError::InvalidLength(length));
    }

    let length = usize::try_from(length).map_err(|_| WireError::InvalidLength(length))?;
    if buf.remaining() < length {
        return Err(WireError::Truncated {
            needed: length,
            available: buf.remaining(),
        });
    }

    let mut payload = vec![0u8; length];
    buf.copy_to_slice(&mut payload);

    if let Some(index) = payload.iter().position(|b| !b.is_ascii()) {
        return Err(WireError::NotAscii {
            index,
            byte: payload[index],
        });
    }

    // All bytes are ASCII, so this cannot fail.
    let s = String::from_utf8(payload).map_err(|e| WireError::NotAscii {
        index: e.utf8_error().valid_up_to(),
        byte: 0,
    })?;

    Ok((Some(s), prefix + length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip(s: Option<&str>) {
        let mut buf = BytesMut::new();
        let written = write_ascii_string(&mut buf, s).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(written, ascii_string_length(s));

        let mut reader = buf.freeze();
        let (decoded, consumed) = read_ascii_string(&mut reader).unwrap();
        assert_eq!(decoded.as_deref(), s);
        assert_eq!(consumed, written);
        assert!(!reader.has_remaining());
    }

    #[test]
    fn test_roundtrip_null_empty_and_text() {
        roundtrip(None);
        roundtrip(Some(""));
        roundtrip(Some("A"));
        roundtrip(Some("The quick brown fox jumps over the lazy dog 0123456789"));
    }

    #[test]
    fn test_long_string_uses_wider_prefix() {
        let long = "x".repeat(200);
        roundtrip(Some(&long));
        assert_eq!(ascii_string_length(Some(&long)), 2 + 200);
    }

    #[test]
    fn test_wire_layout() {
        let mut buf = Vec::new();
        write_ascii_string(&mut buf, None).unwrap();
        write_ascii_string(&mut buf, Some("")).unwrap();
        write_ascii_string(&mut buf, Some("AB")).unwrap();
        assert_eq!(buf, vec![0x7f, 0x00, 0x02, b'A', b'B']);
    }

    #[test]
    fn test_rejects_non_ascii_on_encode() {
        let mut buf = Vec::new();
        let result = write_ascii_string(&mut buf, Some("caf\u{e9}"));
        assert_eq!(
            result,
            Err(WireError::NotAscii {
                index: 3,
                byte: 0xc3
            })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_rejects_non_ascii_on_decode() {
        let mut cursor = &[0x02, b'o', 0xff][..];
        assert_eq!(
            read_ascii_string(&mut cursor),
            Err(WireError::NotAscii {
                index: 1,
                byte: 0xff
            })
        );
    }

    #[test]
    fn test_rejects_negative_length() {
        // -2 encodes as 0x7e
        let mut cursor = &[0x7e][..];
        assert_eq!(
            read_ascii_string(&mut cursor),
            Err(WireError::InvalidLength(-2))
        );
    }

    #[test]
    fn test_truncated_payload() {
        let mut cursor = &[0x05, b'a', b'b'][..];
        assert_eq!(
            read_ascii_string(&mut cursor),
            Err(WireError::Truncated {
                needed: 5,
                available: 2
            })
        );
    }

    #[test]
    fn test_capacity_error_leaves_destination_untouched() {
        let mut storage = [0u8; 3];
        let mut dst = &mut storage[..];
        let result = write_ascii_string(&mut dst, Some("hello"));
        assert_eq!(
            result,
            Err(WireError::Capacity {
                needed: 6,
                available: 3
            })
        );
        assert_eq!(storage, [0u8; 3]);
    }
}
