//! Compact Signed Integers
//!
//! A variable-length, sign-extending, base-128 encoding (the SLEB128 layout):
//!
//! ```text
//!   value bits:  ...sssss ggggggg ggggggg ggggggg
//!                          \_____/ \_____/ \_____/
//!   bytes:        [1|ggggggg] [1|ggggggg] [0|ggggggg]
//!                   first        ...         last
//! ```
//!
//! The two's-complement value is split into 7-bit groups, least significant
//! first. Every byte but the last has the high bit set. Encoding stops as soon
//! as the remaining high bits equal the sign extension of the group just
//! written, so the decoder sign-extends from bit 6 of the final byte.
//!
//! | value | bytes        |
//! |-------|--------------|
//! | 0     | `00`         |
//! | 63    | `3f`         |
//! | 64    | `c0 00`      |
//! | -64   | `40`         |
//! | -65   | `bf 7f`      |

use crate::wire::error::{WireError, WireResult};
use bytes::{Buf, BufMut};

/// Longest encoding of an `i64` (ceil(64 / 7) bytes).
pub const MAX_COMPACT_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;
const DATA_MASK: u8 = 0x7f;
const SIGN_BIT: u8 = 0x40;

/// Returns the number of bytes `value` occupies when compact-encoded.
///
/// This is `ceil(significant_bits / 7)`, where the significant bits include
/// the sign bit. Zero needs one bit and therefore one byte.
#[inline]
pub fn compacted_length(value: i64) -> usize {
    // Flipping negatives turns leading sign bits into leading zeros.
    let magnitude = value ^ (value >> 63);
    let significant_bits = 65 - magnitude.leading_zeros() as usize;
    significant_bits.div_ceil(7)
}

/// Writes `value` as a compact integer, returning the number of bytes written.
///
/// Fails with [`WireError::Capacity`] before touching the buffer if it cannot
/// hold the whole encoding.
pub fn write_compact_i64<B: BufMut>(buf: &mut B, value: i64) -> WireResult<usize> {
    let len = compacted_length(value);
    if buf.remaining_mut() < len {
        return Err(WireError::Capacity {
            needed: len,
            available: buf.remaining_mut(),
        });
    }

    let mut remaining = value;
    let mut written = 0;
    loop {
        let group = (remaining as u8) & DATA_MASK;
        remaining >>= 7;
        written += 1;

        let done = (remaining == 0 && group & SIGN_BIT == 0)
            || (remaining == -1 && group & SIGN_BIT != 0);
        if done {
            buf.put_u8(group);
            break;
        }
        buf.put_u8(group | CONTINUATION);
    }

    debug_assert_eq!(written, len);
    Ok(written)
}

/// Writes a 32-bit value as a compact integer.
///
/// The encoding is identical to [`write_compact_i64`] for the same value.
pub fn write_compact_i32<B: BufMut>(buf: &mut B, value: i32) -> WireResult<usize> {
    write_compact_i64(buf, i64::from(value))
}

/// Reads one compact integer, returning the value and the bytes consumed.
///
/// On error the cursor position is unspecified; the buffer should be
/// discarded.
pub fn read_compact_i64<B: Buf>(buf: &mut B) -> WireResult<(i64, usize)> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut consumed = 0;

    loop {
        if !buf.has_remaining() {
            return Err(WireError::Truncated {
                needed: 1,
                available: 0,
            });
        }

        let byte = buf.get_u8();
        consumed += 1;
        let group = byte & DATA_MASK;

        if consumed == MAX_COMPACT_LEN {
            // Only bit 0 of the tenth group is value; the rest must be its
            // sign extension.
            if byte & CONTINUATION != 0 || (group != 0 && group != DATA_MASK) {
                return Err(WireError::Overflow { bits: 64 });
            }
        }

        result |= i64::from(group) << shift;
        shift += 7;

        if byte & CONTINUATION == 0 {
            if shift < 64 && group & SIGN_BIT != 0 {
                result |= -1i64 << shift;
            }
            return Ok((result, consumed));
        }
    }
}

/// Reads one compact integer that must fit in an `i32`.
pub fn read_compact_i32<B: Buf>(buf: &mut B) -> WireResult<(i32, usize)> {
    let (value, consumed) = read_compact_i64(buf)?;
    let value = i32::try_from(value).map_err(|_| WireError::Overflow { bits: 32 })?;
    Ok((value, consumed))
}
