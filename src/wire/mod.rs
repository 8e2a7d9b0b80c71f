//! Wire Encoding Primitives
//!
//! This module provides the two binary formats protocols built on top of the
//! transport use to frame their own messages:
//!
//! - **Compact signed integers**: a minimal-byte, sign-extending, base-128
//!   encoding (SLEB128-style). Small magnitudes take one byte.
//! - **ASCII strings**: a compact length prefix followed by one byte per
//!   character, with a reserved length for `null`.
//!
//! ## Modules
//!
//! - `compact`: compact integer encode/decode and length calculation
//! - `ascii`: nullable ASCII string encode/decode
//! - `error`: the `WireError` type shared by both
//!
//! ## Example
//!
//! ```
//! use sockloop::wire::{read_ascii_string, write_ascii_string, write_compact_i64, read_compact_i64};
//! use bytes::BytesMut;
//!
//! let mut buf = BytesMut::new();
//! write_compact_i64(&mut buf, -65).unwrap();
//! write_ascii_string(&mut buf, Some("hello")).unwrap();
//!
//! let mut reader = buf.freeze();
//! assert_eq!(read_compact_i64(&mut reader).unwrap(), (-65, 2));
//! assert_eq!(read_ascii_string(&mut reader).unwrap(), (Some("hello".to_string()), 6));
//! ```

pub mod ascii;
pub mod compact;
pub mod error;

// Re-export commonly used items for convenience
pub use ascii::{ascii_string_length, read_ascii_string, write_ascii_string, NULL_STRING_LENGTH};
pub use compact::{
    compacted_length, read_compact_i32, read_compact_i64, write_compact_i32, write_compact_i64,
    MAX_COMPACT_LEN,
};
pub use error::{WireError, WireResult};
