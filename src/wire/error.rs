//! Errors produced by the wire codec.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire values.
///
/// Every variant except [`WireError::Capacity`] describes bad input on the
/// decode side. None of them leave shared state behind: a failed call only
/// affects the buffer it was given.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The input ended before a complete value was read
    #[error("truncated input: needed {needed} more bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// A compact integer does not fit the requested width
    #[error("compact integer overflows {bits}-bit range")]
    Overflow { bits: u32 },

    /// A string length prefix is negative but not the null marker
    #[error("invalid string length: {0}")]
    InvalidLength(i64),

    /// A string contains a byte outside 7-bit ASCII
    #[error("non-ASCII byte {byte:#04x} at index {index}")]
    NotAscii { index: usize, byte: u8 },

    /// The destination buffer cannot hold the encoded value
    #[error("buffer too small: needed {needed} bytes, {available} available")]
    Capacity { needed: usize, available: usize },
}

impl WireError {
    /// Returns true for errors caused by malformed or truncated input.
    pub fn is_decode(&self) -> bool {
        !matches!(self, WireError::Capacity { .. })
    }
}

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;
