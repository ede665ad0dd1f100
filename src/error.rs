//! Error types for the PackStream codec.

use std::fmt;

/// Errors that can occur while packing or unpacking PackStream values.
#[derive(Debug, thiserror::Error)]
pub enum PackStreamError {
    #[error("marker byte 0x{0:02X} is not assigned")]
    MalformedMarker(u8),

    #[error("expected {expected}, found {found}")]
    UnexpectedType { expected: String, found: String },

    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("{0}")]
    Overflow(String),

    #[error("dict key must be a string, found {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackStreamError {
    /// Builds an `UnexpectedType` error from what the caller asked for and
    /// what the stream holds.
    pub fn unexpected(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        Self::UnexpectedType {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
