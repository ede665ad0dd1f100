//! PackStream marker byte constants and type classification.
//!
//! Every encoded value begins with exactly one marker byte. The marker
//! identifies the value's kind and either the literal value itself (tiny
//! encodings) or the width of the size field that follows.

use std::fmt;

use crate::error::PackStreamError;

// Null
pub const NULL: u8 = 0xC0;

// Boolean
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

// Float (IEEE 754 double-precision, big-endian)
pub const FLOAT_64: u8 = 0xC1;

// Integer (beyond TINY_INT range)
pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

// TINY_INT: single byte, range -16..=127
// Positive: 0x00..=0x7F (0..127)
// Negative: 0xF0..=0xFF (-16..-1)

// Bytes (no tiny form)
pub const BYTES_8: u8 = 0xCC;
pub const BYTES_16: u8 = 0xCD;
pub const BYTES_32: u8 = 0xCE;

// String
// TINY_STRING: 0x80..=0x8F (high nibble 0x8, low = byte length 0..15)
pub const STRING_8: u8 = 0xD0;
pub const STRING_16: u8 = 0xD1;
pub const STRING_32: u8 = 0xD2;

// List
// TINY_LIST: 0x90..=0x9F (high nibble 0x9, low = item count 0..15)
pub const LIST_8: u8 = 0xD4;
pub const LIST_16: u8 = 0xD5;
pub const LIST_32: u8 = 0xD6;

// Dictionary
// TINY_DICT: 0xA0..=0xAF (high nibble 0xA, low = entry count 0..15)
pub const DICT_8: u8 = 0xD8;
pub const DICT_16: u8 = 0xD9;
pub const DICT_32: u8 = 0xDA;

// Structure
// TINY_STRUCT: 0xB0..=0xBF (high nibble 0xB, low = field count 0..15)
// No 32-bit class: struct field counts top out at 65535.
pub const STRUCT_8: u8 = 0xDC;
pub const STRUCT_16: u8 = 0xDD;

// High-nibble masks for tiny types.
pub const TINY_STRING_NIBBLE: u8 = 0x80;
pub const TINY_LIST_NIBBLE: u8 = 0x90;
pub const TINY_DICT_NIBBLE: u8 = 0xA0;
pub const TINY_STRUCT_NIBBLE: u8 = 0xB0;

/// The kind of an encoded PackStream value, as determined by its marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackType {
    Null,
    Boolean,
    Integer,
    Float,
    Bytes,
    String,
    List,
    Dict,
    Struct,
}

impl fmt::Display for PackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Bytes => "bytes",
            Self::String => "string",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Struct => "struct",
        };
        write!(f, "{name}")
    }
}

/// Classifies a marker byte into the kind of value it introduces.
///
/// Fails with `MalformedMarker` for bytes in the unassigned ranges
/// (`0xC4..=0xC7`, `0xCF`, `0xD3`, `0xD7`, `0xDB`, `0xDE..=0xEF`).
pub fn classify(marker: u8) -> Result<PackType, PackStreamError> {
    match marker {
        NULL => Ok(PackType::Null),
        TRUE | FALSE => Ok(PackType::Boolean),
        FLOAT_64 => Ok(PackType::Float),
        INT_8 | INT_16 | INT_32 | INT_64 => Ok(PackType::Integer),
        BYTES_8 | BYTES_16 | BYTES_32 => Ok(PackType::Bytes),
        STRING_8 | STRING_16 | STRING_32 => Ok(PackType::String),
        LIST_8 | LIST_16 | LIST_32 => Ok(PackType::List),
        DICT_8 | DICT_16 | DICT_32 => Ok(PackType::Dict),
        STRUCT_8 | STRUCT_16 => Ok(PackType::Struct),
        _ => match marker & 0xF0 {
            TINY_STRING_NIBBLE => Ok(PackType::String),
            TINY_LIST_NIBBLE => Ok(PackType::List),
            TINY_DICT_NIBBLE => Ok(PackType::Dict),
            TINY_STRUCT_NIBBLE => Ok(PackType::Struct),
            _ if marker <= 0x7F || marker >= 0xF0 => Ok(PackType::Integer),
            _ => Err(PackStreamError::MalformedMarker(marker)),
        },
    }
}
