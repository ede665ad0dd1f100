//! PackStream — a streaming codec for the PackStream binary serialization
//! format.
//!
//! PackStream is a compact, self-describing binary presentation format for
//! richly-typed data: null, booleans, 64-bit integers, 64-bit floats, raw
//! bytes, UTF-8 strings, lists, string-keyed dicts, and tagged structs. It
//! uses big-endian byte ordering exclusively, and every value opens with a
//! single marker byte that identifies its kind and size class.
//!
//! # Architecture
//!
//! - **`marker`** — On-wire marker byte table and type classification
//! - **`value`** — The dynamically-typed value tree
//! - **`packer`** — Streaming encoder selecting minimum-width encodings
//! - **`unpacker`** — Streaming pull decoder with non-destructive peek
//! - **`channel`** — Bounded buffered adapters over async byte channels
//!
//! The codec streams: containers can be written and read header-first, one
//! element at a time, and neither side ever materializes more than one
//! value's payload plus a bounded buffer.

pub mod channel;
pub mod error;
pub mod marker;
pub mod packer;
pub mod unpacker;
pub mod value;

pub use channel::{ChannelReader, ChannelWriter, DEFAULT_BUFFER_SIZE};
pub use error::PackStreamError;
pub use marker::PackType;
pub use packer::Packer;
pub use unpacker::Unpacker;
pub use value::{Dict, Struct, Value};
