//! Buffered adapters over async byte channels.
//!
//! `ChannelReader` absorbs whatever chunking the underlying channel
//! produces behind a bounded reassembly buffer; `ChannelWriter` batches
//! output into a bounded buffer that drains only on demand.

mod reader;
mod writer;

pub use reader::ChannelReader;
pub use writer::ChannelWriter;

/// Default capacity in bytes of the reassembly and output buffers.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;
