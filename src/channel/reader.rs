//! Bounded reassembly buffering over an async byte source.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::DEFAULT_BUFFER_SIZE;
use crate::error::PackStreamError;

/// Reads PackStream data through a fixed-capacity reassembly buffer.
///
/// The buffer absorbs the chunking of the underlying channel so value
/// parsing always sees logically contiguous bytes. A payload that does not
/// fit the buffer is read from the channel straight into the caller's
/// destination once the buffered prefix has been drained.
pub struct ChannelReader<R> {
    reader: R,
    buf: BytesMut,
    capacity: usize,
}

impl<R: AsyncRead + Unpin> ChannelReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a reader with an explicit buffer capacity in bytes.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be non-zero");
        Self {
            reader,
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebinds to a new channel, keeping the buffer and any unread bytes.
    pub fn rebind(&mut self, reader: R) {
        self.reader = reader;
    }

    /// True when at least one more byte is buffered or obtainable.
    pub async fn has_next(&mut self) -> Result<bool, PackStreamError> {
        if !self.buf.is_empty() {
            return Ok(true);
        }
        Ok(self.fill().await? > 0)
    }

    /// Returns the next byte without consuming it.
    pub async fn peek_u8(&mut self) -> Result<u8, PackStreamError> {
        self.ensure(1).await?;
        Ok(self.buf[0])
    }

    pub async fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        self.ensure(1).await?;
        Ok(self.buf.get_u8())
    }

    pub async fn read_i8(&mut self) -> Result<i8, PackStreamError> {
        Ok(self.read_u8().await? as i8)
    }

    pub async fn read_u16(&mut self) -> Result<u16, PackStreamError> {
        let mut bytes = [0u8; 2];
        self.read_slice(&mut bytes).await?;
        Ok(u16::from_be_bytes(bytes))
    }

    pub async fn read_i16(&mut self) -> Result<i16, PackStreamError> {
        let mut bytes = [0u8; 2];
        self.read_slice(&mut bytes).await?;
        Ok(i16::from_be_bytes(bytes))
    }

    pub async fn read_u32(&mut self) -> Result<u32, PackStreamError> {
        let mut bytes = [0u8; 4];
        self.read_slice(&mut bytes).await?;
        Ok(u32::from_be_bytes(bytes))
    }

    pub async fn read_i32(&mut self) -> Result<i32, PackStreamError> {
        let mut bytes = [0u8; 4];
        self.read_slice(&mut bytes).await?;
        Ok(i32::from_be_bytes(bytes))
    }

    pub async fn read_i64(&mut self) -> Result<i64, PackStreamError> {
        let mut bytes = [0u8; 8];
        self.read_slice(&mut bytes).await?;
        Ok(i64::from_be_bytes(bytes))
    }

    pub async fn read_f64(&mut self) -> Result<f64, PackStreamError> {
        let mut bytes = [0u8; 8];
        self.read_slice(&mut bytes).await?;
        Ok(f64::from_be_bytes(bytes))
    }

    /// Fills `dst` completely, regardless of how the channel chunks reads.
    pub async fn read_slice(&mut self, dst: &mut [u8]) -> Result<(), PackStreamError> {
        let buffered = self.buf.len().min(dst.len());
        dst[..buffered].copy_from_slice(&self.buf[..buffered]);
        self.buf.advance(buffered);

        let mut filled = buffered;
        while filled < dst.len() {
            let rest = dst.len() - filled;
            if rest >= self.capacity {
                // Remainder exceeds the reassembly buffer: bypass it.
                let read = self.reader.read(&mut dst[filled..]).await?;
                if read == 0 {
                    return Err(PackStreamError::UnexpectedEof);
                }
                filled += read;
            } else {
                self.ensure(rest).await?;
                dst[filled..].copy_from_slice(&self.buf[..rest]);
                self.buf.advance(rest);
                filled += rest;
            }
        }
        Ok(())
    }

    /// Makes at least `count` unread bytes available in the buffer.
    ///
    /// `count` must not exceed the buffer capacity.
    async fn ensure(&mut self, count: usize) -> Result<(), PackStreamError> {
        debug_assert!(count <= self.capacity);
        while self.buf.len() < count {
            if self.fill().await? == 0 {
                return Err(PackStreamError::UnexpectedEof);
            }
        }
        Ok(())
    }

    /// Reads once from the channel into the buffer's free space.
    ///
    /// Returns the number of bytes read; 0 means end of stream.
    async fn fill(&mut self) -> Result<usize, PackStreamError> {
        let start = self.buf.len();
        self.buf.resize(self.capacity, 0);
        let read = match self.reader.read(&mut self.buf[start..]).await {
            Ok(n) => n,
            Err(e) => {
                self.buf.truncate(start);
                return Err(e.into());
            }
        };
        self.buf.truncate(start + read);
        tracing::trace!(read, buffered = self.buf.len(), "filled reassembly buffer");
        Ok(read)
    }
}
