//! Bounded output buffering over an async byte sink.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::DEFAULT_BUFFER_SIZE;
use crate::error::PackStreamError;

/// Batches PackStream output into a fixed-capacity buffer.
///
/// The buffer drains to the channel only when a write needs room or on an
/// explicit `flush`. A payload larger than the whole buffer is written
/// straight through after the buffered prefix has been drained.
pub struct ChannelWriter<W> {
    writer: W,
    buf: BytesMut,
    capacity: usize,
}

impl<W: AsyncWrite + Unpin> ChannelWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a writer with an explicit buffer capacity in bytes.
    pub fn with_capacity(writer: W, capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be non-zero");
        Self {
            writer,
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub async fn put_u8(&mut self, value: u8) -> Result<(), PackStreamError> {
        self.put_slice(&[value]).await
    }

    pub async fn put_i8(&mut self, value: i8) -> Result<(), PackStreamError> {
        self.put_slice(&value.to_be_bytes()).await
    }

    pub async fn put_u16(&mut self, value: u16) -> Result<(), PackStreamError> {
        self.put_slice(&value.to_be_bytes()).await
    }

    pub async fn put_i16(&mut self, value: i16) -> Result<(), PackStreamError> {
        self.put_slice(&value.to_be_bytes()).await
    }

    pub async fn put_u32(&mut self, value: u32) -> Result<(), PackStreamError> {
        self.put_slice(&value.to_be_bytes()).await
    }

    pub async fn put_i32(&mut self, value: i32) -> Result<(), PackStreamError> {
        self.put_slice(&value.to_be_bytes()).await
    }

    pub async fn put_i64(&mut self, value: i64) -> Result<(), PackStreamError> {
        self.put_slice(&value.to_be_bytes()).await
    }

    pub async fn put_f64(&mut self, value: f64) -> Result<(), PackStreamError> {
        self.put_slice(&value.to_be_bytes()).await
    }

    pub async fn put_slice(&mut self, data: &[u8]) -> Result<(), PackStreamError> {
        if data.len() > self.capacity {
            // Oversize payload: drain what is buffered, then bypass the buffer.
            self.drain().await?;
            self.writer.write_all(data).await?;
            return Ok(());
        }
        if self.buf.len() + data.len() > self.capacity {
            self.drain().await?;
        }
        self.buf.put_slice(data);
        Ok(())
    }

    /// Drains the buffer and flushes the underlying channel.
    pub async fn flush(&mut self) -> Result<(), PackStreamError> {
        self.drain().await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn drain(&mut self) -> Result<(), PackStreamError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.writer.write_all(&self.buf).await?;
        tracing::trace!(drained = self.buf.len(), "drained output buffer");
        self.buf.clear();
        Ok(())
    }
}
