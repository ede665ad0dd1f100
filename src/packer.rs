//! PackStream packing: values → marker and payload byte sequences.

use tokio::io::AsyncWrite;

use crate::channel::ChannelWriter;
use crate::error::PackStreamError;
use crate::marker;
use crate::value::{Struct, Value};

/// Largest byte length for strings and bytes, and largest item count for
/// lists and dicts (2^31 - 1).
const MAX_SIZE: usize = 0x7FFF_FFFF;

/// Largest field count for structs (16-bit size class, no 32-bit form).
const MAX_STRUCT_SIZE: usize = 0xFFFF;

/// Emits PackStream values through a buffered byte sink.
///
/// Every multi-byte payload is written big-endian and every value gets the
/// narrowest encoding its size class allows. Output stays in the sink
/// buffer until `flush`, except when a write needs room.
pub struct Packer<W> {
    out: ChannelWriter<W>,
}

impl<W: AsyncWrite + Unpin> Packer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: ChannelWriter::new(writer),
        }
    }

    /// Creates a packer with an explicit output buffer capacity.
    pub fn with_capacity(writer: W, capacity: usize) -> Self {
        Self {
            out: ChannelWriter::with_capacity(writer, capacity),
        }
    }

    /// Drains buffered output to the underlying channel.
    pub async fn flush(&mut self) -> Result<(), PackStreamError> {
        self.out.flush().await
    }

    /// Packs any value, recursing through containers.
    pub async fn pack(&mut self, value: &Value) -> Result<(), PackStreamError> {
        match value {
            Value::Null => self.pack_null().await,
            Value::Boolean(b) => self.pack_bool(*b).await,
            Value::Integer(i) => self.pack_int(*i).await,
            Value::Float(f) => self.pack_float(*f).await,
            Value::String(s) => self.pack_string(s).await,
            Value::Bytes(b) => self.pack_bytes(b).await,
            Value::List(items) => self.pack_list(items).await,
            Value::Dict(pairs) => self.pack_dict(pairs).await,
            Value::Struct(s) => self.pack_struct(s).await,
        }
    }

    pub async fn pack_null(&mut self) -> Result<(), PackStreamError> {
        self.out.put_u8(marker::NULL).await
    }

    pub async fn pack_bool(&mut self, value: bool) -> Result<(), PackStreamError> {
        self.out
            .put_u8(if value { marker::TRUE } else { marker::FALSE })
            .await
    }

    /// Packs an integer using the narrowest size class that holds it.
    pub async fn pack_int(&mut self, value: i64) -> Result<(), PackStreamError> {
        if (-16..=127).contains(&value) {
            // TINY_INT: single byte
            self.out.put_u8(value as u8).await
        } else if i64::from(i8::MIN) <= value && value <= i64::from(i8::MAX) {
            self.out.put_u8(marker::INT_8).await?;
            self.out.put_i8(value as i8).await
        } else if i64::from(i16::MIN) <= value && value <= i64::from(i16::MAX) {
            self.out.put_u8(marker::INT_16).await?;
            self.out.put_i16(value as i16).await
        } else if i64::from(i32::MIN) <= value && value <= i64::from(i32::MAX) {
            self.out.put_u8(marker::INT_32).await?;
            self.out.put_i32(value as i32).await
        } else {
            self.out.put_u8(marker::INT_64).await?;
            self.out.put_i64(value).await
        }
    }

    pub async fn pack_float(&mut self, value: f64) -> Result<(), PackStreamError> {
        self.out.put_u8(marker::FLOAT_64).await?;
        self.out.put_f64(value).await
    }

    /// Packs a string (size = UTF-8 byte length, not char count).
    pub async fn pack_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        self.pack_string_bytes(value.as_bytes()).await
    }

    /// Packs a string directly from its UTF-8 byte form.
    ///
    /// The bytes are written as-is. Handing over invalid UTF-8 produces a
    /// wire string whose decoding back to text is the caller's concern.
    pub async fn pack_string_bytes(&mut self, value: &[u8]) -> Result<(), PackStreamError> {
        let len = value.len();
        if len <= 15 {
            self.out
                .put_u8(marker::TINY_STRING_NIBBLE | len as u8)
                .await?;
        } else if len <= 255 {
            self.out.put_u8(marker::STRING_8).await?;
            self.out.put_u8(len as u8).await?;
        } else if len <= 65535 {
            self.out.put_u8(marker::STRING_16).await?;
            self.out.put_u16(len as u16).await?;
        } else if len <= MAX_SIZE {
            self.out.put_u8(marker::STRING_32).await?;
            self.out.put_u32(len as u32).await?;
        } else {
            return Err(PackStreamError::Overflow(format!(
                "string of {len} bytes exceeds the largest size class"
            )));
        }
        self.out.put_slice(value).await
    }

    pub async fn pack_bytes(&mut self, value: &[u8]) -> Result<(), PackStreamError> {
        let len = value.len();
        if len <= 255 {
            self.out.put_u8(marker::BYTES_8).await?;
            self.out.put_u8(len as u8).await?;
        } else if len <= 65535 {
            self.out.put_u8(marker::BYTES_16).await?;
            self.out.put_u16(len as u16).await?;
        } else if len <= MAX_SIZE {
            self.out.put_u8(marker::BYTES_32).await?;
            self.out.put_u32(len as u32).await?;
        } else {
            return Err(PackStreamError::Overflow(format!(
                "byte array of {len} bytes exceeds the largest size class"
            )));
        }
        self.out.put_slice(value).await
    }

    /// Packs a list header followed by each element.
    pub async fn pack_list(&mut self, items: &[Value]) -> Result<(), PackStreamError> {
        self.pack_list_header(items.len()).await?;
        for item in items {
            Box::pin(self.pack(item)).await?;
        }
        Ok(())
    }

    pub async fn pack_list_header(&mut self, size: usize) -> Result<(), PackStreamError> {
        if size <= 15 {
            self.out.put_u8(marker::TINY_LIST_NIBBLE | size as u8).await
        } else if size <= 255 {
            self.out.put_u8(marker::LIST_8).await?;
            self.out.put_u8(size as u8).await
        } else if size <= 65535 {
            self.out.put_u8(marker::LIST_16).await?;
            self.out.put_u16(size as u16).await
        } else if size <= MAX_SIZE {
            self.out.put_u8(marker::LIST_32).await?;
            self.out.put_u32(size as u32).await
        } else {
            Err(PackStreamError::Overflow(format!(
                "list of {size} items exceeds the largest size class"
            )))
        }
    }

    /// Packs a dict header and the pairs in their given order.
    pub async fn pack_dict(&mut self, pairs: &[(String, Value)]) -> Result<(), PackStreamError> {
        self.pack_dict_header(pairs.len()).await?;
        for (key, value) in pairs {
            self.pack_string(key).await?;
            Box::pin(self.pack(value)).await?;
        }
        Ok(())
    }

    pub async fn pack_dict_header(&mut self, size: usize) -> Result<(), PackStreamError> {
        if size <= 15 {
            self.out.put_u8(marker::TINY_DICT_NIBBLE | size as u8).await
        } else if size <= 255 {
            self.out.put_u8(marker::DICT_8).await?;
            self.out.put_u8(size as u8).await
        } else if size <= 65535 {
            self.out.put_u8(marker::DICT_16).await?;
            self.out.put_u16(size as u16).await
        } else if size <= MAX_SIZE {
            self.out.put_u8(marker::DICT_32).await?;
            self.out.put_u32(size as u32).await
        } else {
            Err(PackStreamError::Overflow(format!(
                "dict of {size} entries exceeds the largest size class"
            )))
        }
    }

    /// Packs a struct header and its fields.
    pub async fn pack_struct(&mut self, value: &Struct) -> Result<(), PackStreamError> {
        self.pack_struct_header(value.fields.len(), value.signature)
            .await?;
        for field in &value.fields {
            Box::pin(self.pack(field)).await?;
        }
        Ok(())
    }

    /// Packs a struct header: size marker, then the signature byte.
    pub async fn pack_struct_header(
        &mut self,
        size: usize,
        signature: u8,
    ) -> Result<(), PackStreamError> {
        if size <= 15 {
            self.out
                .put_u8(marker::TINY_STRUCT_NIBBLE | size as u8)
                .await?;
        } else if size <= 255 {
            self.out.put_u8(marker::STRUCT_8).await?;
            self.out.put_u8(size as u8).await?;
        } else if size <= MAX_STRUCT_SIZE {
            self.out.put_u8(marker::STRUCT_16).await?;
            self.out.put_u16(size as u16).await?;
        } else {
            return Err(PackStreamError::Overflow(format!(
                "struct of {size} fields exceeds the 16-bit field count"
            )));
        }
        self.out.put_u8(signature).await
    }
}
