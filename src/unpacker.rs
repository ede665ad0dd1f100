//! PackStream unpacking: a pull decoder over a buffered byte source.

use tokio::io::AsyncRead;

use crate::channel::ChannelReader;
use crate::error::PackStreamError;
use crate::marker::{self, PackType};
use crate::value::{Struct, Value};

/// Largest length accepted from a 32-bit size field (2^31 - 1).
const MAX_SIZE: u32 = 0x7FFF_FFFF;

/// Pull decoder for PackStream values.
///
/// The caller inspects the next value with `peek_next_type` and consumes it
/// with the matching `unpack_*` method. Containers are surfaced header
/// first: after a list header of size N the caller consumes exactly N
/// values (2N for a dict), and after a struct header the signature byte
/// comes before the fields. Calling a method whose kind does not match the
/// pending marker fails with `UnexpectedType` before anything is consumed.
pub struct Unpacker<R> {
    source: ChannelReader<R>,
    awaiting_signature: bool,
}

impl<R: AsyncRead + Unpin> Unpacker<R> {
    pub fn new(reader: R) -> Self {
        Self {
            source: ChannelReader::new(reader),
            awaiting_signature: false,
        }
    }

    /// Creates an unpacker with an explicit reassembly buffer capacity.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            source: ChannelReader::with_capacity(reader, capacity),
            awaiting_signature: false,
        }
    }

    /// Rebinds the decoder to a new channel, keeping the reassembly buffer
    /// and any bytes already buffered from the previous one.
    pub fn reset(&mut self, reader: R) {
        self.source.rebind(reader);
    }

    /// True when at least one full marker byte is buffered or obtainable.
    pub async fn has_next(&mut self) -> Result<bool, PackStreamError> {
        self.source.has_next().await
    }

    /// Classifies the next value without consuming it.
    pub async fn peek_next_type(&mut self) -> Result<PackType, PackStreamError> {
        if self.awaiting_signature {
            return Err(PackStreamError::unexpected("value", "struct signature"));
        }
        marker::classify(self.source.peek_u8().await?)
    }

    pub async fn unpack_null(&mut self) -> Result<(), PackStreamError> {
        self.check_type(PackType::Null).await?;
        self.source.read_u8().await?;
        Ok(())
    }

    pub async fn unpack_bool(&mut self) -> Result<bool, PackStreamError> {
        self.check_type(PackType::Boolean).await?;
        Ok(self.source.read_u8().await? == marker::TRUE)
    }

    /// Unpacks any integer size class, sign-extending to 64 bits.
    pub async fn unpack_int(&mut self) -> Result<i64, PackStreamError> {
        self.check_type(PackType::Integer).await?;
        let m = self.source.read_u8().await?;
        match m {
            marker::INT_8 => Ok(i64::from(self.source.read_i8().await?)),
            marker::INT_16 => Ok(i64::from(self.source.read_i16().await?)),
            marker::INT_32 => Ok(i64::from(self.source.read_i32().await?)),
            marker::INT_64 => self.source.read_i64().await,
            // TINY_INT: 0x00..=0x7F and 0xF0..=0xFF both sign-extend correctly
            _ => Ok(i64::from(m as i8)),
        }
    }

    pub async fn unpack_float(&mut self) -> Result<f64, PackStreamError> {
        self.check_type(PackType::Float).await?;
        self.source.read_u8().await?;
        self.source.read_f64().await
    }

    pub async fn unpack_bytes(&mut self) -> Result<Vec<u8>, PackStreamError> {
        self.check_type(PackType::Bytes).await?;
        let m = self.source.read_u8().await?;
        let len = match m {
            marker::BYTES_8 => self.source.read_u8().await? as usize,
            marker::BYTES_16 => self.source.read_u16().await? as usize,
            _ => {
                let n = self.source.read_u32().await?;
                checked_len(n, "bytes")?
            }
        };
        self.read_payload(len).await
    }

    /// Unpacks a string payload as text.
    ///
    /// The payload is not validated: bytes outside UTF-8 are surfaced
    /// lossily. `unpack_string_bytes` returns the exact payload.
    pub async fn unpack_string(&mut self) -> Result<String, PackStreamError> {
        let data = self.unpack_string_bytes().await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Unpacks a string payload as its raw UTF-8 byte form.
    pub async fn unpack_string_bytes(&mut self) -> Result<Vec<u8>, PackStreamError> {
        self.check_type(PackType::String).await?;
        let m = self.source.read_u8().await?;
        let len = match m {
            marker::STRING_8 => self.source.read_u8().await? as usize,
            marker::STRING_16 => self.source.read_u16().await? as usize,
            marker::STRING_32 => {
                let n = self.source.read_u32().await?;
                checked_len(n, "string")?
            }
            _ => (m & 0x0F) as usize,
        };
        self.read_payload(len).await
    }

    /// Unpacks a list header, returning the element count.
    ///
    /// The caller consumes exactly that many values next; there is no end
    /// marker.
    pub async fn unpack_list_header(&mut self) -> Result<usize, PackStreamError> {
        self.check_type(PackType::List).await?;
        let m = self.source.read_u8().await?;
        match m {
            marker::LIST_8 => Ok(self.source.read_u8().await? as usize),
            marker::LIST_16 => Ok(self.source.read_u16().await? as usize),
            marker::LIST_32 => {
                let n = self.source.read_u32().await?;
                checked_len(n, "list")
            }
            _ => Ok((m & 0x0F) as usize),
        }
    }

    /// Unpacks a dict header, returning the pair count.
    pub async fn unpack_dict_header(&mut self) -> Result<usize, PackStreamError> {
        self.check_type(PackType::Dict).await?;
        let m = self.source.read_u8().await?;
        match m {
            marker::DICT_8 => Ok(self.source.read_u8().await? as usize),
            marker::DICT_16 => Ok(self.source.read_u16().await? as usize),
            marker::DICT_32 => {
                let n = self.source.read_u32().await?;
                checked_len(n, "dict")
            }
            _ => Ok((m & 0x0F) as usize),
        }
    }

    /// Unpacks a struct header, returning the field count.
    ///
    /// The signature byte comes next and must be read with
    /// `unpack_struct_signature` before any field.
    pub async fn unpack_struct_header(&mut self) -> Result<usize, PackStreamError> {
        self.check_type(PackType::Struct).await?;
        let m = self.source.read_u8().await?;
        let size = match m {
            marker::STRUCT_8 => self.source.read_u8().await? as usize,
            marker::STRUCT_16 => self.source.read_u16().await? as usize,
            _ => (m & 0x0F) as usize,
        };
        self.awaiting_signature = true;
        Ok(size)
    }

    /// Reads the signature byte that follows a struct header.
    pub async fn unpack_struct_signature(&mut self) -> Result<u8, PackStreamError> {
        if !self.awaiting_signature {
            let found = marker::classify(self.source.peek_u8().await?)?;
            return Err(PackStreamError::unexpected("struct signature", found));
        }
        let signature = self.source.read_u8().await?;
        self.awaiting_signature = false;
        Ok(signature)
    }

    /// Unpacks one complete value, materializing containers.
    pub async fn unpack_value(&mut self) -> Result<Value, PackStreamError> {
        match self.peek_next_type().await? {
            PackType::Null => {
                self.unpack_null().await?;
                Ok(Value::Null)
            }
            PackType::Boolean => Ok(Value::Boolean(self.unpack_bool().await?)),
            PackType::Integer => Ok(Value::Integer(self.unpack_int().await?)),
            PackType::Float => Ok(Value::Float(self.unpack_float().await?)),
            PackType::Bytes => Ok(Value::Bytes(self.unpack_bytes().await?)),
            PackType::String => Ok(Value::String(self.unpack_string().await?)),
            PackType::List => {
                let size = self.unpack_list_header().await?;
                let mut items = Vec::with_capacity(size);
                for _ in 0..size {
                    items.push(Box::pin(self.unpack_value()).await?);
                }
                Ok(Value::List(items))
            }
            PackType::Dict => {
                let size = self.unpack_dict_header().await?;
                let mut pairs = Vec::with_capacity(size);
                for _ in 0..size {
                    let key = match Box::pin(self.unpack_value()).await? {
                        Value::String(s) => s,
                        other => return Err(PackStreamError::InvalidKey(other.to_string())),
                    };
                    let value = Box::pin(self.unpack_value()).await?;
                    pairs.push((key, value));
                }
                Ok(Value::Dict(pairs))
            }
            PackType::Struct => {
                let size = self.unpack_struct_header().await?;
                let signature = self.unpack_struct_signature().await?;
                let mut fields = Vec::with_capacity(size);
                for _ in 0..size {
                    fields.push(Box::pin(self.unpack_value()).await?);
                }
                Ok(Value::Struct(Struct { signature, fields }))
            }
        }
    }

    /// Verifies the pending marker matches what the caller asked for,
    /// consuming nothing.
    async fn check_type(&mut self, expected: PackType) -> Result<(), PackStreamError> {
        if self.awaiting_signature {
            return Err(PackStreamError::unexpected(expected, "struct signature"));
        }
        let found = marker::classify(self.source.peek_u8().await?)?;
        if found != expected {
            return Err(PackStreamError::unexpected(expected, found));
        }
        Ok(())
    }

    async fn read_payload(&mut self, len: usize) -> Result<Vec<u8>, PackStreamError> {
        let mut data = vec![0u8; len];
        self.source.read_slice(&mut data).await?;
        Ok(data)
    }
}

fn checked_len(len: u32, what: &str) -> Result<usize, PackStreamError> {
    if len > MAX_SIZE {
        return Err(PackStreamError::Overflow(format!(
            "{what} length {len} exceeds the largest size class"
        )));
    }
    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::channel::testing::DribbleReader;
    use crate::packer::Packer;

    async fn pack_one(value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        let mut packer = Packer::new(&mut out);
        packer.pack(value).await.unwrap();
        packer.flush().await.unwrap();
        drop(packer);
        out
    }

    fn new_unpacker(bytes: Vec<u8>) -> Unpacker<Cursor<Vec<u8>>> {
        Unpacker::new(Cursor::new(bytes))
    }

    /// Encode then decode a value and verify round-trip.
    async fn round_trip(value: &Value) -> Value {
        let bytes = pack_one(value).await;
        new_unpacker(bytes).unpack_value().await.unwrap()
    }

    async fn assert_peek(expected: PackType, value: Value) {
        let bytes = pack_one(&value).await;
        let mut unpacker = new_unpacker(bytes);
        assert_eq!(unpacker.peek_next_type().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn peek_classifies_each_kind() {
        assert_peek(PackType::Null, Value::Null).await;
        assert_peek(PackType::Boolean, Value::from(true)).await;
        assert_peek(PackType::Integer, Value::from(123)).await;
        assert_peek(PackType::Float, Value::from(123.123)).await;
        assert_peek(PackType::String, Value::from("a string")).await;
        assert_peek(PackType::Bytes, Value::Bytes(vec![0x01])).await;
        assert_peek(PackType::List, Value::List(vec![Value::from(1)])).await;
        assert_peek(PackType::Dict, Value::Dict(vec![("l".into(), Value::from(3))])).await;
        assert_peek(
            PackType::Struct,
            Value::Struct(Struct::new(b'N', vec![Value::from(1)])),
        )
        .await;
    }

    #[tokio::test]
    async fn peek_is_idempotent() {
        let mut unpacker = new_unpacker(pack_one(&Value::from(42)).await);
        for _ in 0..5 {
            assert_eq!(unpacker.peek_next_type().await.unwrap(), PackType::Integer);
        }
        assert_eq!(unpacker.unpack_int().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn round_trip_null_and_booleans() {
        assert_eq!(round_trip(&Value::Null).await, Value::Null);
        assert_eq!(round_trip(&Value::from(true)).await, Value::from(true));
        assert_eq!(round_trip(&Value::from(false)).await, Value::from(false));
    }

    #[tokio::test]
    async fn round_trip_tiny_integers() {
        for i in -16..=127i64 {
            let bytes = pack_one(&Value::Integer(i)).await;
            assert_eq!(bytes.len(), 1, "width of {i}");
            assert_eq!(new_unpacker(bytes).unpack_int().await.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn round_trip_short_integers() {
        for i in -32768..32768i64 {
            let bytes = pack_one(&Value::Integer(i)).await;
            assert!(bytes.len() <= 3, "width of {i}");
            assert_eq!(new_unpacker(bytes).unpack_int().await.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn round_trip_integer_size_classes() {
        let samples = [
            -16, -1, 0, 1, 42, 127,
            -128, -17,
            -129, 128, -32768, 32767,
            -32769, 32768, i64::from(i32::MIN), i64::from(i32::MAX),
            i64::from(i32::MAX) + 1, i64::from(i32::MIN) - 1, i64::MAX, i64::MIN,
        ];
        for i in samples {
            assert_eq!(round_trip(&Value::Integer(i)).await, Value::Integer(i), "failed for {i}");
        }
    }

    #[tokio::test]
    async fn round_trip_powers_of_two() {
        for i in 0..62 {
            let n = 1i64 << i;
            assert_eq!(round_trip(&Value::Integer(n)).await, Value::Integer(n));
        }
    }

    #[tokio::test]
    async fn round_trip_floats() {
        for value in [0.0, 1.23, -1.23, 3.14159, f64::MIN, f64::MAX] {
            assert_eq!(round_trip(&Value::Float(value)).await, Value::Float(value));
        }
        // Non-finite values survive bit-for-bit.
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let decoded = round_trip(&Value::Float(value)).await;
            match decoded {
                Value::Float(f) => assert_eq!(f.to_bits(), value.to_bits()),
                other => panic!("expected float, got {other}"),
            }
        }
    }

    #[tokio::test]
    async fn round_trip_strings_across_size_classes() {
        for len in [0usize, 1, 15, 16, 255, 256, 65535, 65536] {
            let s = "a".repeat(len);
            assert_eq!(
                round_trip(&Value::String(s.clone())).await,
                Value::String(s),
                "failed for length {len}"
            );
        }
    }

    #[tokio::test]
    async fn round_trip_bytes_across_size_classes() {
        for len in [0usize, 1, 255, 256, 65535, 65536] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            assert_eq!(
                round_trip(&Value::Bytes(data.clone())).await,
                Value::Bytes(data),
                "failed for length {len}"
            );
        }
    }

    #[tokio::test]
    async fn round_trip_special_string() {
        let code = "Mjölnir"; // UTF-8 `c3 b6` for ö
        let bytes = pack_one(&Value::from(code)).await;
        assert_eq!(
            &bytes[1..],
            &[0x4D, 0x6A, 0xC3, 0xB6, 0x6C, 0x6E, 0x69, 0x72]
        );
        assert_eq!(new_unpacker(bytes).unpack_string().await.unwrap(), code);
    }

    #[tokio::test]
    async fn string_bytes_surface_the_exact_payload() {
        let mut out = Vec::new();
        let mut packer = Packer::new(&mut out);
        packer.pack_string_bytes("Mjölnir".as_bytes()).await.unwrap();
        packer.flush().await.unwrap();
        drop(packer);

        let mut unpacker = new_unpacker(out);
        assert_eq!(unpacker.peek_next_type().await.unwrap(), PackType::String);
        assert_eq!(
            unpacker.unpack_string_bytes().await.unwrap(),
            "Mjölnir".as_bytes()
        );
    }

    #[tokio::test]
    async fn invalid_utf8_payload_is_surfaced_lossily() {
        // TINY_STRING of one byte that is not valid UTF-8.
        let mut lossy = new_unpacker(vec![0x81, 0xFF]);
        assert_eq!(lossy.unpack_string().await.unwrap(), "\u{FFFD}");

        let mut raw = new_unpacker(vec![0x81, 0xFF]);
        assert_eq!(raw.unpack_string_bytes().await.unwrap(), vec![0xFF]);
    }

    #[tokio::test]
    async fn round_trip_list_and_nested_containers() {
        let value = Value::List(vec![
            Value::from(1),
            Value::from("two"),
            Value::from(true),
            Value::List(vec![Value::from(4), Value::from(5)]),
        ]);
        assert_eq!(round_trip(&value).await, value);
    }

    #[tokio::test]
    async fn round_trip_dict_in_wire_order() {
        let value = Value::Dict(vec![
            ("name".to_string(), Value::from("Alice")),
            ("age".to_string(), Value::from(30)),
        ]);
        assert_eq!(round_trip(&value).await, value);
    }

    #[tokio::test]
    async fn round_trip_large_containers() {
        let list = Value::List((0..300).map(Value::from).collect());
        assert_eq!(round_trip(&list).await, list);

        let dict = Value::Dict(
            (0..300)
                .map(|i| (format!("k{i}"), Value::from(i)))
                .collect(),
        );
        assert_eq!(round_trip(&dict).await, dict);

        let tiny_struct = Value::Struct(Struct::new(0x01, vec![Value::from(1)]));
        assert_eq!(round_trip(&tiny_struct).await, tiny_struct);

        let struct8 = Value::Struct(Struct::new(0x02, (0..20).map(Value::from).collect()));
        assert_eq!(round_trip(&struct8).await, struct8);

        let struct16 = Value::Struct(Struct::new(0x03, (0..300).map(Value::from).collect()));
        assert_eq!(round_trip(&struct16).await, struct16);
    }

    #[tokio::test]
    async fn streaming_list_one_item_at_a_time() {
        let mut out = Vec::new();
        let mut packer = Packer::new(&mut out);
        packer.pack_list_header(3).await.unwrap();
        packer.pack_int(12).await.unwrap();
        packer.pack_int(13).await.unwrap();
        packer.pack_int(14).await.unwrap();
        packer.flush().await.unwrap();
        drop(packer);

        let mut unpacker = new_unpacker(out);
        assert_eq!(unpacker.peek_next_type().await.unwrap(), PackType::List);
        assert_eq!(unpacker.unpack_list_header().await.unwrap(), 3);
        assert_eq!(unpacker.unpack_int().await.unwrap(), 12);
        assert_eq!(unpacker.unpack_int().await.unwrap(), 13);
        assert_eq!(unpacker.unpack_int().await.unwrap(), 14);
    }

    #[tokio::test]
    async fn streaming_nested_list_unpacking() {
        let value = Value::List(vec![
            Value::from(1),
            Value::from(2),
            Value::from(3),
            Value::List(vec![Value::from(4), Value::from(5)]),
        ]);
        let mut unpacker = new_unpacker(pack_one(&value).await);

        assert_eq!(unpacker.unpack_list_header().await.unwrap(), 4);
        assert_eq!(unpacker.unpack_int().await.unwrap(), 1);
        assert_eq!(unpacker.unpack_int().await.unwrap(), 2);
        assert_eq!(unpacker.unpack_int().await.unwrap(), 3);
        assert_eq!(unpacker.unpack_list_header().await.unwrap(), 2);
        assert_eq!(unpacker.unpack_int().await.unwrap(), 4);
        assert_eq!(unpacker.unpack_int().await.unwrap(), 5);
        assert!(!unpacker.has_next().await.unwrap());
    }

    #[tokio::test]
    async fn streaming_dict_unpacking() {
        let mut out = Vec::new();
        let mut packer = Packer::new(&mut out);
        packer.pack_dict_header(2).await.unwrap();
        packer.pack_string("name").await.unwrap();
        packer.pack_string("Bob").await.unwrap();
        packer.pack_string("cat_ages").await.unwrap();
        packer
            .pack_list(&[Value::from(4.3), Value::from(true)])
            .await
            .unwrap();
        packer.flush().await.unwrap();
        drop(packer);

        let mut unpacker = new_unpacker(out);
        assert_eq!(unpacker.unpack_dict_header().await.unwrap(), 2);
        assert_eq!(unpacker.unpack_string().await.unwrap(), "name");
        assert_eq!(unpacker.unpack_string().await.unwrap(), "Bob");
        assert_eq!(unpacker.unpack_string().await.unwrap(), "cat_ages");
        assert_eq!(unpacker.unpack_list_header().await.unwrap(), 2);
        assert!((unpacker.unpack_float().await.unwrap() - 4.3).abs() < 1e-9);
        assert!(unpacker.unpack_bool().await.unwrap());
    }

    #[tokio::test]
    async fn streaming_struct_unpacking() {
        let mut out = Vec::new();
        let mut packer = Packer::new(&mut out);
        packer.pack_struct_header(3, b'N').await.unwrap();
        packer.pack_int(12).await.unwrap();
        packer
            .pack(&Value::List(vec![
                Value::from("Person"),
                Value::from("Employee"),
            ]))
            .await
            .unwrap();
        packer
            .pack(&Value::Dict(vec![
                ("name".to_string(), Value::from("Alice")),
                ("age".to_string(), Value::from(33)),
            ]))
            .await
            .unwrap();
        packer.flush().await.unwrap();
        drop(packer);

        let mut unpacker = new_unpacker(out);
        assert_eq!(unpacker.peek_next_type().await.unwrap(), PackType::Struct);
        assert_eq!(unpacker.unpack_struct_header().await.unwrap(), 3);
        assert_eq!(unpacker.unpack_struct_signature().await.unwrap(), b'N');

        assert_eq!(unpacker.unpack_int().await.unwrap(), 12);

        assert_eq!(unpacker.unpack_list_header().await.unwrap(), 2);
        assert_eq!(unpacker.unpack_string().await.unwrap(), "Person");
        assert_eq!(unpacker.unpack_string().await.unwrap(), "Employee");

        assert_eq!(unpacker.unpack_dict_header().await.unwrap(), 2);
        assert_eq!(unpacker.unpack_string().await.unwrap(), "name");
        assert_eq!(unpacker.unpack_string().await.unwrap(), "Alice");
        assert_eq!(unpacker.unpack_string().await.unwrap(), "age");
        assert_eq!(unpacker.unpack_int().await.unwrap(), 33);
    }

    #[tokio::test]
    async fn has_next_between_values() {
        let mut out = Vec::new();
        let mut packer = Packer::new(&mut out);
        packer.pack_string("name").await.unwrap();
        packer.pack_int(1).await.unwrap();
        packer.flush().await.unwrap();
        drop(packer);

        let mut unpacker = new_unpacker(out);
        assert!(unpacker.has_next().await.unwrap());
        unpacker.unpack_string().await.unwrap();
        assert!(unpacker.has_next().await.unwrap());
        unpacker.unpack_int().await.unwrap();
        assert!(!unpacker.has_next().await.unwrap());
    }

    #[tokio::test]
    async fn data_crossing_buffer_boundaries() {
        let mut out = Vec::new();
        let mut packer = Packer::new(&mut out);
        packer.pack_int(i64::MAX).await.unwrap();
        packer.pack_int(i64::MAX).await.unwrap();
        packer.flush().await.unwrap();
        drop(packer);

        // Two 9-byte values misalign with an 11-byte reassembly buffer:
        // the second marker and payload straddle a refill.
        let mut unpacker = Unpacker::with_capacity(Cursor::new(out), 11);
        assert_eq!(unpacker.unpack_int().await.unwrap(), i64::MAX);
        assert_eq!(unpacker.unpack_int().await.unwrap(), i64::MAX);
    }

    #[tokio::test]
    async fn identical_results_across_buffer_capacities() {
        let value = Value::List(vec![
            Value::String("x".repeat(300)),
            Value::Integer(i64::MAX),
            Value::Bytes((0..=255).collect()),
            Value::Dict(vec![
                ("k".to_string(), Value::from(1.5)),
                ("l".to_string(), Value::Null),
            ]),
        ]);
        let bytes = pack_one(&value).await;

        for capacity in [1usize, 7, 11, 64, 8192] {
            let mut unpacker = Unpacker::with_capacity(Cursor::new(bytes.clone()), capacity);
            assert_eq!(
                unpacker.unpack_value().await.unwrap(),
                value,
                "failed at capacity {capacity}"
            );
            assert!(!unpacker.has_next().await.unwrap());
        }
    }

    #[tokio::test]
    async fn identical_results_across_read_chunkings() {
        let value = Value::List(vec![
            Value::String("x".repeat(100)),
            Value::Integer(-32769),
            Value::Float(2.5),
        ]);
        let bytes = pack_one(&value).await;

        for max_read in [1usize, 2, 3, 5, 64] {
            let reader = DribbleReader::new(bytes.clone(), max_read);
            let mut unpacker = Unpacker::with_capacity(reader, 7);
            assert_eq!(
                unpacker.unpack_value().await.unwrap(),
                value,
                "failed at read chunk {max_read}"
            );
        }
    }

    #[tokio::test]
    async fn mismatched_unpack_leaves_the_stream_usable() {
        let mut unpacker = new_unpacker(pack_one(&Value::from("hello")).await);
        match unpacker.unpack_int().await {
            Err(PackStreamError::UnexpectedType { .. }) => {}
            other => panic!("expected UnexpectedType, got {other:?}"),
        }
        // Nothing was consumed: the value is still decodable.
        assert_eq!(unpacker.unpack_string().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn struct_signature_must_follow_the_header() {
        let value = Value::Struct(Struct::new(b'~', vec![Value::from(1)]));
        let mut unpacker = new_unpacker(pack_one(&value).await);

        assert_eq!(unpacker.unpack_struct_header().await.unwrap(), 1);
        match unpacker.unpack_int().await {
            Err(PackStreamError::UnexpectedType { .. }) => {}
            other => panic!("expected UnexpectedType, got {other:?}"),
        }
        // The signature is still pending and readable.
        assert_eq!(unpacker.unpack_struct_signature().await.unwrap(), b'~');
        assert_eq!(unpacker.unpack_int().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn struct_signature_without_a_header_is_rejected() {
        let mut unpacker = new_unpacker(pack_one(&Value::from(7)).await);
        match unpacker.unpack_struct_signature().await {
            Err(PackStreamError::UnexpectedType { .. }) => {}
            other => panic!("expected UnexpectedType, got {other:?}"),
        }
        assert_eq!(unpacker.unpack_int().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn malformed_markers_are_rejected() {
        for m in [0xC4u8, 0xC7, 0xCF, 0xD3, 0xD7, 0xDB, 0xDE, 0xEF] {
            let mut unpacker = new_unpacker(vec![m]);
            match unpacker.peek_next_type().await {
                Err(PackStreamError::MalformedMarker(byte)) => assert_eq!(byte, m),
                other => panic!("expected MalformedMarker for 0x{m:02X}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn truncated_payload_is_unexpected_eof() {
        // INT_64 marker with only two payload bytes.
        let mut unpacker = new_unpacker(vec![marker::INT_64, 0x00, 0x01]);
        match unpacker.unpack_int().await {
            Err(PackStreamError::UnexpectedEof) => {}
            other => panic!("expected UnexpectedEof, got {other:?}"),
        }

        // STRING_8 announcing five bytes but carrying one.
        let mut unpacker = new_unpacker(vec![marker::STRING_8, 0x05, b'a']);
        match unpacker.unpack_string().await {
            Err(PackStreamError::UnexpectedEof) => {}
            other => panic!("expected UnexpectedEof, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_length_field_is_an_overflow() {
        // STRING_32 with a length above 2^31 - 1.
        let mut unpacker = new_unpacker(vec![marker::STRING_32, 0xFF, 0xFF, 0xFF, 0xFF]);
        match unpacker.unpack_string().await {
            Err(PackStreamError::Overflow(_)) => {}
            other => panic!("expected Overflow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_string_dict_key_is_an_invalid_key() {
        // TINY_DICT of one pair whose key is an integer.
        let mut unpacker = new_unpacker(vec![0xA1, 0x01, 0x02]);
        match unpacker.unpack_value().await {
            Err(PackStreamError::InvalidKey(_)) => {}
            other => panic!("expected InvalidKey, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_rebinds_to_a_new_channel() {
        let first = pack_one(&Value::from("first")).await;
        let second = pack_one(&Value::from("second")).await;

        let mut unpacker = new_unpacker(first);
        assert_eq!(unpacker.unpack_string().await.unwrap(), "first");
        assert!(!unpacker.has_next().await.unwrap());

        unpacker.reset(Cursor::new(second));
        assert_eq!(unpacker.unpack_string().await.unwrap(), "second");
        assert!(!unpacker.has_next().await.unwrap());
    }
}
