//! Bolt message framing for tokio_util.
//!
//! A message is split into chunks, each with a 2-byte big-endian length
//! prefix, and terminated by a zero-length chunk. A lone terminator with no
//! preceding chunks is a NOOP keep-alive and is skipped.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::packstream::{decode, PackStreamEncoder, PackStreamValue};
use super::BoltError;

/// Largest chunk this codec writes (16KB). Peers may send up to 64KB.
pub const MAX_CHUNK_SIZE: usize = 16384;

/// End of message marker (0x00 0x00)
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Default limit on an assembled incoming message (16MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Bolt message codec for framing.
#[derive(Debug)]
pub struct BoltCodec {
    /// Maximum message size
    max_message_size: usize,
    /// Chunks of the message being assembled
    message_buffer: BytesMut,
    /// Packs outgoing values before chunking
    encoder: PackStreamEncoder,
}

impl BoltCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a codec with custom max message size.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            message_buffer: BytesMut::with_capacity(4096),
            encoder: PackStreamEncoder::new(),
        }
    }

    /// Split a packed message into chunks.
    fn encode_chunked(data: &[u8], dst: &mut BytesMut) {
        dst.reserve(data.len() + 2 * (data.len() / MAX_CHUNK_SIZE + 2));
        for chunk in data.chunks(MAX_CHUNK_SIZE) {
            dst.put_u16(chunk.len() as u16);
            dst.put_slice(chunk);
        }
        dst.put_slice(&END_MARKER);
    }
}

impl Default for BoltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoltCodec {
    type Item = PackStreamValue;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Need at least 2 bytes for chunk header
            if src.len() < 2 {
                return Ok(None);
            }

            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(2);

                if self.message_buffer.is_empty() {
                    continue;
                }

                let message_data = self.message_buffer.split();
                let value = decode(&message_data)?;
                return Ok(Some(value));
            }

            if src.len() < 2 + chunk_size {
                src.reserve(2 + chunk_size - src.len());
                return Ok(None);
            }

            if self.message_buffer.len() + chunk_size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size: self.message_buffer.len() + chunk_size,
                    max: self.max_message_size,
                });
            }

            src.advance(2);
            self.message_buffer.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }
}

impl<'a> Encoder<&'a PackStreamValue> for BoltCodec {
    type Error = BoltError;

    /// Pack and chunk one message. Nothing is written to `dst` if packing fails.
    fn encode(&mut self, item: &'a PackStreamValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut packed = BytesMut::new();
        self.encoder.pack_into(item, &mut packed)?;
        Self::encode_chunked(&packed, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::packstream::{PackStreamMap, PackStreamStructure};

    #[test]
    fn test_encode_decode_structure() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        let value = PackStreamStructure::new(0x70, vec![PackStreamMap::new().into()]).into();
        codec.encode(&value, &mut buf).unwrap();

        assert_eq!(&buf[..], &[0x00, 0x03, 0xB1, 0x70, 0xA0, 0x00, 0x00]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(value));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_chunked_large_message() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        let large_data = "x".repeat(MAX_CHUNK_SIZE * 2 + 100);
        let value = PackStreamValue::String(large_data.clone());
        codec.encode(&value, &mut buf).unwrap();

        // First chunk is full size.
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]) as usize, MAX_CHUNK_SIZE);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.as_str().unwrap(), large_data);
    }

    #[test]
    fn test_partial_chunk() {
        let mut codec = BoltCodec::new();
        let mut full = BytesMut::new();
        codec.encode(&PackStreamValue::Integer(42), &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..2]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[2..]);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.as_int().unwrap(), 42);
    }

    #[test]
    fn test_message_too_large() {
        let mut codec = BoltCodec::with_max_size(100);
        let mut buf = BytesMut::new();

        buf.put_u16(200);
        buf.extend_from_slice(&[0u8; 200]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(BoltError::MessageTooLarge { size: 200, max: 100 })));
    }

    #[test]
    fn test_noop_skipped() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        buf.put_slice(&END_MARKER);
        codec.encode(&PackStreamValue::Boolean(true), &mut buf).unwrap();
        buf.put_slice(&END_MARKER);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(PackStreamValue::Boolean(true)));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_failed_pack_writes_nothing() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        let too_wide = PackStreamStructure::new(0x10, vec![PackStreamValue::Null; 70_000]);
        assert!(codec.encode(&too_wide.into(), &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_messages() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        for i in 1..=3 {
            codec.encode(&PackStreamValue::Integer(i), &mut buf).unwrap();
        }

        for i in 1..=3 {
            assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_int(), Some(i));
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
