//! PackStream encoder.
//!
//! Values are packed into a scratch buffer first and only appended to the
//! destination once the whole value has been packed, so a failure never
//! leaves a half-written value behind.

use bytes::{BufMut, BytesMut};

use super::marker::*;
use super::types::{PackStreamMap, PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Markers for the 8, 16 and 32 bit size prefixes of one collection kind.
struct SizedMarkers {
    kind: &'static str,
    tiny: Option<u8>,
    m8: u8,
    m16: u8,
    m32: Option<u8>,
}

const BYTES: SizedMarkers = SizedMarkers { kind: "bytes", tiny: None, m8: BYTES_8, m16: BYTES_16, m32: Some(BYTES_32) };
const STRING: SizedMarkers = SizedMarkers { kind: "string", tiny: Some(TINY_STRING), m8: STRING_8, m16: STRING_16, m32: Some(STRING_32) };
const LIST: SizedMarkers = SizedMarkers { kind: "list", tiny: Some(TINY_LIST), m8: LIST_8, m16: LIST_16, m32: Some(LIST_32) };
const MAP: SizedMarkers = SizedMarkers { kind: "map", tiny: Some(TINY_MAP), m8: MAP_8, m16: MAP_16, m32: Some(MAP_32) };
const STRUCT: SizedMarkers = SizedMarkers { kind: "structure", tiny: Some(TINY_STRUCT), m8: STRUCT_8, m16: STRUCT_16, m32: None };

/// PackStream encoder that writes values to a byte buffer.
#[derive(Debug, Default)]
pub struct PackStreamEncoder {
    buffer: BytesMut,
}

impl PackStreamEncoder {
    /// Create a new encoder with default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new encoder with specified buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Bytes packed so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the encoder and return the bytes.
    pub fn into_bytes(self) -> BytesMut {
        self.buffer
    }

    /// Pack `value` and append it to `dst`.
    ///
    /// On error `dst` is left exactly as it was.
    pub fn pack_into(&mut self, value: &PackStreamValue, dst: &mut BytesMut) -> Result<(), PackStreamError> {
        self.buffer.clear();
        let result = self.encode(value);
        if result.is_ok() {
            dst.extend_from_slice(&self.buffer);
        }
        self.buffer.clear();
        result
    }

    /// Encode a value onto the end of the internal buffer.
    pub fn encode(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => self.buffer.put_u8(NULL),
            PackStreamValue::Boolean(b) => self.buffer.put_u8(if *b { TRUE } else { FALSE }),
            PackStreamValue::Integer(i) => self.encode_int(*i),
            PackStreamValue::Float(f) => {
                self.buffer.put_u8(FLOAT_64);
                self.buffer.put_f64(*f);
            }
            PackStreamValue::Bytes(b) => {
                self.write_header(&BYTES, b.len())?;
                self.buffer.put_slice(b);
            }
            PackStreamValue::String(s) => self.encode_string(s)?,
            PackStreamValue::List(items) => {
                self.write_header(&LIST, items.len())?;
                for item in items {
                    self.encode(item)?;
                }
            }
            PackStreamValue::Map(map) => self.encode_map(map)?,
            PackStreamValue::Structure(s) => self.encode_structure(s)?,
        }
        Ok(())
    }

    /// Encode an integer using the smallest representation.
    fn encode_int(&mut self, value: i64) {
        match int_width(value) {
            0 => self.buffer.put_i8(value as i8),
            1 => {
                self.buffer.put_u8(INT_8);
                self.buffer.put_i8(value as i8);
            }
            2 => {
                self.buffer.put_u8(INT_16);
                self.buffer.put_i16(value as i16);
            }
            4 => {
                self.buffer.put_u8(INT_32);
                self.buffer.put_i32(value as i32);
            }
            _ => {
                self.buffer.put_u8(INT_64);
                self.buffer.put_i64(value);
            }
        }
    }

    fn encode_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        self.write_header(&STRING, value.len())?;
        self.buffer.put_slice(value.as_bytes());
        Ok(())
    }

    fn encode_map(&mut self, map: &PackStreamMap) -> Result<(), PackStreamError> {
        self.write_header(&MAP, map.len())?;
        for (key, value) in map {
            self.encode_string(key)?;
            self.encode(value)?;
        }
        Ok(())
    }

    fn encode_structure(&mut self, s: &PackStreamStructure) -> Result<(), PackStreamError> {
        self.write_header(&STRUCT, s.fields.len())?;
        self.buffer.put_u8(s.tag);
        for field in &s.fields {
            self.encode(field)?;
        }
        Ok(())
    }

    fn write_header(&mut self, markers: &SizedMarkers, len: usize) -> Result<(), PackStreamError> {
        match markers.tiny {
            Some(base) if len <= TINY_MAX_LEN => self.buffer.put_u8(base | len as u8),
            _ if len <= u8::MAX as usize => {
                self.buffer.put_u8(markers.m8);
                self.buffer.put_u8(len as u8);
            }
            _ if len <= u16::MAX as usize => {
                self.buffer.put_u8(markers.m16);
                self.buffer.put_u16(len as u16);
            }
            _ => match markers.m32 {
                Some(m32) if len <= u32::MAX as usize => {
                    self.buffer.put_u8(m32);
                    self.buffer.put_u32(len as u32);
                }
                _ => return Err(PackStreamError::ValueTooLarge(markers.kind, len)),
            },
        }
        Ok(())
    }
}

/// Encode a single value to a fresh buffer.
pub fn encode(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut encoder = PackStreamEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(&encode(&PackStreamValue::Null).unwrap()[..], &[0xC0]);
        assert_eq!(&encode(&PackStreamValue::Boolean(true)).unwrap()[..], &[0xC3]);
        assert_eq!(&encode(&PackStreamValue::Integer(-16)).unwrap()[..], &[0xF0]);
        assert_eq!(&encode(&PackStreamValue::Integer(-17)).unwrap()[..], &[0xC8, 0xEF]);
        assert_eq!(&encode(&PackStreamValue::Integer(1000)).unwrap()[..], &[0xC9, 0x03, 0xE8]);
        assert_eq!(
            &encode(&PackStreamValue::Integer(100_000)).unwrap()[..],
            &[0xCA, 0x00, 0x01, 0x86, 0xA0]
        );
        assert_eq!(
            &encode(&PackStreamValue::Float(1.1)).unwrap()[..],
            &[0xC1, 0x3F, 0xF1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9A]
        );
    }

    #[test]
    fn test_encode_tiny_and_sized_strings() {
        assert_eq!(&encode(&"a".into()).unwrap()[..], &[0x81, b'a']);
        let sixteen = "x".repeat(16);
        let bytes = encode(&sixteen.as_str().into()).unwrap();
        assert_eq!(&bytes[..2], &[STRING_8, 16]);
        let long = "y".repeat(300);
        let bytes = encode(&long.as_str().into()).unwrap();
        assert_eq!(&bytes[..3], &[STRING_16, 0x01, 0x2C]);
    }

    #[test]
    fn test_encode_structure_header() {
        let node = PackStreamStructure::new(
            0x4E,
            vec![PackStreamValue::Integer(1), PackStreamValue::List(vec![]), PackStreamValue::Map(PackStreamMap::new())],
        );
        let bytes = encode(&node.into()).unwrap();
        assert_eq!(&bytes[..], &[0xB3, 0x4E, 0x01, 0x90, 0xA0]);
    }

    #[test]
    fn test_bytes_never_use_tiny_marker() {
        let bytes = encode(&PackStreamValue::Bytes(vec![1, 2, 3])).unwrap();
        assert_eq!(&bytes[..], &[BYTES_8, 3, 1, 2, 3]);
    }

    #[test]
    fn test_pack_into_failure_leaves_destination_untouched() {
        let mut dst = BytesMut::from(&b"prefix"[..]);
        let mut encoder = PackStreamEncoder::new();

        let too_wide = PackStreamStructure::new(0x01, vec![PackStreamValue::Null; 70_000]);
        let value = PackStreamValue::List(vec!["ok".into(), too_wide.into()]);

        assert!(matches!(
            encoder.pack_into(&value, &mut dst),
            Err(PackStreamError::ValueTooLarge("structure", 70_000))
        ));
        assert_eq!(&dst[..], b"prefix");

        encoder.pack_into(&PackStreamValue::Integer(1), &mut dst).unwrap();
        assert_eq!(&dst[..], b"prefix\x01");
    }
}
