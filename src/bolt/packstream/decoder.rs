//! PackStream decoder.

use bytes::Buf;

use super::marker::Marker;
use super::types::{PackStreamMap, PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Nesting limit for lists, maps and structures.
pub const MAX_DEPTH: usize = 128;

/// PackStream decoder that reads values from a byte slice.
pub struct PackStreamDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> PackStreamDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, depth: 0 }
    }

    /// Get remaining bytes count.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let marker = Marker::from_byte(self.read_u8()?);
        let value = match marker {
            Marker::Null => PackStreamValue::Null,
            Marker::Bool(b) => PackStreamValue::Boolean(b),
            Marker::TinyInt(i) => PackStreamValue::Integer(i as i64),
            Marker::Int(width) => PackStreamValue::Integer(self.read_int(width)?),
            Marker::Float => PackStreamValue::Float(self.take(8)?.get_f64()),
            Marker::Bytes(width) => {
                let len = self.read_len(width)?;
                PackStreamValue::Bytes(self.take(len)?.to_vec())
            }
            Marker::TinyString(len) => self.read_string(len)?,
            Marker::String(width) => {
                let len = self.read_len(width)?;
                self.read_string(len)?
            }
            Marker::TinyList(len) => self.nested(|d| d.read_list(len))?,
            Marker::List(width) => {
                let len = self.read_len(width)?;
                self.nested(|d| d.read_list(len))?
            }
            Marker::TinyMap(len) => self.nested(|d| d.read_map(len))?,
            Marker::Map(width) => {
                let len = self.read_len(width)?;
                self.nested(|d| d.read_map(len))?
            }
            Marker::TinyStruct(len) => self.nested(|d| d.read_struct(len))?,
            Marker::Struct(width) => {
                let len = self.read_len(width)?;
                self.nested(|d| d.read_struct(len))?
            }
            Marker::Reserved(byte) => return Err(PackStreamError::UnknownMarker(byte)),
        };
        Ok(value)
    }

    fn nested<F>(&mut self, f: F) -> Result<PackStreamValue, PackStreamError>
    where
        F: FnOnce(&mut Self) -> Result<PackStreamValue, PackStreamError>,
    {
        if self.depth >= MAX_DEPTH {
            return Err(PackStreamError::InvalidStructure(format!(
                "nesting deeper than {} levels",
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn read_string(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))?;
        Ok(PackStreamValue::String(s.to_string()))
    }

    fn read_list(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        // Each element takes at least one byte.
        let mut items = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(PackStreamValue::List(items))
    }

    fn read_map(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let mut map = PackStreamMap::with_capacity(len.min(self.remaining() / 2));
        for _ in 0..len {
            let key = match self.decode()? {
                PackStreamValue::String(s) => s,
                _ => return Err(PackStreamError::InvalidMapKey),
            };
            let value = self.decode()?;
            map.insert(key, value);
        }
        Ok(PackStreamValue::Map(map))
    }

    fn read_struct(&mut self, field_count: usize) -> Result<PackStreamValue, PackStreamError> {
        let tag = self.read_u8()?;
        let mut fields = Vec::with_capacity(field_count.min(self.remaining()));
        for _ in 0..field_count {
            fields.push(self.decode()?);
        }
        Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
    }

    fn read_int(&mut self, width: usize) -> Result<i64, PackStreamError> {
        let mut bytes = self.take(width)?;
        Ok(match width {
            1 => bytes.get_i8() as i64,
            2 => bytes.get_i16() as i64,
            4 => bytes.get_i32() as i64,
            _ => bytes.get_i64(),
        })
    }

    fn read_len(&mut self, width: usize) -> Result<usize, PackStreamError> {
        let mut bytes = self.take(width)?;
        Ok(match width {
            1 => bytes.get_u8() as usize,
            2 => bytes.get_u16() as usize,
            _ => bytes.get_u32() as usize,
        })
    }

    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        Ok(self.take(1)?[0])
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        if self.remaining() < len {
            return Err(PackStreamError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

/// Decode exactly one value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    let mut decoder = PackStreamDecoder::new(data);
    let value = decoder.decode()?;
    if decoder.remaining() > 0 {
        return Err(PackStreamError::InvalidStructure(format!(
            "{} trailing bytes after value",
            decoder.remaining()
        )));
    }
    Ok(value)
}
