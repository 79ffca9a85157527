//! PackStream marker bytes.
//!
//! Every packed value starts with a marker byte. Small integers and short
//! collections carry their value or length inside the marker itself; the
//! remaining markers are followed by a big-endian size or payload.

/// Null.
pub const NULL: u8 = 0xC0;
/// 64-bit IEEE 754 float.
pub const FLOAT_64: u8 = 0xC1;
/// Boolean false.
pub const FALSE: u8 = 0xC2;
/// Boolean true.
pub const TRUE: u8 = 0xC3;

/// Signed 8-bit integer.
pub const INT_8: u8 = 0xC8;
/// Signed 16-bit integer.
pub const INT_16: u8 = 0xC9;
/// Signed 32-bit integer.
pub const INT_32: u8 = 0xCA;
/// Signed 64-bit integer.
pub const INT_64: u8 = 0xCB;

/// Byte array, 8-bit length.
pub const BYTES_8: u8 = 0xCC;
/// Byte array, 16-bit length.
pub const BYTES_16: u8 = 0xCD;
/// Byte array, 32-bit length.
pub const BYTES_32: u8 = 0xCE;

/// String with its length in the low nibble.
pub const TINY_STRING: u8 = 0x80;
/// String, 8-bit length.
pub const STRING_8: u8 = 0xD0;
/// String, 16-bit length.
pub const STRING_16: u8 = 0xD1;
/// String, 32-bit length.
pub const STRING_32: u8 = 0xD2;

/// List with its length in the low nibble.
pub const TINY_LIST: u8 = 0x90;
/// List, 8-bit length.
pub const LIST_8: u8 = 0xD4;
/// List, 16-bit length.
pub const LIST_16: u8 = 0xD5;
/// List, 32-bit length.
pub const LIST_32: u8 = 0xD6;

/// Map with its entry count in the low nibble.
pub const TINY_MAP: u8 = 0xA0;
/// Map, 8-bit entry count.
pub const MAP_8: u8 = 0xD8;
/// Map, 16-bit entry count.
pub const MAP_16: u8 = 0xD9;
/// Map, 32-bit entry count.
pub const MAP_32: u8 = 0xDA;

/// Structure with its field count in the low nibble.
pub const TINY_STRUCT: u8 = 0xB0;
/// Structure, 8-bit field count.
pub const STRUCT_8: u8 = 0xDC;
/// Structure, 16-bit field count.
pub const STRUCT_16: u8 = 0xDD;

/// Largest length that fits in a tiny marker's low nibble.
pub const TINY_MAX_LEN: usize = 15;

/// Range of integers packed directly into the marker byte.
pub const TINY_INT_RANGE: std::ops::RangeInclusive<i64> = -16..=127;

/// A marker byte classified into the value kind it introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Null.
    Null,
    /// 64-bit float follows.
    Float,
    /// Boolean carried in the marker.
    Bool(bool),
    /// Integer carried in the marker.
    TinyInt(i8),
    /// Integer payload of the given width in bytes.
    Int(usize),
    /// Byte array whose length prefix has the given width.
    Bytes(usize),
    /// String of the given length.
    TinyString(usize),
    /// String whose length prefix has the given width.
    String(usize),
    /// List of the given length.
    TinyList(usize),
    /// List whose length prefix has the given width.
    List(usize),
    /// Map with the given entry count.
    TinyMap(usize),
    /// Map whose size prefix has the given width.
    Map(usize),
    /// Structure with the given field count.
    TinyStruct(usize),
    /// Structure whose size prefix has the given width.
    Struct(usize),
    /// Byte with no meaning in PackStream.
    Reserved(u8),
}

impl Marker {
    /// Classify a marker byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00..=0x7F | 0xF0..=0xFF => Marker::TinyInt(byte as i8),
            0x80..=0x8F => Marker::TinyString((byte & 0x0F) as usize),
            0x90..=0x9F => Marker::TinyList((byte & 0x0F) as usize),
            0xA0..=0xAF => Marker::TinyMap((byte & 0x0F) as usize),
            0xB0..=0xBF => Marker::TinyStruct((byte & 0x0F) as usize),
            NULL => Marker::Null,
            FLOAT_64 => Marker::Float,
            FALSE => Marker::Bool(false),
            TRUE => Marker::Bool(true),
            INT_8 => Marker::Int(1),
            INT_16 => Marker::Int(2),
            INT_32 => Marker::Int(4),
            INT_64 => Marker::Int(8),
            BYTES_8 => Marker::Bytes(1),
            BYTES_16 => Marker::Bytes(2),
            BYTES_32 => Marker::Bytes(4),
            STRING_8 => Marker::String(1),
            STRING_16 => Marker::String(2),
            STRING_32 => Marker::String(4),
            LIST_8 => Marker::List(1),
            LIST_16 => Marker::List(2),
            LIST_32 => Marker::List(4),
            MAP_8 => Marker::Map(1),
            MAP_16 => Marker::Map(2),
            MAP_32 => Marker::Map(4),
            STRUCT_8 => Marker::Struct(1),
            STRUCT_16 => Marker::Struct(2),
            other => Marker::Reserved(other),
        }
    }
}

/// Pick the narrowest integer marker for `value`.
#[inline]
pub fn int_width(value: i64) -> usize {
    if TINY_INT_RANGE.contains(&value) {
        0
    } else if i8::try_from(value).is_ok() {
        1
    } else if i16::try_from(value).is_ok() {
        2
    } else if i32::try_from(value).is_ok() {
        4
    } else {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_int_classification() {
        assert_eq!(Marker::from_byte(0x00), Marker::TinyInt(0));
        assert_eq!(Marker::from_byte(0x7F), Marker::TinyInt(127));
        assert_eq!(Marker::from_byte(0xF0), Marker::TinyInt(-16));
        assert_eq!(Marker::from_byte(0xFF), Marker::TinyInt(-1));
    }

    #[test]
    fn test_tiny_collections_carry_length() {
        assert_eq!(Marker::from_byte(0x85), Marker::TinyString(5));
        assert_eq!(Marker::from_byte(0x9F), Marker::TinyList(15));
        assert_eq!(Marker::from_byte(0xA0), Marker::TinyMap(0));
        assert_eq!(Marker::from_byte(0xB3), Marker::TinyStruct(3));
    }

    #[test]
    fn test_sized_markers() {
        assert_eq!(Marker::from_byte(INT_64), Marker::Int(8));
        assert_eq!(Marker::from_byte(STRING_16), Marker::String(2));
        assert_eq!(Marker::from_byte(STRUCT_8), Marker::Struct(1));
        assert_eq!(Marker::from_byte(0xC4), Marker::Reserved(0xC4));
        assert_eq!(Marker::from_byte(0xDE), Marker::Reserved(0xDE));
    }

    #[test]
    fn test_int_width() {
        assert_eq!(int_width(-16), 0);
        assert_eq!(int_width(127), 0);
        assert_eq!(int_width(-17), 1);
        assert_eq!(int_width(128), 2);
        assert_eq!(int_width(1000), 2);
        assert_eq!(int_width(100_000), 4);
        assert_eq!(int_width(i64::MIN), 8);
    }
}
