//! Raw PackStream values as they appear on the wire.

use std::collections::HashMap;

use super::PackStreamError;

/// A string-keyed PackStream map.
pub type PackStreamMap = HashMap<String, PackStreamValue>;

/// A PackStream value before any structure hydration.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamValue {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// Byte array
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// List of values
    List(Vec<PackStreamValue>),
    /// Map of string keys to values
    Map(PackStreamMap),
    /// Structure (tag + fields)
    Structure(PackStreamStructure),
}

/// A tagged structure: the wire form of messages and extension types.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamStructure {
    /// Structure tag
    pub tag: u8,
    /// Structure fields
    pub fields: Vec<PackStreamValue>,
}

impl PackStreamStructure {
    /// Create a new structure with given tag and fields.
    pub fn new(tag: u8, fields: Vec<PackStreamValue>) -> Self {
        Self { tag, fields }
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the structure has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fail with `MalformedStructure` unless exactly `expected` fields are present.
    pub fn expect_fields(&self, expected: usize) -> Result<(), PackStreamError> {
        if self.fields.len() == expected {
            Ok(())
        } else {
            Err(PackStreamError::MalformedStructure {
                tag: self.tag,
                expected,
                actual: self.fields.len(),
            })
        }
    }

    /// Integer field at `index`.
    pub fn int_field(&self, index: usize, name: &str) -> Result<i64, PackStreamError> {
        self.field(index, name)?
            .as_int()
            .ok_or_else(|| self.field_type_error(index, name, "Integer"))
    }

    /// Float field at `index`; integers are widened.
    pub fn float_field(&self, index: usize, name: &str) -> Result<f64, PackStreamError> {
        self.field(index, name)?
            .as_float()
            .ok_or_else(|| self.field_type_error(index, name, "Float"))
    }

    /// String field at `index`.
    pub fn str_field(&self, index: usize, name: &str) -> Result<&str, PackStreamError> {
        self.field(index, name)?
            .as_str()
            .ok_or_else(|| self.field_type_error(index, name, "String"))
    }

    /// Map field at `index`.
    pub fn map_field(&self, index: usize, name: &str) -> Result<&PackStreamMap, PackStreamError> {
        self.field(index, name)?
            .as_map()
            .ok_or_else(|| self.field_type_error(index, name, "Map"))
    }

    /// List field at `index`.
    pub fn list_field(&self, index: usize, name: &str) -> Result<&[PackStreamValue], PackStreamError> {
        self.field(index, name)?
            .as_list()
            .ok_or_else(|| self.field_type_error(index, name, "List"))
    }

    fn field(&self, index: usize, name: &str) -> Result<&PackStreamValue, PackStreamError> {
        self.fields.get(index).ok_or_else(|| {
            PackStreamError::InvalidStructure(format!(
                "structure 0x{:02X} has no field {} ({})",
                self.tag, index, name
            ))
        })
    }

    fn field_type_error(&self, index: usize, name: &str, expected: &str) -> PackStreamError {
        let actual = self.fields.get(index).map(|v| v.type_name()).unwrap_or("nothing");
        PackStreamError::InvalidStructure(format!(
            "structure 0x{:02X} field {} ({}) must be {}, got {}",
            self.tag, index, name, expected, actual
        ))
    }
}

impl PackStreamValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, PackStreamValue::Null)
    }

    /// Try to get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PackStreamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PackStreamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as float. Integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PackStreamValue::Float(f) => Some(*f),
            PackStreamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PackStreamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as list reference.
    pub fn as_list(&self) -> Option<&[PackStreamValue]> {
        match self {
            PackStreamValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Try to get as map reference.
    pub fn as_map(&self) -> Option<&PackStreamMap> {
        match self {
            PackStreamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Try to get as structure reference.
    pub fn as_structure(&self) -> Option<&PackStreamStructure> {
        match self {
            PackStreamValue::Structure(s) => Some(s),
            _ => None,
        }
    }

    /// Take the structure out of this value.
    pub fn into_structure(self) -> Option<PackStreamStructure> {
        match self {
            PackStreamValue::Structure(s) => Some(s),
            _ => None,
        }
    }

    /// Collect a list of strings; `None` if any element is not a string.
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        self.as_list()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Get the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PackStreamValue::Null => "Null",
            PackStreamValue::Boolean(_) => "Boolean",
            PackStreamValue::Integer(_) => "Integer",
            PackStreamValue::Float(_) => "Float",
            PackStreamValue::Bytes(_) => "Bytes",
            PackStreamValue::String(_) => "String",
            PackStreamValue::List(_) => "List",
            PackStreamValue::Map(_) => "Map",
            PackStreamValue::Structure(_) => "Structure",
        }
    }
}

impl From<bool> for PackStreamValue {
    fn from(v: bool) -> Self {
        PackStreamValue::Boolean(v)
    }
}

impl From<i64> for PackStreamValue {
    fn from(v: i64) -> Self {
        PackStreamValue::Integer(v)
    }
}

impl From<f64> for PackStreamValue {
    fn from(v: f64) -> Self {
        PackStreamValue::Float(v)
    }
}

impl From<String> for PackStreamValue {
    fn from(v: String) -> Self {
        PackStreamValue::String(v)
    }
}

impl From<&str> for PackStreamValue {
    fn from(v: &str) -> Self {
        PackStreamValue::String(v.to_string())
    }
}

impl From<Vec<PackStreamValue>> for PackStreamValue {
    fn from(v: Vec<PackStreamValue>) -> Self {
        PackStreamValue::List(v)
    }
}

impl From<PackStreamMap> for PackStreamValue {
    fn from(v: PackStreamMap) -> Self {
        PackStreamValue::Map(v)
    }
}

impl From<PackStreamStructure> for PackStreamValue {
    fn from(v: PackStreamStructure) -> Self {
        PackStreamValue::Structure(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert!(PackStreamValue::Null.is_null());
        assert_eq!(PackStreamValue::Integer(42).as_float(), Some(42.0));
        assert_eq!(PackStreamValue::Float(1.5).as_int(), None);
        assert_eq!(PackStreamValue::from("x").as_str(), Some("x"));
    }

    #[test]
    fn test_string_list() {
        let v = PackStreamValue::List(vec!["a".into(), "b".into()]);
        assert_eq!(v.as_string_list(), Some(vec!["a".to_string(), "b".to_string()]));

        let mixed = PackStreamValue::List(vec!["a".into(), PackStreamValue::Integer(1)]);
        assert_eq!(mixed.as_string_list(), None);
    }

    #[test]
    fn test_expect_fields() {
        let s = PackStreamStructure::new(0x4E, vec![PackStreamValue::Integer(1)]);
        assert!(s.expect_fields(1).is_ok());
        match s.expect_fields(3) {
            Err(PackStreamError::MalformedStructure { tag, expected, actual }) => {
                assert_eq!((tag, expected, actual), (0x4E, 3, 1));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_typed_field_errors() {
        let s = PackStreamStructure::new(0x44, vec!["not a number".into()]);
        assert!(s.str_field(0, "days").is_ok());
        assert!(matches!(
            s.int_field(0, "days"),
            Err(PackStreamError::InvalidStructure(_))
        ));
        assert!(s.int_field(5, "missing").is_err());
    }
}
