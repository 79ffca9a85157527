//! PackStream serialization format.
//!
//! PackStream is the binary format Bolt uses for every message and value.
//! This module only knows the raw shapes: scalars, byte arrays, strings,
//! lists, string-keyed maps and tagged structures. Turning structures into
//! graph, temporal and spatial values happens in [`crate::driver::types`],
//! which needs the negotiated protocol version to pick field layouts.
//!
//! # Encoding rules
//!
//! - Integers use the narrowest of tiny/8/16/32/64-bit encodings
//! - Floats are always 64-bit IEEE 754
//! - Strings, lists and maps up to 15 entries use a tiny marker
//! - Byte arrays always carry an explicit size prefix
//! - Structures carry at most 65535 fields

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod structures;
pub mod types;

pub use decoder::{decode, PackStreamDecoder};
pub use encoder::{encode, PackStreamEncoder};
pub use marker::Marker;
pub use types::{PackStreamMap, PackStreamStructure, PackStreamValue};

use std::fmt;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamError {
    /// Unexpected end of input
    UnexpectedEof,
    /// Unknown marker byte
    UnknownMarker(u8),
    /// Invalid UTF-8 in string
    InvalidUtf8(String),
    /// Invalid map key (must be string)
    InvalidMapKey,
    /// Value too large to encode
    ValueTooLarge(&'static str, usize),
    /// Invalid structure format
    InvalidStructure(String),
    /// Known structure tag with the wrong number of fields
    MalformedStructure {
        /// Structure tag
        tag: u8,
        /// Field count required by the negotiated version
        expected: usize,
        /// Field count received
        actual: usize,
    },
    /// Value cannot be sent as a parameter
    Packing(String),
    /// Value has no encoding on the negotiated protocol version
    UnsupportedType {
        /// Value type
        type_name: &'static str,
        /// Negotiated protocol version
        version: String,
    },
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "Unexpected end of PackStream data"),
            PackStreamError::UnknownMarker(m) => write!(f, "Unknown PackStream marker: 0x{:02X}", m),
            PackStreamError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            PackStreamError::InvalidMapKey => write!(f, "Map keys must be strings"),
            PackStreamError::ValueTooLarge(t, s) => write!(f, "{} too large: {} entries", t, s),
            PackStreamError::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
            PackStreamError::MalformedStructure { tag, expected, actual } => write!(
                f,
                "Structure 0x{:02X} expects {} fields, received {}",
                tag, expected, actual
            ),
            PackStreamError::Packing(msg) => write!(f, "Cannot pack value: {}", msg),
            PackStreamError::UnsupportedType { type_name, version } => {
                write!(f, "{} is not supported by Bolt {}", type_name, version)
            }
        }
    }
}

impl std::error::Error for PackStreamError {}
