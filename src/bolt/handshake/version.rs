//! Bolt protocol version definitions.

use std::fmt;

/// Bolt protocol versions known to this driver.
///
/// On the wire a version is four bytes `[0, range, minor, major]`. A proposal
/// with a non-zero range accepts `minor` down to `minor - range` of the same
/// major; the server always replies with range 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoltVersion {
    /// Bolt 3.0
    V3_0,
    /// Bolt 4.0: multi-database, PULL with fetch size
    V4_0,
    /// Bolt 4.1: routing context in HELLO
    V4_1,
    /// Bolt 4.2
    V4_2,
    /// Bolt 4.3: ROUTE message
    V4_3,
    /// Bolt 4.4: impersonation
    V4_4,
    /// Bolt 5.0: element ids, UTC date-times
    V5_0,
    /// Bolt 5.1: LOGON/LOGOFF
    V5_1,
    /// Bolt 5.2: notification filters
    V5_2,
    /// Bolt 5.3: bolt agent
    V5_3,
    /// Bolt 5.4
    V5_4,
}

impl BoltVersion {
    /// All supported versions, newest first.
    pub const ALL: [BoltVersion; 11] = [
        BoltVersion::V5_4,
        BoltVersion::V5_3,
        BoltVersion::V5_2,
        BoltVersion::V5_1,
        BoltVersion::V5_0,
        BoltVersion::V4_4,
        BoltVersion::V4_3,
        BoltVersion::V4_2,
        BoltVersion::V4_1,
        BoltVersion::V4_0,
        BoltVersion::V3_0,
    ];

    /// Look up a version by major and minor number.
    pub fn new(major: u8, minor: u8) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.major() == major && v.minor() == minor)
    }

    /// Get the major version number.
    pub fn major(self) -> u8 {
        match self {
            BoltVersion::V3_0 => 3,
            BoltVersion::V4_0
            | BoltVersion::V4_1
            | BoltVersion::V4_2
            | BoltVersion::V4_3
            | BoltVersion::V4_4 => 4,
            _ => 5,
        }
    }

    /// Get the minor version number.
    pub fn minor(self) -> u8 {
        match self {
            BoltVersion::V3_0 | BoltVersion::V4_0 | BoltVersion::V5_0 => 0,
            BoltVersion::V4_1 | BoltVersion::V5_1 => 1,
            BoltVersion::V4_2 | BoltVersion::V5_2 => 2,
            BoltVersion::V4_3 | BoltVersion::V5_3 => 3,
            BoltVersion::V4_4 | BoltVersion::V5_4 => 4,
        }
    }

    /// Encode as a handshake proposal accepting `range` older minors.
    pub fn proposal(self, range: u8) -> [u8; 4] {
        [0, range, self.minor(), self.major()]
    }

    /// Encode as a plain version with no range.
    pub fn to_bytes(self) -> [u8; 4] {
        self.proposal(0)
    }

    /// Parse the server's handshake reply.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        if bytes[0] != 0 || bytes[1] != 0 {
            return None;
        }
        Self::new(bytes[3], bytes[2])
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout() {
        assert_eq!(BoltVersion::V4_3.to_bytes(), [0x00, 0x00, 0x03, 0x04]);
        assert_eq!(BoltVersion::V5_4.proposal(4), [0x00, 0x04, 0x04, 0x05]);
        assert_eq!(BoltVersion::from_bytes([0, 0, 2, 5]), Some(BoltVersion::V5_2));
        assert_eq!(BoltVersion::from_bytes([0, 0, 0, 3]), Some(BoltVersion::V3_0));
        assert_eq!(BoltVersion::from_bytes([0, 0, 9, 5]), None);
        assert_eq!(BoltVersion::from_bytes([0, 1, 0, 5]), None);
    }

    #[test]
    fn test_version_ordering() {
        assert!(BoltVersion::V5_0 > BoltVersion::V4_4);
        assert!(BoltVersion::V4_0 > BoltVersion::V3_0);
        assert!(BoltVersion::V5_4 > BoltVersion::V5_1);
        let mut sorted = BoltVersion::ALL;
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(sorted, BoltVersion::ALL);
    }

    #[test]
    fn test_version_display() {
        assert_eq!(BoltVersion::V3_0.to_string(), "3.0");
        assert_eq!(BoltVersion::V4_3.to_string(), "4.3");
        assert_eq!(BoltVersion::V5_4.to_string(), "5.4");
    }
}
