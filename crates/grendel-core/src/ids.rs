//! Core identifier types for grendel.
//!
//! This module provides strongly-typed identifiers for nodes and network
//! interfaces. All IDs serialize as strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable external node identifier based on UUID v4.
///
/// Node UIDs are generated when a node is first stored and survive later
/// upserts of the same node name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeUid(uuid::Uuid);

impl NodeUid {
    /// Generate a new random `NodeUid`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl FromStr for NodeUid {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeUid({})", self.0)
    }
}

impl fmt::Display for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for NodeUid {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeUid> for String {
    fn from(id: NodeUid) -> Self {
        id.0.to_string()
    }
}

/// A 48-bit hardware (MAC) address.
///
/// Accepts colon, dash or dot separated input in either case and always
/// displays as lowercase colon-separated octets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Create a new `MacAddr` from raw octets.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Return the underlying octets.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl FromStr for MacAddr {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();
        let bytes = hex::decode(&digits).map_err(|_| IdError::InvalidHex)?;
        let arr: [u8; 6] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: 6,
            got: digits.len() / 2,
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl TryFrom<String> for MacAddr {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input string contains invalid hexadecimal characters.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_uid_roundtrip() {
        let id = NodeUid::generate();
        let parsed = NodeUid::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn node_uids_are_unique() {
        assert_ne!(NodeUid::generate(), NodeUid::generate());
    }

    #[test]
    fn node_uid_invalid() {
        assert!(matches!(
            NodeUid::from_str("not-a-uuid"),
            Err(IdError::InvalidUuid)
        ));
    }

    #[test]
    fn mac_formats() {
        let colon: MacAddr = "AA:BB:CC:00:11:22".parse().unwrap();
        let dash: MacAddr = "aa-bb-cc-00-11-22".parse().unwrap();
        let dotted: MacAddr = "aabb.cc00.1122".parse().unwrap();
        assert_eq!(colon, dash);
        assert_eq!(colon, dotted);
        assert_eq!(colon.to_string(), "aa:bb:cc:00:11:22");
    }

    #[test]
    fn mac_invalid() {
        assert!(matches!(
            "zz:bb:cc:00:11:22".parse::<MacAddr>(),
            Err(IdError::InvalidHex)
        ));
        assert!(matches!(
            "aa:bb:cc".parse::<MacAddr>(),
            Err(IdError::InvalidLength { expected: 6, .. })
        ));
    }

    #[test]
    fn mac_serde_json() {
        let mac = MacAddr::from_bytes([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"de:ad:be:ef:00:01\"");
        let parsed: MacAddr = serde_json::from_str(&json).unwrap();
        assert_eq!(mac, parsed);
    }
}
