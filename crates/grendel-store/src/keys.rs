//! Key encoding utilities for `RocksDB`.
//!
//! Record keys are the UTF-8 bytes of the record name. Index keys are laid
//! out so a prefix scan returns one posting list.

use grendel_core::MacAddr;

use crate::error::{Result, StoreError};

const SEPARATOR: u8 = 0x00;

/// Encode a record key (the name bytes).
#[must_use]
pub fn name_key(name: &str) -> Vec<u8> {
    name.as_bytes().to_vec()
}

/// Encode a tag index key: `tag || 0x00 || node_name`.
///
/// # Errors
///
/// Returns `StoreError::InvalidKey` if the tag contains a NUL byte.
pub fn tag_node_key(tag: &str, node_name: &str) -> Result<Vec<u8>> {
    let mut key = tag_prefix(tag)?;
    key.extend_from_slice(node_name.as_bytes());
    Ok(key)
}

/// Encode a tag prefix for scanning all nodes carrying a tag.
///
/// # Errors
///
/// Returns `StoreError::InvalidKey` if the tag contains a NUL byte.
pub fn tag_prefix(tag: &str) -> Result<Vec<u8>> {
    if tag.as_bytes().contains(&SEPARATOR) {
        return Err(StoreError::InvalidKey(format!("tag {tag:?} contains NUL")));
    }
    let mut key = Vec::with_capacity(tag.len() + 1);
    key.extend_from_slice(tag.as_bytes());
    key.push(SEPARATOR);
    Ok(key)
}

/// Split a tag index key into `(tag, node_name)`.
///
/// Returns `None` if the key is malformed.
#[must_use]
pub fn split_tag_node_key(key: &[u8]) -> Option<(&str, &str)> {
    let pos = key.iter().position(|b| *b == SEPARATOR)?;
    let tag = std::str::from_utf8(&key[..pos]).ok()?;
    let name = std::str::from_utf8(&key[pos + 1..]).ok()?;
    Some((tag, name))
}

/// Encode a MAC index key (the raw octets).
#[must_use]
pub fn mac_key(mac: &MacAddr) -> Vec<u8> {
    mac.as_bytes().to_vec()
}

/// Encode an event key as a big-endian sequence number.
#[must_use]
pub fn event_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

/// Decode a big-endian counter value.
#[must_use]
pub fn decode_u64(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_node_key_roundtrip() {
        let key = tag_node_key("rack=d13", "cpn-d13-01").unwrap();
        assert_eq!(split_tag_node_key(&key), Some(("rack=d13", "cpn-d13-01")));
    }

    #[test]
    fn tag_prefix_does_not_match_longer_tag() {
        let gpu = tag_node_key("gpu", "n1").unwrap();
        let gpus = tag_node_key("gpus", "n1").unwrap();
        let prefix = tag_prefix("gpu").unwrap();

        assert!(gpu.starts_with(&prefix));
        assert!(!gpus.starts_with(&prefix));
    }

    #[test]
    fn tag_with_nul_rejected() {
        assert!(matches!(
            tag_prefix("bad\0tag"),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn event_keys_sort_numerically() {
        assert!(event_key(2) < event_key(10));
        assert!(event_key(255) < event_key(256));
        assert_eq!(decode_u64(&event_key(42)), Some(42));
    }
}
