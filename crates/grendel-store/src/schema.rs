//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary node records, keyed by node name.
    pub const NODES: &str = "nodes";

    /// Index: tag posting lists, keyed by `tag || 0x00 || name`.
    pub const NODES_BY_TAG: &str = "nodes_by_tag";

    /// Index: MAC ownership, keyed by the 6 MAC octets, value is the node name.
    pub const NODES_BY_MAC: &str = "nodes_by_mac";

    /// Boot image records, keyed by image name.
    pub const IMAGES: &str = "images";

    /// User records, keyed by username.
    pub const USERS: &str = "users";

    /// Role records, keyed by role name.
    pub const ROLES: &str = "roles";

    /// Audit events, keyed by big-endian sequence number.
    pub const EVENTS: &str = "events";

    /// Counters and other bookkeeping values.
    pub const META: &str = "meta";
}

/// Keys stored in the [`cf::META`] column family.
pub mod meta {
    /// Next internal node id to assign.
    pub const NEXT_NODE_ID: &[u8] = b"next_node_id";

    /// Next event sequence number to assign.
    pub const NEXT_EVENT_ID: &[u8] = b"next_event_id";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::NODES,
        cf::NODES_BY_TAG,
        cf::NODES_BY_MAC,
        cf::IMAGES,
        cf::USERS,
        cf::ROLES,
        cf::EVENTS,
        cf::META,
    ]
}
