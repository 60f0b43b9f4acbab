//! `RocksDB` inventory store for grendel.
//!
//! This crate provides persistent storage for nodes, boot images, users,
//! roles and audit events using `RocksDB` with column families for indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `nodes`: Primary node records, keyed by name
//! - `nodes_by_tag`: Tag posting lists used by the node resolver
//! - `nodes_by_mac`: MAC ownership index for conflict detection
//! - `images`: Boot image records, keyed by name
//! - `users`, `roles`: Authentication records
//! - `events`: Append-only audit log
//! - `meta`: Id counters
//!
//! # Example
//!
//! ```no_run
//! use grendel_store::{resolve, Node, RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/grendel-db").unwrap();
//!
//! let mut node = Node::new("cpn-d13-01");
//! node.tags.insert("gpu".to_string());
//! store.put_nodes(&[node]).unwrap();
//!
//! let names = resolve(&store, Some("cpn-d13-[01-04]"), Some("gpu")).unwrap();
//! assert_eq!(names, vec!["cpn-d13-01".to_string()]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod resolve;
pub mod rocks;
pub mod schema;
pub mod types;

use std::collections::BTreeSet;

pub use error::{Result, StoreError};
pub use resolve::resolve;
pub use rocks::RocksStore;
pub use types::{
    Bond, BootImage, DataDump, Event, JobMessage, JobStatus, NetInterface, Node, Permission, Role,
    Severity, User, ROLE_ADMIN, ROLE_DISABLED, ROLE_USER,
};

use grendel_core::MacAddr;

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Node Operations
    // =========================================================================

    /// Insert or replace a batch of nodes atomically.
    ///
    /// New nodes are assigned the next internal id. Existing nodes keep their
    /// stored `id` and `uid` regardless of the incoming values. Tag and MAC
    /// indexes are updated in the same write batch. Returns the records as
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns an error if a tag cannot be indexed or the database operation fails.
    fn put_nodes(&self, nodes: &[Node]) -> Result<Vec<Node>>;

    /// Get a node by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_node(&self, name: &str) -> Result<Option<Node>>;

    /// Get several nodes by name, in the given order, skipping missing ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_nodes(&self, names: &[String]) -> Result<Vec<Node>>;

    /// Returns true if a node with this name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_node(&self, name: &str) -> Result<bool>;

    /// Delete nodes by name and drop them from all indexes.
    ///
    /// Returns the number of nodes that existed and were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_nodes(&self, names: &[String]) -> Result<usize>;

    /// List every node, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_nodes(&self) -> Result<Vec<Node>>;

    /// The names of every node.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn node_names(&self) -> Result<BTreeSet<String>>;

    /// The posting list of a single tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn nodes_with_tag(&self, tag: &str) -> Result<BTreeSet<String>>;

    /// Every distinct tag present in the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn all_tags(&self) -> Result<BTreeSet<String>>;

    /// The name of the node owning a MAC address, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn node_name_by_mac(&self, mac: &MacAddr) -> Result<Option<String>>;

    // =========================================================================
    // Image Operations
    // =========================================================================

    /// Insert or replace a batch of images atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_images(&self, images: &[BootImage]) -> Result<()>;

    /// Get an image by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_image(&self, name: &str) -> Result<Option<BootImage>>;

    /// Delete images by name, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_images(&self, names: &[String]) -> Result<usize>;

    /// List every image, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_images(&self) -> Result<Vec<BootImage>>;

    // =========================================================================
    // User Operations
    // =========================================================================

    /// Insert or update a user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_user(&self, user: &User) -> Result<()>;

    /// Get a user by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_user(&self, username: &str) -> Result<Option<User>>;

    /// Delete a user, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_user(&self, username: &str) -> Result<bool>;

    /// List every user, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_users(&self) -> Result<Vec<User>>;

    /// Count users.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_users(&self) -> Result<usize>;

    // =========================================================================
    // Role Operations
    // =========================================================================

    /// Insert or update a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_role(&self, role: &Role) -> Result<()>;

    /// Get a role by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_role(&self, name: &str) -> Result<Option<Role>>;

    /// Delete a role, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_role(&self, name: &str) -> Result<bool>;

    /// List every role, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_roles(&self) -> Result<Vec<Role>>;

    // =========================================================================
    // Event Operations
    // =========================================================================

    /// Append an event, assigning the next sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn append_event(&self, event: Event) -> Result<Event>;

    /// List up to `limit` events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_events(&self, limit: usize) -> Result<Vec<Event>>;

    // =========================================================================
    // Dump / Restore
    // =========================================================================

    /// Snapshot every node, image and user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn dump(&self) -> Result<DataDump>;

    /// Upsert the contents of a dump in a single atomic write.
    ///
    /// Records keep the `id` and `uid` carried by the dump.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written then.
    fn restore(&self, dump: &DataDump) -> Result<()>;
}
