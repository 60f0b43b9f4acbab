//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use grendel_core::MacAddr;
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf, meta};
use crate::types::{BootImage, DataDump, Event, Node, Role, User};
use crate::Store;

/// RocksDB-backed storage implementation.
///
/// Reads go straight to the database. Read-modify-write paths (node upserts,
/// id counters, restore) are serialized by an internal writer lock so index
/// maintenance always sees the latest committed record.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// The built-in roles are seeded if they are missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;

        let store = Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        };
        store.seed_roles()?;
        Ok(store)
    }

    fn seed_roles(&self) -> Result<()> {
        for role in Role::builtin() {
            if self.get_role(&role.name)?.is_none() {
                tracing::debug!(role = %role.name, "Seeding built-in role");
                self.put_role(&role)?;
            }
        }
        Ok(())
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_value<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(&cf, key, Self::serialize(value)?)?;
        Ok(())
    }

    fn delete_value(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        if self.db.get_pinned_cf(&cf, key)?.is_none() {
            return Ok(false);
        }
        self.db.delete_cf(&cf, key)?;
        Ok(true)
    }

    fn list_values<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(Self::deserialize(&value)?);
        }
        Ok(values)
    }

    fn read_counter(&self, key: &[u8]) -> Result<u64> {
        let cf = self.cf(cf::META)?;
        Ok(self
            .db
            .get_cf(&cf, key)?
            .and_then(|bytes| keys::decode_u64(&bytes))
            .unwrap_or(1))
    }

    /// Stage the replacement of stored nodes by `nodes` into `batch`.
    ///
    /// Index entries of the previous versions are removed before any new
    /// entry is written, so a MAC or tag moving between two nodes of the same
    /// batch ends up pointing at its new owner.
    fn stage_nodes(&self, batch: &mut WriteBatch, nodes: &[Node]) -> Result<()> {
        let cf_nodes = self.cf(cf::NODES)?;
        let cf_by_tag = self.cf(cf::NODES_BY_TAG)?;
        let cf_by_mac = self.cf(cf::NODES_BY_MAC)?;

        for node in nodes {
            if let Some(old) = self.get_node(&node.name)? {
                for tag in &old.tags {
                    batch.delete_cf(&cf_by_tag, keys::tag_node_key(tag, &old.name)?);
                }
                for mac in old.macs() {
                    batch.delete_cf(&cf_by_mac, keys::mac_key(&mac));
                }
            }
        }

        for node in nodes {
            batch.put_cf(&cf_nodes, keys::name_key(&node.name), Self::serialize(node)?);
            for tag in &node.tags {
                batch.put_cf(&cf_by_tag, keys::tag_node_key(tag, &node.name)?, []);
            }
            for mac in node.macs() {
                batch.put_cf(&cf_by_mac, keys::mac_key(&mac), node.name.as_bytes());
            }
        }
        Ok(())
    }

    fn scan_tag_prefix(&self, prefix: &[u8]) -> Result<BTreeSet<String>> {
        let cf = self.cf(cf::NODES_BY_TAG)?;
        let mut names = BTreeSet::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item?;

            // Stop if we're past the prefix
            if !key.starts_with(prefix) {
                break;
            }

            if let Some((_, name)) = keys::split_tag_node_key(&key) {
                names.insert(name.to_string());
            }
        }
        Ok(names)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Node Operations
    // =========================================================================

    fn put_nodes(&self, nodes: &[Node]) -> Result<Vec<Node>> {
        let _guard = self.write_lock.lock();
        let cf_meta = self.cf(cf::META)?;

        let mut next_id = self.read_counter(meta::NEXT_NODE_ID)?;
        let mut stored = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mut node = node.clone();
            if let Some(old) = self.get_node(&node.name)? {
                node.id = old.id;
                node.uid = old.uid;
            } else {
                node.id = next_id;
                next_id += 1;
            }
            stored.push(node);
        }

        let mut batch = WriteBatch::default();
        self.stage_nodes(&mut batch, &stored)?;
        batch.put_cf(&cf_meta, meta::NEXT_NODE_ID, next_id.to_be_bytes());
        self.db.write(batch)?;

        tracing::debug!(count = stored.len(), "Stored nodes");
        Ok(stored)
    }

    fn get_node(&self, name: &str) -> Result<Option<Node>> {
        self.get_value(cf::NODES, &keys::name_key(name))
    }

    fn get_nodes(&self, names: &[String]) -> Result<Vec<Node>> {
        let mut nodes = Vec::with_capacity(names.len());
        for name in names {
            if let Some(node) = self.get_node(name)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn has_node(&self, name: &str) -> Result<bool> {
        let cf = self.cf(cf::NODES)?;
        Ok(self.db.get_pinned_cf(&cf, keys::name_key(name))?.is_some())
    }

    fn delete_nodes(&self, names: &[String]) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let cf_nodes = self.cf(cf::NODES)?;
        let cf_by_tag = self.cf(cf::NODES_BY_TAG)?;
        let cf_by_mac = self.cf(cf::NODES_BY_MAC)?;

        let mut batch = WriteBatch::default();
        let mut removed = 0;
        let unique: BTreeSet<&String> = names.iter().collect();
        for name in unique {
            let Some(node) = self.get_node(name)? else {
                continue;
            };
            batch.delete_cf(&cf_nodes, keys::name_key(&node.name));
            for tag in &node.tags {
                batch.delete_cf(&cf_by_tag, keys::tag_node_key(tag, &node.name)?);
            }
            for mac in node.macs() {
                batch.delete_cf(&cf_by_mac, keys::mac_key(&mac));
            }
            removed += 1;
        }

        self.db.write(batch)?;
        Ok(removed)
    }

    fn list_nodes(&self) -> Result<Vec<Node>> {
        self.list_values(cf::NODES)
    }

    fn node_names(&self) -> Result<BTreeSet<String>> {
        let cf = self.cf(cf::NODES)?;
        let mut names = BTreeSet::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            let name = String::from_utf8(key.into_vec())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            names.insert(name);
        }
        Ok(names)
    }

    fn nodes_with_tag(&self, tag: &str) -> Result<BTreeSet<String>> {
        self.scan_tag_prefix(&keys::tag_prefix(tag)?)
    }

    fn all_tags(&self) -> Result<BTreeSet<String>> {
        let cf = self.cf(cf::NODES_BY_TAG)?;
        let mut tags = BTreeSet::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            if let Some((tag, _)) = keys::split_tag_node_key(&key) {
                if !tags.contains(tag) {
                    tags.insert(tag.to_string());
                }
            }
        }
        Ok(tags)
    }

    fn node_name_by_mac(&self, mac: &MacAddr) -> Result<Option<String>> {
        let cf = self.cf(cf::NODES_BY_MAC)?;
        self.db
            .get_cf(&cf, keys::mac_key(mac))?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .transpose()
    }

    // =========================================================================
    // Image Operations
    // =========================================================================

    fn put_images(&self, images: &[BootImage]) -> Result<()> {
        let cf = self.cf(cf::IMAGES)?;
        let mut batch = WriteBatch::default();
        for image in images {
            batch.put_cf(&cf, keys::name_key(&image.name), Self::serialize(image)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn get_image(&self, name: &str) -> Result<Option<BootImage>> {
        self.get_value(cf::IMAGES, &keys::name_key(name))
    }

    fn delete_images(&self, names: &[String]) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let cf = self.cf(cf::IMAGES)?;
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        let unique: BTreeSet<&String> = names.iter().collect();
        for name in unique {
            let key = keys::name_key(name);
            if self.db.get_pinned_cf(&cf, &key)?.is_some() {
                batch.delete_cf(&cf, key);
                removed += 1;
            }
        }
        self.db.write(batch)?;
        Ok(removed)
    }

    fn list_images(&self) -> Result<Vec<BootImage>> {
        self.list_values(cf::IMAGES)
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    fn put_user(&self, user: &User) -> Result<()> {
        self.put_value(cf::USERS, &keys::name_key(&user.username), user)
    }

    fn get_user(&self, username: &str) -> Result<Option<User>> {
        self.get_value(cf::USERS, &keys::name_key(username))
    }

    fn delete_user(&self, username: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        self.delete_value(cf::USERS, &keys::name_key(username))
    }

    fn list_users(&self) -> Result<Vec<User>> {
        self.list_values(cf::USERS)
    }

    fn count_users(&self) -> Result<usize> {
        let cf = self.cf(cf::USERS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    // =========================================================================
    // Role Operations
    // =========================================================================

    fn put_role(&self, role: &Role) -> Result<()> {
        self.put_value(cf::ROLES, &keys::name_key(&role.name), role)
    }

    fn get_role(&self, name: &str) -> Result<Option<Role>> {
        self.get_value(cf::ROLES, &keys::name_key(name))
    }

    fn delete_role(&self, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        self.delete_value(cf::ROLES, &keys::name_key(name))
    }

    fn list_roles(&self) -> Result<Vec<Role>> {
        self.list_values(cf::ROLES)
    }

    // =========================================================================
    // Event Operations
    // =========================================================================

    fn append_event(&self, mut event: Event) -> Result<Event> {
        let _guard = self.write_lock.lock();
        let cf_events = self.cf(cf::EVENTS)?;
        let cf_meta = self.cf(cf::META)?;

        event.id = self.read_counter(meta::NEXT_EVENT_ID)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_events, keys::event_key(event.id), Self::serialize(&event)?);
        batch.put_cf(&cf_meta, meta::NEXT_EVENT_ID, (event.id + 1).to_be_bytes());
        self.db.write(batch)?;

        Ok(event)
    }

    fn list_events(&self, limit: usize) -> Result<Vec<Event>> {
        let cf = self.cf(cf::EVENTS)?;
        let mut events = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::End).take(limit) {
            let (_, value) = item?;
            events.push(Self::deserialize(&value)?);
        }
        Ok(events)
    }

    // =========================================================================
    // Dump / Restore
    // =========================================================================

    fn dump(&self) -> Result<DataDump> {
        Ok(DataDump {
            hosts: self.list_nodes()?,
            images: self.list_images()?,
            users: self.list_users()?,
        })
    }

    fn restore(&self, dump: &DataDump) -> Result<()> {
        let _guard = self.write_lock.lock();
        let cf_images = self.cf(cf::IMAGES)?;
        let cf_users = self.cf(cf::USERS)?;
        let cf_meta = self.cf(cf::META)?;

        // Last occurrence of a name wins.
        let hosts: BTreeMap<&str, &Node> =
            dump.hosts.iter().map(|n| (n.name.as_str(), n)).collect();
        let hosts: Vec<Node> = hosts.into_values().cloned().collect();

        let mut batch = WriteBatch::default();
        self.stage_nodes(&mut batch, &hosts)?;
        for image in &dump.images {
            batch.put_cf(&cf_images, keys::name_key(&image.name), Self::serialize(image)?);
        }
        for user in &dump.users {
            batch.put_cf(&cf_users, keys::name_key(&user.username), Self::serialize(user)?);
        }

        let max_id = hosts.iter().map(|n| n.id).max().unwrap_or(0);
        let next_id = self.read_counter(meta::NEXT_NODE_ID)?.max(max_id + 1);
        batch.put_cf(&cf_meta, meta::NEXT_NODE_ID, next_id.to_be_bytes());

        self.db.write(batch)?;

        tracing::info!(
            hosts = hosts.len(),
            images = dump.images.len(),
            users = dump.users.len(),
            "Restored database dump"
        );
        Ok(())
    }
}
