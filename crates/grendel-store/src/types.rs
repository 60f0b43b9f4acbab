//! Domain types stored in the database.
//!
//! These types represent the persisted state of nodes, boot images, users,
//! roles and audit events. The same types are exchanged over the API and in
//! database dumps, so field names follow the wire contract.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use grendel_core::{MacAddr, NodeUid};
use serde::{Deserialize, Serialize};

/// A managed machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Internal numeric id, assigned on first insert. Zero means unassigned.
    #[serde(default)]
    pub id: u64,
    /// Stable external identifier.
    #[serde(default = "NodeUid::generate")]
    pub uid: NodeUid,
    /// Unique node name.
    pub name: String,
    /// Whether the node should be (re)imaged on next boot.
    #[serde(default)]
    pub provision: bool,
    /// Name of the assigned boot image (weak reference).
    #[serde(default)]
    pub boot_image: Option<String>,
    /// Network interfaces in declaration order.
    #[serde(default)]
    pub interfaces: Vec<NetInterface>,
    /// Bonded interfaces.
    #[serde(default)]
    pub bonds: Vec<Bond>,
    /// Free-form tags, bare keys or `key=value` / `namespace:key=value`.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Firmware version string reported for the node.
    #[serde(default)]
    pub firmware: Option<String>,
    /// CPU architecture.
    #[serde(default)]
    pub arch: Option<String>,
}

impl Node {
    /// Create a node with the given name and no interfaces.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            uid: NodeUid::generate(),
            name: name.into(),
            provision: false,
            boot_image: None,
            interfaces: Vec::new(),
            bonds: Vec::new(),
            tags: BTreeSet::new(),
            firmware: None,
            arch: None,
        }
    }

    /// The interface flagged as the node's BMC, if any.
    #[must_use]
    pub fn bmc_interface(&self) -> Option<&NetInterface> {
        self.interfaces.iter().find(|i| i.bmc)
    }

    /// Look up an interface by name.
    #[must_use]
    pub fn interface(&self, ifname: &str) -> Option<&NetInterface> {
        self.interfaces.iter().find(|i| i.ifname == ifname)
    }

    /// All MAC addresses declared on the node's interfaces.
    pub fn macs(&self) -> impl Iterator<Item = MacAddr> + '_ {
        self.interfaces.iter().filter_map(|i| i.mac)
    }
}

/// A physical network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetInterface {
    /// Interface name, e.g. `eno1`.
    #[serde(default)]
    pub ifname: String,
    /// Hardware address.
    #[serde(default)]
    pub mac: Option<MacAddr>,
    /// Address in `addr[/prefix]` form.
    #[serde(default)]
    pub ip: Option<String>,
    /// Fully qualified domain name.
    #[serde(default)]
    pub fqdn: Option<String>,
    /// Whether this interface is the node's BMC.
    #[serde(default)]
    pub bmc: bool,
    /// VLAN tag.
    #[serde(default)]
    pub vlan: Option<String>,
    /// MTU override.
    #[serde(default)]
    pub mtu: Option<u16>,
}

impl NetInterface {
    /// The host part of `ip`, without any prefix length.
    #[must_use]
    pub fn addr(&self) -> Option<&str> {
        self.ip
            .as_deref()
            .map(|ip| ip.split_once('/').map_or(ip, |(addr, _)| addr))
    }

    /// The preferred way to reach this interface: FQDN, else address.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.fqdn
            .as_deref()
            .filter(|f| !f.is_empty())
            .or_else(|| self.addr())
    }
}

/// An aggregated interface over two or more physical interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    /// Bond interface name, e.g. `bond0`.
    pub ifname: String,
    /// Names of the member interfaces.
    pub peers: Vec<String>,
    /// Address in `addr[/prefix]` form.
    #[serde(default)]
    pub ip: Option<String>,
    /// Fully qualified domain name.
    #[serde(default)]
    pub fqdn: Option<String>,
    /// MTU override.
    #[serde(default)]
    pub mtu: Option<u16>,
}

/// A provisionable OS image definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootImage {
    /// Unique image name.
    pub name: String,
    /// Path to the kernel.
    pub kernel: String,
    /// Ordered initrd paths.
    #[serde(default)]
    pub initrd: Vec<String>,
    /// Optional live image path.
    #[serde(default)]
    pub liveimg: Option<String>,
    /// Kernel command line template.
    #[serde(default)]
    pub cmdline: Option<String>,
    /// Whether the kernel signature should be verified.
    #[serde(default)]
    pub verify: bool,
    /// Butane/ignition template reference.
    #[serde(default)]
    pub butane: Option<String>,
    /// Cloud-init user data.
    #[serde(default)]
    pub user_data: Option<String>,
    /// Default provisioning template.
    #[serde(default)]
    pub provision_template: Option<String>,
    /// Named provisioning templates. `None` marks an entry for deletion.
    #[serde(default)]
    pub provision_templates: BTreeMap<String, Option<String>>,
}

/// An API user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user name.
    pub username: String,
    /// Argon2 PHC password hash.
    pub hash: String,
    /// Name of the user's role.
    pub role: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub modified_at: DateTime<Utc>,
}

/// A single allowed (method, path) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// HTTP method, or `*` for any.
    pub method: String,
    /// Request path, optionally ending in `*` for a prefix match.
    pub path: String,
}

impl Permission {
    /// Create a new permission.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }
}

/// A named set of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role name.
    pub name: String,
    /// Granted permissions.
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// Name of the built-in administrator role.
pub const ROLE_ADMIN: &str = "admin";
/// Name of the built-in read-only role.
pub const ROLE_USER: &str = "user";
/// Name of the built-in role without any permission.
pub const ROLE_DISABLED: &str = "disabled";

impl Role {
    /// The roles seeded into every new database.
    #[must_use]
    pub fn builtin() -> Vec<Self> {
        vec![
            Self {
                name: ROLE_ADMIN.to_string(),
                permissions: vec![Permission::new("*", "*")],
            },
            Self {
                name: ROLE_USER.to_string(),
                permissions: vec![
                    Permission::new("GET", "/v1/*"),
                    Permission::new("POST", "/v1/auth/signout"),
                    Permission::new("PATCH", "/v1/auth/reset"),
                ],
            },
            Self {
                name: ROLE_DISABLED.to_string(),
                permissions: vec![Permission::new("POST", "/v1/auth/signout")],
            },
        ]
    }

    /// Returns true if this is one of the seeded roles.
    #[must_use]
    pub fn is_builtin(name: &str) -> bool {
        matches!(name, ROLE_ADMIN | ROLE_USER | ROLE_DISABLED)
    }
}

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational, e.g. an inventory change.
    Info,
    /// Every node of a batch succeeded.
    Success,
    /// Some nodes were skipped, none failed.
    Warning,
    /// At least one node failed.
    Error,
}

/// Per-node outcome status in a [`JobMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The operation succeeded on the node.
    Success,
    /// The operation failed on the node.
    Error,
    /// The operation was not attempted on the node.
    Skipped,
}

/// The outcome of one node in a fan-out operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    /// Outcome status.
    pub status: JobStatus,
    /// Node name.
    pub host: String,
    /// Human-readable outcome.
    pub msg: String,
    /// Raw vendor error payload, when the BMC returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redfish_error: Option<serde_json::Value>,
    /// Number of dispatch attempts made.
    #[serde(default)]
    pub attempts: u32,
}

/// An append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    /// Monotonic id, assigned by the store on append.
    #[serde(default)]
    pub id: u64,
    /// When the event was recorded.
    pub time: DateTime<Utc>,
    /// Worst outcome of the operation.
    pub severity: Severity,
    /// Acting user.
    pub user: String,
    /// Summary of the operation.
    pub message: String,
    /// Per-node outcomes for fan-out operations.
    #[serde(default)]
    pub job_messages: Vec<JobMessage>,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn now(severity: Severity, user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            time: Utc::now(),
            severity,
            user: user.into(),
            message: message.into(),
            job_messages: Vec::new(),
        }
    }

    /// Attach per-node outcomes.
    #[must_use]
    pub fn with_job_messages(mut self, job_messages: Vec<JobMessage>) -> Self {
        self.job_messages = job_messages;
        self
    }
}

/// A full snapshot of the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataDump {
    /// All nodes.
    #[serde(default)]
    pub hosts: Vec<Node>,
    /// All boot images.
    #[serde(default)]
    pub images: Vec<BootImage>,
    /// All users, including password hashes.
    #[serde(default)]
    pub users: Vec<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_defaults_from_json() {
        let node: Node = serde_json::from_str(r#"{"name":"cpn-01"}"#).unwrap();
        assert_eq!(node.id, 0);
        assert!(!node.provision);
        assert!(node.interfaces.is_empty());
        assert!(node.tags.is_empty());
    }

    #[test]
    fn interface_host_prefers_fqdn() {
        let mut iface = NetInterface {
            ifname: "bmc".to_string(),
            mac: None,
            ip: Some("10.0.0.5/24".to_string()),
            fqdn: None,
            bmc: true,
            vlan: None,
            mtu: None,
        };
        assert_eq!(iface.addr(), Some("10.0.0.5"));
        assert_eq!(iface.host(), Some("10.0.0.5"));

        iface.fqdn = Some("cpn-01-bmc.example".to_string());
        assert_eq!(iface.host(), Some("cpn-01-bmc.example"));
    }

    #[test]
    fn dump_uses_pascal_case() {
        let json = serde_json::to_value(DataDump::default()).unwrap();
        assert!(json.get("Hosts").is_some());
        assert!(json.get("Images").is_some());
        assert!(json.get("Users").is_some());
    }

    #[test]
    fn severity_orders_by_badness() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Success);
    }
}
