//! Inventory mutations.
//!
//! Every mutation resolves its selector, computes the new records, then
//! commits them in one atomic `put_nodes` batch. `changed` counts only
//! records whose stored value differs afterwards; a selector that matches
//! nothing changes nothing.

use std::collections::{BTreeSet, HashMap, HashSet};

use grendel_core::MacAddr;
use grendel_store::{resolve, BootImage, DataDump, Node, Store};

use crate::error::{ControlError, Result};
use crate::events;
use crate::types::{
    AuthContext, ItemFailure, MutationResult, NodeSelector, TagAction, UpsertReport,
};

/// Resolve a selector to node names.
///
/// # Errors
///
/// Returns `ControlError::Validation` if neither expression is given or
/// either fails to parse.
pub fn resolve_selector<S: Store + ?Sized>(
    store: &S,
    selector: &NodeSelector,
) -> Result<Vec<String>> {
    Ok(resolve(store, selector.nodeset.as_deref(), selector.tags.as_deref())?)
}

/// The records of every node matching a selector, in name order.
///
/// # Errors
///
/// Returns a validation or storage error.
pub fn find_nodes<S: Store + ?Sized>(store: &S, selector: &NodeSelector) -> Result<Vec<Node>> {
    let names = resolve_selector(store, selector)?;
    Ok(store.get_nodes(&names)?)
}

/// Check a record name: non-empty, `[A-Za-z0-9._-]` only.
///
/// # Errors
///
/// Returns the rejection reason.
pub fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(format!("name contains invalid character {c:?}"));
    }
    Ok(())
}

/// Structural checks on a single node.
fn validate_node(node: &Node) -> std::result::Result<(), String> {
    validate_name(&node.name)?;

    if node.interfaces.iter().filter(|i| i.bmc).count() > 1 {
        return Err("more than one BMC interface".to_string());
    }

    let mut macs = HashSet::new();
    for mac in node.macs() {
        if !macs.insert(mac) {
            return Err(format!("MAC {mac} appears on more than one interface"));
        }
    }

    for bond in &node.bonds {
        if bond.peers.len() < 2 {
            return Err(format!("bond {} needs at least two peers", bond.ifname));
        }
        if let Some(peer) = bond.peers.iter().find(|p| node.interface(p).is_none()) {
            return Err(format!(
                "bond {} references unknown interface {peer}",
                bond.ifname
            ));
        }
    }

    for tag in &node.tags {
        validate_tag(tag)?;
    }
    Ok(())
}

fn validate_tag(tag: &str) -> std::result::Result<(), String> {
    if tag.is_empty() {
        return Err("tags must not be empty".to_string());
    }
    if tag.contains([',', '\0']) || tag.starts_with('!') {
        return Err(format!("invalid tag {tag:?}"));
    }
    Ok(())
}

/// Returns true if storing `incoming` over `existing` changes nothing.
///
/// Internal ids are ignored; the store keeps the existing ones.
fn same_record(existing: &Node, incoming: &Node) -> bool {
    let mut normalized = incoming.clone();
    normalized.id = existing.id;
    normalized.uid = existing.uid;
    normalized == *existing
}

/// Write the records that differ from what is stored.
fn commit<S: Store + ?Sized>(store: &S, nodes: Vec<Node>) -> Result<usize> {
    let mut changed = Vec::with_capacity(nodes.len());
    for node in nodes {
        let differs = store
            .get_node(&node.name)?
            .map_or(true, |existing| !same_record(&existing, &node));
        if differs {
            changed.push(node);
        }
    }
    if !changed.is_empty() {
        store.put_nodes(&changed)?;
    }
    Ok(changed.len())
}

/// A MAC of `node` owned by a stored node outside `batch`.
fn stored_mac_conflict<S: Store + ?Sized>(
    store: &S,
    node: &Node,
    batch: &HashSet<String>,
) -> Result<Option<String>> {
    for mac in node.macs() {
        if let Some(owner) = store.node_name_by_mac(&mac)? {
            if owner != node.name && !batch.contains(&owner) {
                return Ok(Some(format!("conflict: MAC {mac} belongs to {owner}")));
            }
        }
    }
    Ok(None)
}

/// Insert or replace nodes.
///
/// Items are validated individually. Rejections: invalid name or structure,
/// a name repeated within the batch (the later item), a MAC repeated within
/// the batch (the later item), or a MAC owned by a stored node that is not
/// among the accepted items. A MAC may move away from a stored node only if
/// that node's new record is accepted too, so rejecting one item can reject
/// another that took over its MAC.
///
/// # Errors
///
/// Returns a storage error; nothing is written then.
pub fn upsert_nodes<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    nodes: Vec<Node>,
) -> Result<UpsertReport> {
    let mut report = UpsertReport::default();
    let mut seen_names = HashSet::new();
    let mut batch_macs: HashMap<MacAddr, String> = HashMap::new();
    let mut candidates = Vec::with_capacity(nodes.len());

    for node in nodes {
        let checked = validate_node(&node).and_then(|()| {
            if seen_names.contains(&node.name) {
                return Err("conflict: name repeated in request".to_string());
            }
            if let Some((mac, owner)) = node
                .macs()
                .find_map(|mac| batch_macs.get(&mac).map(|owner| (mac, owner)))
            {
                return Err(format!("conflict: MAC {mac} also given for {owner}"));
            }
            Ok(())
        });

        match checked {
            Ok(()) => {
                seen_names.insert(node.name.clone());
                for mac in node.macs() {
                    batch_macs.insert(mac, node.name.clone());
                }
                candidates.push(node);
            }
            Err(reason) => report.failures.push(ItemFailure {
                name: node.name,
                reason,
            }),
        }
    }

    // Repeat until stable: each rejection may strand a MAC another item took.
    let mut accepted = candidates;
    loop {
        let mut kept = Vec::with_capacity(accepted.len());
        let mut rejected = 0;
        for node in accepted {
            match stored_mac_conflict(store, &node, &seen_names)? {
                Some(reason) => {
                    seen_names.remove(&node.name);
                    rejected += 1;
                    report.failures.push(ItemFailure {
                        name: node.name,
                        reason,
                    });
                }
                None => kept.push(node),
            }
        }
        accepted = kept;
        if rejected == 0 {
            break;
        }
    }

    report.accepted = accepted.len();
    report.changed = commit(store, accepted)?;

    for failure in &report.failures {
        tracing::warn!(node = %failure.name, reason = %failure.reason, "Rejected node");
    }
    if report.accepted > 0 {
        tracing::info!(
            accepted = report.accepted,
            changed = report.changed,
            rejected = report.failures.len(),
            "Upserted nodes"
        );
        events::info(
            store,
            actor,
            format!(
                "Upserted {} node(s), {} changed, {} rejected",
                report.accepted,
                report.changed,
                report.failures.len()
            ),
        );
    }
    Ok(report)
}

/// Delete every node matching a selector.
///
/// # Errors
///
/// Returns a validation or storage error.
pub fn delete_nodes<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    selector: &NodeSelector,
) -> Result<MutationResult> {
    let names = resolve_selector(store, selector)?;
    let changed = if names.is_empty() {
        0
    } else {
        store.delete_nodes(&names)?
    };

    tracing::info!(changed, "Deleted nodes");
    events::info(store, actor, format!("Deleted {changed} node(s)"));
    Ok(MutationResult::new(
        "Nodes deleted",
        format!("{changed} node(s) deleted"),
        changed,
    ))
}

/// Apply `edit` to every matching node and commit the result.
fn update_nodes<S, F>(store: &S, selector: &NodeSelector, mut edit: F) -> Result<usize>
where
    S: Store + ?Sized,
    F: FnMut(&mut Node),
{
    let nodes = find_nodes(store, selector)?
        .into_iter()
        .map(|mut node| {
            edit(&mut node);
            node
        })
        .collect();
    commit(store, nodes)
}

/// Set the provision flag of every matching node.
///
/// # Errors
///
/// Returns a validation or storage error.
pub fn set_provision<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    selector: &NodeSelector,
    provision: bool,
) -> Result<MutationResult> {
    let changed = update_nodes(store, selector, |node| node.provision = provision)?;

    tracing::info!(provision, changed, "Set provision flag");
    events::info(
        store,
        actor,
        format!("Set provision={provision} on {changed} node(s)"),
    );
    Ok(MutationResult::new(
        "Provision updated",
        format!("provision={provision} set on {changed} node(s)"),
        changed,
    ))
}

/// Assign a boot image to every matching node.
///
/// # Errors
///
/// Returns `ControlError::NotFound` if the image does not exist, or a
/// validation or storage error.
pub fn set_boot_image<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    selector: &NodeSelector,
    image: &str,
) -> Result<MutationResult> {
    if store.get_image(image)?.is_none() {
        return Err(ControlError::not_found("image", image));
    }

    let changed = update_nodes(store, selector, |node| {
        node.boot_image = Some(image.to_string());
    })?;

    tracing::info!(image, changed, "Set boot image");
    events::info(
        store,
        actor,
        format!("Set boot image {image} on {changed} node(s)"),
    );
    Ok(MutationResult::new(
        "Boot image updated",
        format!("image {image} set on {changed} node(s)"),
        changed,
    ))
}

/// Add or remove tags on every matching node.
///
/// Removing a tag a node does not carry leaves it unchanged.
///
/// # Errors
///
/// Returns `ControlError::Validation` for an empty or malformed tag list, or
/// a validation or storage error.
pub fn apply_tags<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    selector: &NodeSelector,
    action: TagAction,
    tags: &[String],
) -> Result<MutationResult> {
    if tags.is_empty() {
        return Err(ControlError::Validation("no tags given".to_string()));
    }
    for tag in tags {
        validate_tag(tag).map_err(ControlError::Validation)?;
    }
    let tags: BTreeSet<&String> = tags.iter().collect();

    let changed = update_nodes(store, selector, |node| match action {
        TagAction::Add => node.tags.extend(tags.iter().map(|t| (*t).clone())),
        TagAction::Remove => node.tags.retain(|t| !tags.contains(t)),
    })?;

    let verb = match action {
        TagAction::Add => "Added",
        TagAction::Remove => "Removed",
    };
    tracing::info!(?action, changed, "Updated tags");
    events::info(
        store,
        actor,
        format!("{verb} tags {tags:?} on {changed} node(s)"),
    );
    Ok(MutationResult::new(
        "Tags updated",
        format!("{verb} {} tag(s) on {changed} node(s)", tags.len()),
        changed,
    ))
}

// =========================================================================
// Images
// =========================================================================

/// Images by name, skipping unknown names.
///
/// # Errors
///
/// Returns a storage error.
pub fn find_images<S: Store + ?Sized>(store: &S, names: &[String]) -> Result<Vec<BootImage>> {
    let mut images = Vec::with_capacity(names.len());
    for name in names {
        if let Some(image) = store.get_image(name)? {
            images.push(image);
        }
    }
    Ok(images)
}

/// Merge an incoming image over the stored one.
///
/// `provision_templates` entries set to `None` delete the stored entry.
fn merge_image(existing: Option<&BootImage>, mut incoming: BootImage) -> BootImage {
    let mut templates = existing
        .map(|e| e.provision_templates.clone())
        .unwrap_or_default();
    for (name, path) in std::mem::take(&mut incoming.provision_templates) {
        match path {
            Some(path) => {
                templates.insert(name, Some(path));
            }
            None => {
                templates.remove(&name);
            }
        }
    }
    incoming.provision_templates = templates;
    incoming
}

/// Insert or replace boot images, validated per item.
///
/// # Errors
///
/// Returns a storage error; nothing is written then.
pub fn upsert_images<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    images: Vec<BootImage>,
) -> Result<UpsertReport> {
    let mut report = UpsertReport::default();
    let mut seen = HashSet::new();
    let mut changed = Vec::new();

    for image in images {
        let checked = validate_name(&image.name).and_then(|()| {
            if image.kernel.trim().is_empty() {
                Err("kernel is required".to_string())
            } else if seen.contains(&image.name) {
                Err("conflict: name repeated in request".to_string())
            } else {
                Ok(())
            }
        });
        if let Err(reason) = checked {
            tracing::warn!(image = %image.name, %reason, "Rejected image");
            report.failures.push(ItemFailure {
                name: image.name,
                reason,
            });
            continue;
        }

        seen.insert(image.name.clone());
        report.accepted += 1;
        let existing = store.get_image(&image.name)?;
        let merged = merge_image(existing.as_ref(), image);
        if existing.as_ref() != Some(&merged) {
            changed.push(merged);
        }
    }

    if !changed.is_empty() {
        store.put_images(&changed)?;
    }
    report.changed = changed.len();

    if report.accepted > 0 {
        tracing::info!(accepted = report.accepted, changed = report.changed, "Upserted images");
        events::info(
            store,
            actor,
            format!(
                "Upserted {} image(s), {} changed",
                report.accepted, report.changed
            ),
        );
    }
    Ok(report)
}

/// Delete images by name.
///
/// Nodes referencing a deleted image keep the dangling name.
///
/// # Errors
///
/// Returns a storage error.
pub fn delete_images<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    names: &[String],
) -> Result<MutationResult> {
    let changed = if names.is_empty() {
        0
    } else {
        store.delete_images(names)?
    };

    tracing::info!(changed, "Deleted images");
    events::info(store, actor, format!("Deleted {changed} image(s)"));
    Ok(MutationResult::new(
        "Images deleted",
        format!("{changed} image(s) deleted"),
        changed,
    ))
}

// =========================================================================
// Dump / Restore
// =========================================================================

/// MACs must stay unique across the dump's hosts and the stored nodes it
/// leaves in place.
fn check_dump_macs<S: Store + ?Sized>(store: &S, dump: &DataDump) -> Result<()> {
    let hosts: HashMap<&str, &Node> = dump.hosts.iter().map(|n| (n.name.as_str(), n)).collect();

    let mut owners: HashMap<MacAddr, &str> = HashMap::new();
    for (&name, node) in &hosts {
        for mac in node.macs() {
            if let Some(other) = owners.insert(mac, name).filter(|other| *other != name) {
                return Err(ControlError::Validation(format!(
                    "hosts {other} and {name} share MAC {mac}"
                )));
            }
        }
    }

    for (mac, name) in owners {
        if let Some(owner) = store.node_name_by_mac(&mac)? {
            if owner != name && !hosts.contains_key(owner.as_str()) {
                return Err(ControlError::Conflict(format!(
                    "host {name}: MAC {mac} belongs to {owner}"
                )));
            }
        }
    }
    Ok(())
}

/// Merge a dump into the current inventory in one atomic write.
///
/// Records in the dump replace stored records of the same name; other
/// stored records are kept. When a name appears twice the last record wins.
///
/// # Errors
///
/// Returns `ControlError::Validation` if a record name is invalid or two
/// hosts share a MAC, `ControlError::Conflict` if a host claims a MAC owned
/// by a stored node the dump does not replace, or a storage error; nothing
/// is written then.
pub fn restore<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    dump: &DataDump,
) -> Result<MutationResult> {
    for node in &dump.hosts {
        validate_node(node).map_err(|reason| {
            ControlError::Validation(format!("host {}: {reason}", node.name))
        })?;
    }
    for image in &dump.images {
        validate_name(&image.name).map_err(|reason| {
            ControlError::Validation(format!("image {}: {reason}", image.name))
        })?;
    }
    check_dump_macs(store, dump)?;

    store.restore(dump)?;

    let changed = dump.hosts.len() + dump.images.len() + dump.users.len();
    tracing::info!(
        hosts = dump.hosts.len(),
        images = dump.images.len(),
        users = dump.users.len(),
        "Restored database"
    );
    events::info(
        store,
        actor,
        format!(
            "Restored {} host(s), {} image(s), {} user(s)",
            dump.hosts.len(),
            dump.images.len(),
            dump.users.len()
        ),
    );
    Ok(MutationResult::new(
        "Database restored",
        format!("{changed} record(s) restored"),
        changed,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grendel_store::{Bond, NetInterface, RocksStore};
    use tempfile::TempDir;

    fn setup() -> (RocksStore, TempDir, AuthContext) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir, AuthContext::new("admin", "admin"))
    }

    fn iface(ifname: &str, mac: &str) -> NetInterface {
        NetInterface {
            ifname: ifname.to_string(),
            mac: Some(mac.parse().unwrap()),
            ip: None,
            fqdn: None,
            bmc: false,
            vlan: None,
            mtu: None,
        }
    }

    fn node(name: &str, tags: &[&str]) -> Node {
        let mut node = Node::new(name);
        node.tags = tags.iter().map(ToString::to_string).collect();
        node
    }

    fn image(name: &str) -> BootImage {
        BootImage {
            name: name.to_string(),
            kernel: "/images/rocky9/vmlinuz".to_string(),
            initrd: vec!["/images/rocky9/initrd.img".to_string()],
            liveimg: None,
            cmdline: Some("console=ttyS0".to_string()),
            verify: false,
            butane: None,
            user_data: None,
            provision_template: None,
            provision_templates: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn upsert_then_resolve_then_delete() {
        let (store, _dir, actor) = setup();
        let report = upsert_nodes(
            &store,
            &actor,
            vec![node("cpn-01", &["gpu"]), node("cpn-02", &[]), node("cpn-03", &["gpu"])],
        )
        .unwrap();
        assert_eq!(report.changed, 3);
        assert!(report.failures.is_empty());

        let gpu = find_nodes(&store, &NodeSelector::tags("gpu")).unwrap();
        let names: Vec<_> = gpu.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["cpn-01", "cpn-03"]);

        let deleted = delete_nodes(&store, &actor, &NodeSelector::nodeset("cpn-[01-02]")).unwrap();
        assert_eq!(deleted.changed, 2);
        assert_eq!(
            resolve_selector(&store, &NodeSelector::nodeset("cpn-[01-03]")).unwrap(),
            vec!["cpn-03".to_string()]
        );
    }

    #[test]
    fn upsert_same_record_changes_nothing() {
        let (store, _dir, actor) = setup();
        upsert_nodes(&store, &actor, vec![node("cpn-01", &["gpu"])]).unwrap();
        let stored = store.get_node("cpn-01").unwrap().unwrap();

        // A fresh uid in the payload does not count as a change.
        let report = upsert_nodes(&store, &actor, vec![node("cpn-01", &["gpu"])]).unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.changed, 0);
        assert_eq!(store.get_node("cpn-01").unwrap().unwrap().uid, stored.uid);
    }

    #[test]
    fn per_item_rejections() {
        let (store, _dir, actor) = setup();

        let mut owner = node("cpn-01", &[]);
        owner.interfaces.push(iface("eno1", "aa:bb:cc:00:00:01"));
        upsert_nodes(&store, &actor, vec![owner]).unwrap();

        let mut stolen = node("cpn-02", &[]);
        stolen.interfaces.push(iface("eno1", "aa:bb:cc:00:00:01"));

        let mut two_bmcs = node("cpn-03", &[]);
        two_bmcs.interfaces.push(NetInterface { bmc: true, ..iface("bmc0", "aa:bb:cc:00:00:03") });
        two_bmcs.interfaces.push(NetInterface { bmc: true, ..iface("bmc1", "aa:bb:cc:00:00:04") });

        let mut bad_bond = node("cpn-04", &[]);
        bad_bond.interfaces.push(iface("eno1", "aa:bb:cc:00:00:05"));
        bad_bond.bonds.push(Bond {
            ifname: "bond0".to_string(),
            peers: vec!["eno1".to_string(), "eno2".to_string()],
            ip: None,
            fqdn: None,
            mtu: None,
        });

        let report = upsert_nodes(
            &store,
            &actor,
            vec![
                stolen,
                two_bmcs,
                bad_bond,
                node("bad name", &[]),
                node("cpn-05", &[]),
                node("cpn-05", &["dup"]),
            ],
        )
        .unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.changed, 1);
        let rejected: Vec<_> = report.failures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(rejected, ["cpn-03", "cpn-04", "bad name", "cpn-05", "cpn-02"]);
        assert!(report.failures[4].reason.contains("belongs to cpn-01"));

        // The first cpn-05 won; the rejected duplicate did not overwrite it.
        assert!(store.get_node("cpn-05").unwrap().unwrap().tags.is_empty());
        assert!(store.get_node("cpn-02").unwrap().is_none());
    }

    #[test]
    fn mac_may_move_between_nodes_in_one_batch() {
        let (store, _dir, actor) = setup();
        let mut first = node("cpn-01", &[]);
        first.interfaces.push(iface("eno1", "aa:bb:cc:00:00:01"));
        upsert_nodes(&store, &actor, vec![first]).unwrap();

        let mut second = node("cpn-02", &[]);
        second.interfaces.push(iface("eno1", "aa:bb:cc:00:00:01"));
        let report = upsert_nodes(&store, &actor, vec![node("cpn-01", &[]), second]).unwrap();

        assert!(report.failures.is_empty());
        let mac: MacAddr = "aa:bb:cc:00:00:01".parse().unwrap();
        assert_eq!(
            store.node_name_by_mac(&mac).unwrap().as_deref(),
            Some("cpn-02")
        );
    }

    #[test]
    fn rejected_owner_keeps_its_mac() {
        let (store, _dir, actor) = setup();
        let mut a = node("cpn-01", &[]);
        a.interfaces.push(iface("eno1", "aa:bb:cc:00:00:01"));
        let mut b = node("cpn-02", &[]);
        b.interfaces.push(iface("eno1", "aa:bb:cc:00:00:02"));
        let mut d = node("cpn-04", &[]);
        d.interfaces.push(iface("eno1", "aa:bb:cc:00:00:03"));
        upsert_nodes(&store, &actor, vec![a, b, d]).unwrap();

        // cpn-01 takes cpn-02's MAC, but cpn-02 is rejected for taking
        // cpn-04's, so cpn-01 must be rejected as well.
        let mut a = node("cpn-01", &[]);
        a.interfaces.push(iface("eno1", "aa:bb:cc:00:00:02"));
        let mut b = node("cpn-02", &[]);
        b.interfaces.push(iface("eno1", "aa:bb:cc:00:00:03"));
        let report = upsert_nodes(&store, &actor, vec![a, b]).unwrap();

        assert_eq!(report.accepted, 0);
        let rejected: BTreeSet<_> = report.failures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(rejected, BTreeSet::from(["cpn-01", "cpn-02"]));

        for (name, mac) in [
            ("cpn-01", "aa:bb:cc:00:00:01"),
            ("cpn-02", "aa:bb:cc:00:00:02"),
            ("cpn-04", "aa:bb:cc:00:00:03"),
        ] {
            let mac: MacAddr = mac.parse().unwrap();
            assert_eq!(store.node_name_by_mac(&mac).unwrap().as_deref(), Some(name));
            let stored = store.get_node(name).unwrap().unwrap();
            assert_eq!(stored.macs().collect::<Vec<_>>(), vec![mac]);
        }
    }

    #[test]
    fn macs_may_swap_within_one_batch() {
        let (store, _dir, actor) = setup();
        let mut a = node("cpn-01", &[]);
        a.interfaces.push(iface("eno1", "aa:bb:cc:00:00:01"));
        let mut b = node("cpn-02", &[]);
        b.interfaces.push(iface("eno1", "aa:bb:cc:00:00:02"));
        upsert_nodes(&store, &actor, vec![a, b]).unwrap();

        let mut a = node("cpn-01", &[]);
        a.interfaces.push(iface("eno1", "aa:bb:cc:00:00:02"));
        let mut b = node("cpn-02", &[]);
        b.interfaces.push(iface("eno1", "aa:bb:cc:00:00:01"));
        let mut c = node("cpn-03", &[]);
        c.interfaces.push(iface("eno1", "aa:bb:cc:00:00:02"));
        let report = upsert_nodes(&store, &actor, vec![a, b, c]).unwrap();

        assert_eq!(report.accepted, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "cpn-03");
        let mac: MacAddr = "aa:bb:cc:00:00:02".parse().unwrap();
        assert_eq!(store.node_name_by_mac(&mac).unwrap().as_deref(), Some("cpn-01"));
    }

    #[test]
    fn removing_absent_tag_is_a_noop() {
        let (store, _dir, actor) = setup();
        upsert_nodes(&store, &actor, vec![node("cpn-01", &["gpu"]), node("cpn-02", &[])]).unwrap();
        let before = store.get_node("cpn-02").unwrap().unwrap();

        let result = apply_tags(
            &store,
            &actor,
            &NodeSelector::nodeset("cpn-02"),
            TagAction::Remove,
            &["gpu".to_string()],
        )
        .unwrap();

        assert_eq!(result.changed, 0);
        assert_eq!(store.get_node("cpn-02").unwrap().unwrap(), before);
    }

    #[test]
    fn add_and_remove_tags_update_index() {
        let (store, _dir, actor) = setup();
        upsert_nodes(&store, &actor, vec![node("cpn-01", &[]), node("cpn-02", &["gpu"])]).unwrap();

        let added = apply_tags(
            &store,
            &actor,
            &NodeSelector::nodeset("cpn-[01-02]"),
            TagAction::Add,
            &["gpu".to_string(), "rack=d13".to_string()],
        )
        .unwrap();
        assert_eq!(added.changed, 2);
        assert_eq!(store.nodes_with_tag("gpu").unwrap().len(), 2);

        let removed = apply_tags(
            &store,
            &actor,
            &NodeSelector::tags("rack="),
            TagAction::Remove,
            &["gpu".to_string()],
        )
        .unwrap();
        assert_eq!(removed.changed, 2);
        assert!(store.nodes_with_tag("gpu").unwrap().is_empty());

        assert!(matches!(
            apply_tags(&store, &actor, &NodeSelector::nodeset("cpn-01"), TagAction::Add, &[]),
            Err(ControlError::Validation(_))
        ));
    }

    #[test]
    fn empty_selection_changes_nothing() {
        let (store, _dir, actor) = setup();
        let result =
            set_provision(&store, &actor, &NodeSelector::nodeset("nothing-[1-5]"), true).unwrap();
        assert_eq!(result.changed, 0);

        assert!(matches!(
            set_provision(&store, &actor, &NodeSelector::default(), true),
            Err(ControlError::Validation(_))
        ));
    }

    #[test]
    fn provision_counts_only_changed_nodes() {
        let (store, _dir, actor) = setup();
        let mut ready = node("cpn-01", &[]);
        ready.provision = true;
        upsert_nodes(&store, &actor, vec![ready, node("cpn-02", &[])]).unwrap();

        let result =
            set_provision(&store, &actor, &NodeSelector::nodeset("cpn-[01-02]"), true).unwrap();
        assert_eq!(result.changed, 1);
        assert!(store.get_node("cpn-02").unwrap().unwrap().provision);
    }

    #[test]
    fn boot_image_must_exist() {
        let (store, _dir, actor) = setup();
        upsert_nodes(&store, &actor, vec![node("cpn-01", &[])]).unwrap();
        let selector = NodeSelector::nodeset("cpn-01");

        assert!(matches!(
            set_boot_image(&store, &actor, &selector, "rocky9"),
            Err(ControlError::NotFound { kind: "image", .. })
        ));

        upsert_images(&store, &actor, vec![image("rocky9")]).unwrap();
        let result = set_boot_image(&store, &actor, &selector, "rocky9").unwrap();
        assert_eq!(result.changed, 1);
        assert_eq!(
            store.get_node("cpn-01").unwrap().unwrap().boot_image.as_deref(),
            Some("rocky9")
        );
    }

    #[test]
    fn image_templates_merge_with_tombstones() {
        let (store, _dir, actor) = setup();
        let mut first = image("rocky9");
        first
            .provision_templates
            .insert("kickstart".to_string(), Some("ks.cfg".to_string()));
        first
            .provision_templates
            .insert("post".to_string(), Some("post.sh".to_string()));
        upsert_images(&store, &actor, vec![first]).unwrap();

        let mut update = image("rocky9");
        update.provision_templates.insert("post".to_string(), None);
        update
            .provision_templates
            .insert("user-data".to_string(), Some("cloud.yaml".to_string()));
        let report = upsert_images(&store, &actor, vec![update]).unwrap();
        assert_eq!(report.changed, 1);

        let stored = store.get_image("rocky9").unwrap().unwrap();
        let names: Vec<_> = stored.provision_templates.keys().map(String::as_str).collect();
        assert_eq!(names, ["kickstart", "user-data"]);
        assert!(stored.provision_templates.values().all(Option::is_some));
    }

    #[test]
    fn image_without_kernel_is_rejected() {
        let (store, _dir, actor) = setup();
        let mut bad = image("empty");
        bad.kernel = String::new();

        let report = upsert_images(&store, &actor, vec![bad, image("rocky9")]).unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.failures[0].name, "empty");
        assert_eq!(
            find_images(&store, &["rocky9".to_string(), "empty".to_string()])
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn dump_then_restore_is_identity() {
        let (store, _dir, actor) = setup();
        let mut tagged = node("cpn-01", &["gpu", "rack=d13"]);
        tagged.interfaces.push(iface("eno1", "aa:bb:cc:00:00:01"));
        upsert_nodes(&store, &actor, vec![tagged, node("cpn-02", &[])]).unwrap();
        upsert_images(&store, &actor, vec![image("rocky9")]).unwrap();
        let dump = store.dump().unwrap();

        let other_dir = TempDir::new().unwrap();
        let other = RocksStore::open(other_dir.path()).unwrap();
        let result = restore(&other, &actor, &dump).unwrap();

        assert_eq!(result.changed, 3);
        assert_eq!(other.dump().unwrap(), dump);
        assert_eq!(
            resolve_selector(&other, &NodeSelector::tags("gpu")).unwrap(),
            vec!["cpn-01".to_string()]
        );
    }

    #[test]
    fn restore_keeps_macs_unique() {
        let (store, _dir, actor) = setup();
        let mut kept = node("cpn-09", &[]);
        kept.interfaces.push(iface("eno1", "aa:bb:cc:00:00:09"));
        upsert_nodes(&store, &actor, vec![kept]).unwrap();
        let before = store.dump().unwrap();

        let mut first = node("cpn-01", &[]);
        first.interfaces.push(iface("eno1", "aa:bb:cc:00:00:01"));
        let mut second = node("cpn-02", &[]);
        second.interfaces.push(iface("eno1", "aa:bb:cc:00:00:01"));
        let shared = DataDump {
            hosts: vec![first.clone(), second],
            images: Vec::new(),
            users: Vec::new(),
        };
        assert!(matches!(
            restore(&store, &actor, &shared),
            Err(ControlError::Validation(_))
        ));

        let mut thief = node("cpn-02", &[]);
        thief.interfaces.push(iface("eno1", "aa:bb:cc:00:00:09"));
        let stolen = DataDump {
            hosts: vec![first, thief],
            images: Vec::new(),
            users: Vec::new(),
        };
        assert!(matches!(
            restore(&store, &actor, &stolen),
            Err(ControlError::Conflict(_))
        ));
        assert_eq!(store.dump().unwrap(), before);

        // A dump that replaces the owner may move its MAC.
        let mut moved = node("cpn-09", &[]);
        moved.interfaces.push(iface("eno1", "aa:bb:cc:00:00:10"));
        let mut taker = node("cpn-02", &[]);
        taker.interfaces.push(iface("eno1", "aa:bb:cc:00:00:09"));
        let swap = DataDump {
            hosts: vec![moved, taker],
            images: Vec::new(),
            users: Vec::new(),
        };
        restore(&store, &actor, &swap).unwrap();
        let mac: MacAddr = "aa:bb:cc:00:00:09".parse().unwrap();
        assert_eq!(store.node_name_by_mac(&mac).unwrap().as_deref(), Some("cpn-02"));
    }
}
