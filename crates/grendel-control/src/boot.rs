//! Boot tokens and iPXE scripts.
//!
//! A boot token is bound to one node interface and is accepted once. The
//! node's firmware presents it to fetch its iPXE script, built from the
//! node's boot image.

use std::fmt::Write as _;

use grendel_auth::BootTokenSigner;
use grendel_store::{BootImage, Node, Store};

use crate::error::{ControlError, Result};
use crate::inventory;
use crate::template::{self, Vars};
use crate::types::{BootTokenResult, NodeSelector};

/// Issue one token per matching node for the interface `ifname`.
///
/// Nodes without that interface, or without a MAC on it, get a per-node
/// error instead of a token.
///
/// # Errors
///
/// Returns `ControlError::EmptyNodeSet` if nothing matches, or a validation,
/// signing or storage error.
pub fn issue_tokens<S: Store + ?Sized>(
    store: &S,
    signer: &BootTokenSigner,
    selector: &NodeSelector,
    ifname: &str,
) -> Result<Vec<BootTokenResult>> {
    let nodes = inventory::find_nodes(store, selector)?;
    if nodes.is_empty() {
        return Err(ControlError::EmptyNodeSet);
    }

    let mut results = Vec::with_capacity(nodes.len());
    for node in nodes {
        let mac = node.interface(ifname).and_then(|i| i.mac);
        let result = match mac {
            Some(mac) => BootTokenResult {
                token: Some(signer.issue(
                    &node.uid.to_string(),
                    &node.name,
                    ifname,
                    &mac.to_string(),
                )?),
                error: None,
                name: node.name,
            },
            None => {
                let reason = if node.interface(ifname).is_some() {
                    format!("interface {ifname} has no MAC address")
                } else {
                    format!("no interface named {ifname}")
                };
                tracing::warn!(node = %node.name, %reason, "No boot token issued");
                BootTokenResult {
                    token: None,
                    error: Some(reason),
                    name: node.name,
                }
            }
        };
        results.push(result);
    }

    tracing::info!(
        interface = ifname,
        issued = results.iter().filter(|r| r.token.is_some()).count(),
        "Issued boot tokens"
    );
    Ok(results)
}

/// Consume a boot token and render the node's iPXE script.
///
/// Nodes not marked for provisioning get a script that exits to the next
/// boot device.
///
/// # Errors
///
/// Returns `ControlError::Auth` for an invalid, expired or reused token,
/// `ControlError::Unauthorized` if the token no longer matches the node,
/// and `ControlError::NotFound` if the node or its image is gone.
pub fn ipxe_script<S: Store + ?Sized>(
    store: &S,
    signer: &BootTokenSigner,
    token: &str,
    base_url: Option<&str>,
) -> Result<String> {
    let claims = signer.consume(token)?;

    let node = store
        .get_node(&claims.name)?
        .ok_or_else(|| ControlError::not_found("node", &claims.name))?;
    let mac_matches = node
        .interface(&claims.iface)
        .and_then(|i| i.mac)
        .is_some_and(|mac| mac.to_string() == claims.mac);
    if node.uid.to_string() != claims.sub || !mac_matches {
        return Err(ControlError::Unauthorized(format!(
            "boot token does not match node {}",
            node.name
        )));
    }

    if !node.provision {
        tracing::info!(node = %node.name, "Node not marked for provisioning");
        return Ok(format!(
            "#!ipxe\necho {} is not marked for provisioning\nexit\n",
            node.name
        ));
    }

    let image_name = node.boot_image.as_deref().ok_or_else(|| {
        ControlError::not_found("image", format!("(none assigned to {})", node.name))
    })?;
    let image = store
        .get_image(image_name)?
        .ok_or_else(|| ControlError::not_found("image", image_name))?;

    let mut vars = Vars::for_node(&node);
    vars.set("mac", claims.mac.clone());
    vars.set("iface", claims.iface.clone());

    tracing::info!(node = %node.name, image = %image.name, "Serving iPXE script");
    Ok(render_ipxe(&node, &image, &vars, base_url))
}

/// An asset path as seen by the booting node.
fn asset_url(base_url: Option<&str>, path: &str) -> String {
    if path.contains("://") {
        return path.to_string();
    }
    match base_url {
        Some(base) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ),
        None => path.to_string(),
    }
}

fn render_ipxe(node: &Node, image: &BootImage, vars: &Vars, base_url: Option<&str>) -> String {
    let mut script = String::from("#!ipxe\n");
    let _ = writeln!(script, "echo Booting {} with image {}", node.name, image.name);

    let mut kernel_line = format!("kernel --name kernel {}", asset_url(base_url, &image.kernel));
    for index in 0..image.initrd.len() {
        let _ = write!(kernel_line, " initrd=initrd{index}");
    }
    if let Some(cmdline) = image.cmdline.as_deref().filter(|c| !c.is_empty()) {
        kernel_line.push(' ');
        kernel_line.push_str(&template::render(cmdline, vars));
    }
    if let Some(liveimg) = &image.liveimg {
        let _ = write!(kernel_line, " root=live:{}", asset_url(base_url, liveimg));
    }
    script.push_str(&kernel_line);
    script.push('\n');

    for (index, initrd) in image.initrd.iter().enumerate() {
        let _ = writeln!(
            script,
            "initrd --name initrd{index} {}",
            asset_url(base_url, initrd)
        );
    }
    script.push_str("boot\n");
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use grendel_auth::{AuthConfig, AuthError};
    use grendel_store::{NetInterface, RocksStore};
    use tempfile::TempDir;

    fn setup() -> (RocksStore, TempDir, BootTokenSigner) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        let mut node = Node::new("cpn-01");
        node.provision = true;
        node.boot_image = Some("rocky9".to_string());
        node.interfaces.push(NetInterface {
            ifname: "eno1".to_string(),
            mac: Some("aa:bb:cc:00:00:01".parse().unwrap()),
            ip: Some("10.0.0.1/16".to_string()),
            fqdn: None,
            bmc: false,
            vlan: None,
            mtu: None,
        });
        let mut bare = Node::new("cpn-02");
        bare.interfaces.push(NetInterface {
            ifname: "eno1".to_string(),
            mac: None,
            ip: None,
            fqdn: None,
            bmc: false,
            vlan: None,
            mtu: None,
        });
        store.put_nodes(&[node, bare]).unwrap();
        store
            .put_images(&[BootImage {
                name: "rocky9".to_string(),
                kernel: "/images/rocky9/vmlinuz".to_string(),
                initrd: vec![
                    "/images/rocky9/initrd.img".to_string(),
                    "/images/rocky9/extra.img".to_string(),
                ],
                liveimg: None,
                cmdline: Some("console=ttyS0 hostname={{name}} BOOTIF={{mac}}".to_string()),
                verify: false,
                butane: None,
                user_data: None,
                provision_template: None,
                provision_templates: std::collections::BTreeMap::new(),
            }])
            .unwrap();

        let signer = BootTokenSigner::new(&AuthConfig::with_secret(
            b"boot-token-secret-0123".to_vec(),
        ));
        (store, dir, signer)
    }

    #[test]
    fn tokens_follow_resolved_order_with_per_node_errors() {
        let (store, _dir, signer) = setup();
        let results =
            issue_tokens(&store, &signer, &NodeSelector::nodeset("cpn-[01-02]"), "eno1").unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "cpn-01");
        assert!(results[0].token.is_some());
        assert_eq!(results[1].name, "cpn-02");
        assert!(results[1].error.as_deref().unwrap().contains("no MAC"));

        let missing =
            issue_tokens(&store, &signer, &NodeSelector::nodeset("cpn-01"), "ib0").unwrap();
        assert!(missing[0].token.is_none());
    }

    #[test]
    fn empty_selection_is_an_error() {
        let (store, _dir, signer) = setup();
        assert!(matches!(
            issue_tokens(&store, &signer, &NodeSelector::nodeset("gpu-[1-4]"), "eno1"),
            Err(ControlError::EmptyNodeSet)
        ));
    }

    #[test]
    fn script_uses_image_and_is_single_use() {
        let (store, _dir, signer) = setup();
        let results =
            issue_tokens(&store, &signer, &NodeSelector::nodeset("cpn-01"), "eno1").unwrap();
        let token = results[0].token.clone().unwrap();

        let script = ipxe_script(&store, &signer, &token, Some("http://10.0.0.254/")).unwrap();
        assert!(script.starts_with("#!ipxe\n"));
        assert!(script.contains(concat!(
            "kernel --name kernel http://10.0.0.254/images/rocky9/vmlinuz ",
            "initrd=initrd0 initrd=initrd1 ",
            "console=ttyS0 hostname=cpn-01 BOOTIF=aa:bb:cc:00:00:01\n"
        )));
        let initrd0 = script.find("initrd --name initrd0").unwrap();
        let initrd1 = script.find("initrd --name initrd1").unwrap();
        assert!(initrd0 < initrd1);
        assert!(script.ends_with("boot\n"));

        assert!(matches!(
            ipxe_script(&store, &signer, &token, None),
            Err(ControlError::Auth(AuthError::TokenReused))
        ));
    }

    #[test]
    fn unprovisioned_node_exits() {
        let (store, _dir, signer) = setup();
        let mut node = store.get_node("cpn-01").unwrap().unwrap();
        node.provision = false;
        store.put_nodes(&[node]).unwrap();

        let token = issue_tokens(&store, &signer, &NodeSelector::nodeset("cpn-01"), "eno1")
            .unwrap()
            .remove(0)
            .token
            .unwrap();
        let script = ipxe_script(&store, &signer, &token, None).unwrap();
        assert!(script.ends_with("exit\n"));
    }

    #[test]
    fn stale_token_is_rejected_after_mac_change() {
        let (store, _dir, signer) = setup();
        let token = issue_tokens(&store, &signer, &NodeSelector::nodeset("cpn-01"), "eno1")
            .unwrap()
            .remove(0)
            .token
            .unwrap();

        let mut node = store.get_node("cpn-01").unwrap().unwrap();
        node.interfaces[0].mac = Some("aa:bb:cc:00:00:99".parse().unwrap());
        store.put_nodes(&[node]).unwrap();

        assert!(matches!(
            ipxe_script(&store, &signer, &token, None),
            Err(ControlError::Unauthorized(_))
        ));
    }
}
