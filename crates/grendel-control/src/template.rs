//! `{{placeholder}}` substitution for configuration profiles and boot scripts.
//!
//! Node placeholders: `name`, `uid`, `firmware`, `boot_image`, `arch`,
//! `bmc_fqdn`, `bmc_ip`. Callers may add more with [`Vars::set`]. Unknown
//! placeholders are left in place.

use std::collections::BTreeMap;
use std::path::Path;

use grendel_store::Node;

use crate::error::{ControlError, Result};

/// Placeholder values.
#[derive(Debug, Clone, Default)]
pub struct Vars(BTreeMap<&'static str, String>);

impl Vars {
    /// Values derived from a node record.
    #[must_use]
    pub fn for_node(node: &Node) -> Self {
        let mut vars = Self::default();
        vars.set("name", node.name.clone());
        vars.set("uid", node.uid.to_string());
        vars.set("firmware", node.firmware.clone().unwrap_or_default());
        vars.set("boot_image", node.boot_image.clone().unwrap_or_default());
        vars.set("arch", node.arch.clone().unwrap_or_default());
        if let Some(bmc) = node.bmc_interface() {
            vars.set("bmc_fqdn", bmc.fqdn.clone().unwrap_or_default());
            vars.set("bmc_ip", bmc.addr().unwrap_or_default().to_string());
        }
        vars
    }

    /// Set or replace a value.
    pub fn set(&mut self, key: &'static str, value: impl Into<String>) -> &mut Self {
        self.0.insert(key, value.into());
        self
    }
}

/// Substitute every known `{{key}}` in `template`.
#[must_use]
pub fn render(template: &str, vars: &Vars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = after[..end].trim();
        match vars.0.get(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Read a template file from `dir`.
///
/// # Errors
///
/// Returns `ControlError::Validation` for names that would escape `dir` and
/// `ControlError::NotFound` if the file cannot be read.
pub async fn load(dir: &Path, name: &str) -> Result<String> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ControlError::Validation(format!("invalid template name {name:?}")));
    }

    tokio::fs::read_to_string(dir.join(name)).await.map_err(|e| {
        tracing::warn!(
            template = name,
            dir = %dir.display(),
            error = %e,
            "Failed to read template"
        );
        ControlError::not_found("template", name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use grendel_store::NetInterface;

    fn node() -> Node {
        let mut node = Node::new("cpn-d13-01");
        node.firmware = Some("2.19.1".to_string());
        node.interfaces.push(NetInterface {
            ifname: "bmc".to_string(),
            mac: None,
            ip: Some("10.1.0.1/16".to_string()),
            fqdn: Some("cpn-d13-01-bmc.example.org".to_string()),
            bmc: true,
            vlan: None,
            mtu: None,
        });
        node
    }

    #[test]
    fn substitutes_node_values() {
        let vars = Vars::for_node(&node());
        let out = render(
            "<Attribute Name=\"HostName\">{{name}}</Attribute> {{ bmc_ip }} {{firmware}}",
            &vars,
        );
        assert_eq!(
            out,
            "<Attribute Name=\"HostName\">cpn-d13-01</Attribute> 10.1.0.1 2.19.1"
        );
    }

    #[test]
    fn unknown_and_unterminated_placeholders_are_kept() {
        let vars = Vars::for_node(&node());
        assert_eq!(render("a {{nope}} b", &vars), "a {{nope}} b");
        assert_eq!(render("{{name}} {{name", &vars), "cpn-d13-01 {{name");
        assert_eq!(render("no placeholders", &vars), "no placeholders");
    }

    #[test]
    fn extra_vars() {
        let mut vars = Vars::for_node(&node());
        vars.set("mac", "aa:bb:cc:dd:ee:ff");
        assert_eq!(render("ip=dhcp BOOTIF={{mac}}", &vars), "ip=dhcp BOOTIF=aa:bb:cc:dd:ee:ff");
    }

    #[tokio::test]
    async fn load_rejects_traversal() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("idrac.xml"), "<SystemConfiguration/>")
            .await
            .unwrap();

        assert_eq!(
            load(dir.path(), "idrac.xml").await.unwrap(),
            "<SystemConfiguration/>"
        );
        assert!(matches!(
            load(dir.path(), "../etc/passwd").await,
            Err(ControlError::Validation(_))
        ));
        assert!(matches!(
            load(dir.path(), "missing.xml").await,
            Err(ControlError::NotFound { .. })
        ));
    }
}
