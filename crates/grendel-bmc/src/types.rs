//! Request and response types exchanged with BMCs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Redfish `ResetType` values accepted for host power control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerAction {
    /// Power on.
    On,
    /// Immediate power off.
    ForceOff,
    /// OS-initiated shutdown.
    GracefulShutdown,
    /// OS-initiated restart.
    GracefulRestart,
    /// Immediate restart.
    ForceRestart,
    /// Power off then on.
    PowerCycle,
    /// Non-maskable interrupt.
    Nmi,
}

impl PowerAction {
    /// The Redfish `ResetType` string.
    #[must_use]
    pub const fn as_reset_type(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::ForceOff => "ForceOff",
            Self::GracefulShutdown => "GracefulShutdown",
            Self::GracefulRestart => "GracefulRestart",
            Self::ForceRestart => "ForceRestart",
            Self::PowerCycle => "PowerCycle",
            Self::Nmi => "Nmi",
        }
    }
}

/// Redfish `BootSourceOverrideTarget` values for a one-time boot override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BootOverride {
    /// Clear the override.
    None,
    /// Network boot.
    Pxe,
    /// Local disk.
    Hdd,
    /// Firmware setup.
    BiosSetup,
    /// USB device.
    Usb,
    /// Optical drive.
    Cd,
    /// UEFI HTTP boot.
    UefiHttp,
}

impl BootOverride {
    /// The Redfish target string.
    #[must_use]
    pub const fn as_target(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Pxe => "Pxe",
            Self::Hdd => "Hdd",
            Self::BiosSetup => "BiosSetup",
            Self::Usb => "Usb",
            Self::Cd => "Cd",
            Self::UefiHttp => "UefiHttp",
        }
    }
}

/// Host shutdown behaviour when a configuration import needs a reboot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShutdownType {
    /// Ask the OS to shut down.
    #[default]
    Graceful,
    /// Power off immediately.
    Forced,
    /// Stage the change for the next reboot.
    NoReboot,
}

impl ShutdownType {
    /// The iDRAC `ShutdownType` string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Graceful => "Graceful",
            Self::Forced => "Forced",
            Self::NoReboot => "NoReboot",
        }
    }
}

/// Sentinel job id that clears every job on a BMC.
pub const CLEAR_ALL_JOBS: &str = "JID_CLEARALL";

/// Summary of a computer system as reported by its BMC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Host name, falling back to the Redfish resource name.
    pub name: String,
    /// Manufacturer.
    pub manufacturer: Option<String>,
    /// Model.
    pub model: Option<String>,
    /// Serial number.
    pub serial_number: Option<String>,
    /// BIOS version.
    pub bios_version: Option<String>,
    /// Current power state.
    pub power_state: Option<String>,
    /// Rolled-up health.
    pub health: Option<String>,
    /// Active boot override target.
    pub boot_override: Option<String>,
    /// Persistent boot order.
    pub boot_order: Vec<String>,
}

impl SystemInfo {
    /// Build from a Redfish `ComputerSystem` resource.
    #[must_use]
    pub fn from_redfish(value: &Value) -> Self {
        let text = |pointer: &str| value.pointer(pointer).and_then(Value::as_str).map(String::from);
        Self {
            name: text("/HostName")
                .filter(|h| !h.is_empty())
                .or_else(|| text("/Name"))
                .unwrap_or_default(),
            manufacturer: text("/Manufacturer"),
            model: text("/Model"),
            serial_number: text("/SerialNumber"),
            bios_version: text("/BiosVersion"),
            power_state: text("/PowerState"),
            health: text("/Status/Health"),
            boot_override: text("/Boot/BootSourceOverrideTarget"),
            boot_order: value
                .pointer("/Boot/BootOrder")
                .and_then(Value::as_array)
                .map(|order| order.iter().filter_map(Value::as_str).map(String::from).collect())
                .unwrap_or_default(),
        }
    }
}

/// A BMC-reported unit of asynchronous work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job id, e.g. `JID_123456789012`.
    pub id: String,
    /// Job name.
    pub name: Option<String>,
    /// Vendor job state.
    pub job_state: Option<String>,
    /// Vendor job status.
    pub job_status: Option<String>,
    /// Progress, 0 to 100.
    pub percent_complete: Option<u8>,
    /// Vendor diagnostic messages.
    pub messages: Vec<Value>,
}

impl Job {
    /// Build from a Redfish `Job` resource.
    #[must_use]
    pub fn from_redfish(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(String::from);
        Self {
            id: text("Id").unwrap_or_default(),
            name: text("Name"),
            job_state: text("JobState"),
            job_status: text("JobStatus").or_else(|| text("Message")),
            percent_complete: value
                .get("PercentComplete")
                .and_then(Value::as_u64)
                .and_then(|p| u8::try_from(p).ok()),
            messages: value
                .get("Messages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// One telemetry metric report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    /// Report id.
    pub id: String,
    /// Report name.
    pub name: Option<String>,
    /// Report timestamp as sent by the BMC.
    pub timestamp: Option<String>,
    /// Raw metric values.
    pub metric_values: Vec<Value>,
}

impl MetricReport {
    /// Build from a Redfish `MetricReport` resource.
    #[must_use]
    pub fn from_redfish(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(String::from);
        Self {
            id: text("Id").unwrap_or_default(),
            name: text("Name"),
            timestamp: text("Timestamp"),
            metric_values: value
                .get("MetricValues")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// A network share holding a firmware catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareRepo {
    /// Share host or address.
    pub ip_address: String,
    /// Share protocol, e.g. `HTTPS`, `HTTP`, `NFS`.
    #[serde(default = "FirmwareRepo::default_share_type")]
    pub share_type: String,
    /// Path of the share on the host.
    #[serde(default)]
    pub share_name: String,
    /// Catalog file name.
    #[serde(default)]
    pub catalog_file: Option<String>,
}

impl FirmwareRepo {
    fn default_share_type() -> String {
        "HTTPS".to_string()
    }

    /// The public Dell update catalog.
    #[must_use]
    pub fn dell_default() -> Self {
        Self {
            ip_address: "downloads.dell.com".to_string(),
            share_type: Self::default_share_type(),
            share_name: String::new(),
            catalog_file: Some("Catalog.xml".to_string()),
        }
    }
}

/// Acknowledgement of an accepted action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAck {
    /// HTTP status of the action request.
    pub status: u16,
    /// Task or job URI from the `Location` header, if any.
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_info_from_redfish() {
        let info = SystemInfo::from_redfish(&json!({
            "Name": "System",
            "HostName": "",
            "Manufacturer": "Dell Inc.",
            "PowerState": "On",
            "Status": {"Health": "OK"},
            "Boot": {"BootSourceOverrideTarget": "Pxe", "BootOrder": ["NIC.1", "HDD.1"]}
        }));
        assert_eq!(info.name, "System");
        assert_eq!(info.health.as_deref(), Some("OK"));
        assert_eq!(info.boot_override.as_deref(), Some("Pxe"));
        assert_eq!(info.boot_order, vec!["NIC.1", "HDD.1"]);
    }

    #[test]
    fn job_from_redfish() {
        let job = Job::from_redfish(&json!({
            "Id": "JID_1",
            "JobState": "Completed",
            "PercentComplete": 100,
            "Messages": [{"Message": "done"}]
        }));
        assert_eq!(job.id, "JID_1");
        assert_eq!(job.percent_complete, Some(100));
        assert_eq!(job.messages.len(), 1);
    }

    #[test]
    fn power_action_wire_names() {
        let action: PowerAction = serde_json::from_str("\"ForceRestart\"").unwrap();
        assert_eq!(action.as_reset_type(), "ForceRestart");
        assert_eq!(BootOverride::Pxe.as_target(), "Pxe");
    }
}
