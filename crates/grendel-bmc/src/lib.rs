//! BMC client adapters for grendel.
//!
//! This crate talks to node BMCs over Redfish:
//!
//! - [`BmcClient`]: a capability-tagged trait; operations an adapter does not
//!   implement return [`BmcError::Unsupported`]
//! - [`RedfishClient`]: standard DMTF resources
//! - [`DellClient`]: iDRAC OEM actions for jobs, configuration import and
//!   repository firmware updates
//! - [`RedfishConnector`]: reads the service root and picks the adapter
//!
//! Adapters never retry; retry policy belongs to the caller and is driven by
//! [`BmcError::is_retriable`].
//!
//! # Example
//!
//! ```no_run
//! use grendel_bmc::{BmcConfig, BmcConnector, Capability, PowerAction, RedfishConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = RedfishConnector::new(BmcConfig::default());
//! let bmc = connector.connect("cpn-d13-01-bmc.example.org").await?;
//!
//! if bmc.supports(Capability::PowerControl) {
//!     bmc.power_os(PowerAction::GracefulRestart, None).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod connector;
pub mod dell;
pub mod error;
pub mod http;
pub mod redfish;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use client::{BmcClient, BmcConnector, Capability};
pub use connector::{BmcConfig, RedfishConnector};
pub use dell::DellClient;
pub use error::{BmcError, Result};
pub use redfish::RedfishClient;
pub use types::{
    ActionAck, BootOverride, FirmwareRepo, Job, MetricReport, PowerAction, ShutdownType,
    SystemInfo, CLEAR_ALL_JOBS,
};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockBehavior, MockBmc, MockCall, MockConnector};
