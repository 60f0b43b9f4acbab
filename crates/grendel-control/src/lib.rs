//! Control plane for grendel node provisioning and BMC orchestration.
//!
//! This crate holds the business logic between the HTTP gateway and the
//! storage, auth and BMC layers: inventory mutations, fan-out of BMC
//! operations over node sets, boot token issuance, and user and role
//! management.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Gateway (HTTP)                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ AuthContext
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ControlPlaneService                      │
//! │  ┌───────────┐ ┌───────────┐ ┌───────────┐ ┌────────────┐   │
//! │  │ Inventory │ │  Engine   │ │   Boot    │ │  Accounts  │   │
//! │  │           │ │ (fan-out) │ │  tokens   │ │            │   │
//! │  └───────────┘ └───────────┘ └───────────┘ └────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │  Auth    │   │   BMC    │
//!        │ (RocksDB)│   │  (JWT)   │   │ (Redfish)│
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use grendel_auth::{AuthConfig, HmacValidator};
//! use grendel_bmc::{BmcConfig, RedfishConnector};
//! use grendel_control::{
//!     AuthContext, ControlPlane, ControlPlaneService, EngineConfig, NodeSelector, Operation,
//! };
//! use grendel_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/var/lib/grendel")?);
//! let connector = Arc::new(RedfishConnector::new(BmcConfig::default()));
//! let auth = AuthConfig::default();
//! let sessions = Arc::new(HmacValidator::new(&auth));
//! let control =
//!     ControlPlaneService::new(store, connector, sessions, &auth, EngineConfig::default());
//!
//! let admin = AuthContext::new("admin", "admin");
//! let report = control
//!     .execute(&admin, &NodeSelector::nodeset("cpn-d13-[01-16]"), Operation::ClearSel)
//!     .await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Node lifecycle
//!
//! Every node of a batch moves `Pending → Dispatched{n} → Succeeded |
//! Failed | Skipped`. See the [`lifecycle`] module.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accounts;
pub mod boot;
pub mod engine;
pub mod error;
pub mod events;
pub mod inventory;
pub mod lifecycle;
pub mod service;
pub mod template;
pub mod types;

pub use engine::Engine;
pub use error::{ControlError, Result};
pub use lifecycle::{NodeRun, NodeState};
pub use service::{ControlPlane, ControlPlaneService};
pub use types::{
    AuthContext, BatchReport, BootTokenResult, EngineConfig, FailureReason, ItemFailure,
    MutationResult, NodeData, NodeOutcome, NodeResult, NodeSelector, Operation, TagAction,
    TokenResponse, UpsertReport, UserView,
};
