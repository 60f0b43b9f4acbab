//! Core types and utilities for grendel.
//!
//! This crate provides the foundational types used throughout the grendel
//! provisioning engine:
//!
//! - **Identifiers**: Strongly-typed node UIDs and MAC addresses
//! - **Node sets**: Parsing of compact node-range and tag expressions
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use grendel_core::{MacAddr, NodeSet, TagQuery};
//!
//! let set = NodeSet::parse("cpn-d13-[01-03],srv1").unwrap();
//! assert_eq!(set.into_names().len(), 4);
//!
//! let query = TagQuery::parse("rack=,!retired").unwrap();
//! assert_eq!(query.clauses().len(), 2);
//! assert!(query.clauses()[1].negated);
//!
//! let mac: MacAddr = "AA:BB:CC:00:11:22".parse().unwrap();
//! assert_eq!(mac.to_string(), "aa:bb:cc:00:11:22");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod nodeset;

pub use error::{CoreError, Result};
pub use ids::{IdError, MacAddr, NodeUid};
pub use nodeset::{NodeSet, TagQuery, TagTerm};
