//! HTTP request handlers.
//!
//! Handlers are generic over the control plane and token validator so the
//! integration tests can run them against a mock BMC connector.

pub mod accounts;
pub mod bmc;
pub mod boot;
pub mod db;
pub mod events;
pub mod health;
pub mod images;
pub mod nodes;
pub mod roles;
pub mod users;

use grendel_control::{ItemFailure, UpsertReport};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// `?names=a,b` query parameter.
#[derive(Debug, Default, Deserialize)]
pub struct NamesQuery {
    /// Comma-separated names.
    #[serde(default)]
    pub names: Option<String>,
}

impl NamesQuery {
    /// The listed names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.names.as_deref().map(split_names).unwrap_or_default()
    }
}

/// Response of a bulk upsert that stored at least one item.
#[derive(Debug, Serialize)]
pub struct UpsertResponse {
    /// Short title.
    pub title: String,
    /// Counts.
    pub detail: String,
    /// Number of records whose stored value changed.
    pub changed: usize,
    /// Rejected items.
    pub errors: Vec<ItemFailure>,
}

impl UpsertResponse {
    /// Build the response for `kind` records, or reject the request if no
    /// item was accepted.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Rejected` carrying every item failure when items
    /// were submitted and all of them failed.
    pub fn from_report(kind: &str, report: UpsertReport) -> Result<Self, ApiError> {
        if report.all_failed() {
            return Err(ApiError::Rejected {
                detail: format!("no {kind} accepted"),
                errors: report.failures,
            });
        }
        Ok(Self {
            title: format!("{kind} upserted"),
            detail: format!(
                "{} accepted, {} changed, {} rejected",
                report.accepted,
                report.changed,
                report.failures.len()
            ),
            changed: report.changed,
            errors: report.failures,
        })
    }
}

/// Split a comma-separated list, dropping blanks.
#[must_use]
pub fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
