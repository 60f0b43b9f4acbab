//! Common error types for grendel.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the grendel system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A node-set expression could not be parsed.
    #[error("invalid nodeset {expr:?}: {reason}")]
    InvalidNodeSet {
        /// The offending expression.
        expr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A tag expression could not be parsed.
    #[error("invalid tag expression {expr:?}: {reason}")]
    InvalidTags {
        /// The offending expression.
        expr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Neither a nodeset nor a tag expression was supplied.
    #[error("invalid query: a nodeset or tag expression is required")]
    InvalidQuery,

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),
}
