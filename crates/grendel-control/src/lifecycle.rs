//! Per-node operation state machine.
//!
//! Every node in a batch moves through these states exactly once:
//!
//! ```text
//!   Pending ──────────────────────────────┐
//!      │                                  │ (no BMC, unsupported)
//!      ▼                                  ▼
//!   Dispatched{1} ──▶ Dispatched{2} ──▶ … Failed | Skipped
//!      │                   │
//!      └───────┬───────────┘
//!              ▼
//!     Succeeded | Failed | Skipped
//! ```
//!
//! Terminal states are never left.

use serde::Serialize;

use crate::error::{ControlError, Result};

/// The state of one node within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum NodeState {
    /// Resolved but not yet started.
    Pending,
    /// A BMC call is in flight; `attempt` starts at 1.
    Dispatched {
        /// Current attempt number.
        attempt: u32,
    },
    /// The operation completed.
    Succeeded,
    /// The operation failed.
    Failed,
    /// The operation was not applicable to the node.
    Skipped,
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: NodeState, to: NodeState) -> bool {
    use NodeState::{Dispatched, Failed, Pending, Skipped, Succeeded};

    match (from, to) {
        (Pending, Dispatched { attempt }) => attempt == 1,
        (Dispatched { attempt: current }, Dispatched { attempt: next }) => next == current + 1,
        (Pending, Failed | Skipped) | (Dispatched { .. }, Succeeded | Failed | Skipped) => true,
        _ => false,
    }
}

/// Returns true if no further transition is possible.
#[must_use]
pub const fn is_terminal(state: NodeState) -> bool {
    matches!(
        state,
        NodeState::Succeeded | NodeState::Failed | NodeState::Skipped
    )
}

/// Tracks one node through the state machine.
#[derive(Debug, Clone)]
pub struct NodeRun {
    name: String,
    state: NodeState,
    attempts: u32,
}

impl NodeRun {
    /// Start tracking a node in `Pending`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: NodeState::Pending,
            attempts: 0,
        }
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> NodeState {
        self.state
    }

    /// Number of dispatch attempts made so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Move to the next dispatch attempt.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Internal` if the node already finished.
    pub fn dispatch(&mut self) -> Result<u32> {
        let attempt = self.attempts + 1;
        self.advance(NodeState::Dispatched { attempt })?;
        self.attempts = attempt;
        Ok(attempt)
    }

    /// Move to a new state.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Internal` if the transition is not allowed.
    pub fn advance(&mut self, to: NodeState) -> Result<()> {
        if !is_valid_transition(self.state, to) {
            return Err(ControlError::Internal(format!(
                "node {}: invalid transition {:?} -> {to:?}",
                self.name, self.state
            )));
        }
        self.state = to;
        Ok(())
    }
}
