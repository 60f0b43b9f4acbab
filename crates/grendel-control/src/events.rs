//! Audit event recording.
//!
//! Events are appended after the change they describe has been committed. A
//! failed append is logged and does not undo or fail the change.

use grendel_store::{Event, JobMessage, Severity, Store};

use crate::types::AuthContext;

/// Append an event, returning its id.
pub fn record<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    severity: Severity,
    message: impl Into<String>,
    job_messages: Vec<JobMessage>,
) -> Option<u64> {
    let event = Event::now(severity, &actor.username, message).with_job_messages(job_messages);
    match store.append_event(event) {
        Ok(event) => {
            tracing::debug!(
                event_id = event.id,
                user = %event.user,
                severity = ?event.severity,
                message = %event.message,
                "Recorded event"
            );
            Some(event.id)
        }
        Err(e) => {
            tracing::error!(user = %actor.username, error = %e, "Failed to record event");
            None
        }
    }
}

/// Append an informational event without per-node records.
pub fn info<S: Store + ?Sized>(
    store: &S,
    actor: &AuthContext,
    message: impl Into<String>,
) -> Option<u64> {
    record(store, actor, Severity::Info, message, Vec::new())
}
