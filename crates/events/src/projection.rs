use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::EventEnvelope;

#[derive(Debug, Error)]
pub enum ProjectorError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("read model store failure: {0}")]
    Store(String),
}

/// A projector folds events into a read model.
///
/// Projectors implement the **CQRS read model pattern**: they transform events
/// (write model) into queryable state (read model).
///
/// ## Idempotency
///
/// Projectors must be **idempotent**: applying the same event more than once
/// must leave the read model as if it had been applied once. Events are
/// redelivered under at-least-once semantics and replayed on rebuild.
///
/// For membership-style read models this means set semantics (union on add,
/// remove-by-value on delete) rather than counters or appends.
///
/// ## Disposability
///
/// Read models are **disposable**: they can be dropped and rebuilt from the
/// event log at any time. Each projector solely owns its read-model store.
///
/// ## Error Handling
///
/// Failures are returned, never swallowed; the event bus propagates them to the
/// command that triggered the publication.
pub trait Projector: Send + Sync {
    /// Name used in logs and registry errors.
    fn name(&self) -> &'static str;

    /// Event types this projector folds.
    fn event_types(&self) -> &[&'static str];

    /// Apply a single event to the read model.
    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectorError>;
}
