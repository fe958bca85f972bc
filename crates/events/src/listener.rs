use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::{EventEnvelope, SerializedCommand};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("failed to serialize emitted command: {0}")]
    Serialize(String),

    #[error("{0}")]
    Failed(String),
}

/// Reacts to persisted events (listener abstraction).
///
/// Listeners run synchronously inside the originating command's call stack,
/// after every projector registered for the same event type. A listener may
/// answer with commands; the command bus dispatches each of them immediately
/// (reentrantly, with a bounded depth) before moving on to the next listener.
///
/// Errors are never swallowed: a failing listener fails the triggering command,
/// even though the event itself is already durably recorded.
///
/// ## Delivery
///
/// Events can be redelivered (at-least-once), so listeners must tolerate seeing
/// the same `(stream_id, sequence)` more than once.
pub trait Listener: Send + Sync {
    /// Name used in logs and registry errors.
    fn name(&self) -> &'static str;

    /// Event types this listener is bound to.
    fn event_types(&self) -> &[&'static str];

    /// Command types this listener may emit.
    ///
    /// The command bus checks at startup that each of them has a handler.
    fn emits(&self) -> &[&'static str] {
        &[]
    }

    fn handle(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Vec<SerializedCommand>, ListenerError>;
}
