//! Process manager mechanics (framework only, no business rules).
//!
//! - Stateless: each reaction depends only on the incoming event
//! - Event-driven: bound to specific event types
//! - Compensating actions expressed as commands
//!
//! A `ProcessManager` is plugged into the event bus through
//! [`ProcessManagerListener`], which deserializes the payload, calls `react`
//! and serializes the resulting commands for immediate dispatch.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use checkin_core::AggregateId;

use crate::{Command, EventEnvelope, Listener, ListenerError, SerializedCommand};

/// Process manager contract.
pub trait ProcessManager: Send + Sync + 'static {
    /// Event payload type this process manager reads.
    type Event: DeserializeOwned;
    /// Command type it emits.
    type Command: Command;

    /// Stable name (logs, registry errors).
    fn name(&self) -> &'static str;

    /// Event types that trigger a reaction.
    fn triggers(&self) -> &[&'static str];

    /// React to an incoming event, producing zero or more commands.
    fn react(&self, stream_id: AggregateId, event: Self::Event) -> Vec<Self::Command>;
}

/// Adapts a [`ProcessManager`] to the [`Listener`] contract.
#[derive(Debug)]
pub struct ProcessManagerListener<P> {
    inner: P,
    emits: [&'static str; 1],
}

impl<P> ProcessManagerListener<P>
where
    P: ProcessManager,
{
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            emits: [<P::Command as Command>::COMMAND_TYPE],
        }
    }
}

impl<P> Listener for ProcessManagerListener<P>
where
    P: ProcessManager,
{
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn event_types(&self) -> &[&'static str] {
        self.inner.triggers()
    }

    fn emits(&self) -> &[&'static str] {
        &self.emits
    }

    fn handle(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Vec<SerializedCommand>, ListenerError> {
        let event: P::Event = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ListenerError::Deserialize(e.to_string()))?;

        self.inner
            .react(envelope.stream_id(), event)
            .iter()
            .map(|cmd| {
                cmd.to_serialized()
                    .map_err(|e| ListenerError::Serialize(e.to_string()))
            })
            .collect()
    }
}
