//! In-process event routing.
//!
//! For every committed event the bus invokes, synchronously and in
//! registration order, each projector bound to the event type and then each
//! listener bound to it. Commands a listener answers with are handed to the
//! caller's `on_command` callback right after that listener returns, before
//! the next listener runs.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use checkin_events::{EventEnvelope, Listener, Projector, SerializedCommand};

use crate::command_bus::DispatchError;

#[derive(Default, Clone)]
pub struct EventBus {
    projectors: Vec<Arc<dyn Projector>>,
    listeners: Vec<Arc<dyn Listener>>,
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "projectors",
                &self.projectors.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "listeners",
                &self.listeners.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_projector(&mut self, projector: Arc<dyn Projector>) {
        self.projectors.push(projector);
    }

    pub fn register_listener(&mut self, listener: Arc<dyn Listener>) {
        self.listeners.push(listener);
    }

    pub fn listeners(&self) -> impl Iterator<Item = &Arc<dyn Listener>> {
        self.listeners.iter()
    }

    /// Number of projectors plus listeners bound to an event type.
    pub fn route_count(&self, event_type: &str) -> usize {
        let projectors = self
            .projectors
            .iter()
            .filter(|p| p.event_types().contains(&event_type))
            .count();
        let listeners = self
            .listeners
            .iter()
            .filter(|l| l.event_types().contains(&event_type))
            .count();
        projectors + listeners
    }

    /// Route one committed event.
    ///
    /// The first failure stops the fan-out and is returned as is.
    pub fn publish(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        on_command: &mut dyn FnMut(SerializedCommand) -> Result<(), DispatchError>,
    ) -> Result<(), DispatchError> {
        let event_type = envelope.event_type();

        for projector in self
            .projectors
            .iter()
            .filter(|p| p.event_types().contains(&event_type))
        {
            debug!(projector = projector.name(), event_type, sequence = envelope.sequence(), "projecting");
            projector
                .apply(envelope)
                .map_err(|source| DispatchError::Projector {
                    projector: projector.name(),
                    event_type: event_type.to_string(),
                    source,
                })?;
        }

        for listener in self
            .listeners
            .iter()
            .filter(|l| l.event_types().contains(&event_type))
        {
            debug!(listener = listener.name(), event_type, sequence = envelope.sequence(), "notifying listener");
            let commands = listener
                .handle(envelope)
                .map_err(|source| DispatchError::Listener {
                    listener: listener.name(),
                    event_type: event_type.to_string(),
                    source,
                })?;

            for command in commands {
                on_command(command)?;
            }
        }

        Ok(())
    }
}
