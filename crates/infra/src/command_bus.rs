//! Command execution pipeline (immediate dispatch).
//!
//! ```text
//! Command
//!   ↓
//! 1. Resolve the single handler registered for the command type
//!   ↓
//! 2. Run it against a fresh UnitOfWork (load, decide, stage)
//!   ↓
//! 3. Commit the staged events (atomic, optimistic concurrency)
//!   ↓
//! 4. Publish each committed event, in order, through the EventBus
//!   ↓
//! 5. Dispatch commands emitted by listeners immediately, one level deeper
//! ```
//!
//! A failure before step 3 leaves the log untouched. A failure after it
//! propagates to the caller as [`DispatchError::AfterCommit`] while the
//! committed events stay recorded; running the command again would record
//! them twice.
//!
//! The handler registry is fixed when the bus is built. `build()` rejects two
//! handlers for one command type and listeners that can emit a command type
//! nobody handles, so `NoHandler` surfaces at startup rather than under load.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use checkin_core::DomainError;
use checkin_events::{
    Command, CommandDecodeError, EventEnvelope, Listener, ListenerError, Projector, ProjectorError,
    SerializedCommand,
};

use crate::event_bus::EventBus;
use crate::event_log::EventLog;
use crate::notify::NotifyError;
use crate::repository::{RepositoryError, UnitOfWork};

/// Nested dispatch depth allowed below a top-level command.
pub const DEFAULT_MAX_REENTRANCY_DEPTH: usize = 4;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler registered for command type '{0}'")]
    NoHandler(String),

    #[error("dispatching '{command_type}' would exceed the reentrancy limit of {max_depth}")]
    ReentrancyLimit {
        command_type: String,
        max_depth: usize,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("projector '{projector}' failed on {event_type}: {source}")]
    Projector {
        projector: &'static str,
        event_type: String,
        #[source]
        source: ProjectorError,
    },

    #[error("listener '{listener}' failed on {event_type}: {source}")]
    Listener {
        listener: &'static str,
        event_type: String,
        #[source]
        source: ListenerError,
    },

    #[error(transparent)]
    Notification(#[from] NotifyError),

    #[error("invalid command payload: {0}")]
    InvalidPayload(#[from] CommandDecodeError),

    /// Publication or a reentrant command failed after the top-level command
    /// committed `committed` (event ids, in append order).
    #[error("failed after committing {} event(s): {source}", .committed.len())]
    AfterCommit {
        committed: Vec<Uuid>,
        #[source]
        source: Box<DispatchError>,
    },
}

impl DispatchError {
    /// Whether reloading and retrying the command may succeed.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, DispatchError::Repository(RepositoryError::VersionConflict { .. }))
    }

    /// Whether the command's own events were already committed.
    pub fn is_after_commit(&self) -> bool {
        matches!(self, DispatchError::AfterCommit { .. })
    }

    /// The underlying failure, without the after-commit wrapper.
    pub fn root(&self) -> &DispatchError {
        match self {
            DispatchError::AfterCommit { source, .. } => source.root(),
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("command type '{0}' has more than one handler")]
    DuplicateHandler(&'static str),

    #[error("listener '{listener}' emits '{command_type}' but no handler is registered for it")]
    MissingHandler {
        listener: &'static str,
        command_type: &'static str,
    },
}

/// Typed command handler.
///
/// Handlers load and stage aggregates through the unit of work; the bus owns
/// commit and publication.
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    fn handle(&self, command: C, uow: &mut UnitOfWork<'_>) -> Result<(), DispatchError>;
}

impl<C, F> CommandHandler<C> for F
where
    C: Command,
    F: Fn(C, &mut UnitOfWork<'_>) -> Result<(), DispatchError> + Send + Sync + 'static,
{
    fn handle(&self, command: C, uow: &mut UnitOfWork<'_>) -> Result<(), DispatchError> {
        self(command, uow)
    }
}

/// Handler with the command type erased, keyed by `COMMAND_TYPE` in the registry.
trait ErasedHandler: Send + Sync {
    fn call(&self, command: &SerializedCommand, uow: &mut UnitOfWork<'_>) -> Result<(), DispatchError>;
}

struct Typed<C, H> {
    handler: H,
    _command: PhantomData<fn() -> C>,
}

impl<C, H> ErasedHandler for Typed<C, H>
where
    C: Command,
    H: CommandHandler<C>,
{
    fn call(&self, command: &SerializedCommand, uow: &mut UnitOfWork<'_>) -> Result<(), DispatchError> {
        let command: C = command.decode()?;
        self.handler.handle(command, uow)
    }
}

pub struct CommandBusBuilder {
    log: Arc<dyn EventLog>,
    handlers: Vec<(&'static str, Box<dyn ErasedHandler>)>,
    event_bus: EventBus,
    max_depth: usize,
}

impl CommandBusBuilder {
    /// Register the handler for `C::COMMAND_TYPE`.
    pub fn handler<C, H>(mut self, handler: H) -> Self
    where
        C: Command,
        H: CommandHandler<C>,
    {
        let erased: Box<dyn ErasedHandler> = Box::new(Typed {
            handler,
            _command: PhantomData,
        });
        self.handlers.push((C::COMMAND_TYPE, erased));
        self
    }

    pub fn projector(mut self, projector: Arc<dyn Projector>) -> Self {
        self.event_bus.register_projector(projector);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.event_bus.register_listener(listener);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn max_reentrancy_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Validate the registry and build the bus.
    pub fn build(self) -> Result<CommandBus, RegistryError> {
        let mut handlers = HashMap::with_capacity(self.handlers.len());
        for (command_type, handler) in self.handlers {
            if handlers.insert(command_type, handler).is_some() {
                return Err(RegistryError::DuplicateHandler(command_type));
            }
        }

        for listener in self.event_bus.listeners() {
            if let Some(missing) = listener.emits().iter().find(|t| !handlers.contains_key(*t)) {
                return Err(RegistryError::MissingHandler {
                    listener: listener.name(),
                    command_type: *missing,
                });
            }
        }

        let mut registered: Vec<_> = handlers.keys().copied().collect();
        registered.sort_unstable();
        debug!(commands = ?registered, "command registry validated");

        Ok(CommandBus {
            log: self.log,
            handlers,
            event_bus: self.event_bus,
            max_depth: self.max_depth,
        })
    }
}

/// Routes each command to exactly one handler and runs it as one transaction.
pub struct CommandBus {
    log: Arc<dyn EventLog>,
    handlers: HashMap<&'static str, Box<dyn ErasedHandler>>,
    event_bus: EventBus,
    max_depth: usize,
}

impl core::fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandBus")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("event_bus", &self.event_bus)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl CommandBus {
    pub fn builder(log: Arc<dyn EventLog>) -> CommandBusBuilder {
        CommandBusBuilder {
            log,
            handlers: Vec::new(),
            event_bus: EventBus::new(),
            max_depth: DEFAULT_MAX_REENTRANCY_DEPTH,
        }
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    /// Dispatch a typed command and wait for its whole transaction.
    ///
    /// Returns the events committed by this command (not those of commands
    /// dispatched reentrantly on its behalf).
    pub fn dispatch<C: Command>(&self, command: &C) -> Result<Vec<EventEnvelope<JsonValue>>, DispatchError> {
        let serialized = command
            .to_serialized()
            .map_err(|e| DispatchError::InvalidPayload(CommandDecodeError::Payload(e)))?;
        self.dispatch_serialized(&serialized)
    }

    /// Dispatch a command in transport form (deferred consumers use this).
    pub fn dispatch_serialized(
        &self,
        command: &SerializedCommand,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, DispatchError> {
        self.dispatch_at(command, 0)
    }

    fn dispatch_at(
        &self,
        command: &SerializedCommand,
        depth: usize,
    ) -> Result<Vec<EventEnvelope<JsonValue>>, DispatchError> {
        let command_type = command.command_type();

        if depth > self.max_depth {
            return Err(DispatchError::ReentrancyLimit {
                command_type: command_type.to_string(),
                max_depth: self.max_depth,
            });
        }

        let handler = self
            .handlers
            .get(command_type)
            .ok_or_else(|| DispatchError::NoHandler(command_type.to_string()))?;

        // 1-3) Decide and commit atomically.
        let mut uow = UnitOfWork::new(self.log.as_ref());
        handler.call(command, &mut uow)?;
        let committed = uow.commit()?;

        let envelopes: Vec<_> = committed.iter().map(|e| e.to_envelope()).collect();
        info!(command_type, depth, events = envelopes.len(), "command committed");

        // 4-5) Publish after commit; emitted commands run before the next handler.
        for envelope in &envelopes {
            let published = self.event_bus.publish(envelope, &mut |emitted| {
                debug!(
                    command_type = emitted.command_type(),
                    caused_by = envelope.event_type(),
                    depth = depth + 1,
                    "dispatching emitted command"
                );
                self.dispatch_at(&emitted, depth + 1).map(|_| ())
            });

            if let Err(err) = published {
                // Nested failures are wrapped once, by the top-level command.
                if depth > 0 {
                    return Err(err);
                }
                return Err(DispatchError::AfterCommit {
                    committed: envelopes.iter().map(|e| e.event_id()).collect(),
                    source: Box::new(err),
                });
            }
        }

        Ok(envelopes)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use checkin_building::{AllowList, Building, BuildingId, CheckUserIntoBuilding, RegisterNewBuilding};
    use checkin_core::AggregateId;

    use super::*;
    use crate::event_log::InMemoryEventLog;

    fn log() -> Arc<InMemoryEventLog> {
        Arc::new(InMemoryEventLog::new())
    }

    fn register(cmd: RegisterNewBuilding, uow: &mut UnitOfWork<'_>) -> Result<(), DispatchError> {
        let mut building = Building::register(cmd.building_id, &cmd.name)?;
        uow.add(&mut building)?;
        Ok(())
    }

    fn check_in(cmd: CheckUserIntoBuilding, uow: &mut UnitOfWork<'_>) -> Result<(), DispatchError> {
        let mut building: Building = uow.get(cmd.building_id)?;
        building.check_in_user(&AllowList::new(["fritz"]), &cmd.username)?;
        uow.add(&mut building)?;
        Ok(())
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Echo;

    impl Command for Echo {
        const COMMAND_TYPE: &'static str = "test.echo";
    }

    /// Re-emits an `Echo` for every registered building.
    struct EchoForever;

    impl Listener for EchoForever {
        fn name(&self) -> &'static str {
            "echo_forever"
        }

        fn event_types(&self) -> &[&'static str] {
            &["building.registered"]
        }

        fn emits(&self) -> &[&'static str] {
            &["building.register_new_building"]
        }

        fn handle(&self, _envelope: &EventEnvelope<JsonValue>) -> Result<Vec<SerializedCommand>, ListenerError> {
            let cmd = RegisterNewBuilding {
                building_id: BuildingId::generate(),
                name: "again".to_string(),
            };
            Ok(vec![cmd.to_serialized().map_err(|e| ListenerError::Serialize(e.to_string()))?])
        }
    }

    #[test]
    fn dispatch_commits_and_returns_events() {
        let log = log();
        let bus = CommandBus::builder(log.clone())
            .handler::<RegisterNewBuilding, _>(register)
            .build()
            .unwrap();

        let id = BuildingId::generate();
        let events = bus
            .dispatch(&RegisterNewBuilding {
                building_id: id,
                name: "B1".to_string(),
            })
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stream_id(), id.0);
        assert_eq!(events[0].event_type(), "building.registered");
        assert_eq!(log.stream_version(id.0).unwrap(), Some(0));
    }

    #[test]
    fn unknown_command_type_is_no_handler() {
        let bus = CommandBus::builder(log()).build().unwrap();
        let err = bus.dispatch(&Echo).unwrap_err();
        assert!(matches!(err, DispatchError::NoHandler(t) if t == "test.echo"));
    }

    #[test]
    fn domain_failure_appends_nothing() {
        let log = log();
        let bus = CommandBus::builder(log.clone())
            .handler::<RegisterNewBuilding, _>(register)
            .handler::<CheckUserIntoBuilding, _>(check_in)
            .build()
            .unwrap();

        let id = BuildingId::generate();
        bus.dispatch(&RegisterNewBuilding {
            building_id: id,
            name: "B1".to_string(),
        })
        .unwrap();

        let err = bus
            .dispatch(&CheckUserIntoBuilding {
                building_id: id,
                username: "mallory".to_string(),
            })
            .unwrap_err();

        assert!(matches!(err, DispatchError::Domain(DomainError::Unauthorized { .. })));
        assert_eq!(log.stream_version(id.0).unwrap(), Some(0));
    }

    #[test]
    fn missing_aggregate_surfaces_as_not_found() {
        let bus = CommandBus::builder(log()).handler::<CheckUserIntoBuilding, _>(check_in).build().unwrap();
        let err = bus
            .dispatch(&CheckUserIntoBuilding {
                building_id: BuildingId::generate(),
                username: "fritz".to_string(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Repository(RepositoryError::AggregateNotFound { .. })
        ));
    }

    #[test]
    fn duplicate_handlers_are_rejected() {
        let err = CommandBus::builder(log())
            .handler::<RegisterNewBuilding, _>(register)
            .handler::<RegisterNewBuilding, _>(register)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateHandler("building.register_new_building")
        );
    }

    #[test]
    fn listener_emitting_an_unhandled_command_is_rejected() {
        let err = CommandBus::builder(log())
            .listener(Arc::new(EchoForever))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::MissingHandler {
                listener: "echo_forever",
                command_type: "building.register_new_building",
            }
        );
    }

    #[test]
    fn reentrant_chains_are_bounded() {
        let log = log();
        let bus = CommandBus::builder(log.clone())
            .handler::<RegisterNewBuilding, _>(register)
            .listener(Arc::new(EchoForever))
            .max_reentrancy_depth(2)
            .build()
            .unwrap();

        let err = bus
            .dispatch(&RegisterNewBuilding {
                building_id: BuildingId::generate(),
                name: "B1".to_string(),
            })
            .unwrap_err();

        assert!(err.is_after_commit());
        assert!(matches!(err.root(), DispatchError::ReentrancyLimit { max_depth: 2, .. }));
        // Depths 0, 1 and 2 committed before the chain was cut.
        assert_eq!(log.len(), 3);
    }

    /// Fails on every anomaly it is told about.
    struct Refuse;

    impl Listener for Refuse {
        fn name(&self) -> &'static str {
            "refuse"
        }

        fn event_types(&self) -> &[&'static str] {
            &["building.check_in_anomaly_detected"]
        }

        fn handle(&self, _envelope: &EventEnvelope<JsonValue>) -> Result<Vec<SerializedCommand>, ListenerError> {
            Err(ListenerError::Failed("no administrator on duty".to_string()))
        }
    }

    #[test]
    fn fan_out_failure_reports_the_committed_events() {
        let log = log();
        let bus = CommandBus::builder(log.clone())
            .handler::<RegisterNewBuilding, _>(register)
            .handler::<CheckUserIntoBuilding, _>(check_in)
            .listener(Arc::new(Refuse))
            .build()
            .unwrap();

        let id = BuildingId::generate();
        bus.dispatch(&RegisterNewBuilding {
            building_id: id,
            name: "B1".to_string(),
        })
        .unwrap();
        let check_in_fritz = CheckUserIntoBuilding {
            building_id: id,
            username: "fritz".to_string(),
        };
        bus.dispatch(&check_in_fritz).unwrap();

        let err = bus.dispatch(&check_in_fritz).unwrap_err();

        let DispatchError::AfterCommit { committed, source } = &err else {
            panic!("expected an after-commit failure, got {err:?}");
        };
        let stored: Vec<Uuid> = log.read_stream(id.0).unwrap()[2..]
            .iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(committed, &stored);
        assert!(matches!(**source, DispatchError::Listener { listener: "refuse", .. }));
        assert!(!err.is_version_conflict());
    }

    #[test]
    fn malformed_payload_is_invalid() {
        let bus = CommandBus::builder(log()).handler::<RegisterNewBuilding, _>(register).build().unwrap();
        let err = bus
            .dispatch_serialized(&SerializedCommand {
                command_type: "building.register_new_building".to_string(),
                payload: serde_json::json!({ "name": 7 }),
                issued_at: chrono::Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidPayload(_)));
    }

    #[test]
    fn version_conflicts_are_classified() {
        let err = DispatchError::Repository(RepositoryError::VersionConflict {
            stream_id: AggregateId::new(),
            expected: checkin_core::ExpectedVersion::Exact(0),
            actual: Some(1),
        });
        assert!(err.is_version_conflict());
        assert!(!DispatchError::NoHandler("x".to_string()).is_version_conflict());
    }
}
