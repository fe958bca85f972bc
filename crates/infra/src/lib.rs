//! Infrastructure layer: event log, repositories, command/event routing,
//! deferred execution, read models and notification sinks.

pub mod command_bus;
pub mod deferred;
pub mod event_bus;
pub mod event_log;
pub mod handlers;
pub mod notify;
pub mod projections;
pub mod read_model;
pub mod repository;
pub mod workers;

pub use command_bus::{
    CommandBus, CommandBusBuilder, CommandHandler, DispatchError, RegistryError,
    DEFAULT_MAX_REENTRANCY_DEPTH,
};
pub use deferred::DeferredCommandBus;
pub use event_bus::EventBus;
pub use event_log::{EventLog, EventLogError, InMemoryEventLog, StoredEvent, StreamAppend, UncommittedEvent};
pub use notify::{AnomalyNotifier, NotifyError, RecordingAnomalyNotifier, TracingAnomalyNotifier};
pub use repository::{AggregateRepository, RepositoryError, UnitOfWork};
