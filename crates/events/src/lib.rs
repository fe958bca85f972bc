//! Messaging contracts: events, commands, listeners, projectors and the
//! command queue boundary.
//!
//! Nothing here performs storage IO; infrastructure composes these traits.

pub mod command;
pub mod envelope;
pub mod event;
pub mod in_memory_queue;
pub mod listener;
pub mod process_manager;
pub mod projection;
pub mod queue;
pub mod runner;

pub use command::{Command, CommandDecodeError, SerializedCommand};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_queue::InMemoryCommandQueue;
pub use listener::{Listener, ListenerError};
pub use process_manager::{ProcessManager, ProcessManagerListener};
pub use projection::{Projector, ProjectorError};
pub use queue::{CommandQueue, QueueError, QueuedCommand};
pub use runner::{ProjectionRunner, ReplayError};
