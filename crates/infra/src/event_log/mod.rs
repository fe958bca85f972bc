//! Append-only event log boundary.
//!
//! An infrastructure-facing abstraction for storing and loading per-aggregate
//! event streams without making any storage assumptions.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventLog;
pub use r#trait::{EventLog, EventLogError, StoredEvent, StreamAppend, UncommittedEvent};
