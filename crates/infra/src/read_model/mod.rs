//! Read model storage abstractions.
//!
//! Read models are disposable: they can always be rebuilt from the event log.

pub mod store;

pub use store::{InMemoryReadModelStore, ReadModelError, ReadModelStore};
