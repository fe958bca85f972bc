//! `checkin-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model and the event-sourced aggregate contract.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion, rehydrate};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, MessageId};
pub use value_object::ValueObject;
