//! Domain error model.

use thiserror::Error;

use crate::id::AggregateId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// authorization, state preconditions). Storage and routing failures belong to
/// the infrastructure layer.
///
/// A command method that returns one of these has recorded **no** events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The authorization predicate rejected the user.
    #[error("user \"{username}\" is not authorized to enter the building")]
    Unauthorized { username: String },

    /// Check-out of a user that is not currently checked in.
    #[error("user \"{username}\" is not checked into the building \"{building}\"")]
    NotCheckedIn {
        username: String,
        building: AggregateId,
    },

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn unauthorized(username: impl Into<String>) -> Self {
        Self::Unauthorized {
            username: username.into(),
        }
    }

    pub fn not_checked_in(username: impl Into<String>, building: AggregateId) -> Self {
        Self::NotCheckedIn {
            username: username.into(),
            building,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
