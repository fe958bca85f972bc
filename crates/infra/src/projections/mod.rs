//! Projection implementations (read model builders).
//!
//! Projections consume committed events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from the event log
//! - **Idempotent**: safe for at-least-once delivery

pub mod checked_in_users;

pub use checked_in_users::{CheckedInUsers, CheckedInUsersProjector, RebuildError};
