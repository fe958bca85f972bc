//! Check-in application: configuration and startup wiring.

pub mod config;
pub mod services;

pub use config::{AppConfig, ConfigError};
pub use services::{build_services, CheckedInUsersView, CheckinServices};
