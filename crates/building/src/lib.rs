//! Building domain module (event-sourced).
//!
//! This crate contains the check-in/check-out business rules, implemented
//! purely as deterministic domain logic (no IO, no storage, no routing).

pub mod authorization;
pub mod building;
pub mod commands;
pub mod process_manager;

pub use authorization::{AllowList, AuthorizedUsers};
pub use building::{
    Building, BuildingEvent, BuildingId, BuildingRegistered, CheckInAnomalyDetected, UserCheckedIn,
    UserCheckedOut, Username, event_types,
};
pub use commands::{
    CheckUserIntoBuilding, CheckUserOutOfBuilding, NotifyAdministratorOfMultipleCheckInAnomaly,
    RegisterNewBuilding,
};
pub use process_manager::NotifyAdministratorWhenUserCheckedInMultipleTimes;
