use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use checkin_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ValueObject};
use checkin_events::Event;

use crate::authorization::AuthorizedUsers;

/// Event type identifiers (routing keys) of the building stream.
pub mod event_types {
    pub const BUILDING_REGISTERED: &str = "building.registered";
    pub const USER_CHECKED_IN: &str = "building.user_checked_in";
    pub const USER_CHECKED_OUT: &str = "building.user_checked_out";
    pub const CHECK_IN_ANOMALY_DETECTED: &str = "building.check_in_anomaly_detected";
}

/// Building identifier (also the id of its event stream).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildingId(pub AggregateId);

impl BuildingId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl From<BuildingId> for AggregateId {
    fn from(value: BuildingId) -> Self {
        value.0
    }
}

impl core::fmt::Display for BuildingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A username, compared by value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl ValueObject for Username {}

impl Username {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Username {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event: a new building was registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingRegistered {
    pub building_id: BuildingId,
    pub name: String,
}

/// Event: a user was checked into a building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCheckedIn {
    pub building_id: BuildingId,
    pub username: Username,
}

/// Event: a user was checked out of a building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCheckedOut {
    pub building_id: BuildingId,
    pub username: Username,
}

/// Event: a user checked in while already checked in.
///
/// Informational only: it has no effect on building state. It exists so the
/// anomaly process manager can react to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInAnomalyDetected {
    pub building_id: BuildingId,
    pub username: Username,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildingEvent {
    BuildingRegistered(BuildingRegistered),
    UserCheckedIn(UserCheckedIn),
    UserCheckedOut(UserCheckedOut),
    CheckInAnomalyDetected(CheckInAnomalyDetected),
}

impl Event for BuildingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BuildingEvent::BuildingRegistered(_) => event_types::BUILDING_REGISTERED,
            BuildingEvent::UserCheckedIn(_) => event_types::USER_CHECKED_IN,
            BuildingEvent::UserCheckedOut(_) => event_types::USER_CHECKED_OUT,
            BuildingEvent::CheckInAnomalyDetected(_) => event_types::CHECK_IN_ANOMALY_DETECTED,
        }
    }
}

/// Aggregate root: Building.
///
/// Holds only what future commands need to validate against: identity and the
/// set of currently checked-in usernames. The set is ordered so replay yields
/// identical state everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Building {
    id: BuildingId,
    name: String,
    checked_in: BTreeSet<Username>,
    version: Option<u64>,
    recorded: Vec<BuildingEvent>,
}

impl Building {
    /// Register a new building with a freshly generated id.
    pub fn new(name: &str) -> Result<Self, DomainError> {
        Self::register(BuildingId::generate(), name)
    }

    /// Register a new building with a caller-chosen id.
    pub fn register(id: BuildingId, name: &str) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("building name cannot be empty"));
        }

        let mut building = Self::blank();
        building.record(BuildingEvent::BuildingRegistered(BuildingRegistered {
            building_id: id,
            name: name.to_string(),
        }));
        Ok(building)
    }

    pub fn id_typed(&self) -> BuildingId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checked_in_users(&self) -> &BTreeSet<Username> {
        &self.checked_in
    }

    pub fn is_checked_in(&self, username: &str) -> bool {
        self.checked_in.contains(&Username::new(username))
    }

    /// Events recorded since load/creation that are not persisted yet.
    pub fn recorded(&self) -> &[BuildingEvent] {
        &self.recorded
    }

    /// Check a user in.
    ///
    /// A second check-in of someone already inside is still recorded; it is
    /// followed by a `CheckInAnomalyDetected` event in the same call.
    pub fn check_in_user(
        &mut self,
        authorized_users: &dyn AuthorizedUsers,
        username: &str,
    ) -> Result<(), DomainError> {
        if !authorized_users.has(username) {
            return Err(DomainError::unauthorized(username));
        }

        let username = Username::new(username);
        let double_check_in = self.checked_in.contains(&username);

        self.record(BuildingEvent::UserCheckedIn(UserCheckedIn {
            building_id: self.id,
            username: username.clone(),
        }));

        if double_check_in {
            self.record(BuildingEvent::CheckInAnomalyDetected(CheckInAnomalyDetected {
                building_id: self.id,
                username,
            }));
        }

        Ok(())
    }

    /// Check a user out. Fails if the user is not currently checked in.
    pub fn check_out_user(&mut self, username: &str) -> Result<(), DomainError> {
        let username = Username::new(username);
        if !self.checked_in.contains(&username) {
            return Err(DomainError::not_checked_in(username.as_str(), self.id.0));
        }

        self.record(BuildingEvent::UserCheckedOut(UserCheckedOut {
            building_id: self.id,
            username,
        }));
        Ok(())
    }

    fn record(&mut self, event: BuildingEvent) {
        self.apply(&event);
        self.recorded.push(event);
    }
}

impl AggregateRoot for Building {
    type Id = BuildingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> Option<u64> {
        self.version
    }
}

impl Aggregate for Building {
    type Event = BuildingEvent;
    const AGGREGATE_TYPE: &'static str = "building";

    fn blank() -> Self {
        Self {
            id: BuildingId(AggregateId::nil()),
            name: String::new(),
            checked_in: BTreeSet::new(),
            version: None,
            recorded: Vec::new(),
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BuildingEvent::BuildingRegistered(e) => {
                self.id = e.building_id;
                self.name = e.name.clone();
            }
            BuildingEvent::UserCheckedIn(e) => {
                self.checked_in.insert(e.username.clone());
            }
            BuildingEvent::UserCheckedOut(e) => {
                self.checked_in.remove(&e.username);
            }
            BuildingEvent::CheckInAnomalyDetected(_) => {}
        }
    }

    fn mark_persisted(&mut self, version: u64) {
        self.version = Some(version);
    }

    fn take_recorded(&mut self) -> Vec<Self::Event> {
        std::mem::take(&mut self.recorded)
    }
}
