use std::collections::BTreeSet;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use checkin_building::{event_types, BuildingEvent, BuildingId};
use checkin_events::{EventEnvelope, ProjectionRunner, Projector, ProjectorError, ReplayError};

use crate::event_log::{EventLog, EventLogError};
use crate::read_model::{ReadModelError, ReadModelStore};

/// Queryable read model: the users currently inside each building.
pub type CheckedInUsers = BTreeSet<String>;

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error(transparent)]
    Log(#[from] EventLogError),

    #[error(transparent)]
    Store(#[from] ReadModelError),

    #[error(transparent)]
    Replay(#[from] ReplayError),
}

const EVENT_TYPES: [&str; 2] = [event_types::USER_CHECKED_IN, event_types::USER_CHECKED_OUT];

/// Checked-in users projection.
///
/// Set semantics make it idempotent: a repeated check-in is a no-op union and
/// a check-out removes by value, so redelivered events leave the view intact.
#[derive(Debug)]
pub struct CheckedInUsersProjector<S>
where
    S: ReadModelStore<BuildingId, CheckedInUsers>,
{
    store: S,
}

impl<S> CheckedInUsersProjector<S>
where
    S: ReadModelStore<BuildingId, CheckedInUsers>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Users currently checked into a building (empty when unknown).
    pub fn checked_in(&self, building_id: BuildingId) -> Result<CheckedInUsers, ReadModelError> {
        Ok(self.store.get(&building_id)?.unwrap_or_default())
    }

    /// Buildings that have an entry in the read model.
    pub fn buildings(&self) -> Result<Vec<BuildingId>, ReadModelError> {
        let mut ids = self.store.keys()?;
        ids.sort();
        Ok(ids)
    }

    /// Drop the read model and replay every check-in/check-out from the log.
    ///
    /// Returns the number of events replayed.
    pub fn rebuild_from_log(&self, log: &dyn EventLog) -> Result<usize, RebuildError> {
        self.store.clear()?;

        let envelopes: Vec<_> = log.read_all()?.iter().map(|e| e.to_envelope()).collect();
        let replayed = ProjectionRunner::new(self).run(&envelopes)?;

        info!(projector = self.name(), replayed, "read model rebuilt");
        Ok(replayed)
    }
}

impl<S> Projector for CheckedInUsersProjector<S>
where
    S: ReadModelStore<BuildingId, CheckedInUsers>,
{
    fn name(&self) -> &'static str {
        "checked_in_users"
    }

    fn event_types(&self) -> &[&'static str] {
        &EVENT_TYPES
    }

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectorError> {
        let event: BuildingEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectorError::Deserialize(e.to_string()))?;

        let result = match event {
            BuildingEvent::UserCheckedIn(e) => self.store.update(e.building_id, &mut |users| {
                users.insert(e.username.as_str().to_string());
            }),
            BuildingEvent::UserCheckedOut(e) => self.store.update(e.building_id, &mut |users| {
                users.remove(e.username.as_str());
            }),
            _ => Ok(()),
        };

        result.map_err(|e| ProjectorError::Store(e.to_string()))
    }
}
