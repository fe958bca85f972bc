//! Anomaly notification sinks.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

use checkin_building::BuildingId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notification sink unavailable: {0}")]
    Unavailable(String),
}

/// Synchronous sink for administrator notifications.
pub trait AnomalyNotifier: Send + Sync {
    fn notify(&self, username: &str, building_id: BuildingId) -> Result<(), NotifyError>;
}

impl<N> AnomalyNotifier for std::sync::Arc<N>
where
    N: AnomalyNotifier + ?Sized,
{
    fn notify(&self, username: &str, building_id: BuildingId) -> Result<(), NotifyError> {
        (**self).notify(username, building_id)
    }
}

/// Writes each notification to the log at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnomalyNotifier;

impl AnomalyNotifier for TracingAnomalyNotifier {
    fn notify(&self, username: &str, building_id: BuildingId) -> Result<(), NotifyError> {
        warn!(
            %building_id,
            username,
            "User \"{username}\" is cheating the system at building \"{building_id}\""
        );
        Ok(())
    }
}

/// Keeps every notification in memory (tests/dev).
#[derive(Debug, Default)]
pub struct RecordingAnomalyNotifier {
    sent: Mutex<Vec<(String, BuildingId)>>,
}

impl RecordingAnomalyNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, BuildingId)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl AnomalyNotifier for RecordingAnomalyNotifier {
    fn notify(&self, username: &str, building_id: BuildingId) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Unavailable("lock poisoned".to_string()))?
            .push((username.to_string(), building_id));
        Ok(())
    }
}
