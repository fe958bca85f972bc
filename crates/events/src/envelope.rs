use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use checkin_core::AggregateId;

/// Envelope for a persisted event, containing stream metadata.
///
/// This is the unit the event bus routes to projectors and listeners.
///
/// Notes:
/// - `(stream_id, sequence)` is the event's identity.
/// - **Append-only**: `sequence` is monotonically increasing per stream, starting at 0.
/// - `event_type` is the routing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,

    stream_id: AggregateId,
    aggregate_type: String,

    /// Position in the stream (0-based).
    sequence: u64,

    event_type: String,
    recorded_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        stream_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence: u64,
        event_type: impl Into<String>,
        recorded_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            stream_id,
            aggregate_type: aggregate_type.into(),
            sequence,
            event_type: event_type.into(),
            recorded_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn stream_id(&self) -> AggregateId {
        self.stream_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
