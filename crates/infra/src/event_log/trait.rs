use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use checkin_core::{AggregateId, ExpectedVersion};
use checkin_events::{Event, EventEnvelope};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// ## Event Lifecycle
///
/// 1. **Domain event**: recorded by an aggregate's command method
/// 2. **UncommittedEvent**: serialized, tagged with its type and aggregate type
/// 3. **StoredEvent**: persisted with an assigned `sequence` and `recorded_at`
/// 4. **EventEnvelope**: published to the event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_type: String,

    pub event_type: String,
    pub schema_version: u32,

    pub payload: JsonValue,
}

impl UncommittedEvent {
    /// Serialize a typed domain event, keeping the metadata needed to route and
    /// decode it later.
    pub fn from_typed<E>(aggregate_type: impl Into<String>, event: &E) -> Result<Self, serde_json::Error>
    where
        E: Event + Serialize,
    {
        Ok(Self {
            event_id: Uuid::now_v7(),
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            schema_version: event.schema_version(),
            payload: serde_json::to_value(event)?,
        })
    }
}

/// A stored event in an append-only stream.
///
/// ## Sequence Numbers
///
/// Assigned by the log during append:
/// - **Contiguous**: the first event of a stream is 0, then 1, 2, ...
/// - **Stream-scoped**: there is no global order across streams
/// - **Immutable**: never reassigned or reused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub stream_id: AggregateId,
    pub aggregate_type: String,

    pub sequence: u64,

    pub event_type: String,
    pub schema_version: u32,
    pub recorded_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    /// Convert a stored event into an envelope for publication.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.stream_id,
            self.aggregate_type.clone(),
            self.sequence,
            self.event_type.clone(),
            self.recorded_at,
            self.payload.clone(),
        )
    }
}

/// Events for one stream within an append batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub stream_id: AggregateId,
    pub expected: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
}

/// Event log operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventLogError {
    #[error("version conflict on stream {stream_id}: expected {expected}, actual {}", display_version(.actual))]
    VersionConflict {
        stream_id: AggregateId,
        expected: ExpectedVersion,
        actual: Option<u64>,
    },

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event log unavailable: {0}")]
    Unavailable(String),
}

fn display_version(version: &Option<u64>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "no stream".to_string(),
    }
}

/// Append-only event log.
///
/// ## Append Semantics
///
/// `append_batch()`:
/// - Checks every stream's `ExpectedVersion` before writing anything
/// - Assigns contiguous sequence numbers per stream
/// - Persists the whole batch atomically (all streams or none)
///
/// A stale expectation fails with `VersionConflict`; the log never reorders
/// or overwrites.
///
/// ## Read Semantics
///
/// `read_stream()` returns one stream in sequence order, or an empty vector
/// when the stream has never been written. `read_all()` returns every event,
/// ordered by `(stream_id, sequence)`.
pub trait EventLog: Send + Sync {
    /// Atomically append events to one or more streams.
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventLogError>;

    /// Load the full stream, in sequence order.
    fn read_stream(&self, stream_id: AggregateId) -> Result<Vec<StoredEvent>, EventLogError>;

    /// Load every stream, ordered by `(stream_id, sequence)`.
    fn read_all(&self) -> Result<Vec<StoredEvent>, EventLogError>;

    /// Append events to a single stream.
    fn append(
        &self,
        stream_id: AggregateId,
        expected: ExpectedVersion,
        events: Vec<UncommittedEvent>,
    ) -> Result<Vec<StoredEvent>, EventLogError> {
        self.append_batch(vec![StreamAppend {
            stream_id,
            expected,
            events,
        }])
    }

    /// Highest sequence of a stream, `None` if it has never been written.
    fn stream_version(&self, stream_id: AggregateId) -> Result<Option<u64>, EventLogError> {
        Ok(self.read_stream(stream_id)?.last().map(|e| e.sequence))
    }
}

impl<L> EventLog for Arc<L>
where
    L: EventLog + ?Sized,
{
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventLogError> {
        (**self).append_batch(batch)
    }

    fn read_stream(&self, stream_id: AggregateId) -> Result<Vec<StoredEvent>, EventLogError> {
        (**self).read_stream(stream_id)
    }

    fn read_all(&self) -> Result<Vec<StoredEvent>, EventLogError> {
        (**self).read_all()
    }

    fn stream_version(&self, stream_id: AggregateId) -> Result<Option<u64>, EventLogError> {
        (**self).stream_version(stream_id)
    }
}
