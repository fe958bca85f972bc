//! Loading and saving event-sourced aggregates.
//!
//! `AggregateRepository` loads aggregates from the log. Saving goes through a
//! `UnitOfWork`, the transaction boundary the command bus hands to handlers:
//! loads read committed state, saves are only staged, and `commit` appends
//! everything staged in one atomic batch. The command bus publishes the
//! committed events, so a save outside a dispatched command reaches no
//! projector or listener.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use checkin_core::{rehydrate, Aggregate, AggregateId, ExpectedVersion};
use checkin_events::Event;

use crate::event_log::{EventLog, EventLogError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("{aggregate_type} {id} not found")]
    AggregateNotFound {
        aggregate_type: &'static str,
        id: AggregateId,
    },

    #[error("version conflict on stream {stream_id}: expected {expected}, actual {actual:?}")]
    VersionConflict {
        stream_id: AggregateId,
        expected: ExpectedVersion,
        actual: Option<u64>,
    },

    #[error("stream {stream_id} event {sequence} could not be decoded: {message}")]
    Deserialize {
        stream_id: AggregateId,
        sequence: u64,
        message: String,
    },

    #[error("event could not be encoded: {0}")]
    Serialize(String),

    #[error(transparent)]
    Log(EventLogError),
}

impl From<EventLogError> for RepositoryError {
    fn from(value: EventLogError) -> Self {
        match value {
            EventLogError::VersionConflict {
                stream_id,
                expected,
                actual,
            } => RepositoryError::VersionConflict {
                stream_id,
                expected,
                actual,
            },
            other => RepositoryError::Log(other),
        }
    }
}

/// Repository for one event log, generic over the aggregate type per call.
#[derive(Debug, Clone)]
pub struct AggregateRepository<L> {
    log: L,
}

impl<L> AggregateRepository<L>
where
    L: EventLog,
{
    pub fn new(log: L) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Load an aggregate by replaying its full stream.
    pub fn get<A>(&self, id: impl Into<AggregateId>) -> Result<A, RepositoryError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        load(&self.log, id.into())
    }

    /// Open a transaction against this repository's log.
    pub fn unit_of_work(&self) -> UnitOfWork<'_> {
        UnitOfWork::new(&self.log)
    }
}

/// Staged writes of one command transaction.
///
/// Dropping a unit of work without committing discards everything staged.
pub struct UnitOfWork<'a> {
    log: &'a dyn EventLog,
    staged: Vec<StreamAppend>,
}

impl<'a> UnitOfWork<'a> {
    pub fn new(log: &'a dyn EventLog) -> Self {
        Self {
            log,
            staged: Vec::new(),
        }
    }

    /// Load an aggregate from committed history.
    ///
    /// Writes staged earlier in the same unit are not visible.
    pub fn get<A>(&self, id: impl Into<AggregateId>) -> Result<A, RepositoryError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        load(self.log, id.into())
    }

    /// Stage the aggregate's recorded events for commit.
    ///
    /// The expected version is the aggregate's last-known version, so a
    /// concurrent writer to the same stream makes `commit` fail.
    pub fn add<A>(&mut self, aggregate: &mut A) -> Result<(), RepositoryError>
    where
        A: Aggregate,
        A::Id: Copy + Into<AggregateId>,
        A::Event: Event + Serialize,
    {
        let append = stage(aggregate)?;
        if !append.events.is_empty() {
            self.staged.push(append);
        }
        Ok(())
    }

    /// Number of streams with staged events.
    pub fn staged_streams(&self) -> usize {
        self.staged.len()
    }

    /// Append everything staged in one atomic batch.
    pub fn commit(self) -> Result<Vec<StoredEvent>, RepositoryError> {
        if self.staged.is_empty() {
            return Ok(vec![]);
        }
        Ok(self.log.append_batch(self.staged)?)
    }
}

fn load<A>(log: &dyn EventLog, id: AggregateId) -> Result<A, RepositoryError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let history = log.read_stream(id)?;
    validate_loaded_stream(id, &history)?;

    let events = history
        .into_iter()
        .map(|stored| {
            serde_json::from_value::<A::Event>(stored.payload).map_err(|e| RepositoryError::Deserialize {
                stream_id: id,
                sequence: stored.sequence,
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    rehydrate(&events).ok_or(RepositoryError::AggregateNotFound {
        aggregate_type: A::AGGREGATE_TYPE,
        id,
    })
}

fn stage<A>(aggregate: &mut A) -> Result<StreamAppend, RepositoryError>
where
    A: Aggregate,
    A::Id: Copy + Into<AggregateId>,
    A::Event: Event + Serialize,
{
    let stream_id: AggregateId = (*aggregate.id()).into();
    let expected = ExpectedVersion::from_version(aggregate.version());

    let events = aggregate
        .take_recorded()
        .iter()
        .map(|event| UncommittedEvent::from_typed(A::AGGREGATE_TYPE, event))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RepositoryError::Serialize(e.to_string()))?;

    Ok(StreamAppend {
        stream_id,
        expected,
        events,
    })
}

fn validate_loaded_stream(stream_id: AggregateId, stream: &[StoredEvent]) -> Result<(), RepositoryError> {
    // A misbehaving backend must not produce a silently wrong fold.
    for (idx, e) in stream.iter().enumerate() {
        if e.stream_id != stream_id {
            return Err(RepositoryError::Log(EventLogError::InvalidAppend(format!(
                "loaded stream {stream_id} contains an event of stream {} at index {idx}",
                e.stream_id
            ))));
        }
        if e.sequence != idx as u64 {
            return Err(RepositoryError::Log(EventLogError::InvalidAppend(format!(
                "loaded stream {stream_id} has sequence {} at index {idx}",
                e.sequence
            ))));
        }
    }
    Ok(())
}
