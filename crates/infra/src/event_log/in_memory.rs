use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;

use checkin_core::AggregateId;

use super::r#trait::{EventLog, EventLogError, StoredEvent, StreamAppend};

/// In-memory append-only event log.
///
/// Intended for tests/dev. A single write lock serializes appends, which also
/// makes multi-stream batches atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    streams: RwLock<BTreeMap<AggregateId, Vec<StoredEvent>>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events across all streams.
    pub fn len(&self) -> usize {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current_version(stream: Option<&Vec<StoredEvent>>) -> Option<u64> {
        stream.and_then(|s| s.last()).map(|e| e.sequence)
    }

    fn validate(
        streams: &BTreeMap<AggregateId, Vec<StoredEvent>>,
        batch: &[StreamAppend],
    ) -> Result<(), EventLogError> {
        let mut seen = HashSet::new();

        for append in batch {
            if !seen.insert(append.stream_id) {
                return Err(EventLogError::InvalidAppend(format!(
                    "stream {} appears twice in one batch",
                    append.stream_id
                )));
            }

            let existing = streams.get(&append.stream_id);
            let actual = Self::current_version(existing);
            if !append.expected.matches(actual) {
                return Err(EventLogError::VersionConflict {
                    stream_id: append.stream_id,
                    expected: append.expected,
                    actual,
                });
            }

            // Enforce aggregate type stability across the stream.
            let stream_type = existing
                .and_then(|s| s.first())
                .map(|e| e.aggregate_type.as_str())
                .or_else(|| append.events.first().map(|e| e.aggregate_type.as_str()));

            if let Some(stream_type) = stream_type {
                if let Some((idx, e)) = append
                    .events
                    .iter()
                    .enumerate()
                    .find(|(_, e)| e.aggregate_type != stream_type)
                {
                    return Err(EventLogError::InvalidAppend(format!(
                        "stream {} has aggregate type '{}', event {idx} has '{}'",
                        append.stream_id, stream_type, e.aggregate_type
                    )));
                }
            }
        }

        Ok(())
    }
}

impl EventLog for InMemoryEventLog {
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventLogError> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventLogError::Unavailable("lock poisoned".to_string()))?;

        // Check everything first so a failure leaves every stream untouched.
        Self::validate(&streams, &batch)?;

        let recorded_at = Utc::now();
        let mut committed = Vec::new();

        for append in batch {
            if append.events.is_empty() {
                continue;
            }

            let stream = streams.entry(append.stream_id).or_default();
            let mut next = Self::current_version(Some(stream)).map_or(0, |v| v + 1);

            for e in append.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    stream_id: append.stream_id,
                    aggregate_type: e.aggregate_type,
                    sequence: next,
                    event_type: e.event_type,
                    schema_version: e.schema_version,
                    recorded_at,
                    payload: e.payload,
                };
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn read_stream(&self, stream_id: AggregateId) -> Result<Vec<StoredEvent>, EventLogError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventLogError::Unavailable("lock poisoned".to_string()))?;

        Ok(streams.get(&stream_id).cloned().unwrap_or_default())
    }

    fn read_all(&self) -> Result<Vec<StoredEvent>, EventLogError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventLogError::Unavailable("lock poisoned".to_string()))?;

        Ok(streams.values().flatten().cloned().collect())
    }

    fn stream_version(&self, stream_id: AggregateId) -> Result<Option<u64>, EventLogError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventLogError::Unavailable("lock poisoned".to_string()))?;

        Ok(Self::current_version(streams.get(&stream_id)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use checkin_core::ExpectedVersion;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::event_log::UncommittedEvent;

    fn event(n: u32) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_type: "test".to_string(),
            event_type: "test.happened".to_string(),
            schema_version: 1,
            payload: json!({ "n": n }),
        }
    }

    #[test]
    fn sequences_start_at_zero_and_are_contiguous() {
        let log = InMemoryEventLog::new();
        let stream = AggregateId::new();

        let first = log
            .append(stream, ExpectedVersion::NoStream, vec![event(0), event(1)])
            .unwrap();
        assert_eq!(first.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![0, 1]);

        let second = log.append(stream, ExpectedVersion::Exact(1), vec![event(2)]).unwrap();
        assert_eq!(second[0].sequence, 2);
        assert_eq!(log.stream_version(stream).unwrap(), Some(2));

        let payloads: Vec<_> = log
            .read_stream(stream)
            .unwrap()
            .into_iter()
            .map(|e| e.payload["n"].as_u64().unwrap())
            .collect();
        assert_eq!(payloads, vec![0, 1, 2]);
    }

    #[test]
    fn unknown_stream_reads_empty() {
        let log = InMemoryEventLog::new();
        assert!(log.read_stream(AggregateId::new()).unwrap().is_empty());
        assert_eq!(log.stream_version(AggregateId::new()).unwrap(), None);
    }

    #[test]
    fn stale_expectation_is_a_version_conflict() {
        let log = InMemoryEventLog::new();
        let stream = AggregateId::new();
        log.append(stream, ExpectedVersion::NoStream, vec![event(0)]).unwrap();

        let err = log
            .append(stream, ExpectedVersion::NoStream, vec![event(1)])
            .unwrap_err();
        assert_eq!(
            err,
            EventLogError::VersionConflict {
                stream_id: stream,
                expected: ExpectedVersion::NoStream,
                actual: Some(0),
            }
        );
        assert_eq!(log.read_stream(stream).unwrap().len(), 1);
    }

    #[test]
    fn failed_batch_writes_nothing() {
        let log = InMemoryEventLog::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        log.append(b, ExpectedVersion::NoStream, vec![event(0)]).unwrap();

        let err = log
            .append_batch(vec![
                StreamAppend {
                    stream_id: a,
                    expected: ExpectedVersion::NoStream,
                    events: vec![event(1)],
                },
                StreamAppend {
                    stream_id: b,
                    expected: ExpectedVersion::NoStream,
                    events: vec![event(2)],
                },
            ])
            .unwrap_err();

        assert!(matches!(err, EventLogError::VersionConflict { .. }));
        assert!(log.read_stream(a).unwrap().is_empty());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn aggregate_type_is_stable_per_stream() {
        let log = InMemoryEventLog::new();
        let stream = AggregateId::new();
        log.append(stream, ExpectedVersion::NoStream, vec![event(0)]).unwrap();

        let mut other = event(1);
        other.aggregate_type = "other".to_string();
        let err = log
            .append(stream, ExpectedVersion::Exact(0), vec![other])
            .unwrap_err();
        assert!(matches!(err, EventLogError::InvalidAppend(_)));
    }

    #[test]
    fn read_all_orders_by_stream_then_sequence() {
        let log = InMemoryEventLog::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        log.append(b, ExpectedVersion::Any, vec![event(0)]).unwrap();
        log.append(a, ExpectedVersion::Any, vec![event(1), event(2)]).unwrap();
        log.append(b, ExpectedVersion::Any, vec![event(3)]).unwrap();

        let keys: Vec<_> = log
            .read_all()
            .unwrap()
            .into_iter()
            .map(|e| (e.stream_id, e.sequence))
            .collect();

        let mut expected = vec![(a, 0), (a, 1), (b, 0), (b, 1)];
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn concurrent_appends_with_same_expectation_have_one_winner() {
        let log = Arc::new(InMemoryEventLog::new());
        let stream = AggregateId::new();
        log.append(stream, ExpectedVersion::NoStream, vec![event(0)]).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|n| {
                let log = log.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    log.append(stream, ExpectedVersion::Exact(0), vec![event(n)])
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(EventLogError::VersionConflict { .. })))
            .count();

        assert_eq!((wins, conflicts), (1, 1));
        assert_eq!(log.stream_version(stream).unwrap(), Some(1));
    }

    #[test]
    fn len_still_counts_after_a_writer_panicked() {
        let log = Arc::new(InMemoryEventLog::new());
        log.append(AggregateId::new(), ExpectedVersion::NoStream, vec![event(0), event(1)])
            .unwrap();

        let writer = log.clone();
        let _ = thread::spawn(move || {
            let _guard = writer.streams.write().unwrap();
            panic!("poison the log lock");
        })
        .join();

        assert!(log.streams.is_poisoned());
        assert_eq!(log.len(), 2);
        assert!(!log.is_empty());
    }
}
