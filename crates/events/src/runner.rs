//! Projection runner utilities (read model rebuilds).
//!
//! Read models are **disposable**; events are the source of truth.
//! This module provides deterministic replay with per-stream cursor tracking
//! without making storage assumptions.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use thiserror::Error;

use checkin_core::AggregateId;

use crate::{EventEnvelope, Projector, ProjectorError};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("stream {stream_id}: expected sequence {expected}, found {found}")]
    NonContiguousSequence {
        stream_id: AggregateId,
        expected: u64,
        found: u64,
    },

    #[error("projector '{projector}' failed: {source}")]
    Projector {
        projector: &'static str,
        #[source]
        source: ProjectorError,
    },
}

/// Runs envelopes through a projector and tracks progress per stream.
///
/// Streams may be interleaved (there is no global order), but within one
/// stream the runner requires sequences `0, 1, 2, ...` without gaps. Events the
/// projector is not bound to still advance the cursor.
pub struct ProjectionRunner<'p> {
    projector: &'p dyn Projector,
    cursors: HashMap<AggregateId, u64>,
}

impl<'p> ProjectionRunner<'p> {
    pub fn new(projector: &'p dyn Projector) -> Self {
        Self {
            projector,
            cursors: HashMap::new(),
        }
    }

    /// Last applied sequence for a stream, if any.
    pub fn cursor(&self, stream_id: AggregateId) -> Option<u64> {
        self.cursors.get(&stream_id).copied()
    }

    /// Apply a single envelope, enforcing contiguous per-stream sequencing.
    pub fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ReplayError> {
        let stream_id = envelope.stream_id();
        let expected = self.cursors.get(&stream_id).map_or(0, |last| last + 1);

        if envelope.sequence() != expected {
            return Err(ReplayError::NonContiguousSequence {
                stream_id,
                expected,
                found: envelope.sequence(),
            });
        }

        if self
            .projector
            .event_types()
            .contains(&envelope.event_type())
        {
            self.projector
                .apply(envelope)
                .map_err(|source| ReplayError::Projector {
                    projector: self.projector.name(),
                    source,
                })?;
        }

        self.cursors.insert(stream_id, envelope.sequence());
        Ok(())
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<JsonValue>>,
    ) -> Result<usize, ReplayError> {
        let mut applied = 0;
        for env in envelopes {
            self.apply(env)?;
            applied += 1;
        }
        Ok(applied)
    }
}
