//! Aggregate root trait for event-sourced domain models.

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Sequence number of the last **persisted** event this instance has seen.
    ///
    /// `None` means the stream has never been written (a freshly created
    /// aggregate whose first events are still only recorded in memory).
    /// Sequences start at 0, so an aggregate loaded from a one-event stream
    /// reports `Some(0)`.
    fn version(&self) -> Option<u64>;
}

/// Optimistic concurrency expectation for a stream append.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// Require the stream to be empty.
    NoStream,
    /// Require the stream's highest sequence to be exactly this value.
    Exact(u64),
}

impl ExpectedVersion {
    /// The expectation matching an aggregate's last-known version.
    pub fn from_version(version: Option<u64>) -> Self {
        match version {
            None => ExpectedVersion::NoStream,
            Some(v) => ExpectedVersion::Exact(v),
        }
    }

    /// Whether a stream whose highest sequence is `actual` satisfies this expectation.
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::NoStream, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }
}

impl core::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ExpectedVersion::Any => f.write_str("any"),
            ExpectedVersion::NoStream => f.write_str("no stream"),
            ExpectedVersion::Exact(v) => write!(f, "{v}"),
        }
    }
}

/// Event-sourced aggregate semantics.
///
/// - **Decision logic** lives in command-shaped methods on the concrete type.
///   They validate against current state and, on success, *record* events.
///   Recording applies the event to in-memory state and keeps it pending until
///   the repository persists it.
/// - **State evolution** is `apply`, a single fold over the event sum type.
///
/// Aggregates must not perform IO or side effects.
pub trait Aggregate: AggregateRoot + Sized {
    /// The event sum type of this aggregate's stream.
    type Event: Clone + core::fmt::Debug;

    /// Stable aggregate type name stored alongside every event (e.g. "building").
    const AGGREGATE_TYPE: &'static str;

    /// Empty instance used as the starting point of a replay.
    fn blank() -> Self;

    /// Evolve in-memory state from a single event.
    ///
    /// Must be deterministic: the same event sequence always yields the same
    /// state, on any machine, at any time.
    fn apply(&mut self, event: &Self::Event);

    /// Record that persisted history up to and including `version` is reflected
    /// in this instance.
    fn mark_persisted(&mut self, version: u64);

    /// Drain the events recorded since load/creation (not yet persisted), in
    /// recording order.
    fn take_recorded(&mut self) -> Vec<Self::Event>;
}

/// Rebuild an aggregate by folding its full history, in order, from sequence 0.
///
/// Returns `None` for an empty history (the aggregate does not exist).
pub fn rehydrate<'a, A>(history: impl IntoIterator<Item = &'a A::Event>) -> Option<A>
where
    A: Aggregate,
    A::Event: 'a,
{
    let mut aggregate = A::blank();
    let mut version: Option<u64> = None;

    for event in history {
        aggregate.apply(event);
        version = Some(version.map_or(0, |v| v + 1));
    }

    let version = version?;
    aggregate.mark_persisted(version);
    Some(aggregate)
}
