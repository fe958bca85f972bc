//! In-memory command queue for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use checkin_core::MessageId;

use crate::queue::{CommandQueue, QueueError, QueuedCommand};
use crate::SerializedCommand;

#[derive(Debug, Default)]
struct State {
    /// Monotonic enqueue position; restores producer order on redelivery.
    next_position: u64,
    ready: VecDeque<(u64, QueuedCommand)>,
    in_flight: HashMap<MessageId, (u64, QueuedCommand)>,
    closed: bool,
}

/// In-memory queue.
///
/// - No IO
/// - Blocking `dequeue` with timeout (condition variable)
/// - In-flight tracking for at-least-once redelivery
#[derive(Debug, Default)]
pub struct InMemoryCommandQueue {
    state: Mutex<State>,
    available: Condvar,
}

impl InMemoryCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop accepting messages. Consumers drain what is left, then see `Closed`.
    pub fn close(&self) {
        self.peek().closed = true;
        self.available.notify_all();
    }

    /// Number of messages dequeued but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.peek().in_flight.len()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, QueueError> {
        self.state.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Read-only access for counters; a poisoned lock still holds valid counts.
    fn peek(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandQueue for InMemoryCommandQueue {
    fn enqueue(&self, command: SerializedCommand) -> Result<MessageId, QueueError> {
        let mut state = self.lock()?;
        if state.closed {
            return Err(QueueError::Closed);
        }

        let message_id = MessageId::new();
        let position = state.next_position;
        state.next_position += 1;
        state.ready.push_back((
            position,
            QueuedCommand {
                message_id,
                command,
                attempt: 1,
                enqueued_at: Utc::now(),
            },
        ));
        drop(state);

        self.available.notify_one();
        Ok(message_id)
    }

    fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedCommand>, QueueError> {
        // `None` means the timeout is too large to represent: wait indefinitely.
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock()?;

        loop {
            if let Some((position, message)) = state.ready.pop_front() {
                state
                    .in_flight
                    .insert(message.message_id, (position, message.clone()));
                return Ok(Some(message));
            }

            if state.closed {
                return Err(QueueError::Closed);
            }

            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.available
                        .wait_timeout(state, deadline - now)
                        .map_err(|_| QueueError::Poisoned)?
                        .0
                }
                None => self.available.wait(state).map_err(|_| QueueError::Poisoned)?,
            };
        }
    }

    fn ack(&self, message_id: MessageId) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        state
            .in_flight
            .remove(&message_id)
            .map(|_| ())
            .ok_or(QueueError::UnknownMessage(message_id))
    }

    fn nack(&self, message_id: MessageId) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        let (position, mut message) = state
            .in_flight
            .remove(&message_id)
            .ok_or(QueueError::UnknownMessage(message_id))?;

        message.attempt += 1;
        state.ready.push_front((position, message));
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    fn redeliver_unacked(&self) -> Result<usize, QueueError> {
        let mut state = self.lock()?;

        let mut unacked: Vec<(u64, QueuedCommand)> = state.in_flight.drain().map(|(_, v)| v).collect();
        unacked.sort_by_key(|(position, _)| *position);
        let moved = unacked.len();

        for (position, mut message) in unacked.into_iter().rev() {
            message.attempt += 1;
            state.ready.push_front((position, message));
        }
        drop(state);

        if moved > 0 {
            debug!(moved, "redelivering unacknowledged commands");
            self.available.notify_all();
        }
        Ok(moved)
    }

    fn pending(&self) -> usize {
        self.peek().ready.len()
    }
}
