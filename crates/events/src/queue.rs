//! Command queue abstraction (transport mechanics only).
//!
//! The queue carries serialized commands from a producer (the deferred command
//! bus) to an asynchronous consumer that re-dispatches them immediately.
//!
//! ## Delivery Guarantees
//!
//! - **At-least-once**: a dequeued message stays *in flight* until it is
//!   acknowledged. A consumer that crashes between dequeue and ack leaves the
//!   message to be redelivered, so handlers may see a command more than once.
//! - **Per-producer order**: messages are dequeued in enqueue order. A message
//!   handed back with `nack` returns to the head of the queue so it is not
//!   overtaken by later messages.
//!
//! The queue is for distribution, not storage: it never touches the event log.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use checkin_core::MessageId;

use crate::SerializedCommand;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was closed; no more messages will be accepted or delivered.
    #[error("queue closed")]
    Closed,

    /// Ack/nack for a message that is not in flight.
    #[error("message {0} is not in flight")]
    UnknownMessage(MessageId),

    /// Failed to serialize the command for transport.
    #[error("failed to serialize command: {0}")]
    Serialize(String),

    /// Internal lock poisoning.
    #[error("queue lock poisoned")]
    Poisoned,
}

/// A command as it travels through the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCommand {
    pub message_id: MessageId,
    pub command: SerializedCommand,
    /// Delivery attempt, starting at 1 for the first delivery.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// At-least-once, per-producer ordered command transport.
pub trait CommandQueue: Send + Sync {
    /// Place a serialized command at the tail of the queue.
    fn enqueue(&self, command: SerializedCommand) -> Result<MessageId, QueueError>;

    /// Take the next message, waiting up to `timeout` for one to arrive.
    ///
    /// This is the only suspension point in the pipeline. The returned message
    /// is in flight until `ack`/`nack`.
    fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedCommand>, QueueError>;

    /// Processing finished (successfully or terminally); forget the message.
    fn ack(&self, message_id: MessageId) -> Result<(), QueueError>;

    /// Hand an in-flight message back to the head of the queue for another
    /// attempt (the attempt counter is incremented).
    fn nack(&self, message_id: MessageId) -> Result<(), QueueError>;

    /// Return every unacknowledged in-flight message to the head of the queue,
    /// in original enqueue order (crash recovery). Returns how many moved.
    fn redeliver_unacked(&self) -> Result<usize, QueueError>;

    /// Number of messages waiting (not counting in-flight ones).
    fn pending(&self) -> usize;
}

impl<Q> CommandQueue for Arc<Q>
where
    Q: CommandQueue + ?Sized,
{
    fn enqueue(&self, command: SerializedCommand) -> Result<MessageId, QueueError> {
        (**self).enqueue(command)
    }

    fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedCommand>, QueueError> {
        (**self).dequeue(timeout)
    }

    fn ack(&self, message_id: MessageId) -> Result<(), QueueError> {
        (**self).ack(message_id)
    }

    fn nack(&self, message_id: MessageId) -> Result<(), QueueError> {
        (**self).nack(message_id)
    }

    fn redeliver_unacked(&self) -> Result<usize, QueueError> {
        (**self).redeliver_unacked()
    }

    fn pending(&self) -> usize {
        (**self).pending()
    }
}
