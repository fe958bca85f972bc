//! Deferred command dispatch: commands are queued and executed later by a
//! [`CommandConsumer`](crate::workers::CommandConsumer).

use tracing::debug;

use checkin_core::MessageId;
use checkin_events::{Command, CommandQueue, QueueError, SerializedCommand};

#[derive(Debug, Clone)]
pub struct DeferredCommandBus<Q> {
    queue: Q,
}

impl<Q> DeferredCommandBus<Q>
where
    Q: CommandQueue,
{
    pub fn new(queue: Q) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Serialize and enqueue; returns as soon as the queue accepted it.
    pub fn dispatch<C: Command>(&self, command: &C) -> Result<MessageId, QueueError> {
        let serialized = command
            .to_serialized()
            .map_err(|e| QueueError::Serialize(e.to_string()))?;
        self.dispatch_serialized(serialized)
    }

    pub fn dispatch_serialized(&self, command: SerializedCommand) -> Result<MessageId, QueueError> {
        let command_type = command.command_type.clone();
        let message_id = self.queue.enqueue(command)?;
        debug!(%message_id, command_type = command_type.as_str(), "command deferred");
        Ok(message_id)
    }
}
