use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use checkin_core::MessageId;
use checkin_events::{CommandQueue, QueueError, QueuedCommand, SerializedCommand};

use crate::command_bus::{CommandBus, DispatchError};

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Thread name, also used in logs.
    pub name: String,
    /// How long one dequeue waits before checking for shutdown.
    pub poll_interval: Duration,
    /// Deliveries per message before it is dead-lettered (at least 1).
    pub max_delivery_attempts: u32,
    /// Dead letters kept in memory; the oldest are dropped beyond this.
    pub max_dead_letters: usize,
}

/// Shortest poll interval; a zero wait would turn the consume loop into a spin.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            name: "command-consumer".to_string(),
            poll_interval: Duration::from_millis(100),
            max_delivery_attempts: 5,
            max_dead_letters: 1_000,
        }
    }
}

impl ConsumerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = attempts.max(1);
        self
    }

    pub fn with_max_dead_letters(mut self, max: usize) -> Self {
        self.max_dead_letters = max;
        self
    }
}

/// Consumer runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub commands_processed: u64,
    pub commands_succeeded: u64,
    pub commands_redelivered: u64,
    pub version_conflicts: u64,
    pub commands_dead_lettered: u64,
}

/// A command that will not be delivered again.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub message_id: MessageId,
    pub command: SerializedCommand,
    pub attempts: u32,
    pub last_error: String,
    /// Events the command committed before failing; empty when it failed
    /// before its commit.
    pub committed_events: Vec<Uuid>,
}

/// Result of one consumer step.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing arrived within the timeout.
    Idle,
    Succeeded,
    /// Failed; put back at the head of the queue.
    Redelivered,
    DeadLettered,
}

/// Takes deferred commands off a queue and runs them through the immediate
/// pipeline of a [`CommandBus`].
///
/// A message is acknowledged only after its transaction finished (committed,
/// published, fanned out). Failures before the commit are redelivered until
/// `max_delivery_attempts` is reached. Everything else is dead-lettered at
/// once: rejections that cannot change on retry (domain errors, unknown or
/// malformed commands) and failures after the commit, whose events are
/// already in the log and must not be recorded again.
pub struct CommandConsumer<Q> {
    bus: Arc<CommandBus>,
    queue: Q,
    config: ConsumerConfig,
    stats: Arc<Mutex<ConsumerStats>>,
    dead_letters: Arc<Mutex<VecDeque<DeadLetter>>>,
}

// Stats and dead letters stay readable after a panic elsewhere; every update
// leaves them consistent.
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<Q> CommandConsumer<Q>
where
    Q: CommandQueue + 'static,
{
    pub fn new(bus: Arc<CommandBus>, queue: Q, config: ConsumerConfig) -> Self {
        Self {
            bus,
            queue,
            config,
            stats: Arc::default(),
            dead_letters: Arc::default(),
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        relock(&self.stats).clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        relock(&self.dead_letters).iter().cloned().collect()
    }

    /// Process at most one message, waiting up to `timeout` for it.
    pub fn run_once(&self, timeout: Duration) -> Result<Delivery, QueueError> {
        let Some(message) = self.queue.dequeue(timeout)? else {
            return Ok(Delivery::Idle);
        };

        let outcome = self.bus.dispatch_serialized(&message.command);
        self.record(|s| s.commands_processed += 1);

        match outcome {
            Ok(events) => {
                self.queue.ack(message.message_id)?;
                self.record(|s| s.commands_succeeded += 1);
                debug!(
                    consumer = %self.config.name,
                    message_id = %message.message_id,
                    attempt = message.attempt,
                    events = events.len(),
                    "deferred command done"
                );
                Ok(Delivery::Succeeded)
            }
            Err(err) => self.handle_failure(message, err),
        }
    }

    /// Drain the queue until it stays empty for one poll interval.
    pub fn run_until_idle(&self) -> Result<usize, QueueError> {
        let mut handled = 0;
        while self.run_once(self.config.poll_interval)? != Delivery::Idle {
            handled += 1;
        }
        Ok(handled)
    }

    fn handle_failure(&self, message: QueuedCommand, err: DispatchError) -> Result<Delivery, QueueError> {
        if err.is_version_conflict() {
            self.record(|s| s.version_conflicts += 1);
        }

        let exhausted = message.attempt >= self.config.max_delivery_attempts;
        if exhausted || is_permanent(&err) {
            self.queue.ack(message.message_id)?;
            error!(
                consumer = %self.config.name,
                message_id = %message.message_id,
                command_type = message.command.command_type(),
                attempts = message.attempt,
                error = %err,
                "deferred command dead-lettered"
            );
            self.record(|s| s.commands_dead_lettered += 1);
            let committed_events = match &err {
                DispatchError::AfterCommit { committed, .. } => committed.clone(),
                _ => Vec::new(),
            };
            self.push_dead_letter(DeadLetter {
                message_id: message.message_id,
                attempts: message.attempt,
                last_error: err.to_string(),
                committed_events,
                command: message.command,
            });
            return Ok(Delivery::DeadLettered);
        }

        warn!(
            consumer = %self.config.name,
            message_id = %message.message_id,
            command_type = message.command.command_type(),
            attempt = message.attempt,
            version_conflict = err.is_version_conflict(),
            error = %err,
            "deferred command failed, redelivering"
        );
        self.queue.nack(message.message_id)?;
        self.record(|s| s.commands_redelivered += 1);
        Ok(Delivery::Redelivered)
    }

    fn record(&self, f: impl FnOnce(&mut ConsumerStats)) {
        f(&mut relock(&self.stats));
    }

    fn push_dead_letter(&self, letter: DeadLetter) {
        let mut dead = relock(&self.dead_letters);
        dead.push_back(letter);
        while dead.len() > self.config.max_dead_letters {
            if let Some(dropped) = dead.pop_front() {
                warn!(
                    consumer = %self.config.name,
                    message_id = %dropped.message_id,
                    "dead-letter list full, dropping oldest entry"
                );
            }
        }
    }

    /// Run the consumer on its own thread until shut down or the queue closes.
    pub fn spawn(self) -> std::io::Result<ConsumerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = self.stats.clone();
        let dead_letters = self.dead_letters.clone();

        let join = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || self.consume_loop(shutdown_rx))?;

        Ok(ConsumerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
            dead_letters,
        })
    }

    fn consume_loop(self, shutdown_rx: mpsc::Receiver<()>) {
        info!(consumer = %self.config.name, "command consumer started");

        loop {
            // Shutdown check (non-blocking)
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            match self.run_once(self.config.poll_interval) {
                Ok(_) => continue,
                Err(QueueError::Closed) => break,
                Err(err) => {
                    error!(consumer = %self.config.name, error = %err, "command queue failed");
                    thread::sleep(self.config.poll_interval);
                }
            }
        }

        info!(consumer = %self.config.name, "command consumer stopped");
    }
}

/// Failures a redelivery cannot fix, or must not attempt because the
/// command's events are already committed.
fn is_permanent(err: &DispatchError) -> bool {
    matches!(
        err,
        DispatchError::Domain(_)
            | DispatchError::NoHandler(_)
            | DispatchError::InvalidPayload(_)
            | DispatchError::ReentrancyLimit { .. }
            | DispatchError::AfterCommit { .. }
    )
}

/// Handle to observe and stop a running consumer.
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ConsumerStats>>,
    dead_letters: Arc<Mutex<VecDeque<DeadLetter>>>,
}

impl ConsumerHandle {
    /// Request graceful shutdown and wait for the consumer to stop.
    ///
    /// The message being processed, if any, finishes first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Wait for the consumer to stop on its own, i.e. after its queue was
    /// closed and drained. Returns the final statistics.
    pub fn wait(mut self) -> ConsumerStats {
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
        self.stats()
    }

    pub fn stats(&self) -> ConsumerStats {
        relock(&self.stats).clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        relock(&self.dead_letters).iter().cloned().collect()
    }
}
