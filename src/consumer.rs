// src/consumer.rs
use crate::admission::AdmissionLock;
use crate::envelope::{EnvelopeError, JobEnvelope};
use crate::queue::{MessageQueue, QueueError, QueueMessage};
use crate::task_router::{HandlerError, TaskRouter};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Timed out waiting for the processing lock ({task_type} {message_id})")]
    ConcurrencyTimeout {
        task_type: String,
        message_id: String,
    },
    #[error("{task_type} handler failed for {message_id}: {source}")]
    HandlerExecution {
        task_type: String,
        message_id: String,
        #[source]
        source: HandlerError,
    },
    #[error("Poison message {message_id}: {source}")]
    PoisonMessage {
        message_id: String,
        #[source]
        source: EnvelopeError,
    },
    #[error("Message {message_id} gave up after {attempts} deliveries (max {max_retries})")]
    RetriesExhausted {
        message_id: String,
        attempts: u32,
        max_retries: u32,
    },
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub max_messages: usize,
    pub wait_time: Duration,
    pub poll_interval: Duration,
    pub max_retries: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_messages: 5,
            wait_time: Duration::from_secs(20),
            poll_interval: Duration::from_millis(2000),
            max_retries: 3,
        }
    }
}

/// What happened to one message in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Completed,
    Unrecognized,
    Poisoned,
    Exhausted,
    /// Lock wait timed out; the message stays for redelivery.
    Deferred,
    /// Handler failed; the message stays for redelivery.
    Failed,
}

impl MessageOutcome {
    pub fn deletes_message(self) -> bool {
        !matches!(self, MessageOutcome::Deferred | MessageOutcome::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    pub completed: usize,
    pub unrecognized: usize,
    pub poisoned: usize,
    pub exhausted: usize,
    pub deferred: usize,
    pub failed: usize,
}

impl CycleReport {
    fn count(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Completed => self.completed += 1,
            MessageOutcome::Unrecognized => self.unrecognized += 1,
            MessageOutcome::Poisoned => self.poisoned += 1,
            MessageOutcome::Exhausted => self.exhausted += 1,
            MessageOutcome::Deferred => self.deferred += 1,
            MessageOutcome::Failed => self.failed += 1,
        }
    }
}

/// Polls the queue on a fixed delay and drives messages through the
/// admission lock and the router, one message at a time.
pub struct QueueConsumer {
    queue: Arc<dyn MessageQueue>,
    router: Arc<TaskRouter>,
    lock: Arc<AdmissionLock>,
    config: ConsumerConfig,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        router: Arc<TaskRouter>,
        lock: Arc<AdmissionLock>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            router,
            lock,
            config,
        }
    }

    /// Runs polling cycles until `shutdown` flips to true. An admitted job
    /// is always allowed to finish before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "👷 Queue consumer started (every {:?}, up to {} messages)",
            self.config.poll_interval,
            self.config.max_messages
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.poll_once().await {
                Ok(report) if report.received > 0 => log::info!("📊 Cycle done: {:?}", report),
                Ok(_) => {}
                Err(e) => log::error!("❌ Polling failed: {}", e),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        log::info!("🛑 Queue consumer stopped");
    }

    /// One polling cycle. Messages are processed sequentially.
    pub async fn poll_once(&self) -> Result<CycleReport, QueueError> {
        let messages = self
            .queue
            .receive(self.config.max_messages, self.config.wait_time)
            .await?;

        let mut report = CycleReport {
            received: messages.len(),
            ..Default::default()
        };
        for message in messages {
            let outcome = self.process(&message).await;
            report.count(outcome);
        }
        Ok(report)
    }

    async fn process(&self, message: &QueueMessage) -> MessageOutcome {
        let attempt = message.delivery_attempt();
        let (outcome, result) = self.dispatch(message, attempt).await;

        match &result {
            Ok(()) => log::info!(
                "✅ Message {} finished as {:?} (attempt {})",
                message.message_id,
                outcome,
                attempt
            ),
            Err(e @ JobError::ConcurrencyTimeout { .. }) => log::warn!("⚠️ {}", e),
            Err(e) => log::error!("❌ {}", e),
        }

        if outcome.deletes_message() {
            if let Err(e) = self.queue.delete(&message.receipt_handle).await {
                log::error!("❌ Failed to delete message {}: {}", message.message_id, e);
            }
        }
        outcome
    }

    async fn dispatch(
        &self,
        message: &QueueMessage,
        attempt: u32,
    ) -> (MessageOutcome, Result<(), JobError>) {
        // 1. Parse; structurally invalid bodies never become valid
        let envelope = match JobEnvelope::parse(&message.body, attempt) {
            Ok(envelope) => envelope,
            Err(source) => {
                return (
                    MessageOutcome::Poisoned,
                    Err(JobError::PoisonMessage {
                        message_id: message.message_id.clone(),
                        source,
                    }),
                )
            }
        };
        log::info!(
            "📨 Received {} message {} (attempt {})",
            envelope.task_type,
            message.message_id,
            attempt
        );

        // 2. Retry ceiling, counted by the queue itself
        if attempt > self.config.max_retries {
            return (
                MessageOutcome::Exhausted,
                Err(JobError::RetriesExhausted {
                    message_id: message.message_id.clone(),
                    attempts: attempt,
                    max_retries: self.config.max_retries,
                }),
            );
        }

        // 3. Admission
        let permit = match self
            .lock
            .acquire(&envelope.task_type, &message.message_id)
            .await
        {
            Some(permit) => permit,
            None => {
                return (
                    MessageOutcome::Deferred,
                    Err(JobError::ConcurrencyTimeout {
                        task_type: envelope.task_type.clone(),
                        message_id: message.message_id.clone(),
                    }),
                )
            }
        };

        // 4. Route; the permit goes back on every path out of here
        let routed = self.router.route(&envelope).await;
        self.lock.release(permit);

        match routed {
            Ok(true) => (MessageOutcome::Completed, Ok(())),
            Ok(false) => (MessageOutcome::Unrecognized, Ok(())),
            Err(source) => (
                MessageOutcome::Failed,
                Err(JobError::HandlerExecution {
                    task_type: envelope.task_type,
                    message_id: message.message_id.clone(),
                    source,
                }),
            ),
        }
    }
}
