// src/queue.rs
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

pub const RECEIVE_COUNT_ATTRIBUTE: &str = "ApproximateReceiveCount";

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),
    #[error("Unknown receipt handle: {0}")]
    UnknownReceipt(String),
    #[error("Failed to acquire queue lock")]
    LockPoisoned,
    #[error("Queue storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A received message. `attributes` carry queue-native metadata such as
/// the redelivery counter; they are not part of the body.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
}

impl QueueMessage {
    /// The queue's own delivery counter. Missing or unreadable counts as 1.
    pub fn delivery_attempt(&self) -> u32 {
        self.attributes
            .get(RECEIVE_COUNT_ATTRIBUTE)
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }
}

pub trait MessageQueue: Send + Sync {
    /// Long-polls for up to `max_messages`, waiting at most `wait`.
    fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> BoxFuture<'_, Result<Vec<QueueMessage>, QueueError>>;

    fn delete<'a>(&'a self, receipt_handle: &'a str) -> BoxFuture<'a, Result<(), QueueError>>;

    /// Enqueues a body and returns the new message id.
    fn send(&self, body: String) -> BoxFuture<'_, Result<String, QueueError>>;
}

struct StoredMessage {
    message_id: String,
    body: String,
    receive_count: u32,
    invisible_until: Option<Instant>,
    receipt_handle: Option<String>,
}

/// In-process queue with visibility-timeout redelivery.
///
/// A received message stays hidden for the visibility timeout and then
/// reappears unless it was deleted, like a hosted queue would.
pub struct InMemoryQueue {
    messages: Mutex<Vec<StoredMessage>>,
    visibility_timeout: Duration,
    arrivals: Notify,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            visibility_timeout,
            arrivals: Notify::new(),
        }
    }

    /// Messages not yet deleted, visible or in flight.
    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_visible(&self, max_messages: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let mut messages = self.messages.lock().map_err(|_| QueueError::LockPoisoned)?;
        let now = Instant::now();
        let mut received = Vec::new();

        for stored in messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if stored.invisible_until.map_or(false, |until| until > now) {
                continue;
            }
            stored.receive_count += 1;
            stored.invisible_until = Some(now + self.visibility_timeout);
            let receipt = Uuid::new_v4().to_string();
            stored.receipt_handle = Some(receipt.clone());

            let mut attributes = HashMap::new();
            attributes.insert(
                RECEIVE_COUNT_ATTRIBUTE.to_string(),
                stored.receive_count.to_string(),
            );
            received.push(QueueMessage {
                message_id: stored.message_id.clone(),
                receipt_handle: receipt,
                body: stored.body.clone(),
                attributes,
            });
        }
        Ok(received)
    }
}

impl MessageQueue for InMemoryQueue {
    fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> BoxFuture<'_, Result<Vec<QueueMessage>, QueueError>> {
        Box::pin(async move {
            let deadline = Instant::now() + wait;
            loop {
                let received = self.take_visible(max_messages.max(1))?;
                if !received.is_empty() {
                    return Ok(received);
                }
                let now = Instant::now();
                if now >= deadline {
                    return Ok(received);
                }
                // Wake on a new send, or re-check shortly for expired visibility
                let step = (deadline - now).min(Duration::from_millis(100));
                let _ = tokio::time::timeout(step, self.arrivals.notified()).await;
            }
        })
    }

    fn delete<'a>(&'a self, receipt_handle: &'a str) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            let mut messages = self.messages.lock().map_err(|_| QueueError::LockPoisoned)?;
            let index = messages
                .iter()
                .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
                .ok_or_else(|| QueueError::UnknownReceipt(receipt_handle.to_string()))?;
            messages.remove(index);
            Ok(())
        })
    }

    fn send(&self, body: String) -> BoxFuture<'_, Result<String, QueueError>> {
        Box::pin(async move {
            let message_id = Uuid::new_v4().to_string();
            self.messages
                .lock()
                .map_err(|_| QueueError::LockPoisoned)?
                .push(StoredMessage {
                    message_id: message_id.clone(),
                    body,
                    receive_count: 0,
                    invisible_until: None,
                    receipt_handle: None,
                });
            self.arrivals.notify_waiters();
            Ok(message_id)
        })
    }
}
