// src/task_router.rs
use crate::blob_store::BlobError;
use crate::envelope::{EnvelopeError, JobEnvelope, TaskType};
use crate::project_store::StoreError;
use crate::renderer::RenderError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Payload(#[from] EnvelopeError),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("Timeline could not be loaded: {0}")]
    Timeline(String),
    #[error("External command failed: {0}")]
    Command(String),
    #[error("Handler task aborted: {0}")]
    Aborted(String),
}

/// One heavy job implementation. The router awaits it to completion.
pub trait TaskHandler: Send + Sync {
    fn handle<'a>(&'a self, envelope: &'a JobEnvelope) -> BoxFuture<'a, Result<(), HandlerError>>;
}

#[derive(Default)]
pub struct TaskRouter {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl TaskRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        if self.handlers.insert(task_type, handler).is_some() {
            log::warn!("⚠️ Handler for {} replaced", task_type);
        }
    }

    pub fn registered_types(&self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|t| self.handlers.contains_key(t))
            .collect()
    }

    /// Dispatches by task type. Returns `Ok(false)` for a type nobody handles;
    /// the caller decides whether to drop it.
    pub async fn route(&self, envelope: &JobEnvelope) -> Result<bool, HandlerError> {
        let handler = envelope
            .known_type()
            .and_then(|task_type| self.handlers.get(&task_type));

        match handler {
            Some(handler) => {
                log::info!(
                    "🧭 Routing {} (attempt {})",
                    envelope.task_type,
                    envelope.delivery_attempt
                );
                handler.handle(envelope).await?;
                Ok(true)
            }
            None => {
                log::warn!("❓ No handler for task type '{}'", envelope.task_type);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl TaskHandler for Counting {
        fn handle<'a>(&'a self, _: &'a JobEnvelope) -> BoxFuture<'a, Result<(), HandlerError>> {
            Box::pin(async move {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    struct Failing;

    impl TaskHandler for Failing {
        fn handle<'a>(&'a self, _: &'a JobEnvelope) -> BoxFuture<'a, Result<(), HandlerError>> {
            Box::pin(async { Err(HandlerError::Command("boom".into())) })
        }
    }

    #[tokio::test]
    async fn test_route_dispatches_by_type() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let mut router = TaskRouter::new();
        router.register(TaskType::VideoFilter, counter.clone());
        router.register(TaskType::AspectRatio, Arc::new(Failing));

        let filter = JobEnvelope::new(TaskType::VideoFilter, Map::new());
        assert!(router.route(&filter).await.unwrap());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        let unhandled = JobEnvelope::new(TaskType::PodcastClip, Map::new());
        assert!(!router.route(&unhandled).await.unwrap());

        let failing = JobEnvelope::new(TaskType::AspectRatio, Map::new());
        assert!(router.route(&failing).await.is_err());

        assert_eq!(
            router.registered_types(),
            vec![TaskType::VideoFilter, TaskType::AspectRatio]
        );
    }

    #[tokio::test]
    async fn test_unknown_type_string() {
        let router = TaskRouter::new();
        let env = JobEnvelope::parse(r#"{"taskType":"MYSTERY"}"#, 1).unwrap();
        assert!(!router.route(&env).await.unwrap());
    }
}
