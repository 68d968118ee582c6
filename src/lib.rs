// src/lib.rs

pub mod action_router;
pub mod admission;
pub mod blob_store;
pub mod commands;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod handlers;
pub mod history;
pub mod keyframe;
pub mod project_store;
pub mod queue;
pub mod renderer;
pub mod requests;
pub mod segment;
pub mod session;
pub mod spool_queue;
pub mod task_router;
pub mod timeline;
pub mod validator;


use admission::AdmissionLock;
use blob_store::{BlobStore, HttpBlobStore, LocalBlobStore};
use config::{AppConfig, QueueBackend};
use consumer::QueueConsumer;
use envelope::TaskType;
use handlers::{CommandHandler, ExportHandler};
use project_store::{FileProjectStore, ProjectStore};
use queue::{InMemoryQueue, MessageQueue};
use renderer::FfmpegRenderer;
use session::SessionStore;
use spool_queue::SpoolQueue;
use std::sync::Arc;
use std::time::Duration;
use task_router::TaskRouter;
use tokio::sync::watch;

/// Everything one worker process shares: stores, queue, the single
/// admission lock, and the consumer that ties them together.
pub struct Worker {
    pub config: AppConfig,
    pub sessions: Arc<SessionStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub lock: Arc<AdmissionLock>,
    pub consumer: Arc<QueueConsumer>,
}

impl Worker {
    pub fn build(config: AppConfig) -> Result<Self, String> {
        // 1. Storage
        let projects: Arc<dyn ProjectStore> = Arc::new(
            FileProjectStore::new(config.projects_dir()).map_err(|e| e.to_string())?,
        );
        let blobs: Arc<dyn BlobStore> = match &config.blob_base_url {
            Some(url) => {
                log::info!("☁️ Using HTTP blob store at {}", url);
                Arc::new(HttpBlobStore::new(url, config.blob_token.clone()))
            }
            None => Arc::new(LocalBlobStore::new(config.blobs_dir())),
        };
        let sessions = Arc::new(SessionStore::new(projects.clone(), config.history_depth));

        // 2. Handlers
        let mut router = TaskRouter::new();
        router.register(
            TaskType::VideoExport,
            Arc::new(ExportHandler::new(
                projects,
                Arc::new(FfmpegRenderer::new(&config.ffmpeg)),
                blobs,
                config.work_dir(),
            )),
        );
        for (task_type, command_line) in &config.task_commands {
            if let Some(handler) = CommandHandler::from_command_line(*task_type, command_line) {
                router.register(*task_type, Arc::new(handler));
            }
        }
        log::info!("🧭 Registered handlers: {:?}", router.registered_types());

        // 3. Queue, lock, consumer
        let queue: Arc<dyn MessageQueue> = match &config.queue {
            QueueBackend::Spool(dir) => {
                log::info!("📥 Reading jobs from spool directory {:?}", dir);
                Arc::new(
                    SpoolQueue::new(dir, config.visibility_timeout).map_err(|e| e.to_string())?,
                )
            }
            QueueBackend::Memory => {
                log::warn!("⚠️ In-memory queue: only this process can enqueue jobs");
                Arc::new(InMemoryQueue::new(config.visibility_timeout))
            }
        };
        let lock = Arc::new(AdmissionLock::new(config.lock_timeout));
        let consumer = Arc::new(QueueConsumer::new(
            queue.clone(),
            Arc::new(router),
            lock.clone(),
            config.consumer_config(),
        ));

        Ok(Self {
            config,
            sessions,
            queue,
            lock,
            consumer,
        })
    }

    /// Runs the consumer and the idle-session sweeper until `shutdown` fires.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let sweeper = {
            let sessions = self.sessions.clone();
            let max_idle = self.config.session_idle;
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(60));
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            let expired = sessions.expire_idle(max_idle);
                            if !expired.is_empty() {
                                log::info!("🧹 Expired {} idle sessions", expired.len());
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            })
        };

        self.consumer.run(shutdown).await;
        let _ = sweeper.await;
    }
}

pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");

    let result = runtime.block_on(async move {
        let worker = Worker::build(config)?;
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("🛑 Ctrl-C received, finishing current work");
            }
            let _ = tx.send(true);
        });

        worker.run(rx).await;
        Ok::<(), String>(())
    });

    if let Err(e) = result {
        log::error!("❌ Worker failed to start: {}", e);
        std::process::exit(1);
    }
}
