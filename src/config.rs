// src/config.rs
use crate::consumer::ConsumerConfig;
use crate::envelope::TaskType;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const PREFIX: &str = "CUTLINE_";

/// Where the worker reads jobs from.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueBackend {
    /// Spool directory other processes drop job files into.
    Spool(PathBuf),
    /// In-process only; nothing outside the worker can enqueue.
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub queue: QueueBackend,
    pub poll_interval: Duration,
    pub max_messages: usize,
    pub wait_time: Duration,
    pub visibility_timeout: Duration,
    pub max_retries: u32,
    pub lock_timeout: Duration,
    pub history_depth: usize,
    pub session_idle: chrono::Duration,
    pub blob_base_url: Option<String>,
    pub blob_token: Option<String>,
    pub ffmpeg: String,
    pub task_commands: HashMap<TaskType, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Debug>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    let key = format!("{}{}", PREFIX, name);
    match lookup(&key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!(
                "⚠️ {}='{}' is not valid, using default {:?}",
                key,
                raw,
                default
            );
            default
        }),
        None => default,
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(&format!("{}{}", PREFIX, name)).filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Self {
        if dotenv::dotenv().is_ok() {
            log::info!("📄 Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut task_commands = HashMap::new();
        for task_type in TaskType::ALL {
            if let Some(cmd) = non_empty(&lookup, &format!("TASK_COMMAND_{}", task_type)) {
                task_commands.insert(task_type, cmd);
            }
        }

        let data_dir = non_empty(&lookup, "DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let spool = || {
            QueueBackend::Spool(
                non_empty(&lookup, "QUEUE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("queue")),
            )
        };
        let queue = match non_empty(&lookup, "QUEUE").map(|v| v.trim().to_ascii_lowercase()) {
            None => spool(),
            Some(kind) if kind == "spool" => spool(),
            Some(kind) if kind == "memory" => QueueBackend::Memory,
            Some(other) => {
                log::warn!("⚠️ {}QUEUE='{}' is not valid, using spool", PREFIX, other);
                spool()
            }
        };

        Self {
            data_dir,
            queue,
            poll_interval: Duration::from_millis(parse_or(&lookup, "POLL_INTERVAL_MS", 2000)),
            max_messages: parse_or(&lookup, "MAX_MESSAGES", 5),
            wait_time: Duration::from_secs(parse_or(&lookup, "WAIT_SECONDS", 20)),
            visibility_timeout: Duration::from_secs(parse_or(
                &lookup,
                "VISIBILITY_TIMEOUT_SECONDS",
                30,
            )),
            max_retries: parse_or(&lookup, "MAX_RETRIES", 3),
            lock_timeout: Duration::from_secs(parse_or(&lookup, "LOCK_TIMEOUT_SECONDS", 1800)),
            history_depth: parse_or(&lookup, "HISTORY_DEPTH", 50),
            session_idle: chrono::Duration::minutes(parse_or(&lookup, "SESSION_IDLE_MINUTES", 120)),
            blob_base_url: non_empty(&lookup, "BLOB_BASE_URL"),
            blob_token: non_empty(&lookup, "BLOB_TOKEN"),
            ffmpeg: non_empty(&lookup, "FFMPEG").unwrap_or_else(|| "ffmpeg".to_string()),
            task_commands,
        }
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.data_dir.join("work")
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            max_messages: self.max_messages,
            wait_time: self.wait_time,
            poll_interval: self.poll_interval,
            max_retries: self.max_retries,
        }
    }
}
