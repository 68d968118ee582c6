// src/envelope.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Message body is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Message body must be a JSON object")]
    NotAnObject,
    #[error("Message has no taskType")]
    MissingTaskType,
    #[error("Missing payload field: {0}")]
    MissingField(String),
    #[error("Payload field '{field}' must be {expected}")]
    InvalidField { field: String, expected: &'static str },
}

/// Every kind of heavy job the worker knows about.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    VideoExport,
    ProcessSubtitles,
    VideoFilter,
    VideoSpeed,
    PodcastClip,
    AspectRatio,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::VideoExport,
        TaskType::ProcessSubtitles,
        TaskType::VideoFilter,
        TaskType::VideoSpeed,
        TaskType::PodcastClip,
        TaskType::AspectRatio,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::VideoExport => "VIDEO_EXPORT",
            TaskType::ProcessSubtitles => "PROCESS_SUBTITLES",
            TaskType::VideoFilter => "VIDEO_FILTER",
            TaskType::VideoSpeed => "VIDEO_SPEED",
            TaskType::PodcastClip => "PODCAST_CLIP",
            TaskType::AspectRatio => "ASPECT_RATIO",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown task type: {}", s))
    }
}

/// One decoded queue message: task type, flat payload, and the queue's
/// own delivery counter.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEnvelope {
    pub task_type: String,
    pub payload: Map<String, Value>,
    pub delivery_attempt: u32,
}

impl JobEnvelope {
    pub fn new(task_type: TaskType, payload: Map<String, Value>) -> Self {
        Self {
            task_type: task_type.as_str().to_string(),
            payload,
            delivery_attempt: 1,
        }
    }

    /// Decodes a message body. The type string is kept raw so that unknown
    /// types reach the router, which decides what to do with them.
    pub fn parse(body: &str, delivery_attempt: u32) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(body)?;
        let mut payload = match value {
            Value::Object(map) => map,
            _ => return Err(EnvelopeError::NotAnObject),
        };
        let task_type = match payload.remove("taskType") {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            _ => return Err(EnvelopeError::MissingTaskType),
        };
        Ok(Self {
            task_type,
            payload,
            delivery_attempt,
        })
    }

    /// Flat JSON body with `taskType` alongside the payload fields.
    pub fn to_body(&self) -> String {
        let mut body = self.payload.clone();
        body.insert("taskType".to_string(), Value::String(self.task_type.clone()));
        Value::Object(body).to_string()
    }

    pub fn known_type(&self) -> Option<TaskType> {
        self.task_type.parse().ok()
    }

    // --- Payload accessors ---

    pub fn str_field(&self, name: &str) -> Result<&str, EnvelopeError> {
        match self.payload.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(EnvelopeError::InvalidField {
                field: name.to_string(),
                expected: "a string",
            }),
            None => Err(EnvelopeError::MissingField(name.to_string())),
        }
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(|v| v.as_str())
    }

    /// Numbers may arrive either as JSON numbers or as numeric strings.
    pub fn f64_field(&self, name: &str) -> Result<f64, EnvelopeError> {
        let invalid = || EnvelopeError::InvalidField {
            field: name.to_string(),
            expected: "a number",
        };
        match self.payload.get(name) {
            Some(Value::Number(n)) => n.as_f64().ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
            Some(_) => Err(invalid()),
            None => Err(EnvelopeError::MissingField(name.to_string())),
        }
    }
}
