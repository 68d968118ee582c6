// src/project_store.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Project not found: {0}")]
    NotFound(String),
    #[error("Project storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Project record is malformed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Failed to acquire project store lock")]
    LockPoisoned,
}

fn default_fps() -> u32 {
    25
}

// --- DATA STRUCTURES ---

/// An uploaded asset addressed by its blob-store path.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub path: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    #[default]
    Idle,
    Queued,
    Rendering,
    Completed,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub file_name: String,
    pub path: String,
    pub url: String,
    pub exported_at: DateTime<Utc>,
}

/// Durable form of a project. The timeline is kept as one JSON string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub timeline_state: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub videos: Vec<MediaRef>,
    #[serde(default)]
    pub images: Vec<MediaRef>,
    #[serde(default)]
    pub audio: Vec<MediaRef>,
    #[serde(default)]
    pub extracted_audio: Vec<MediaRef>,
    #[serde(default)]
    pub exports: Vec<ExportRecord>,
    #[serde(default)]
    pub export_status: ExportStatus,
    #[serde(default)]
    pub edit_session: Option<String>,
}

impl ProjectRecord {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            last_modified: Utc::now(),
            timeline_state: String::new(),
            width: None,
            height: None,
            fps: default_fps(),
            videos: Vec::new(),
            images: Vec::new(),
            audio: Vec::new(),
            extracted_audio: Vec::new(),
            exports: Vec::new(),
            export_status: ExportStatus::Idle,
            edit_session: None,
        }
    }
}

// --- STORES ---

pub trait ProjectStore: Send + Sync {
    fn create(&self, name: &str) -> Result<ProjectRecord, StoreError>;
    fn load(&self, project_id: &str) -> Result<ProjectRecord, StoreError>;
    /// Overwrites the stored record. Last write wins.
    fn save(&self, record: &ProjectRecord) -> Result<(), StoreError>;
}

/// One pretty-printed JSON file per project under a data directory.
pub struct FileProjectStore {
    dir: PathBuf,
    // Serializes writers inside this process
    write_lock: Mutex<()>,
}

impl FileProjectStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, project_id: &str) -> Result<PathBuf, StoreError> {
        // Ids become file names; refuse anything that could escape the directory
        if project_id.is_empty()
            || project_id.contains("..")
            || project_id.contains('/')
            || project_id.contains('\\')
        {
            return Err(StoreError::NotFound(project_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", project_id)))
    }
}

impl ProjectStore for FileProjectStore {
    fn create(&self, name: &str) -> Result<ProjectRecord, StoreError> {
        let record = ProjectRecord::new(name);
        self.save(&record)?;
        log::info!("📁 Created project '{}' ({})", record.name, record.id);
        Ok(record)
    }

    fn load(&self, project_id: &str) -> Result<ProjectRecord, StoreError> {
        let path = self.path_for(project_id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(project_id.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, record: &ProjectRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.id)?;
        let json = serde_json::to_string_pretty(record)?;

        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        // Write to a sibling temp file then rename, so readers never see half a record
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        log::debug!("💾 Project {} written to {:?}", record.id, path);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProjectStore {
    records: Mutex<HashMap<String, ProjectRecord>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ProjectRecord) -> Result<(), StoreError> {
        self.save(&record)
    }
}

impl ProjectStore for MemoryProjectStore {
    fn create(&self, name: &str) -> Result<ProjectRecord, StoreError> {
        let record = ProjectRecord::new(name);
        self.save(&record)?;
        Ok(record)
    }

    fn load(&self, project_id: &str) -> Result<ProjectRecord, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        records
            .get(project_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(project_id.to_string()))
    }

    fn save(&self, record: &ProjectRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("cutline-store-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = temp_dir();
        let store = FileProjectStore::new(&dir).unwrap();

        let mut record = store.create("Demo").unwrap();
        record.timeline_state = r#"{"videoSegments":[]}"#.to_string();
        record.export_status = ExportStatus::Queued;
        store.save(&record).unwrap();

        let loaded = store.load(&record.id).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.fps, 25);
        assert!(!dir.join(format!("{}.json.tmp", record.id)).exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_and_hostile_ids() {
        let dir = temp_dir();
        let store = FileProjectStore::new(&dir).unwrap();

        assert!(matches!(store.load("nope"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.load("../etc/passwd"),
            Err(StoreError::NotFound(_))
        ));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_minimal_record_gets_defaults() {
        let json = r#"{"id":"p1","name":"Old","lastModified":"2024-01-01T00:00:00Z"}"#;
        let record: ProjectRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.fps, 25);
        assert_eq!(record.export_status, ExportStatus::Idle);
        assert!(record.timeline_state.is_empty());
    }

    #[test]
    fn test_memory_store_last_write_wins() {
        let store = MemoryProjectStore::new();
        let record = store.create("Mem").unwrap();

        let mut first = record.clone();
        first.name = "first".into();
        let mut second = record.clone();
        second.name = "second".into();
        store.save(&first).unwrap();
        store.save(&second).unwrap();

        assert_eq!(store.load(&record.id).unwrap().name, "second");
    }
}
