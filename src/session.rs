// src/session.rs
use crate::history::History;
use crate::project_store::{ExportStatus, ProjectRecord, ProjectStore, StoreError};
use crate::timeline::{EditError, TimelineState};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// One live editing context for a project.
pub struct Session {
    pub session_id: String,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
    pub last_touched: DateTime<Utc>,
    state: TimelineState,
    history: History,
}

impl Session {
    fn touch(&mut self) {
        self.last_touched = Utc::now();
    }
}

/// Live sessions keyed by session id.
///
/// The outer map lock is held only to look a session up; each session
/// carries its own mutex so edits to one session never block another.
pub struct SessionStore {
    projects: Arc<dyn ProjectStore>,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
    // Held across the export status check and the write that claims it
    export_gate: Mutex<()>,
    history_depth: usize,
}

impl SessionStore {
    pub fn new(projects: Arc<dyn ProjectStore>, history_depth: usize) -> Self {
        Self {
            projects,
            sessions: Mutex::new(HashMap::new()),
            export_gate: Mutex::new(()),
            history_depth,
        }
    }

    pub fn projects(&self) -> &Arc<dyn ProjectStore> {
        &self.projects
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Opens a session on the project's persisted timeline.
    /// Several sessions may be open on the same project at once.
    pub fn start_session(&self, project_id: &str) -> Result<String, EditError> {
        let record = self.projects.load(project_id)?;
        let mut state =
            TimelineState::from_json(&record.timeline_state).map_err(StoreError::from)?;
        for repair in state.repair_references() {
            log::warn!("🩹 Project {}: {}", project_id, repair);
        }

        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let session = Session {
            session_id: session_id.clone(),
            project_id: project_id.to_string(),
            started_at: now,
            last_touched: now,
            state,
            history: History::new(self.history_depth),
        };

        self.sessions
            .lock()
            .map_err(|_| EditError::LockPoisoned)?
            .insert(session_id.clone(), Arc::new(Mutex::new(session)));
        log::info!(
            "🎬 Session {} started for project {}",
            session_id,
            project_id
        );
        Ok(session_id)
    }

    fn session(&self, session_id: &str) -> Result<Arc<Mutex<Session>>, EditError> {
        let sessions = self.sessions.lock().map_err(|_| EditError::LockPoisoned)?;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| EditError::NotFound(format!("Session not found: {}", session_id)))
    }

    fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> Result<R, EditError>,
    ) -> Result<R, EditError> {
        let handle = self.session(session_id)?;
        let mut session = handle.lock().map_err(|_| EditError::LockPoisoned)?;
        f(&mut session)
    }

    pub fn project_id(&self, session_id: &str) -> Result<String, EditError> {
        self.with_session(session_id, |s| Ok(s.project_id.clone()))
    }

    pub fn read<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&TimelineState) -> R,
    ) -> Result<R, EditError> {
        self.with_session(session_id, |s| Ok(f(&s.state)))
    }

    pub fn state(&self, session_id: &str) -> Result<TimelineState, EditError> {
        self.read(session_id, |state| state.clone())
    }

    /// Runs one mutation under the session lock. On success the prior
    /// state is pushed onto the undo stack; on failure nothing changes.
    pub fn mutate<R>(
        &self,
        session_id: &str,
        label: &str,
        op: impl FnOnce(&mut TimelineState) -> Result<R, EditError>,
    ) -> Result<R, EditError> {
        self.with_session(session_id, |session| {
            let before = session.state.clone();
            let result = op(&mut session.state)?;
            session.history.record(label, before);
            session.touch();
            Ok(result)
        })
    }

    fn persist(&self, session: &Session) -> Result<ProjectRecord, EditError> {
        self.persist_with(session, |_| Ok(()))
    }

    // `prepare` sees the freshly loaded record and may refuse the write.
    fn persist_with(
        &self,
        session: &Session,
        prepare: impl FnOnce(&mut ProjectRecord) -> Result<(), EditError>,
    ) -> Result<ProjectRecord, EditError> {
        let mut record = self.projects.load(&session.project_id)?;
        prepare(&mut record)?;
        record.timeline_state = session.state.to_json().map_err(StoreError::from)?;
        record.last_modified = Utc::now();
        record.edit_session = Some(session.session_id.clone());
        self.projects.save(&record)?;
        Ok(record)
    }

    /// Persists the timeline and starts a fresh history.
    pub fn save(&self, session_id: &str) -> Result<ProjectRecord, EditError> {
        self.with_session(session_id, |session| {
            let record = self.persist(session)?;
            session.history.clear();
            session.touch();
            log::info!(
                "💾 Session {} saved project {}",
                session_id,
                session.project_id
            );
            Ok(record)
        })
    }

    /// Persists the timeline but keeps undo/redo history intact.
    pub fn save_snapshot(&self, session_id: &str) -> Result<ProjectRecord, EditError> {
        self.with_session(session_id, |session| {
            let record = self.persist(session)?;
            session.touch();
            log::debug!("💾 Session {} snapshot persisted", session_id);
            Ok(record)
        })
    }

    /// Claims the project's export slot and persists the session's timeline
    /// in the same write. Nothing is written if an export is already queued
    /// or rendering.
    pub fn begin_export(&self, session_id: &str) -> Result<ProjectRecord, EditError> {
        self.with_session(session_id, |session| {
            let _gate = self.export_gate.lock().map_err(|_| EditError::LockPoisoned)?;
            let record = self.persist_with(session, |record| {
                if matches!(
                    record.export_status,
                    ExportStatus::Queued | ExportStatus::Rendering
                ) {
                    return Err(EditError::Validation(
                        "An export is already in progress for this project".to_string(),
                    ));
                }
                record.export_status = ExportStatus::Queued;
                Ok(())
            })?;
            session.touch();
            Ok(record)
        })
    }

    /// Steps back one edit. At the bottom of the stack this is a no-op.
    pub fn undo(&self, session_id: &str) -> Result<TimelineState, EditError> {
        self.with_session(session_id, |session| {
            if let Some(label) = session.history.undo(&mut session.state) {
                log::debug!("↩️ Session {} undid {}", session_id, label);
            }
            session.touch();
            Ok(session.state.clone())
        })
    }

    pub fn redo(&self, session_id: &str) -> Result<TimelineState, EditError> {
        self.with_session(session_id, |session| {
            if let Some(label) = session.history.redo(&mut session.state) {
                log::debug!("↪️ Session {} redid {}", session_id, label);
            }
            session.touch();
            Ok(session.state.clone())
        })
    }

    /// (undo depth, redo depth)
    pub fn history_depths(&self, session_id: &str) -> Result<(usize, usize), EditError> {
        self.with_session(session_id, |s| {
            Ok((s.history.undo_depth(), s.history.redo_depth()))
        })
    }

    /// Drops the session without persisting anything.
    pub fn end_session(&self, session_id: &str) -> Result<(), EditError> {
        let removed = self
            .sessions
            .lock()
            .map_err(|_| EditError::LockPoisoned)?
            .remove(session_id);
        match removed {
            Some(_) => {
                log::info!("👋 Session {} ended", session_id);
                Ok(())
            }
            None => Err(EditError::NotFound(format!(
                "Session not found: {}",
                session_id
            ))),
        }
    }

    /// Drops sessions untouched for longer than `max_idle`.
    ///
    /// A session with edits since its last save is flushed to the project
    /// store first. If the flush fails the session is kept for the next sweep.
    pub fn expire_idle(&self, max_idle: Duration) -> Vec<String> {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = match self.sessions.lock() {
            Ok(s) => s,
            Err(_) => {
                log::error!("❌ Session map lock poisoned; skipping expiry sweep");
                return Vec::new();
            }
        };

        let mut expired = Vec::new();
        for (id, handle) in sessions.iter() {
            // A session whose own lock is busy is in use and therefore not idle
            let session = match handle.try_lock() {
                Ok(session) => session,
                Err(_) => continue,
            };
            if session.last_touched >= cutoff {
                continue;
            }
            if session.history.undo_depth() > 0 {
                match self.persist(&session) {
                    Ok(_) => log::info!("💾 Session {} flushed before expiry", id),
                    Err(e) => {
                        log::warn!("⚠️ Could not flush idle session {}: {}", id, e);
                        continue;
                    }
                }
            }
            expired.push(id.clone());
        }

        for id in &expired {
            sessions.remove(id);
            log::info!("⌛ Session {} expired after idling", id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project_store::MemoryProjectStore;
    use crate::requests::VideoFields;

    fn store_with_project() -> (SessionStore, String) {
        let projects = Arc::new(MemoryProjectStore::new());
        let record = projects.create("Test").unwrap();
        (SessionStore::new(projects, 50), record.id)
    }

    fn clip() -> VideoFields {
        VideoFields {
            layer: Some(0),
            timeline_start_time: Some(0.0),
            timeline_end_time: Some(4.0),
            source_video_path: Some("a.mp4".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_failed_mutation_records_nothing() {
        let (store, project_id) = store_with_project();
        let session = store.start_session(&project_id).unwrap();

        let mut bad = clip();
        bad.speed = Some(9.0);
        assert!(store
            .mutate(&session, "ADD_VIDEO", |s| s.add_video(&bad))
            .is_err());
        assert_eq!(store.history_depths(&session).unwrap(), (0, 0));
    }

    #[test]
    fn test_unknown_session() {
        let (store, _) = store_with_project();
        assert!(matches!(store.state("ghost"), Err(EditError::NotFound(_))));
        assert!(matches!(
            store.end_session("ghost"),
            Err(EditError::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_project() {
        let (store, _) = store_with_project();
        assert!(matches!(
            store.start_session("missing"),
            Err(EditError::Storage(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn test_expire_idle_flushes_unsaved_changes() {
        let (store, project_id) = store_with_project();
        let session = store.start_session(&project_id).unwrap();
        store
            .mutate(&session, "ADD_VIDEO", |s| s.add_video(&clip()))
            .unwrap();

        assert!(store.expire_idle(Duration::minutes(10)).is_empty());
        let expired = store.expire_idle(Duration::zero() - Duration::seconds(1));
        assert_eq!(expired, vec![session.clone()]);
        assert_eq!(store.session_count(), 0);

        let record = store.projects().load(&project_id).unwrap();
        let state = TimelineState::from_json(&record.timeline_state).unwrap();
        assert_eq!(state.video_segments.len(), 1);
        assert_eq!(record.edit_session.as_deref(), Some(session.as_str()));
    }

    #[test]
    fn test_expire_idle_leaves_clean_sessions_unwritten() {
        let (store, project_id) = store_with_project();
        let session = store.start_session(&project_id).unwrap();
        let before = store.projects().load(&project_id).unwrap();

        let expired = store.expire_idle(Duration::zero() - Duration::seconds(1));
        assert_eq!(expired, vec![session]);
        assert_eq!(store.projects().load(&project_id).unwrap(), before);
    }

    #[test]
    fn test_begin_export_refuses_without_writing() {
        let (store, project_id) = store_with_project();
        let session = store.start_session(&project_id).unwrap();

        let claimed = store.begin_export(&session).unwrap();
        assert_eq!(claimed.export_status, ExportStatus::Queued);

        store
            .mutate(&session, "ADD_VIDEO", |s| s.add_video(&clip()))
            .unwrap();
        let err = store.begin_export(&session).unwrap_err();
        assert!(matches!(err, EditError::Validation(_)));
        assert_eq!(store.projects().load(&project_id).unwrap(), claimed);
    }
}
