// src/commands.rs
// String-error facade for the outer request layer. Messages are the
// errors' Display text, returned verbatim to callers.
use crate::action_router::{apply_to_session, EditOutcome};
use crate::envelope::{JobEnvelope, TaskType};
use crate::project_store::{ExportStatus, ProjectRecord};
use crate::queue::MessageQueue;
use crate::requests::{parse_edit_action, EditAction};
use crate::session::SessionStore;
use crate::timeline::{ActiveSegment, TimelineState};
use serde_json::{json, Map};

// --- COMMAND 1: Projects & sessions ---

pub fn create_project(sessions: &SessionStore, name: &str) -> Result<ProjectRecord, String> {
    if name.trim().is_empty() {
        return Err("Project name must not be empty".to_string());
    }
    sessions
        .projects()
        .create(name.trim())
        .map_err(|e| e.to_string())
}

pub fn start_session(sessions: &SessionStore, project_id: &str) -> Result<String, String> {
    sessions.start_session(project_id).map_err(|e| e.to_string())
}

pub fn end_session(sessions: &SessionStore, session_id: &str) -> Result<(), String> {
    sessions.end_session(session_id).map_err(|e| e.to_string())
}

// --- COMMAND 2: Read ---

pub fn get_timeline_state(
    sessions: &SessionStore,
    session_id: &str,
) -> Result<TimelineState, String> {
    sessions.state(session_id).map_err(|e| e.to_string())
}

/// Active segments and their resolved properties at `time`, for preview.
pub fn query_frame(
    sessions: &SessionStore,
    session_id: &str,
    time: f64,
) -> Result<Vec<ActiveSegment>, String> {
    if !time.is_finite() || time < 0.0 {
        return Err("Time must be a non-negative number".to_string());
    }
    sessions
        .read(session_id, |state| state.query(time))
        .map_err(|e| e.to_string())
}

// --- COMMAND 3: Edit ---

pub fn apply_edit(
    sessions: &SessionStore,
    session_id: &str,
    action: EditAction,
) -> Result<EditOutcome, String> {
    apply_to_session(sessions, session_id, action).map_err(|e| e.to_string())
}

/// Accepts a raw JSON request; unknown actions or fields are rejected.
pub fn apply_edit_json(
    sessions: &SessionStore,
    session_id: &str,
    raw: &str,
) -> Result<EditOutcome, String> {
    let action = parse_edit_action(raw).map_err(|e| format!("Invalid edit request: {}", e))?;
    apply_edit(sessions, session_id, action)
}

// --- COMMAND 4: Save / history ---

pub fn save_project(sessions: &SessionStore, session_id: &str) -> Result<ProjectRecord, String> {
    sessions.save(session_id).map_err(|e| e.to_string())
}

pub fn save_for_undo_redo(
    sessions: &SessionStore,
    session_id: &str,
) -> Result<ProjectRecord, String> {
    sessions.save_snapshot(session_id).map_err(|e| e.to_string())
}

pub fn undo(sessions: &SessionStore, session_id: &str) -> Result<TimelineState, String> {
    sessions.undo(session_id).map_err(|e| e.to_string())
}

pub fn redo(sessions: &SessionStore, session_id: &str) -> Result<TimelineState, String> {
    sessions.redo(session_id).map_err(|e| e.to_string())
}

// --- COMMAND 5: Export ---

/// Persists the session's timeline, marks the project queued and enqueues
/// a VIDEO_EXPORT job. Returns the queue message id.
pub async fn request_export(
    sessions: &SessionStore,
    queue: &dyn MessageQueue,
    session_id: &str,
) -> Result<String, String> {
    // 1. Claim the export slot and persist the timeline in one write.
    //    History is kept; a refused request writes nothing.
    let mut record = sessions
        .begin_export(session_id)
        .map_err(|e| e.to_string())?;

    // 2. Enqueue
    let mut payload = Map::new();
    payload.insert("projectId".to_string(), json!(record.id));
    payload.insert("sessionId".to_string(), json!(session_id));
    let envelope = JobEnvelope::new(TaskType::VideoExport, payload);

    match queue.send(envelope.to_body()).await {
        Ok(message_id) => {
            log::info!(
                "📤 Export for project {} queued as message {}",
                record.id,
                message_id
            );
            Ok(message_id)
        }
        Err(e) => {
            record.export_status = ExportStatus::Failed;
            if let Err(save_err) = sessions.projects().save(&record) {
                log::error!("❌ Could not mark export failed: {}", save_err);
            }
            Err(e.to_string())
        }
    }
}
