// src/handlers.rs
use crate::blob_store::BlobStore;
use crate::envelope::{JobEnvelope, TaskType};
use crate::project_store::{ExportRecord, ExportStatus, ProjectStore};
use crate::renderer::{ExportSettings, Renderer};
use crate::task_router::{HandlerError, TaskHandler};
use crate::timeline::TimelineState;
use chrono::Utc;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

// --- EXPORT ---

/// VIDEO_EXPORT: render the persisted timeline, upload it, record the export.
pub struct ExportHandler {
    projects: Arc<dyn ProjectStore>,
    renderer: Arc<dyn Renderer>,
    blobs: Arc<dyn BlobStore>,
    work_dir: PathBuf,
}

impl ExportHandler {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        renderer: Arc<dyn Renderer>,
        blobs: Arc<dyn BlobStore>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            projects,
            renderer,
            blobs,
            work_dir: work_dir.into(),
        }
    }

    fn set_status(&self, project_id: &str, status: ExportStatus) -> Result<(), HandlerError> {
        let mut record = self.projects.load(project_id)?;
        record.export_status = status;
        self.projects.save(&record)?;
        Ok(())
    }

    async fn export(&self, project_id: &str) -> Result<ExportRecord, HandlerError> {
        // 1. Snapshot the persisted timeline
        let record = self.projects.load(project_id)?;
        let state = TimelineState::from_json(&record.timeline_state)
            .map_err(|e| HandlerError::Timeline(e.to_string()))?;
        let settings = ExportSettings::for_project(&record);

        // 2. Render on a blocking thread
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| HandlerError::Aborted(e.to_string()))?;
        let file_name = format!("export_{}.mp4", Uuid::new_v4());
        let output = self.work_dir.join(&file_name);

        // 3. Render and upload; the scratch file goes away whatever the outcome
        let uploaded = self
            .render_and_upload(project_id, state, settings, &output, &file_name)
            .await;
        discard_scratch(&output).await;
        let (path, url) = uploaded?;

        Ok(ExportRecord {
            file_name,
            path,
            url,
            exported_at: Utc::now(),
        })
    }

    async fn render_and_upload(
        &self,
        project_id: &str,
        state: TimelineState,
        settings: ExportSettings,
        output: &Path,
        file_name: &str,
    ) -> Result<(String, String), HandlerError> {
        let renderer = self.renderer.clone();
        let render_target = output.to_path_buf();
        tokio::task::spawn_blocking(move || renderer.render(&state, &settings, &render_target))
            .await
            .map_err(|e| HandlerError::Aborted(format!("Render task join error: {}", e)))??;
        log::info!("🎞️ Rendered export for project {}", project_id);

        let bytes = tokio::fs::read(output)
            .await
            .map_err(|e| HandlerError::Aborted(format!("Rendered file unreadable: {}", e)))?;
        let path = format!("exports/{}/{}", project_id, file_name);
        let url = self.blobs.put(&path, bytes).await?;
        log::info!("☁️ Export for project {} uploaded to {}", project_id, url);
        Ok((path, url))
    }
}

async fn discard_scratch(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => {}
        // Failed renders may never have created it
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("⚠️ Could not remove scratch render {:?}: {}", output, e),
    }
}

impl TaskHandler for ExportHandler {
    fn handle<'a>(&'a self, envelope: &'a JobEnvelope) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            let project_id = envelope.str_field("projectId")?;
            self.set_status(project_id, ExportStatus::Rendering)?;

            match self.export(project_id).await {
                Ok(export) => {
                    // Reload so edits saved while rendering are kept
                    let mut record = self.projects.load(project_id)?;
                    record.exports.push(export);
                    record.export_status = ExportStatus::Completed;
                    self.projects.save(&record)?;
                    Ok(())
                }
                Err(e) => {
                    if let Err(status_err) = self.set_status(project_id, ExportStatus::Failed) {
                        log::error!(
                            "❌ Could not mark export failed for {}: {}",
                            project_id,
                            status_err
                        );
                    }
                    Err(e)
                }
            }
        })
    }
}

// --- EXTERNAL COMMAND ---

/// Runs a configured program for a task type, feeding the message body on stdin.
pub struct CommandHandler {
    task_type: TaskType,
    program: String,
    args: Vec<String>,
}

impl CommandHandler {
    pub fn new(task_type: TaskType, program: &str, args: Vec<String>) -> Self {
        Self {
            task_type,
            program: program.to_string(),
            args,
        }
    }

    /// Builds from a whitespace-separated command line. `None` when it is blank.
    pub fn from_command_line(task_type: TaskType, command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(task_type, &program, parts.collect()))
    }
}

impl TaskHandler for CommandHandler {
    fn handle<'a>(&'a self, envelope: &'a JobEnvelope) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            log::info!("⚙️ Running {} for {}", self.program, self.task_type);
            let mut child = tokio::process::Command::new(&self.program)
                .args(&self.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| HandlerError::Command(format!("{}: {}", self.program, e)))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(envelope.to_body().as_bytes())
                    .await
                    .map_err(|e| HandlerError::Command(format!("stdin: {}", e)))?;
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| HandlerError::Command(format!("{}: {}", self.program, e)))?;
            if !output.status.success() {
                return Err(HandlerError::Command(format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            log::info!("✅ {} finished for {}", self.program, self.task_type);
            Ok(())
        })
    }
}
