// src/renderer.rs
use crate::project_store::ProjectRecord;
use crate::segment::VideoSegment;
use crate::timeline::TimelineState;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Timeline has no video segments to render")]
    EmptyTimeline,
    #[error("Failed to spawn renderer: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Renderer failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 25,
        }
    }
}

impl ExportSettings {
    pub fn for_project(record: &ProjectRecord) -> Self {
        let defaults = Self::default();
        Self {
            width: record.width.filter(|w| *w > 0).unwrap_or(defaults.width),
            height: record.height.filter(|h| *h > 0).unwrap_or(defaults.height),
            fps: if record.fps > 0 { record.fps } else { defaults.fps },
        }
    }
}

/// Turns a timeline snapshot into an output file. Blocking; run it off the async threads.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        state: &TimelineState,
        settings: &ExportSettings,
        output_path: &Path,
    ) -> Result<(), RenderError>;
}

#[derive(Clone, Debug)]
pub struct FfmpegRenderer {
    binary: String,
}

impl FfmpegRenderer {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    /// Arguments for concatenating the video segments in timeline order.
    pub fn build_args(
        &self,
        state: &TimelineState,
        settings: &ExportSettings,
        output_path: &Path,
    ) -> Result<Vec<String>, RenderError> {
        if state.video_segments.is_empty() {
            return Err(RenderError::EmptyTimeline);
        }

        // 1. Order by timeline start
        let mut clips: Vec<&VideoSegment> = state.video_segments.iter().collect();
        clips.sort_by(|a, b| {
            a.base
                .timeline_start_time
                .partial_cmp(&b.base.timeline_start_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut args: Vec<String> = vec!["-y".into()];
        for clip in &clips {
            args.push("-i".into());
            args.push(clip.source_video_path.clone());
        }

        // 2. Filter graph: trim the source window, retime, fit the frame, concat
        let (w, h) = (settings.width, settings.height);
        let mut graph = String::new();
        let mut concat_inputs = String::new();
        for (i, clip) in clips.iter().enumerate() {
            let source_start = clip.base.source_start_time.unwrap_or(0.0);
            let source_end = clip
                .base
                .source_end_time
                .unwrap_or(source_start + clip.base.duration() * clip.speed);
            graph.push_str(&format!(
                "[{i}:v]trim=start={:.4}:end={:.4},setpts=(PTS-STARTPTS)/{:.4},scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,fps={}[v{i}];",
                source_start, source_end, clip.speed, settings.fps
            ));
            concat_inputs.push_str(&format!("[v{}]", i));
        }
        graph.push_str(&format!(
            "{}concat=n={}:v=1:a=0[outv]",
            concat_inputs,
            clips.len()
        ));

        args.extend(
            [
                "-filter_complex",
                graph.as_str(),
                "-map",
                "[outv]",
                "-c:v",
                "libx264",
                "-preset",
                "fast",
                "-pix_fmt",
                "yuv420p",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(output_path.to_string_lossy().to_string());
        Ok(args)
    }
}

impl Renderer for FfmpegRenderer {
    fn render(
        &self,
        state: &TimelineState,
        settings: &ExportSettings,
        output_path: &Path,
    ) -> Result<(), RenderError> {
        let args = self.build_args(state, settings, output_path)?;
        log::info!("🎥 Running {} with {} inputs", self.binary, state.video_segments.len());
        log::debug!("🎥 {} {:?}", self.binary, args);

        let output = Command::new(&self.binary).args(&args).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Failed(stderr.trim().to_string()));
        }

        log::info!("✅ Render complete: {:?}", output_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::VideoFields;
    use std::path::PathBuf;

    fn clip(start: f64, end: f64, path: &str) -> VideoFields {
        VideoFields {
            layer: Some(0),
            timeline_start_time: Some(start),
            timeline_end_time: Some(end),
            source_video_path: Some(path.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_timeline_rejected() {
        let renderer = FfmpegRenderer::new("ffmpeg");
        let result = renderer.build_args(
            &TimelineState::new(),
            &ExportSettings::default(),
            &PathBuf::from("out.mp4"),
        );
        assert!(matches!(result, Err(RenderError::EmptyTimeline)));
    }

    #[test]
    fn test_inputs_follow_timeline_order() {
        let mut state = TimelineState::new();
        state.add_video(&clip(5.0, 8.0, "second.mp4")).unwrap();
        let mut first = clip(0.0, 5.0, "first.mp4");
        first.speed = Some(2.0);
        first.source_start_time = Some(1.0);
        state.add_video(&first).unwrap();

        let args = FfmpegRenderer::new("ffmpeg")
            .build_args(&state, &ExportSettings::default(), &PathBuf::from("out.mp4"))
            .unwrap();

        assert_eq!(args[1..5], ["-i", "first.mp4", "-i", "second.mp4"]);
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        // 5s on the timeline at 2x speed consumes 10s of source
        assert!(graph.contains("[0:v]trim=start=1.0000:end=11.0000,setpts=(PTS-STARTPTS)/2.0000"));
        assert!(graph.ends_with("[v0][v1]concat=n=2:v=1:a=0[outv]"));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_settings_fall_back_to_defaults() {
        let mut record = ProjectRecord::new("p");
        record.width = Some(0);
        record.height = Some(720);
        let settings = ExportSettings::for_project(&record);
        assert_eq!(settings.width, 1920);
        assert_eq!(settings.height, 720);
        assert_eq!(settings.fps, 25);
    }
}
