// src/requests.rs
use crate::keyframe::{Interpolation, Keyframe, KeyframeValue};
use crate::segment::{SegmentKind, TextAlignment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Keyframe lists inside a field patch. An empty list clears the property's track.
pub type KeyframePatch = BTreeMap<String, Vec<Keyframe>>;

// --- SEGMENT FIELDS ---
// Every field is optional: creation checks the required ones, updates merge
// the present ones and leave the rest untouched.

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VideoFields {
    pub layer: Option<i32>,
    pub timeline_start_time: Option<f64>,
    pub timeline_end_time: Option<f64>,
    pub source_start_time: Option<f64>,
    pub source_end_time: Option<f64>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub scale: Option<f64>,
    pub opacity: Option<f64>,
    pub rotation: Option<f64>,
    pub crop_l: Option<f64>,
    pub crop_r: Option<f64>,
    pub crop_t: Option<f64>,
    pub crop_b: Option<f64>,
    pub keyframes: Option<KeyframePatch>,
    pub source_video_path: Option<String>,
    pub speed: Option<f64>,
    pub audio_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AudioFields {
    pub layer: Option<i32>,
    pub timeline_start_time: Option<f64>,
    pub timeline_end_time: Option<f64>,
    pub source_start_time: Option<f64>,
    pub source_end_time: Option<f64>,
    pub keyframes: Option<KeyframePatch>,
    pub audio_path: Option<String>,
    pub volume: Option<f64>,
    pub waveform_path: Option<String>,
    pub extracted: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageFields {
    pub layer: Option<i32>,
    pub timeline_start_time: Option<f64>,
    pub timeline_end_time: Option<f64>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub scale: Option<f64>,
    pub opacity: Option<f64>,
    pub rotation: Option<f64>,
    pub crop_l: Option<f64>,
    pub crop_r: Option<f64>,
    pub crop_t: Option<f64>,
    pub crop_b: Option<f64>,
    pub keyframes: Option<KeyframePatch>,
    pub image_path: Option<String>,
    pub custom_width: Option<u32>,
    pub custom_height: Option<u32>,
    pub maintain_aspect_ratio: Option<bool>,
    pub is_element: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TextFields {
    pub layer: Option<i32>,
    pub timeline_start_time: Option<f64>,
    pub timeline_end_time: Option<f64>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub scale: Option<f64>,
    pub opacity: Option<f64>,
    pub rotation: Option<f64>,
    pub keyframes: Option<KeyframePatch>,
    pub text: Option<String>,
    pub font_family: Option<String>,
    pub font_color: Option<String>,
    pub alignment: Option<TextAlignment>,
    pub letter_spacing: Option<f64>,
    pub line_spacing: Option<f64>,
    pub background_color: Option<String>,
    pub background_opacity: Option<f64>,
    pub background_border_width: Option<f64>,
    pub background_border_color: Option<String>,
    pub background_border_radius: Option<f64>,
    pub background_h: Option<f64>,
    pub background_w: Option<f64>,
    pub text_border_color: Option<String>,
    pub text_border_width: Option<f64>,
    pub text_border_opacity: Option<f64>,
    pub is_subtitle: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransitionFields {
    #[serde(rename = "type")]
    pub transition_type: Option<String>,
    #[serde(alias = "durationSeconds")]
    pub duration: Option<f64>,
    pub segment_id: Option<String>,
    pub start: Option<bool>,
    pub end: Option<bool>,
    pub layer: Option<i32>,
    pub parameters: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubtitleCue {
    pub text: String,
    pub timeline_start_time: f64,
    pub timeline_end_time: f64,
}

// --- ACTIONS ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(
    tag = "action",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase",
    deny_unknown_fields
)]
pub enum EditAction {
    AddVideo {
        fields: VideoFields,
    },
    AddAudio {
        fields: AudioFields,
    },
    AddImage {
        fields: ImageFields,
    },
    AddText {
        fields: TextFields,
    },
    UpdateVideo {
        segment_id: String,
        fields: VideoFields,
    },
    UpdateAudio {
        segment_id: String,
        fields: AudioFields,
    },
    UpdateImage {
        segment_id: String,
        fields: ImageFields,
    },
    UpdateText {
        segment_id: String,
        fields: TextFields,
    },
    RemoveSegment {
        segment_id: String,
    },
    RemoveSegments {
        segment_ids: Vec<String>,
    },
    AddKeyframe {
        segment_id: String,
        segment_type: SegmentKind,
        property: String,
        time: f64,
        value: KeyframeValue,
        #[serde(default, alias = "interpolationKind")]
        interpolation_type: Interpolation,
    },
    UpdateKeyframe {
        segment_id: String,
        segment_type: SegmentKind,
        property: String,
        time: f64,
        value: KeyframeValue,
        #[serde(default, alias = "interpolationKind")]
        interpolation_type: Interpolation,
    },
    RemoveKeyframe {
        segment_id: String,
        segment_type: SegmentKind,
        property: String,
        time: f64,
    },
    AddTransition {
        fields: TransitionFields,
    },
    UpdateTransition {
        transition_id: String,
        fields: TransitionFields,
    },
    RemoveTransition {
        transition_id: String,
    },
    ApplyFilter {
        segment_id: String,
        filter_name: String,
        filter_value: Option<String>,
    },
    UpdateFilter {
        segment_id: String,
        filter_id: String,
        filter_name: Option<String>,
        filter_value: Option<String>,
    },
    RemoveFilter {
        segment_id: String,
        filter_id: String,
    },
    RemoveAllFilters {
        segment_id: String,
    },
    AddSubtitles {
        cues: Vec<SubtitleCue>,
        #[serde(default)]
        style: TextFields,
    },
    UpdateMultipleText {
        segment_ids: Vec<String>,
        fields: TextFields,
    },
}

impl EditAction {
    /// Short label used for logs and undo history entries.
    pub fn label(&self) -> &'static str {
        match self {
            EditAction::AddVideo { .. } => "ADD_VIDEO",
            EditAction::AddAudio { .. } => "ADD_AUDIO",
            EditAction::AddImage { .. } => "ADD_IMAGE",
            EditAction::AddText { .. } => "ADD_TEXT",
            EditAction::UpdateVideo { .. } => "UPDATE_VIDEO",
            EditAction::UpdateAudio { .. } => "UPDATE_AUDIO",
            EditAction::UpdateImage { .. } => "UPDATE_IMAGE",
            EditAction::UpdateText { .. } => "UPDATE_TEXT",
            EditAction::RemoveSegment { .. } => "REMOVE_SEGMENT",
            EditAction::RemoveSegments { .. } => "REMOVE_SEGMENTS",
            EditAction::AddKeyframe { .. } => "ADD_KEYFRAME",
            EditAction::UpdateKeyframe { .. } => "UPDATE_KEYFRAME",
            EditAction::RemoveKeyframe { .. } => "REMOVE_KEYFRAME",
            EditAction::AddTransition { .. } => "ADD_TRANSITION",
            EditAction::UpdateTransition { .. } => "UPDATE_TRANSITION",
            EditAction::RemoveTransition { .. } => "REMOVE_TRANSITION",
            EditAction::ApplyFilter { .. } => "APPLY_FILTER",
            EditAction::UpdateFilter { .. } => "UPDATE_FILTER",
            EditAction::RemoveFilter { .. } => "REMOVE_FILTER",
            EditAction::RemoveAllFilters { .. } => "REMOVE_ALL_FILTERS",
            EditAction::AddSubtitles { .. } => "ADD_SUBTITLES",
            EditAction::UpdateMultipleText { .. } => "UPDATE_MULTIPLE_TEXT",
        }
    }
}

pub fn parse_edit_action(raw: &str) -> Result<EditAction, serde_json::Error> {
    serde_json::from_str(raw.trim())
}
