// src/segment.rs
use crate::keyframe::{KeyframeTrack, KeyframeValue};
use crate::requests::{AudioFields, ImageFields, KeyframePatch, TextFields, VideoFields};
use crate::timeline::EditError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// 1. KINDS

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Video,
    Audio,
    Image,
    Text,
}

impl SegmentKind {
    pub fn is_visual(self) -> bool {
        self != SegmentKind::Audio
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentKind::Video => "video",
            SegmentKind::Audio => "audio",
            SegmentKind::Image => "image",
            SegmentKind::Text => "text",
        };
        f.write_str(name)
    }
}

const VISUAL_PROPERTIES: &[&str] = &[
    "positionX",
    "positionY",
    "position",
    "scale",
    "opacity",
    "rotation",
    "cropL",
    "cropR",
    "cropT",
    "cropB",
];

const TEXT_PROPERTIES: &[&str] = &[
    "positionX",
    "positionY",
    "position",
    "scale",
    "opacity",
    "rotation",
    "fontColor",
    "backgroundColor",
    "backgroundOpacity",
    "letterSpacing",
    "lineSpacing",
];

const AUDIO_PROPERTIES: &[&str] = &["volume"];

/// Properties that may carry a keyframe track on a segment of `kind`.
pub fn animatable_properties(kind: SegmentKind) -> &'static [&'static str] {
    match kind {
        SegmentKind::Video | SegmentKind::Image => VISUAL_PROPERTIES,
        SegmentKind::Text => TEXT_PROPERTIES,
        SegmentKind::Audio => AUDIO_PROPERTIES,
    }
}

// 2. DATA STRUCTURES

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    Left,
    Right,
    #[default]
    Center,
}

impl TextAlignment {
    fn as_str(self) -> &'static str {
        match self {
            TextAlignment::Left => "left",
            TextAlignment::Right => "right",
            TextAlignment::Center => "center",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub filter_id: String,
    pub segment_id: String,
    pub filter_name: String,
    pub filter_value: Option<String>,
}

fn one() -> f64 {
    1.0
}

/// Placement, transform and animation shared by every segment kind.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentBase {
    pub id: String,
    pub layer: i32,
    pub timeline_start_time: f64,
    pub timeline_end_time: f64,
    #[serde(default)]
    pub source_start_time: Option<f64>,
    #[serde(default)]
    pub source_end_time: Option<f64>,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
    #[serde(default = "one")]
    pub scale: f64,
    #[serde(default = "one")]
    pub opacity: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub crop_l: f64,
    #[serde(default)]
    pub crop_r: f64,
    #[serde(default)]
    pub crop_t: f64,
    #[serde(default)]
    pub crop_b: f64,
    #[serde(default)]
    pub keyframes: BTreeMap<String, KeyframeTrack>,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl SegmentBase {
    pub fn new(id: String, layer: i32, start: f64, end: f64) -> Self {
        Self {
            id,
            layer,
            timeline_start_time: start,
            timeline_end_time: end,
            source_start_time: None,
            source_end_time: None,
            position_x: 0.0,
            position_y: 0.0,
            scale: 1.0,
            opacity: 1.0,
            rotation: 0.0,
            crop_l: 0.0,
            crop_r: 0.0,
            crop_t: 0.0,
            crop_b: 0.0,
            keyframes: BTreeMap::new(),
            filters: Vec::new(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.timeline_end_time - self.timeline_start_time
    }

    /// Half-open: a segment ending at `t` is no longer active at `t`.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.timeline_start_time && time < self.timeline_end_time
    }

    pub fn is_keyframed(&self, property: &str) -> bool {
        self.keyframes
            .get(property)
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }

    fn apply_keyframes(&mut self, patch: &KeyframePatch) -> Result<(), EditError> {
        for (property, keyframes) in patch {
            if keyframes.is_empty() {
                self.keyframes.remove(property);
                continue;
            }
            let track = KeyframeTrack::from_keyframes(keyframes.clone()).map_err(|e| {
                EditError::Validation(format!("Invalid keyframes for '{}': {}", property, e))
            })?;
            self.keyframes.insert(property.clone(), track);
        }
        Ok(())
    }

    fn static_properties(&self, out: &mut BTreeMap<String, KeyframeValue>) {
        let numbers = [
            ("positionX", self.position_x),
            ("positionY", self.position_y),
            ("scale", self.scale),
            ("opacity", self.opacity),
            ("rotation", self.rotation),
            ("cropL", self.crop_l),
            ("cropR", self.crop_r),
            ("cropT", self.crop_t),
            ("cropB", self.crop_b),
        ];
        for (name, value) in numbers {
            out.insert(name.to_string(), KeyframeValue::Number(value));
        }
        out.insert(
            "position".to_string(),
            KeyframeValue::Vector(vec![self.position_x, self.position_y]),
        );
    }
}

// Transform fields carried by a patch, borrowed so each kind can share one merge.
struct TransformPatch<'a> {
    layer: Option<i32>,
    start: Option<f64>,
    end: Option<f64>,
    source_start: Option<f64>,
    source_end: Option<f64>,
    position_x: Option<f64>,
    position_y: Option<f64>,
    scale: Option<f64>,
    opacity: Option<f64>,
    rotation: Option<f64>,
    crop: [Option<f64>; 4],
    keyframes: Option<&'a KeyframePatch>,
}

impl TransformPatch<'_> {
    fn apply(&self, base: &mut SegmentBase) -> Result<(), EditError> {
        if let Some(v) = self.layer {
            base.layer = v;
        }
        if let Some(v) = self.start {
            base.timeline_start_time = v;
        }
        if let Some(v) = self.end {
            base.timeline_end_time = v;
        }
        if self.source_start.is_some() {
            base.source_start_time = self.source_start;
        }
        if self.source_end.is_some() {
            base.source_end_time = self.source_end;
        }
        if let Some(v) = self.position_x {
            base.position_x = v;
        }
        if let Some(v) = self.position_y {
            base.position_y = v;
        }
        if let Some(v) = self.scale {
            base.scale = v;
        }
        if let Some(v) = self.opacity {
            base.opacity = v;
        }
        if let Some(v) = self.rotation {
            base.rotation = v;
        }
        let [l, r, t, b] = self.crop;
        if let Some(v) = l {
            base.crop_l = v;
        }
        if let Some(v) = r {
            base.crop_r = v;
        }
        if let Some(v) = t {
            base.crop_t = v;
        }
        if let Some(v) = b {
            base.crop_b = v;
        }
        if let Some(patch) = self.keyframes {
            base.apply_keyframes(patch)?;
        }
        Ok(())
    }
}

fn required<T: Clone>(value: &Option<T>, name: &str) -> Result<T, EditError> {
    value
        .clone()
        .ok_or_else(|| EditError::Validation(format!("Missing required parameter: {}", name)))
}

fn new_base(
    id: String,
    layer: Option<i32>,
    default_layer: i32,
    start: &Option<f64>,
    end: &Option<f64>,
) -> Result<SegmentBase, EditError> {
    let start = required(start, "timelineStartTime")?;
    let end = required(end, "timelineEndTime")?;
    Ok(SegmentBase::new(
        id,
        layer.unwrap_or(default_layer),
        start,
        end,
    ))
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

// --- VIDEO ---

fn default_speed() -> f64 {
    1.0
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoSegment {
    #[serde(flatten)]
    pub base: SegmentBase,
    pub source_video_path: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub audio_id: Option<String>,
}

impl VideoFields {
    fn transform(&self) -> TransformPatch<'_> {
        TransformPatch {
            layer: self.layer,
            start: self.timeline_start_time,
            end: self.timeline_end_time,
            source_start: self.source_start_time,
            source_end: self.source_end_time,
            position_x: self.position_x,
            position_y: self.position_y,
            scale: self.scale,
            opacity: self.opacity,
            rotation: self.rotation,
            crop: [self.crop_l, self.crop_r, self.crop_t, self.crop_b],
            keyframes: self.keyframes.as_ref(),
        }
    }
}

impl VideoSegment {
    pub fn create(id: String, fields: &VideoFields) -> Result<Self, EditError> {
        let mut segment = Self {
            base: new_base(
                id,
                fields.layer,
                0,
                &fields.timeline_start_time,
                &fields.timeline_end_time,
            )?,
            source_video_path: required(&fields.source_video_path, "sourceVideoPath")?,
            speed: default_speed(),
            audio_id: None,
        };
        segment.apply(fields)?;
        Ok(segment)
    }

    pub fn apply(&mut self, fields: &VideoFields) -> Result<(), EditError> {
        fields.transform().apply(&mut self.base)?;
        set(&mut self.source_video_path, &fields.source_video_path);
        set(&mut self.speed, &fields.speed);
        if fields.audio_id.is_some() {
            self.audio_id = fields.audio_id.clone();
        }
        Ok(())
    }
}

// --- AUDIO ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioSegment {
    #[serde(flatten)]
    pub base: SegmentBase,
    pub audio_path: String,
    #[serde(default = "one")]
    pub volume: f64,
    #[serde(default)]
    pub waveform_path: Option<String>,
    #[serde(default)]
    pub extracted: bool,
}

impl AudioFields {
    fn transform(&self) -> TransformPatch<'_> {
        TransformPatch {
            layer: self.layer,
            start: self.timeline_start_time,
            end: self.timeline_end_time,
            source_start: self.source_start_time,
            source_end: self.source_end_time,
            position_x: None,
            position_y: None,
            scale: None,
            opacity: None,
            rotation: None,
            crop: [None; 4],
            keyframes: self.keyframes.as_ref(),
        }
    }
}

impl AudioSegment {
    pub fn create(id: String, fields: &AudioFields) -> Result<Self, EditError> {
        let mut segment = Self {
            base: new_base(
                id,
                fields.layer,
                -1,
                &fields.timeline_start_time,
                &fields.timeline_end_time,
            )?,
            audio_path: required(&fields.audio_path, "audioPath")?,
            volume: 1.0,
            waveform_path: None,
            extracted: false,
        };
        segment.apply(fields)?;
        Ok(segment)
    }

    pub fn apply(&mut self, fields: &AudioFields) -> Result<(), EditError> {
        fields.transform().apply(&mut self.base)?;
        set(&mut self.audio_path, &fields.audio_path);
        set(&mut self.volume, &fields.volume);
        set(&mut self.extracted, &fields.extracted);
        if fields.waveform_path.is_some() {
            self.waveform_path = fields.waveform_path.clone();
        }
        Ok(())
    }
}

// --- IMAGE ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSegment {
    #[serde(flatten)]
    pub base: SegmentBase,
    pub image_path: String,
    #[serde(default)]
    pub custom_width: Option<u32>,
    #[serde(default)]
    pub custom_height: Option<u32>,
    #[serde(default = "default_true")]
    pub maintain_aspect_ratio: bool,
    #[serde(default)]
    pub is_element: bool,
}

fn default_true() -> bool {
    true
}

impl ImageFields {
    fn transform(&self) -> TransformPatch<'_> {
        TransformPatch {
            layer: self.layer,
            start: self.timeline_start_time,
            end: self.timeline_end_time,
            source_start: None,
            source_end: None,
            position_x: self.position_x,
            position_y: self.position_y,
            scale: self.scale,
            opacity: self.opacity,
            rotation: self.rotation,
            crop: [self.crop_l, self.crop_r, self.crop_t, self.crop_b],
            keyframes: self.keyframes.as_ref(),
        }
    }
}

impl ImageSegment {
    pub fn create(id: String, fields: &ImageFields) -> Result<Self, EditError> {
        let mut segment = Self {
            base: new_base(
                id,
                fields.layer,
                0,
                &fields.timeline_start_time,
                &fields.timeline_end_time,
            )?,
            image_path: required(&fields.image_path, "imagePath")?,
            custom_width: None,
            custom_height: None,
            maintain_aspect_ratio: true,
            is_element: false,
        };
        segment.apply(fields)?;
        Ok(segment)
    }

    pub fn apply(&mut self, fields: &ImageFields) -> Result<(), EditError> {
        fields.transform().apply(&mut self.base)?;
        set(&mut self.image_path, &fields.image_path);
        if fields.custom_width.is_some() {
            self.custom_width = fields.custom_width;
        }
        if fields.custom_height.is_some() {
            self.custom_height = fields.custom_height;
        }
        set(&mut self.maintain_aspect_ratio, &fields.maintain_aspect_ratio);
        set(&mut self.is_element, &fields.is_element);
        Ok(())
    }
}

// --- TEXT ---

fn default_font() -> String {
    "Arial".to_string()
}

fn default_white() -> String {
    "#FFFFFF".to_string()
}

fn default_transparent() -> String {
    "transparent".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextSegment {
    #[serde(flatten)]
    pub base: SegmentBase,
    pub text: String,
    #[serde(default = "default_font")]
    pub font_family: String,
    #[serde(default = "default_white")]
    pub font_color: String,
    #[serde(default)]
    pub alignment: TextAlignment,
    #[serde(default)]
    pub letter_spacing: f64,
    #[serde(default = "one")]
    pub line_spacing: f64,
    #[serde(default = "default_transparent")]
    pub background_color: String,
    #[serde(default)]
    pub background_opacity: f64,
    #[serde(default)]
    pub background_border_width: f64,
    #[serde(default = "default_transparent")]
    pub background_border_color: String,
    #[serde(default)]
    pub background_border_radius: f64,
    #[serde(default)]
    pub background_h: f64,
    #[serde(default)]
    pub background_w: f64,
    #[serde(default = "default_transparent")]
    pub text_border_color: String,
    #[serde(default)]
    pub text_border_width: f64,
    #[serde(default)]
    pub text_border_opacity: f64,
    #[serde(default)]
    pub is_subtitle: bool,
}

impl TextFields {
    fn transform(&self) -> TransformPatch<'_> {
        TransformPatch {
            layer: self.layer,
            start: self.timeline_start_time,
            end: self.timeline_end_time,
            source_start: None,
            source_end: None,
            position_x: self.position_x,
            position_y: self.position_y,
            scale: self.scale,
            opacity: self.opacity,
            rotation: self.rotation,
            crop: [None; 4],
            keyframes: self.keyframes.as_ref(),
        }
    }
}

impl TextSegment {
    pub fn create(id: String, fields: &TextFields) -> Result<Self, EditError> {
        let mut segment = Self {
            base: new_base(
                id,
                fields.layer,
                0,
                &fields.timeline_start_time,
                &fields.timeline_end_time,
            )?,
            text: required(&fields.text, "text")?,
            font_family: default_font(),
            font_color: default_white(),
            alignment: TextAlignment::default(),
            letter_spacing: 0.0,
            line_spacing: 1.0,
            background_color: default_transparent(),
            background_opacity: 0.0,
            background_border_width: 0.0,
            background_border_color: default_transparent(),
            background_border_radius: 0.0,
            background_h: 0.0,
            background_w: 0.0,
            text_border_color: default_transparent(),
            text_border_width: 0.0,
            text_border_opacity: 0.0,
            is_subtitle: false,
        };
        segment.apply(fields)?;
        Ok(segment)
    }

    pub fn apply(&mut self, fields: &TextFields) -> Result<(), EditError> {
        fields.transform().apply(&mut self.base)?;
        set(&mut self.text, &fields.text);
        set(&mut self.font_family, &fields.font_family);
        set(&mut self.font_color, &fields.font_color);
        set(&mut self.alignment, &fields.alignment);
        set(&mut self.letter_spacing, &fields.letter_spacing);
        set(&mut self.line_spacing, &fields.line_spacing);
        set(&mut self.background_color, &fields.background_color);
        set(&mut self.background_opacity, &fields.background_opacity);
        set(&mut self.background_border_width, &fields.background_border_width);
        set(&mut self.background_border_color, &fields.background_border_color);
        set(&mut self.background_border_radius, &fields.background_border_radius);
        set(&mut self.background_h, &fields.background_h);
        set(&mut self.background_w, &fields.background_w);
        set(&mut self.text_border_color, &fields.text_border_color);
        set(&mut self.text_border_width, &fields.text_border_width);
        set(&mut self.text_border_opacity, &fields.text_border_opacity);
        set(&mut self.is_subtitle, &fields.is_subtitle);
        Ok(())
    }
}

// 3. THE SEGMENT ENUM (owned copy handed to callers)

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "segmentType", rename_all = "lowercase")]
pub enum Segment {
    Video(VideoSegment),
    Audio(AudioSegment),
    Image(ImageSegment),
    Text(TextSegment),
}

impl Segment {
    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::Video(_) => SegmentKind::Video,
            Segment::Audio(_) => SegmentKind::Audio,
            Segment::Image(_) => SegmentKind::Image,
            Segment::Text(_) => SegmentKind::Text,
        }
    }

    pub fn base(&self) -> &SegmentBase {
        match self {
            Segment::Video(s) => &s.base,
            Segment::Audio(s) => &s.base,
            Segment::Image(s) => &s.base,
            Segment::Text(s) => &s.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut SegmentBase {
        match self {
            Segment::Video(s) => &mut s.base,
            Segment::Audio(s) => &mut s.base,
            Segment::Image(s) => &mut s.base,
            Segment::Text(s) => &mut s.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// Static value of every animatable property, before keyframes are applied.
    pub fn static_properties(&self) -> BTreeMap<String, KeyframeValue> {
        let mut out = BTreeMap::new();
        match self {
            Segment::Video(s) => s.base.static_properties(&mut out),
            Segment::Image(s) => s.base.static_properties(&mut out),
            Segment::Audio(s) => {
                out.insert("volume".to_string(), KeyframeValue::Number(s.volume));
            }
            Segment::Text(s) => {
                s.base.static_properties(&mut out);
                for crop in ["cropL", "cropR", "cropT", "cropB"] {
                    out.remove(crop);
                }
                out.insert(
                    "fontColor".to_string(),
                    KeyframeValue::Text(s.font_color.clone()),
                );
                out.insert(
                    "backgroundColor".to_string(),
                    KeyframeValue::Text(s.background_color.clone()),
                );
                out.insert(
                    "backgroundOpacity".to_string(),
                    KeyframeValue::Number(s.background_opacity),
                );
                out.insert(
                    "letterSpacing".to_string(),
                    KeyframeValue::Number(s.letter_spacing),
                );
                out.insert(
                    "lineSpacing".to_string(),
                    KeyframeValue::Number(s.line_spacing),
                );
                out.insert(
                    "alignment".to_string(),
                    KeyframeValue::Text(s.alignment.as_str().to_string()),
                );
            }
        }
        out
    }

    /// Effective property values at an absolute timeline time.
    pub fn effective_properties(&self, time: f64) -> BTreeMap<String, KeyframeValue> {
        let base = self.base();
        let local = time - base.timeline_start_time;
        let mut values = self.static_properties();
        for (property, track) in &base.keyframes {
            if let Some(value) = track.evaluate(local) {
                values.insert(property.clone(), value);
            }
        }
        values
    }
}

// --- TRANSITIONS ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub id: String,
    #[serde(rename = "type")]
    pub transition_type: String,
    #[serde(alias = "durationSeconds")]
    pub duration: f64,
    pub segment_id: String,
    pub start: bool,
    pub end: bool,
    pub layer: i32,
    pub timeline_start_time: f64,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Transition {
    /// Anchors to the owner's start edge, or to its end edge for end-only transitions.
    pub fn anchor_to(&mut self, owner: &SegmentBase) {
        self.timeline_start_time = if self.start {
            owner.timeline_start_time
        } else {
            owner.timeline_end_time - self.duration
        };
    }
}
