// src/timeline.rs
use crate::keyframe::{Keyframe, KeyframeError, KeyframeTrack, KeyframeValue};
use crate::project_store::StoreError;
use crate::requests::{AudioFields, ImageFields, SubtitleCue, TextFields, TransitionFields, VideoFields};
use crate::segment::{
    AudioSegment, Filter, ImageSegment, Segment, SegmentKind, TextSegment, Transition,
    VideoSegment,
};
use crate::validator::{
    validate_keyframe_value, validate_property, validate_segment, validate_transition,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EditError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("Failed to acquire session lock")]
    LockPoisoned,
}

impl From<KeyframeError> for EditError {
    fn from(err: KeyframeError) -> Self {
        match err {
            KeyframeError::MissingTime(_) => EditError::NotFound(err.to_string()),
            other => EditError::Validation(other.to_string()),
        }
    }
}

fn not_found(kind: SegmentKind, id: &str) -> EditError {
    EditError::NotFound(format!("{} segment not found: {}", kind, id))
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// 1. THE DATA STRUCTURES

/// All segments and transitions of one editing session.
///
/// Collection order carries no meaning; overlap and stacking come from
/// times and layers.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineState {
    #[serde(default, alias = "segments")]
    pub video_segments: Vec<VideoSegment>,
    #[serde(default)]
    pub audio_segments: Vec<AudioSegment>,
    #[serde(default)]
    pub image_segments: Vec<ImageSegment>,
    #[serde(default)]
    pub text_segments: Vec<TextSegment>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

/// A segment visible or audible at a queried time, with resolved property values.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSegment {
    pub segment: Segment,
    pub properties: BTreeMap<String, KeyframeValue>,
}

impl ActiveSegment {
    pub fn number(&self, property: &str) -> Option<f64> {
        self.properties.get(property).and_then(|v| v.as_number())
    }
}

// 2. THE OPERATIONS
// Every mutation validates a candidate first and only then writes it back,
// so a failed call leaves the state untouched.

impl TimelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// End of the last segment, in seconds.
    pub fn duration(&self) -> f64 {
        self.segments()
            .map(|s| s.base().timeline_end_time)
            .fold(0.0, f64::max)
    }

    pub fn segment_count(&self) -> usize {
        self.video_segments.len()
            + self.audio_segments.len()
            + self.image_segments.len()
            + self.text_segments.len()
    }

    /// Owned copies of every segment, video first.
    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.video_segments
            .iter()
            .cloned()
            .map(Segment::Video)
            .chain(self.audio_segments.iter().cloned().map(Segment::Audio))
            .chain(self.image_segments.iter().cloned().map(Segment::Image))
            .chain(self.text_segments.iter().cloned().map(Segment::Text))
    }

    pub fn find_segment(&self, id: &str) -> Option<Segment> {
        if let Some(s) = self.video_segments.iter().find(|s| s.base.id == id) {
            return Some(Segment::Video(s.clone()));
        }
        if let Some(s) = self.audio_segments.iter().find(|s| s.base.id == id) {
            return Some(Segment::Audio(s.clone()));
        }
        if let Some(s) = self.image_segments.iter().find(|s| s.base.id == id) {
            return Some(Segment::Image(s.clone()));
        }
        self.text_segments
            .iter()
            .find(|s| s.base.id == id)
            .map(|s| Segment::Text(s.clone()))
    }

    fn segment_of_kind(&self, kind: SegmentKind, id: &str) -> Result<Segment, EditError> {
        self.find_segment(id)
            .filter(|s| s.kind() == kind)
            .ok_or_else(|| not_found(kind, id))
    }

    pub fn find_transition(&self, id: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == id)
    }

    pub fn transitions_for(&self, segment_id: &str) -> Vec<&Transition> {
        self.transitions
            .iter()
            .filter(|t| t.segment_id == segment_id)
            .collect()
    }

    /// Highest layer used by a visual segment.
    pub fn topmost_visual_layer(&self) -> Option<i32> {
        self.segments()
            .filter(|s| s.kind().is_visual())
            .map(|s| s.base().layer)
            .max()
    }

    // --- Internal write path ---

    fn check_links(&self, segment: &Segment) -> Result<(), EditError> {
        if let Segment::Video(video) = segment {
            if let Some(audio_id) = &video.audio_id {
                if !self.audio_segments.iter().any(|a| &a.base.id == audio_id) {
                    return Err(EditError::Validation(format!(
                        "Audio segment not found: {}",
                        audio_id
                    )));
                }
            }
        }
        Ok(())
    }

    // Writes a validated segment back, replacing the stored copy with the same id.
    fn put_segment(&mut self, segment: Segment) {
        fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T) -> bool) {
            match items.iter().position(same) {
                Some(i) => items[i] = item,
                None => items.push(item),
            }
        }

        self.reanchor_transitions(&segment);
        let id = segment.id().to_string();
        match segment {
            Segment::Video(s) => upsert(&mut self.video_segments, s, |x| x.base.id == id),
            Segment::Audio(s) => upsert(&mut self.audio_segments, s, |x| x.base.id == id),
            Segment::Image(s) => upsert(&mut self.image_segments, s, |x| x.base.id == id),
            Segment::Text(s) => upsert(&mut self.text_segments, s, |x| x.base.id == id),
        }
    }

    fn reanchor_transitions(&mut self, owner: &Segment) {
        for transition in self
            .transitions
            .iter_mut()
            .filter(|t| t.segment_id == owner.id())
        {
            transition.layer = owner.base().layer;
            transition.anchor_to(owner.base());
        }
    }

    fn insert_segment(&mut self, segment: Segment) -> Result<Segment, EditError> {
        validate_segment(&segment)?;
        self.check_links(&segment)?;
        self.put_segment(segment.clone());
        Ok(segment)
    }

    // Runs `edit` on a copy of the segment, validates the copy, then commits it.
    fn edit_segment<R>(
        &mut self,
        kind: SegmentKind,
        id: &str,
        edit: impl FnOnce(&mut Segment) -> Result<R, EditError>,
    ) -> Result<(R, Segment), EditError> {
        let mut candidate = self.segment_of_kind(kind, id)?;
        let result = edit(&mut candidate)?;
        validate_segment(&candidate)?;
        self.check_links(&candidate)?;
        // Anchored transitions must still fit the edited segment
        for transition in self.transitions.iter().filter(|t| t.segment_id == id) {
            let mut moved = transition.clone();
            moved.layer = candidate.base().layer;
            moved.anchor_to(candidate.base());
            validate_transition(&moved, &candidate)?;
        }
        self.put_segment(candidate.clone());
        Ok((result, candidate))
    }

    fn edit_any_segment<R>(
        &mut self,
        id: &str,
        edit: impl FnOnce(&mut Segment) -> Result<R, EditError>,
    ) -> Result<(R, Segment), EditError> {
        let kind = self
            .find_segment(id)
            .map(|s| s.kind())
            .ok_or_else(|| EditError::NotFound(format!("Segment not found: {}", id)))?;
        self.edit_segment(kind, id, edit)
    }

    // --- Segments ---

    pub fn add_video(&mut self, fields: &VideoFields) -> Result<Segment, EditError> {
        let segment = VideoSegment::create(new_id(), fields)?;
        self.insert_segment(Segment::Video(segment))
    }

    pub fn add_audio(&mut self, fields: &AudioFields) -> Result<Segment, EditError> {
        let segment = AudioSegment::create(new_id(), fields)?;
        self.insert_segment(Segment::Audio(segment))
    }

    pub fn add_image(&mut self, fields: &ImageFields) -> Result<Segment, EditError> {
        let segment = ImageSegment::create(new_id(), fields)?;
        self.insert_segment(Segment::Image(segment))
    }

    pub fn add_text(&mut self, fields: &TextFields) -> Result<Segment, EditError> {
        let segment = TextSegment::create(new_id(), fields)?;
        self.insert_segment(Segment::Text(segment))
    }

    pub fn update_video(&mut self, id: &str, fields: &VideoFields) -> Result<Segment, EditError> {
        let (_, segment) = self.edit_segment(SegmentKind::Video, id, |segment| match segment {
            Segment::Video(video) => video.apply(fields),
            _ => Err(not_found(SegmentKind::Video, id)),
        })?;
        Ok(segment)
    }

    pub fn update_audio(&mut self, id: &str, fields: &AudioFields) -> Result<Segment, EditError> {
        let (_, segment) = self.edit_segment(SegmentKind::Audio, id, |segment| match segment {
            Segment::Audio(audio) => audio.apply(fields),
            _ => Err(not_found(SegmentKind::Audio, id)),
        })?;
        Ok(segment)
    }

    pub fn update_image(&mut self, id: &str, fields: &ImageFields) -> Result<Segment, EditError> {
        let (_, segment) = self.edit_segment(SegmentKind::Image, id, |segment| match segment {
            Segment::Image(image) => image.apply(fields),
            _ => Err(not_found(SegmentKind::Image, id)),
        })?;
        Ok(segment)
    }

    pub fn update_text(&mut self, id: &str, fields: &TextFields) -> Result<Segment, EditError> {
        let (_, segment) = self.edit_segment(SegmentKind::Text, id, |segment| match segment {
            Segment::Text(text) => text.apply(fields),
            _ => Err(not_found(SegmentKind::Text, id)),
        })?;
        Ok(segment)
    }

    /// Removes a segment and the transitions anchored to it.
    ///
    /// A video's paired audio stays on the timeline; removing an audio
    /// segment clears any video back-reference to it.
    pub fn remove_segment(&mut self, id: &str) -> Result<Segment, EditError> {
        let removed = self
            .find_segment(id)
            .ok_or_else(|| EditError::NotFound(format!("Segment not found: {}", id)))?;

        match removed.kind() {
            SegmentKind::Video => self.video_segments.retain(|s| s.base.id != id),
            SegmentKind::Audio => {
                self.audio_segments.retain(|s| s.base.id != id);
                for video in &mut self.video_segments {
                    if video.audio_id.as_deref() == Some(id) {
                        video.audio_id = None;
                    }
                }
            }
            SegmentKind::Image => self.image_segments.retain(|s| s.base.id != id),
            SegmentKind::Text => self.text_segments.retain(|s| s.base.id != id),
        }
        self.transitions.retain(|t| t.segment_id != id);
        Ok(removed)
    }

    /// Removes several segments; fails without removing anything if one id is unknown.
    pub fn remove_segments(&mut self, ids: &[String]) -> Result<Vec<String>, EditError> {
        if ids.is_empty() {
            return Err(EditError::Validation(
                "Missing or empty required parameter: segmentIds".to_string(),
            ));
        }
        if let Some(missing) = ids.iter().find(|id| self.find_segment(id).is_none()) {
            return Err(EditError::NotFound(format!("Segment not found: {}", missing)));
        }

        let mut seen = HashSet::new();
        let mut removed = Vec::new();
        for id in ids {
            if seen.insert(id.as_str()) {
                self.remove_segment(id)?;
                removed.push(id.clone());
            }
        }
        Ok(removed)
    }

    // --- Keyframes ---

    fn track_after(segment: &Segment, property: &str) -> KeyframeTrack {
        segment
            .base()
            .keyframes
            .get(property)
            .cloned()
            .unwrap_or_default()
    }

    /// Adds a sample to a property track; a sample at the same time is replaced.
    pub fn add_keyframe(
        &mut self,
        segment_id: &str,
        kind: SegmentKind,
        property: &str,
        keyframe: Keyframe,
    ) -> Result<KeyframeTrack, EditError> {
        validate_property(kind, property)?;
        validate_keyframe_value(property, &keyframe.value)?;
        let (_, segment) = self.edit_segment(kind, segment_id, |segment| {
            let track = segment
                .base_mut()
                .keyframes
                .entry(property.to_string())
                .or_default();
            track.upsert(keyframe)?;
            Ok(())
        })?;
        Ok(Self::track_after(&segment, property))
    }

    /// Replaces the sample at `keyframe.time`; the sample must already exist.
    pub fn update_keyframe(
        &mut self,
        segment_id: &str,
        kind: SegmentKind,
        property: &str,
        keyframe: Keyframe,
    ) -> Result<KeyframeTrack, EditError> {
        validate_property(kind, property)?;
        validate_keyframe_value(property, &keyframe.value)?;
        let (_, segment) = self.edit_segment(kind, segment_id, |segment| {
            let track = segment
                .base_mut()
                .keyframes
                .get_mut(property)
                .ok_or_else(|| {
                    EditError::NotFound(format!("No keyframes for property '{}'", property))
                })?;
            track.replace(keyframe)?;
            Ok(())
        })?;
        Ok(Self::track_after(&segment, property))
    }

    pub fn remove_keyframe(
        &mut self,
        segment_id: &str,
        kind: SegmentKind,
        property: &str,
        time: f64,
    ) -> Result<KeyframeTrack, EditError> {
        let (_, segment) = self.edit_segment(kind, segment_id, |segment| {
            let keyframes = &mut segment.base_mut().keyframes;
            let track = keyframes.get_mut(property).ok_or_else(|| {
                EditError::NotFound(format!("No keyframes for property '{}'", property))
            })?;
            track.remove_at(time)?;
            if track.is_empty() {
                keyframes.remove(property);
            }
            Ok(())
        })?;
        Ok(Self::track_after(&segment, property))
    }

    // --- Transitions ---

    fn owner_of(&self, segment_id: &str) -> Result<Segment, EditError> {
        self.find_segment(segment_id)
            .ok_or_else(|| EditError::NotFound(format!("Segment not found: {}", segment_id)))
    }

    pub fn add_transition(&mut self, fields: &TransitionFields) -> Result<Transition, EditError> {
        let missing =
            || EditError::Validation("Missing required parameters: type, duration, segmentId".into());
        let segment_id = fields.segment_id.clone().ok_or_else(missing)?;
        let owner = self.owner_of(&segment_id)?;

        let mut transition = Transition {
            id: new_id(),
            transition_type: fields.transition_type.clone().ok_or_else(missing)?,
            duration: fields.duration.ok_or_else(missing)?,
            segment_id,
            start: fields.start.unwrap_or(false),
            end: fields.end.unwrap_or(false),
            layer: fields.layer.unwrap_or(owner.base().layer),
            timeline_start_time: 0.0,
            parameters: fields.parameters.clone().unwrap_or_default(),
        };
        transition.anchor_to(owner.base());
        validate_transition(&transition, &owner)?;

        self.transitions.push(transition.clone());
        Ok(transition)
    }

    pub fn update_transition(
        &mut self,
        id: &str,
        fields: &TransitionFields,
    ) -> Result<Transition, EditError> {
        let index = self
            .transitions
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| EditError::NotFound(format!("Transition not found: {}", id)))?;

        let mut candidate = self.transitions[index].clone();
        if let Some(v) = &fields.transition_type {
            candidate.transition_type = v.clone();
        }
        if let Some(v) = fields.duration {
            candidate.duration = v;
        }
        if let Some(v) = &fields.segment_id {
            candidate.segment_id = v.clone();
        }
        if let Some(v) = fields.start {
            candidate.start = v;
        }
        if let Some(v) = fields.end {
            candidate.end = v;
        }
        if let Some(v) = fields.layer {
            candidate.layer = v;
        }
        if let Some(v) = &fields.parameters {
            candidate.parameters = v.clone();
        }

        let owner = self.owner_of(&candidate.segment_id)?;
        if fields.layer.is_none() && fields.segment_id.is_some() {
            candidate.layer = owner.base().layer;
        }
        candidate.anchor_to(owner.base());
        validate_transition(&candidate, &owner)?;

        self.transitions[index] = candidate.clone();
        Ok(candidate)
    }

    pub fn remove_transition(&mut self, id: &str) -> Result<Transition, EditError> {
        let index = self
            .transitions
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| EditError::NotFound(format!("Transition not found: {}", id)))?;
        Ok(self.transitions.remove(index))
    }

    // --- Filters ---

    fn filterable(&self, segment_id: &str) -> Result<(), EditError> {
        match self.owner_of(segment_id)?.kind() {
            SegmentKind::Video | SegmentKind::Image => Ok(()),
            other => Err(EditError::Validation(format!(
                "Filters cannot be applied to {} segments",
                other
            ))),
        }
    }

    /// Applies a named filter; a filter with the same name is overwritten in place.
    pub fn apply_filter(
        &mut self,
        segment_id: &str,
        filter_name: &str,
        filter_value: Option<String>,
    ) -> Result<Filter, EditError> {
        self.filterable(segment_id)?;
        if filter_name.trim().is_empty() {
            return Err(EditError::Validation("filterName must not be empty".into()));
        }
        let (filter, _) = self.edit_any_segment(segment_id, |segment| {
            let filters = &mut segment.base_mut().filters;
            if let Some(existing) = filters.iter_mut().find(|f| f.filter_name == filter_name) {
                existing.filter_value = filter_value;
                return Ok(existing.clone());
            }
            let filter = Filter {
                filter_id: new_id(),
                segment_id: segment_id.to_string(),
                filter_name: filter_name.to_string(),
                filter_value,
            };
            filters.push(filter.clone());
            Ok(filter)
        })?;
        Ok(filter)
    }

    pub fn update_filter(
        &mut self,
        segment_id: &str,
        filter_id: &str,
        filter_name: Option<String>,
        filter_value: Option<String>,
    ) -> Result<Filter, EditError> {
        self.filterable(segment_id)?;
        if filter_name.as_deref().map(|n| n.trim().is_empty()) == Some(true) {
            return Err(EditError::Validation("filterName must not be empty".into()));
        }
        let (filter, _) = self.edit_any_segment(segment_id, |segment| {
            let filter = segment
                .base_mut()
                .filters
                .iter_mut()
                .find(|f| f.filter_id == filter_id)
                .ok_or_else(|| EditError::NotFound(format!("Filter not found: {}", filter_id)))?;
            if let Some(name) = filter_name {
                filter.filter_name = name;
            }
            if filter_value.is_some() {
                filter.filter_value = filter_value;
            }
            Ok(filter.clone())
        })?;
        Ok(filter)
    }

    pub fn remove_filter(&mut self, segment_id: &str, filter_id: &str) -> Result<Filter, EditError> {
        self.filterable(segment_id)?;
        let (filter, _) = self.edit_any_segment(segment_id, |segment| {
            let filters = &mut segment.base_mut().filters;
            let index = filters
                .iter()
                .position(|f| f.filter_id == filter_id)
                .ok_or_else(|| EditError::NotFound(format!("Filter not found: {}", filter_id)))?;
            Ok(filters.remove(index))
        })?;
        Ok(filter)
    }

    pub fn remove_all_filters(&mut self, segment_id: &str) -> Result<Vec<Filter>, EditError> {
        self.filterable(segment_id)?;
        let (removed, _) = self.edit_any_segment(segment_id, |segment| {
            Ok(std::mem::take(&mut segment.base_mut().filters))
        })?;
        Ok(removed)
    }

    // --- Subtitles & bulk text ---

    /// Inserts one subtitle text segment per cue on a layer above all visual content.
    pub fn add_subtitles(
        &mut self,
        cues: &[SubtitleCue],
        style: &TextFields,
    ) -> Result<Vec<Segment>, EditError> {
        if cues.is_empty() {
            return Err(EditError::Validation("No subtitle cues provided".into()));
        }
        let layer = style
            .layer
            .unwrap_or_else(|| self.topmost_visual_layer().map_or(0, |l| l + 1));

        // Build and validate every cue before touching the timeline
        let mut staged = Vec::with_capacity(cues.len());
        for cue in cues {
            let fields = TextFields {
                text: Some(cue.text.clone()),
                timeline_start_time: Some(cue.timeline_start_time),
                timeline_end_time: Some(cue.timeline_end_time),
                layer: Some(layer),
                is_subtitle: Some(true),
                ..style.clone()
            };
            let segment = Segment::Text(TextSegment::create(new_id(), &fields)?);
            validate_segment(&segment)?;
            staged.push(segment);
        }

        for segment in &staged {
            self.put_segment(segment.clone());
        }
        Ok(staged)
    }

    /// Applies one text patch to several text segments, all or nothing.
    pub fn update_multiple_text(
        &mut self,
        ids: &[String],
        fields: &TextFields,
    ) -> Result<Vec<Segment>, EditError> {
        if ids.is_empty() {
            return Err(EditError::Validation(
                "Missing or empty required parameter: segmentIds".into(),
            ));
        }
        // Each edit takes the single-segment path on a copy; the copy is committed only if all pass
        let mut staged = self.clone();
        let mut updated = Vec::with_capacity(ids.len());
        for id in ids {
            updated.push(staged.update_text(id, fields)?);
        }
        *self = staged;
        Ok(updated)
    }

    // --- Queries ---

    /// Segments active at `time`, ordered by layer then start, with keyframes resolved.
    pub fn query(&self, time: f64) -> Vec<ActiveSegment> {
        let mut active: Vec<ActiveSegment> = self
            .segments()
            .filter(|s| s.base().contains(time))
            .map(|segment| ActiveSegment {
                properties: segment.effective_properties(time),
                segment,
            })
            .collect();
        active.sort_by(|a, b| {
            let (a, b) = (a.segment.base(), b.segment.base());
            a.layer.cmp(&b.layer).then(
                a.timeline_start_time
                    .partial_cmp(&b.timeline_start_time)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        active
    }

    // --- Integrity ---

    /// Drops dangling audio back-references and transitions whose owner is gone.
    /// Returns a description of every repair made.
    pub fn repair_references(&mut self) -> Vec<String> {
        let mut repairs = Vec::new();
        let audio_ids: HashSet<String> = self
            .audio_segments
            .iter()
            .map(|a| a.base.id.clone())
            .collect();
        for video in &mut self.video_segments {
            if let Some(audio_id) = &video.audio_id {
                if !audio_ids.contains(audio_id) {
                    repairs.push(format!(
                        "video {} referenced missing audio {}",
                        video.base.id, audio_id
                    ));
                    video.audio_id = None;
                }
            }
        }

        let visual: BTreeMap<String, i32> = self
            .segments()
            .filter(|s| s.kind().is_visual())
            .map(|s| (s.id().to_string(), s.base().layer))
            .collect();
        self.transitions.retain(|t| {
            let keep = visual.contains_key(&t.segment_id);
            if !keep {
                repairs.push(format!(
                    "transition {} referenced missing segment {}",
                    t.id, t.segment_id
                ));
            }
            keep
        });
        repairs
    }
}
