// src/validator.rs
use crate::keyframe::{KeyframeTrack, KeyframeValue, ValueKind};
use crate::segment::{
    animatable_properties, AudioSegment, ImageSegment, Segment, SegmentBase, SegmentKind,
    TextSegment, Transition, VideoSegment,
};
use crate::timeline::EditError;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 5.0;
pub const MAX_VOLUME: f64 = 15.0;
pub const MAX_CROP: f64 = 100.0;

fn reject<T>(message: impl Into<String>) -> Result<T, EditError> {
    Err(EditError::Validation(message.into()))
}

fn in_range(value: f64, min: f64, max: f64) -> bool {
    value.is_finite() && value >= min && value <= max
}

// --- SEGMENTS ---

pub fn validate_segment(segment: &Segment) -> Result<(), EditError> {
    match segment {
        Segment::Video(s) => validate_video(s),
        Segment::Audio(s) => validate_audio(s),
        Segment::Image(s) => validate_image(s),
        Segment::Text(s) => validate_text(s),
    }
}

fn validate_base(kind: SegmentKind, base: &SegmentBase) -> Result<(), EditError> {
    let start = base.timeline_start_time;
    let end = base.timeline_end_time;
    if !start.is_finite() || start < 0.0 {
        return reject("timelineStartTime must be non-negative");
    }
    if !end.is_finite() || end <= start {
        return reject("timelineEndTime must be greater than timelineStartTime");
    }

    // Rule: the sign of the layer tells audio apart from everything else
    if kind.is_visual() && base.layer < 0 {
        return reject(format!("{} layer must be non-negative", kind));
    }
    if !kind.is_visual() && base.layer >= 0 {
        return reject("Audio layer must be negative");
    }

    if let Some(s) = base.source_start_time {
        if !s.is_finite() || s < 0.0 {
            return reject("startTime must be non-negative");
        }
    }
    if let (Some(s), Some(e)) = (base.source_start_time, base.source_end_time) {
        if !e.is_finite() || e <= s {
            return reject("endTime must be greater than startTime");
        }
    }

    if !in_range(base.opacity, 0.0, 1.0) {
        return reject("Opacity must be between 0 and 1");
    }
    if !base.rotation.is_finite() {
        return reject("Rotation must be a valid number");
    }
    if !base.scale.is_finite() || base.scale <= 0.0 {
        return reject("Scale must be a positive number");
    }
    if !base.position_x.is_finite() || !base.position_y.is_finite() {
        return reject("Position must be a valid number");
    }

    for (name, value) in [
        ("cropL", base.crop_l),
        ("cropR", base.crop_r),
        ("cropT", base.crop_t),
        ("cropB", base.crop_b),
    ] {
        if !in_range(value, 0.0, MAX_CROP) {
            return reject(format!("{} must be between 0 and 100", name));
        }
    }

    // Keyframed crop edges are checked per sample, not as a static sum
    let horizontal_keyframed = base.is_keyframed("cropL") || base.is_keyframed("cropR");
    if !horizontal_keyframed && base.crop_l + base.crop_r >= MAX_CROP {
        return reject("Total horizontal crop (cropL + cropR) cannot be 100% or more");
    }
    let vertical_keyframed = base.is_keyframed("cropT") || base.is_keyframed("cropB");
    if !vertical_keyframed && base.crop_t + base.crop_b >= MAX_CROP {
        return reject("Total vertical crop (cropT + cropB) cannot be 100% or more");
    }

    for (property, track) in &base.keyframes {
        validate_track(kind, property, track)?;
    }
    Ok(())
}

pub fn validate_video(segment: &VideoSegment) -> Result<(), EditError> {
    validate_base(SegmentKind::Video, &segment.base)?;
    if segment.source_video_path.trim().is_empty() {
        return reject("sourceVideoPath must not be empty");
    }
    if !in_range(segment.speed, MIN_SPEED, MAX_SPEED) {
        return reject("Speed must be between 0.1 and 5.0");
    }
    Ok(())
}

pub fn validate_audio(segment: &AudioSegment) -> Result<(), EditError> {
    validate_base(SegmentKind::Audio, &segment.base)?;
    if segment.audio_path.trim().is_empty() {
        return reject("audioPath must not be empty");
    }
    if !in_range(segment.volume, 0.0, MAX_VOLUME) {
        return reject("Volume must be between 0 and 15");
    }
    Ok(())
}

pub fn validate_image(segment: &ImageSegment) -> Result<(), EditError> {
    validate_base(SegmentKind::Image, &segment.base)?;
    if segment.image_path.trim().is_empty() {
        return reject("imagePath must not be empty");
    }
    if segment.custom_width == Some(0) || segment.custom_height == Some(0) {
        return reject("Custom width and height must be positive");
    }
    Ok(())
}

pub fn validate_text(segment: &TextSegment) -> Result<(), EditError> {
    validate_base(SegmentKind::Text, &segment.base)?;
    if segment.text.trim().is_empty() {
        return reject("Text must not be empty");
    }
    if !in_range(segment.background_opacity, 0.0, 1.0) {
        return reject("Background opacity must be between 0 and 1");
    }
    if !in_range(segment.text_border_opacity, 0.0, 1.0) {
        return reject("Text border opacity must be between 0 and 1");
    }
    let non_negative = [
        ("Background border width", segment.background_border_width),
        ("Background border radius", segment.background_border_radius),
        ("Background height", segment.background_h),
        ("Background width", segment.background_w),
        ("Text border width", segment.text_border_width),
        ("Letter spacing", segment.letter_spacing),
        ("Line spacing", segment.line_spacing),
    ];
    for (name, value) in non_negative {
        if !value.is_finite() || value < 0.0 {
            return reject(format!("{} must be non-negative", name));
        }
    }
    Ok(())
}

// --- KEYFRAMES ---

pub fn validate_property(kind: SegmentKind, property: &str) -> Result<(), EditError> {
    if !animatable_properties(kind).contains(&property) {
        return reject(format!(
            "Property '{}' cannot be keyframed on {} segments",
            property, kind
        ));
    }
    Ok(())
}

/// Checks one sample value against the property's domain.
pub fn validate_keyframe_value(property: &str, value: &KeyframeValue) -> Result<(), EditError> {
    let number = |min: f64, max: f64, message: &str| match value {
        KeyframeValue::Number(n) if in_range(*n, min, max) => Ok(()),
        _ => reject(format!("{} keyframe value {}", property, message)),
    };
    match property {
        "opacity" | "backgroundOpacity" => number(0.0, 1.0, "must be between 0 and 1"),
        "volume" => number(0.0, MAX_VOLUME, "must be between 0 and 15"),
        "cropL" | "cropR" | "cropT" | "cropB" => {
            number(0.0, MAX_CROP, "must be between 0 and 100")
        }
        "letterSpacing" | "lineSpacing" => number(0.0, f64::MAX, "must be non-negative"),
        "scale" => match value {
            KeyframeValue::Number(n) if n.is_finite() && *n > 0.0 => Ok(()),
            _ => reject("scale keyframe value must be a positive number"),
        },
        "rotation" => number(f64::MIN, f64::MAX, "must be a valid number")
            .map_err(|_| EditError::Validation("Rotation keyframe value must be a valid number".into())),
        "positionX" | "positionY" => number(f64::MIN, f64::MAX, "must be a valid number"),
        "position" => match value {
            KeyframeValue::Vector(v) if v.len() == 2 && v.iter().all(|c| c.is_finite()) => Ok(()),
            _ => reject("position keyframe value must be a two-element vector"),
        },
        "fontColor" | "backgroundColor" => match value.kind() {
            ValueKind::Color | ValueKind::Text => Ok(()),
            _ => reject(format!("{} keyframe value must be a color", property)),
        },
        _ => Ok(()),
    }
}

pub fn validate_track(
    kind: SegmentKind,
    property: &str,
    track: &KeyframeTrack,
) -> Result<(), EditError> {
    validate_property(kind, property)?;
    for keyframe in track.keyframes() {
        validate_keyframe_value(property, &keyframe.value)?;
    }
    Ok(())
}

// --- TRANSITIONS ---

pub fn validate_transition(transition: &Transition, owner: &Segment) -> Result<(), EditError> {
    if transition.transition_type.trim().is_empty() {
        return reject("Transition type must not be empty");
    }
    if !transition.duration.is_finite() || transition.duration <= 0.0 {
        return reject("Duration must be positive");
    }
    if !transition.start && !transition.end {
        return reject("Transition must be applied at start, end, or both");
    }
    if !owner.kind().is_visual() {
        return reject("Transitions cannot be attached to audio segments");
    }
    if transition.layer != owner.base().layer {
        return reject(format!(
            "Transition layer {} does not match segment layer {}",
            transition.layer,
            owner.base().layer
        ));
    }
    if transition.duration > owner.base().duration() {
        return reject("Transition duration cannot exceed the segment duration");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframe::{Interpolation, Keyframe};
    use crate::requests::{AudioFields, VideoFields};

    fn video(fields: VideoFields) -> VideoSegment {
        VideoSegment::create("v1".to_string(), &fields).unwrap()
    }

    fn base_fields() -> VideoFields {
        VideoFields {
            timeline_start_time: Some(0.0),
            timeline_end_time: Some(10.0),
            source_video_path: Some("videos/a.mp4".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_video_passes() {
        assert!(validate_video(&video(base_fields())).is_ok());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let seg = video(VideoFields {
            timeline_end_time: Some(0.0),
            ..base_fields()
        });
        let err = validate_video(&seg).unwrap_err();
        assert!(matches!(err, EditError::Validation(_)));
    }

    #[test]
    fn test_speed_bounds() {
        let too_slow = video(VideoFields {
            speed: Some(0.05),
            ..base_fields()
        });
        assert!(validate_video(&too_slow).is_err());
        let fast = video(VideoFields {
            speed: Some(5.0),
            ..base_fields()
        });
        assert!(validate_video(&fast).is_ok());
    }

    #[test]
    fn test_negative_visual_layer_rejected() {
        let seg = video(VideoFields {
            layer: Some(-1),
            ..base_fields()
        });
        assert_eq!(
            validate_video(&seg).unwrap_err().to_string(),
            "video layer must be non-negative"
        );
    }

    #[test]
    fn test_audio_layer_must_be_negative() {
        let fields = AudioFields {
            layer: Some(0),
            timeline_start_time: Some(0.0),
            timeline_end_time: Some(3.0),
            audio_path: Some("audio/a.mp3".to_string()),
            ..Default::default()
        };
        let seg = AudioSegment::create("a1".to_string(), &fields).unwrap();
        assert_eq!(
            validate_audio(&seg).unwrap_err().to_string(),
            "Audio layer must be negative"
        );
    }

    #[test]
    fn test_volume_allows_amplification() {
        let fields = AudioFields {
            timeline_start_time: Some(0.0),
            timeline_end_time: Some(3.0),
            audio_path: Some("audio/a.mp3".to_string()),
            volume: Some(12.0),
            ..Default::default()
        };
        let seg = AudioSegment::create("a1".to_string(), &fields).unwrap();
        assert!(validate_audio(&seg).is_ok());
    }

    #[test]
    fn test_total_crop_rejected_unless_keyframed() {
        let static_crop = video(VideoFields {
            crop_l: Some(60.0),
            crop_r: Some(50.0),
            ..base_fields()
        });
        assert!(validate_video(&static_crop).is_err());

        let mut keyframes = std::collections::BTreeMap::new();
        keyframes.insert(
            "cropL".to_string(),
            vec![Keyframe::number(0.0, 10.0, Interpolation::Linear)],
        );
        let keyframed = video(VideoFields {
            crop_l: Some(60.0),
            crop_r: Some(50.0),
            keyframes: Some(keyframes),
            ..base_fields()
        });
        assert!(validate_video(&keyframed).is_ok());
    }

    #[test]
    fn test_keyframe_value_domains() {
        assert!(validate_keyframe_value("opacity", &KeyframeValue::Number(1.5)).is_err());
        assert!(validate_keyframe_value("volume", &KeyframeValue::Number(14.0)).is_ok());
        assert!(validate_keyframe_value("rotation", &KeyframeValue::Number(f64::NAN)).is_err());
        assert!(
            validate_keyframe_value("position", &KeyframeValue::Vector(vec![1.0, 2.0])).is_ok()
        );
        assert!(
            validate_keyframe_value("opacity", &KeyframeValue::Text("half".into())).is_err()
        );
    }

    #[test]
    fn test_property_must_be_animatable() {
        assert!(validate_property(SegmentKind::Audio, "opacity").is_err());
        assert!(validate_property(SegmentKind::Audio, "volume").is_ok());
        assert!(validate_property(SegmentKind::Text, "fontColor").is_ok());
        assert!(validate_property(SegmentKind::Video, "fontColor").is_err());
    }
}
