#[cfg(test)]
mod tests {
    use cutline_lib::commands;
    use cutline_lib::keyframe::{Interpolation, Keyframe, KeyframeTrack};
    use cutline_lib::project_store::MemoryProjectStore;
    use cutline_lib::requests::{AudioFields, KeyframePatch, VideoFields};
    use cutline_lib::segment::SegmentKind;
    use cutline_lib::session::SessionStore;
    use cutline_lib::timeline::{EditError, TimelineState};
    use std::sync::Arc;

    #[test]
    fn test_video_with_paired_audio_fades_out() {
        let mut state = TimelineState::new();
        let audio = state
            .add_audio(&AudioFields {
                layer: Some(-1),
                timeline_start_time: Some(0.0),
                timeline_end_time: Some(10.0),
                audio_path: Some("extracted/a.mp3".into()),
                extracted: Some(true),
                ..Default::default()
            })
            .unwrap();
        let video = state
            .add_video(&VideoFields {
                layer: Some(0),
                timeline_start_time: Some(0.0),
                timeline_end_time: Some(10.0),
                source_video_path: Some("uploads/a.mp4".into()),
                audio_id: Some(audio.id().to_string()),
                ..Default::default()
            })
            .unwrap();

        for (time, value) in [(0.0, 1.0), (10.0, 0.0)] {
            state
                .add_keyframe(
                    video.id(),
                    SegmentKind::Video,
                    "opacity",
                    Keyframe::number(time, value, Interpolation::Linear),
                )
                .unwrap();
        }

        let frame = state.query(5.0);
        let video_frame = frame
            .iter()
            .find(|a| a.segment.id() == video.id())
            .expect("video active at 5s");
        assert!((video_frame.number("opacity").unwrap() - 0.5).abs() < 1e-9);
        // Static values come through untouched
        assert_eq!(video_frame.number("scale"), Some(1.0));
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_keyframed_crop_skips_sum_check() {
        let mut state = TimelineState::new();
        let id = state
            .add_video(&VideoFields {
                layer: Some(0),
                timeline_start_time: Some(0.0),
                timeline_end_time: Some(4.0),
                source_video_path: Some("a.mp4".into()),
                ..Default::default()
            })
            .unwrap()
            .id()
            .to_string();

        let static_only = VideoFields {
            crop_l: Some(60.0),
            crop_r: Some(50.0),
            ..Default::default()
        };
        assert!(matches!(
            state.update_video(&id, &static_only),
            Err(EditError::Validation(_))
        ));

        let mut keyframes = KeyframePatch::new();
        keyframes.insert(
            "cropL".into(),
            vec![
                Keyframe::number(0.0, 0.0, Interpolation::Linear),
                Keyframe::number(4.0, 40.0, Interpolation::Linear),
            ],
        );
        let keyframed = VideoFields {
            keyframes: Some(keyframes),
            ..static_only
        };
        let updated = state.update_video(&id, &keyframed).unwrap();
        let track: &KeyframeTrack = &updated.base().keyframes["cropL"];
        assert_eq!(track.len(), 2);
    }

    #[test]
    fn test_segment_active_over_half_open_range() {
        let mut state = TimelineState::new();
        let (start, end) = (1.25, 3.5);
        state
            .add_video(&VideoFields {
                layer: Some(0),
                timeline_start_time: Some(start),
                timeline_end_time: Some(end),
                source_video_path: Some("a.mp4".into()),
                ..Default::default()
            })
            .unwrap();

        for t in [1.25, 2.0, 3.0, 3.499] {
            assert_eq!(state.query(t).len(), 1, "expected active at {}", t);
        }
        for t in [0.0, 1.2, 3.5, 10.0] {
            assert!(state.query(t).is_empty(), "expected inactive at {}", t);
        }
    }

    #[test]
    fn test_remove_twice_through_commands() {
        let sessions = SessionStore::new(Arc::new(MemoryProjectStore::new()), 50);
        let project = commands::create_project(&sessions, "Scenario").unwrap();
        let session = commands::start_session(&sessions, &project.id).unwrap();

        let added = commands::apply_edit_json(
            &sessions,
            &session,
            r#"{"action":"ADD_TEXT","fields":{"timelineStartTime":0,"timelineEndTime":2,"text":"Title"}}"#,
        )
        .unwrap();
        let id = serde_json::to_value(&added).unwrap()["segment"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let remove = format!(r#"{{"action":"REMOVE_SEGMENT","segmentId":"{}"}}"#, id);
        commands::apply_edit_json(&sessions, &session, &remove).unwrap();
        let err = commands::apply_edit_json(&sessions, &session, &remove).unwrap_err();
        assert_eq!(err, format!("Segment not found: {}", id));

        let frame = commands::query_frame(&sessions, &session, 1.0).unwrap();
        assert!(frame.is_empty());
    }
}
