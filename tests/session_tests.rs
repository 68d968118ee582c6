#[cfg(test)]
mod tests {
    use cutline_lib::action_router::apply_to_session;
    use cutline_lib::project_store::{FileProjectStore, MemoryProjectStore, ProjectStore};
    use cutline_lib::requests::{EditAction, TextFields, VideoFields};
    use cutline_lib::session::SessionStore;
    use cutline_lib::timeline::{EditError, TimelineState};
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryProjectStore>, SessionStore, String) {
        let projects = Arc::new(MemoryProjectStore::new());
        let record = projects.create("Session test").unwrap();
        let sessions = SessionStore::new(projects.clone(), 50);
        (projects, sessions, record.id)
    }

    fn add_clip(start: f64, end: f64) -> EditAction {
        EditAction::AddVideo {
            fields: VideoFields {
                layer: Some(0),
                timeline_start_time: Some(start),
                timeline_end_time: Some(end),
                source_video_path: Some("clip.mp4".into()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_save_mutate_undo_round_trip() {
        let (_, sessions, project_id) = setup();
        let session = sessions.start_session(&project_id).unwrap();
        apply_to_session(&sessions, &session, add_clip(0.0, 5.0)).unwrap();
        sessions.save(&session).unwrap();
        let saved = sessions.state(&session).unwrap();

        apply_to_session(&sessions, &session, add_clip(5.0, 9.0)).unwrap();
        let undone = sessions.undo(&session).unwrap();
        assert_eq!(undone, saved);

        // Bottom of the stack: no-op, state unchanged
        let again = sessions.undo(&session).unwrap();
        assert_eq!(again, saved);

        let redone = sessions.redo(&session).unwrap();
        assert_eq!(redone.video_segments.len(), 2);
        let past_top = sessions.redo(&session).unwrap();
        assert_eq!(past_top, redone);
    }

    #[test]
    fn test_save_clears_history_but_snapshot_keeps_it() {
        let (projects, sessions, project_id) = setup();
        let session = sessions.start_session(&project_id).unwrap();
        apply_to_session(&sessions, &session, add_clip(0.0, 5.0)).unwrap();
        apply_to_session(&sessions, &session, add_clip(5.0, 8.0)).unwrap();

        sessions.save_snapshot(&session).unwrap();
        assert_eq!(sessions.history_depths(&session).unwrap(), (2, 0));
        let persisted = projects.load(&project_id).unwrap();
        let restored = TimelineState::from_json(&persisted.timeline_state).unwrap();
        assert_eq!(restored.video_segments.len(), 2);

        sessions.save(&session).unwrap();
        assert_eq!(sessions.history_depths(&session).unwrap(), (0, 0));
    }

    #[test]
    fn test_concurrent_sessions_last_write_wins() {
        let (projects, sessions, project_id) = setup();
        let first = sessions.start_session(&project_id).unwrap();
        let second = sessions.start_session(&project_id).unwrap();
        assert_ne!(first, second);

        apply_to_session(&sessions, &first, add_clip(0.0, 5.0)).unwrap();
        apply_to_session(&sessions, &second, add_clip(0.0, 3.0)).unwrap();
        apply_to_session(&sessions, &second, add_clip(3.0, 6.0)).unwrap();

        sessions.save(&second).unwrap();
        sessions.save(&first).unwrap();

        let record = projects.load(&project_id).unwrap();
        let state = TimelineState::from_json(&record.timeline_state).unwrap();
        assert_eq!(state.video_segments.len(), 1);
        assert_eq!(record.edit_session.as_deref(), Some(first.as_str()));
    }

    #[test]
    fn test_same_session_mutations_do_not_tear() {
        let (_, sessions, project_id) = setup();
        let sessions = Arc::new(sessions);
        let session = sessions.start_session(&project_id).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sessions = sessions.clone();
                let session = session.clone();
                std::thread::spawn(move || {
                    let action = EditAction::AddText {
                        fields: TextFields {
                            timeline_start_time: Some(i as f64),
                            timeline_end_time: Some(i as f64 + 1.0),
                            text: Some(format!("caption {}", i)),
                            ..Default::default()
                        },
                    };
                    apply_to_session(&sessions, &session, action).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sessions.state(&session).unwrap().text_segments.len(), 8);
        assert_eq!(sessions.history_depths(&session).unwrap(), (8, 0));
    }

    #[test]
    fn test_loading_repairs_dangling_references() {
        let dir = std::env::temp_dir().join(format!("cutline-session-{}", uuid::Uuid::new_v4()));
        let projects = Arc::new(FileProjectStore::new(&dir).unwrap());
        let mut record = projects.create("Broken refs").unwrap();
        record.timeline_state = r#"{
            "videoSegments": [{
                "id": "v1", "layer": 0, "timelineStartTime": 0, "timelineEndTime": 4,
                "sourceVideoPath": "a.mp4", "speed": 1, "audioId": "gone"
            }],
            "transitions": [{
                "id": "t1", "type": "fade", "duration": 1, "segmentId": "missing",
                "start": true, "end": false, "layer": 0, "timelineStartTime": 0
            }]
        }"#
        .to_string();
        projects.save(&record).unwrap();

        let sessions = SessionStore::new(projects, 50);
        let session = sessions.start_session(&record.id).unwrap();
        let state = sessions.state(&session).unwrap();
        assert_eq!(state.video_segments[0].audio_id, None);
        assert!(state.transitions.is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_rejected_edit_surfaces_message() {
        let (_, sessions, project_id) = setup();
        let session = sessions.start_session(&project_id).unwrap();
        let bad = EditAction::AddAudio {
            fields: cutline_lib::requests::AudioFields {
                layer: Some(1),
                timeline_start_time: Some(0.0),
                timeline_end_time: Some(3.0),
                audio_path: Some("a.mp3".into()),
                ..Default::default()
            },
        };
        match apply_to_session(&sessions, &session, bad) {
            Err(EditError::Validation(msg)) => assert_eq!(msg, "Audio layer must be negative"),
            other => panic!("Expected validation error, got {:?}", other),
        }
        sessions.end_session(&session).unwrap();
        assert!(matches!(
            sessions.state(&session),
            Err(EditError::NotFound(_))
        ));
    }
}
