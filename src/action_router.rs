// src/action_router.rs
use crate::keyframe::{Keyframe, KeyframeTrack};
use crate::requests::EditAction;
use crate::segment::{Filter, Segment, Transition};
use crate::session::SessionStore;
use crate::timeline::{EditError, TimelineState};
use serde::Serialize;

/// Resolved result of one edit, returned to the caller as JSON.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EditOutcome {
    Segment {
        segment: Segment,
    },
    Segments {
        segments: Vec<Segment>,
    },
    #[serde(rename_all = "camelCase")]
    Removed {
        segment_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Keyframes {
        segment_id: String,
        property: String,
        track: KeyframeTrack,
    },
    Transition {
        transition: Transition,
    },
    #[serde(rename_all = "camelCase")]
    TransitionRemoved {
        transition_id: String,
    },
    Filter {
        filter: Filter,
    },
    Filters {
        filters: Vec<Filter>,
    },
}

/// Executes one typed edit against a timeline. The timeline is left
/// untouched when the edit fails.
pub fn run_edit_action(
    state: &mut TimelineState,
    action: EditAction,
) -> Result<EditOutcome, EditError> {
    log::debug!("🚀 Action Router: executing {}", action.label());

    let outcome = match action {
        // 1. Segments
        EditAction::AddVideo { fields } => EditOutcome::Segment {
            segment: state.add_video(&fields)?,
        },
        EditAction::AddAudio { fields } => EditOutcome::Segment {
            segment: state.add_audio(&fields)?,
        },
        EditAction::AddImage { fields } => EditOutcome::Segment {
            segment: state.add_image(&fields)?,
        },
        EditAction::AddText { fields } => EditOutcome::Segment {
            segment: state.add_text(&fields)?,
        },
        EditAction::UpdateVideo { segment_id, fields } => EditOutcome::Segment {
            segment: state.update_video(&segment_id, &fields)?,
        },
        EditAction::UpdateAudio { segment_id, fields } => EditOutcome::Segment {
            segment: state.update_audio(&segment_id, &fields)?,
        },
        EditAction::UpdateImage { segment_id, fields } => EditOutcome::Segment {
            segment: state.update_image(&segment_id, &fields)?,
        },
        EditAction::UpdateText { segment_id, fields } => EditOutcome::Segment {
            segment: state.update_text(&segment_id, &fields)?,
        },
        EditAction::RemoveSegment { segment_id } => {
            state.remove_segment(&segment_id)?;
            EditOutcome::Removed {
                segment_ids: vec![segment_id],
            }
        }
        EditAction::RemoveSegments { segment_ids } => EditOutcome::Removed {
            segment_ids: state.remove_segments(&segment_ids)?,
        },

        // 2. Keyframes
        EditAction::AddKeyframe {
            segment_id,
            segment_type,
            property,
            time,
            value,
            interpolation_type,
        } => {
            let keyframe = Keyframe::new(time, value, interpolation_type);
            let track = state.add_keyframe(&segment_id, segment_type, &property, keyframe)?;
            EditOutcome::Keyframes {
                segment_id,
                property,
                track,
            }
        }
        EditAction::UpdateKeyframe {
            segment_id,
            segment_type,
            property,
            time,
            value,
            interpolation_type,
        } => {
            let keyframe = Keyframe::new(time, value, interpolation_type);
            let track = state.update_keyframe(&segment_id, segment_type, &property, keyframe)?;
            EditOutcome::Keyframes {
                segment_id,
                property,
                track,
            }
        }
        EditAction::RemoveKeyframe {
            segment_id,
            segment_type,
            property,
            time,
        } => {
            let track = state.remove_keyframe(&segment_id, segment_type, &property, time)?;
            EditOutcome::Keyframes {
                segment_id,
                property,
                track,
            }
        }

        // 3. Transitions
        EditAction::AddTransition { fields } => EditOutcome::Transition {
            transition: state.add_transition(&fields)?,
        },
        EditAction::UpdateTransition {
            transition_id,
            fields,
        } => EditOutcome::Transition {
            transition: state.update_transition(&transition_id, &fields)?,
        },
        EditAction::RemoveTransition { transition_id } => {
            state.remove_transition(&transition_id)?;
            EditOutcome::TransitionRemoved { transition_id }
        }

        // 4. Filters
        EditAction::ApplyFilter {
            segment_id,
            filter_name,
            filter_value,
        } => EditOutcome::Filter {
            filter: state.apply_filter(&segment_id, &filter_name, filter_value)?,
        },
        EditAction::UpdateFilter {
            segment_id,
            filter_id,
            filter_name,
            filter_value,
        } => EditOutcome::Filter {
            filter: state.update_filter(&segment_id, &filter_id, filter_name, filter_value)?,
        },
        EditAction::RemoveFilter {
            segment_id,
            filter_id,
        } => EditOutcome::Filter {
            filter: state.remove_filter(&segment_id, &filter_id)?,
        },
        EditAction::RemoveAllFilters { segment_id } => EditOutcome::Filters {
            filters: state.remove_all_filters(&segment_id)?,
        },

        // 5. Text
        EditAction::AddSubtitles { cues, style } => EditOutcome::Segments {
            segments: state.add_subtitles(&cues, &style)?,
        },
        EditAction::UpdateMultipleText {
            segment_ids,
            fields,
        } => EditOutcome::Segments {
            segments: state.update_multiple_text(&segment_ids, &fields)?,
        },
    };

    Ok(outcome)
}

/// Runs an edit inside a session, recording undo history on success.
pub fn apply_to_session(
    sessions: &SessionStore,
    session_id: &str,
    action: EditAction,
) -> Result<EditOutcome, EditError> {
    let label = action.label();
    let result = sessions.mutate(session_id, label, |state| run_edit_action(state, action));
    match &result {
        Ok(_) => log::info!("✅ Session {}: {} applied", session_id, label),
        Err(e) => log::warn!("⚠️ Session {}: {} rejected: {}", session_id, label, e),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::parse_edit_action;

    #[test]
    fn test_runs_parsed_actions() {
        let mut state = TimelineState::new();
        let add = parse_edit_action(
            r#"{"action":"ADD_IMAGE","fields":{"layer":1,"timelineStartTime":0,"timelineEndTime":3,"imagePath":"logo.png"}}"#,
        )
        .unwrap();

        let id = match run_edit_action(&mut state, add).unwrap() {
            EditOutcome::Segment { segment } => segment.id().to_string(),
            other => panic!("unexpected outcome {:?}", other),
        };

        let remove = EditAction::RemoveSegment {
            segment_id: id.clone(),
        };
        let outcome = run_edit_action(&mut state, remove.clone()).unwrap();
        assert_eq!(
            outcome,
            EditOutcome::Removed {
                segment_ids: vec![id]
            }
        );

        // Second removal is a not-found error, not a panic
        assert!(matches!(
            run_edit_action(&mut state, remove),
            Err(EditError::NotFound(_))
        ));
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = EditOutcome::TransitionRemoved {
            transition_id: "t1".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "transitionRemoved");
        assert_eq!(json["transitionId"], "t1");
    }
}
