// src/history.rs
use crate::timeline::TimelineState;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_DEPTH: usize = 50;

#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub label: String,
    pub snapshot: TimelineState,
    pub recorded_at: DateTime<Utc>,
}

/// Snapshot-based undo/redo for one session.
///
/// Each entry holds the state *before* a mutation. Recording a new entry
/// forks the timeline and drops everything that was undone.
#[derive(Debug)]
pub struct History {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_depth: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl History {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    pub fn record(&mut self, label: &str, before: TimelineState) {
        self.redo_stack.clear();
        self.undo_stack.push_back(HistoryEntry {
            label: label.to_string(),
            snapshot: before,
            recorded_at: Utc::now(),
        });
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
        log::debug!(
            "📚 History entry '{}' recorded (undo depth {})",
            label,
            self.undo_stack.len()
        );
    }

    /// Swaps `current` for the previous state. Returns the label of the undone step.
    pub fn undo(&mut self, current: &mut TimelineState) -> Option<String> {
        let entry = self.undo_stack.pop_back()?;
        let label = entry.label.clone();
        let after = std::mem::replace(current, entry.snapshot);
        self.redo_stack.push(HistoryEntry {
            label: entry.label,
            snapshot: after,
            recorded_at: Utc::now(),
        });
        Some(label)
    }

    /// Re-applies the most recently undone step.
    pub fn redo(&mut self, current: &mut TimelineState) -> Option<String> {
        let entry = self.redo_stack.pop()?;
        let label = entry.label.clone();
        let before = std::mem::replace(current, entry.snapshot);
        self.undo_stack.push_back(HistoryEntry {
            label: entry.label,
            snapshot: before,
            recorded_at: Utc::now(),
        });
        Some(label)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::TextFields;

    fn with_text(state: &mut TimelineState, content: &str) {
        state
            .add_text(&TextFields {
                timeline_start_time: Some(0.0),
                timeline_end_time: Some(1.0),
                text: Some(content.to_string()),
                ..Default::default()
            })
            .unwrap();
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut history = History::new(10);
        let mut state = TimelineState::new();

        history.record("ADD_TEXT", state.clone());
        with_text(&mut state, "one");
        let after = state.clone();

        assert_eq!(history.undo(&mut state).as_deref(), Some("ADD_TEXT"));
        assert_eq!(state, TimelineState::new());
        assert!(history.can_redo());

        assert_eq!(history.redo(&mut state).as_deref(), Some("ADD_TEXT"));
        assert_eq!(state, after);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_new_record_clears_redo() {
        let mut history = History::new(10);
        let mut state = TimelineState::new();

        history.record("a", state.clone());
        with_text(&mut state, "a");
        history.undo(&mut state);
        assert_eq!(history.redo_depth(), 1);

        history.record("b", state.clone());
        assert_eq!(history.redo_depth(), 0);
    }

    #[test]
    fn test_depth_is_capped() {
        let mut history = History::new(3);
        let mut state = TimelineState::new();
        for i in 0..5 {
            history.record(&format!("step {}", i), state.clone());
            with_text(&mut state, "x");
        }
        assert_eq!(history.undo_depth(), 3);

        let mut undone = 0;
        while history.undo(&mut state).is_some() {
            undone += 1;
        }
        assert_eq!(undone, 3);
        // The two oldest steps fell off the stack
        assert_eq!(state.text_segments.len(), 2);
    }

    #[test]
    fn test_empty_history() {
        let mut history = History::default();
        let mut state = TimelineState::new();
        assert!(history.undo(&mut state).is_none());
        assert!(history.redo(&mut state).is_none());
    }
}
