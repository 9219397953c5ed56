//! Story definition and the objective cursor.

use serde::{Deserialize, Serialize};

/// A scripted story: an ordered list of objectives and a cursor into it.
///
/// The cursor only moves forward. `current_objective_index == objectives.len()`
/// is the terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Story title.
    pub title: String,
    /// Overall premise.
    #[serde(default)]
    pub description: String,
    /// Objectives, in the order they must be achieved.
    pub objectives: Vec<String>,
    /// Index of the active objective. Only [`Story::advance`] moves it.
    #[serde(default)]
    current_objective_index: usize,
}

/// Where a story stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveState {
    /// Working on the objective at this index.
    Active(usize),
    /// Every objective achieved.
    Complete,
}

impl Story {
    /// A story starting at its first objective.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>, objectives: Vec<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            objectives,
            current_objective_index: 0,
        }
    }

    /// The active objective, or `None` once complete.
    #[must_use]
    pub fn current_objective(&self) -> Option<&str> {
        self.objectives
            .get(self.current_objective_index)
            .map(String::as_str)
    }

    /// Whether every objective has been achieved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current_objective_index >= self.objectives.len()
    }

    /// Index of the active objective; equals the objective count once complete.
    #[must_use]
    pub fn current_objective_index(&self) -> usize {
        self.current_objective_index
    }

    /// Active index or complete.
    #[must_use]
    pub fn state(&self) -> ObjectiveState {
        if self.is_complete() {
            ObjectiveState::Complete
        } else {
            ObjectiveState::Active(self.current_objective_index)
        }
    }

    /// Share of objectives achieved, 0 to 100. An empty story is 100% done.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percentage(&self) -> f32 {
        if self.objectives.is_empty() {
            return 100.0;
        }
        let done = self.current_objective_index.min(self.objectives.len());
        done as f32 / self.objectives.len() as f32 * 100.0
    }

    /// Move to the next objective. Returns `false` when that makes (or keeps)
    /// the story complete.
    pub fn advance(&mut self) -> bool {
        if self.current_objective_index + 1 < self.objectives.len() {
            self.current_objective_index += 1;
            true
        } else {
            self.current_objective_index = self.objectives.len();
            false
        }
    }
}
