//! Character model: immutable persona, perceived memory, mutable state.
//!
//! The orchestrator owns every [`Character`]. Other components read them
//! through shared references and hand back [`StateUpdate`] deltas instead of
//! mutating state themselves.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::timeline::TimelineEvent;
use crate::types::SamplingParams;

/// Who a character is. Loaded once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterPersona {
    /// Display name, unique within a scene.
    pub name: String,
    /// Personality traits.
    #[serde(default)]
    pub traits: Vec<String>,
    /// How they talk.
    #[serde(default)]
    pub speaking_style: String,
    /// Backstory.
    #[serde(default)]
    pub background: String,
    /// Other character name -> how this character sees them.
    #[serde(default)]
    pub relationships: BTreeMap<String, String>,
    /// Goals and motivations, most important first.
    #[serde(default)]
    pub goals: Vec<String>,
    /// Topic -> fact this character knows.
    #[serde(default)]
    pub knowledge_base: BTreeMap<String, String>,
    /// Sampling temperature for this character's decisions.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus sampling cutoff for this character's decisions.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Frequency penalty for this character's decisions.
    #[serde(default)]
    pub frequency_penalty: f32,
}

fn default_temperature() -> f32 {
    0.75
}

fn default_top_p() -> f32 {
    0.9
}

impl CharacterPersona {
    /// A persona with only a name; everything else empty or default.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            traits: Vec::new(),
            speaking_style: String::new(),
            background: String::new(),
            relationships: BTreeMap::new(),
            goals: Vec::new(),
            knowledge_base: BTreeMap::new(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
        }
    }

    /// The sampling parameters every decision of this character uses.
    #[must_use]
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams::new(self.temperature, self.top_p, self.frequency_penalty)
    }
}

/// The events a character has perceived, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct CharacterMemory {
    events: Vec<Arc<TimelineEvent>>,
}

impl CharacterMemory {
    /// Empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a perceived event.
    pub fn perceive(&mut self, event: Arc<TimelineEvent>) {
        self.events.push(event);
    }

    /// Every perceived event.
    #[must_use]
    pub fn events(&self) -> &[Arc<TimelineEvent>] {
        &self.events
    }

    /// The last `n` perceived events, or all of them when `n` is `None`.
    #[must_use]
    pub fn window(&self, n: Option<usize>) -> &[Arc<TimelineEvent>] {
        match n {
            Some(n) => &self.events[self.events.len().saturating_sub(n)..],
            None => &self.events,
        }
    }

    /// Number of perceived events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been perceived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A character's changing condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterState {
    /// Emotional state.
    pub mood: String,
    /// What they are paying attention to.
    pub focus: Option<String>,
    /// What they are physically doing.
    pub current_action: Option<String>,
    /// Whether they chose silence in their last decision.
    pub is_silent: bool,
    /// Their personal objective serving the current story objective.
    pub current_objective: Option<String>,
}

impl Default for CharacterState {
    fn default() -> Self {
        Self {
            mood: "neutral".to_string(),
            focus: None,
            current_action: None,
            is_silent: false,
            current_objective: None,
        }
    }
}

/// A delta to a [`CharacterState`]. `None` fields are left untouched; the
/// nested options of `current_objective` let a delta clear the objective.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    /// New mood.
    pub mood: Option<String>,
    /// New focus.
    pub focus: Option<String>,
    /// New physical action.
    pub current_action: Option<String>,
    /// New silence flag.
    pub is_silent: Option<bool>,
    /// `Some(None)` clears the objective, `Some(Some(o))` replaces it.
    pub current_objective: Option<Option<String>>,
}

impl StateUpdate {
    /// Delta that assigns a personal objective.
    #[must_use]
    pub fn objective(objective: impl Into<String>) -> Self {
        Self {
            current_objective: Some(Some(objective.into())),
            ..Self::default()
        }
    }

    /// Delta that clears the personal objective.
    #[must_use]
    pub fn clear_objective() -> Self {
        Self {
            current_objective: Some(None),
            ..Self::default()
        }
    }

    /// Apply this delta to `state`.
    pub fn apply(self, state: &mut CharacterState) {
        if let Some(mood) = self.mood {
            state.mood = mood;
        }
        if let Some(focus) = self.focus {
            state.focus = Some(focus);
        }
        if let Some(action) = self.current_action {
            state.current_action = Some(action);
        }
        if let Some(silent) = self.is_silent {
            state.is_silent = silent;
        }
        if let Some(objective) = self.current_objective {
            state.current_objective = objective;
        }
    }
}

/// A participant in the scene.
#[derive(Debug, Clone)]
pub struct Character {
    /// Immutable identity.
    pub persona: CharacterPersona,
    /// What they have perceived.
    pub memory: CharacterMemory,
    /// Their current condition.
    pub state: CharacterState,
}

impl Character {
    /// A fresh character with empty memory and default state.
    #[must_use]
    pub fn new(persona: CharacterPersona) -> Self {
        Self {
            persona,
            memory: CharacterMemory::new(),
            state: CharacterState::default(),
        }
    }

    /// The character's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.persona.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{EventKind, Timeline};

    #[test]
    fn persona_deserializes_with_defaults() {
        let json = r#"{
            "name": "Luna",
            "traits": ["dreamy", "honest"],
            "speaking_style": "airy non sequiturs",
            "relationships": {"Harry": "a kind friend"}
        }"#;
        let persona: CharacterPersona = serde_json::from_str(json).expect("valid persona");
        assert_eq!(persona.name, "Luna");
        assert_eq!(persona.traits.len(), 2);
        assert!(persona.goals.is_empty());
        assert!((persona.temperature - 0.75).abs() < f32::EPSILON);
        assert!((persona.top_p - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn sampling_comes_from_persona() {
        let mut persona = CharacterPersona::named("Fred");
        persona.temperature = 1.1;
        persona.top_p = 0.95;
        persona.frequency_penalty = 0.4;
        let sampling = persona.sampling();
        assert!((sampling.temperature - 1.1).abs() < f32::EPSILON);
        assert!((sampling.top_p - 0.95).abs() < f32::EPSILON);
        assert!((sampling.frequency_penalty - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn default_state_is_neutral() {
        let state = CharacterState::default();
        assert_eq!(state.mood, "neutral");
        assert!(!state.is_silent);
        assert!(state.current_objective.is_none());
    }

    #[test]
    fn state_update_applies_only_present_fields() {
        let mut state = CharacterState {
            focus: Some("the map".into()),
            ..CharacterState::default()
        };
        StateUpdate {
            mood: Some("tense".into()),
            is_silent: Some(true),
            ..StateUpdate::default()
        }
        .apply(&mut state);

        assert_eq!(state.mood, "tense");
        assert!(state.is_silent);
        assert_eq!(state.focus.as_deref(), Some("the map"));
    }

    #[test]
    fn objective_can_be_set_and_cleared() {
        let mut state = CharacterState::default();
        StateUpdate::objective("find the key").apply(&mut state);
        assert_eq!(state.current_objective.as_deref(), Some("find the key"));
        StateUpdate::clear_objective().apply(&mut state);
        assert!(state.current_objective.is_none());
    }

    #[test]
    fn memory_window_takes_the_tail() {
        let mut timeline = Timeline::new();
        let mut memory = CharacterMemory::new();
        for i in 0..6 {
            let event = timeline.append(EventKind::Action {
                character: "Fred".into(),
                description: format!("move {i}"),
            });
            memory.perceive(event);
        }
        assert_eq!(memory.window(None).len(), 6);
        let tail = memory.window(Some(2));
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].position, 4);
        assert_eq!(memory.window(Some(100)).len(), 6);
    }
}
