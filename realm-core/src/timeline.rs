//! Timeline Store: the append-only narrative log.
//!
//! Every message, action, scene description, entry and exit lands here in a
//! single total order. Events are reference-counted so that character
//! memories can hold the very same records the store does; nothing is ever
//! mutated or reordered after it is appended.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::NARRATOR;

/// What happened, as a closed union with an explicit `type` discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A character spoke.
    Message {
        /// Who spoke.
        speaker: String,
        /// The spoken line.
        content: String,
        /// Body language accompanying the line.
        action_description: Option<String>,
    },
    /// A character acted without speaking.
    Action {
        /// Who acted.
        character: String,
        /// What they did.
        description: String,
    },
    /// The narrator described the scene.
    Scene {
        /// Where the scene takes place.
        location: String,
        /// The description.
        description: String,
    },
    /// A character joined the scene.
    CharacterEntry {
        /// Who entered.
        character: String,
        /// How they entered.
        description: String,
    },
    /// A character left the scene.
    CharacterExit {
        /// Who left.
        character: String,
        /// How they left.
        description: String,
    },
}

impl EventKind {
    /// The character the event originates from, or [`NARRATOR`].
    #[must_use]
    pub fn origin(&self) -> &str {
        match self {
            Self::Message { speaker, .. } => speaker,
            Self::Action { character, .. }
            | Self::CharacterEntry { character, .. }
            | Self::CharacterExit { character, .. } => character,
            Self::Scene { .. } => NARRATOR,
        }
    }

    /// The free-text body of the event.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Message { content, .. } => content,
            Self::Action { description, .. }
            | Self::Scene { description, .. }
            | Self::CharacterEntry { description, .. }
            | Self::CharacterExit { description, .. } => description,
        }
    }

    /// Short tag name, matching the serialized discriminant.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Action { .. } => "action",
            Self::Scene { .. } => "scene",
            Self::CharacterEntry { .. } => "character_entry",
            Self::CharacterExit { .. } => "character_exit",
        }
    }

    /// Whether this is character speech or action (what breaks a silence).
    #[must_use]
    pub fn is_character_activity(&self) -> bool {
        matches!(self, Self::Message { .. } | Self::Action { .. })
    }

    /// The physical action text attached to the event, if any.
    #[must_use]
    pub fn action_text(&self) -> Option<&str> {
        match self {
            Self::Message { action_description, .. } => action_description.as_deref(),
            Self::Action { description, .. } => Some(description),
            Self::Scene { .. } | Self::CharacterEntry { .. } | Self::CharacterExit { .. } => None,
        }
    }

    /// Render the event as `viewer` perceives it; the viewer's own events
    /// are attributed to "You".
    #[must_use]
    pub fn render_for(&self, viewer: &str) -> String {
        let who = |name: &str| if name == viewer { "You".to_string() } else { name.to_string() };
        match self {
            Self::Message { speaker, content, action_description } => match action_description {
                Some(action) => format!("{}: *{action}* {content}", who(speaker)),
                None => format!("{}: {content}", who(speaker)),
            },
            Self::Action { character, description } => format!("{}: *{description}*", who(character)),
            Self::Scene { location, description } => format!("[Scene at {location}]: {description}"),
            Self::CharacterEntry { character, description } => {
                format!("[{} entered]: {description}", who(character))
            }
            Self::CharacterExit { character, description } => {
                format!("[{} left]: {description}", who(character))
            }
        }
    }

    /// Render the event as a neutral one-line summary.
    #[must_use]
    pub fn summary_line(&self) -> String {
        match self {
            Self::Message { speaker, content, .. } => format!("{speaker}: {content}"),
            Self::Action { character, description } => format!("[ACTION] {character}: {description}"),
            Self::Scene { location, description } => format!("[SCENE at {location}]: {description}"),
            Self::CharacterEntry { character, description } => {
                format!("[ENTRY] {character} entered: {description}")
            }
            Self::CharacterExit { character, description } => {
                format!("[EXIT] {character} left: {description}")
            }
        }
    }
}

/// An appended, immutable timeline record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Zero-based append index; strictly increasing.
    pub position: u64,
    /// Wall-clock time of the append.
    pub recorded_at: DateTime<Utc>,
    /// The event payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The shared, append-only event log.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Vec<Arc<TimelineEvent>>,
    participants: Vec<String>,
}

impl Timeline {
    /// Create an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, assigning the next position.
    pub fn append(&mut self, kind: EventKind) -> Arc<TimelineEvent> {
        let origin = kind.origin();
        if origin != NARRATOR && !self.participants.iter().any(|p| p == origin) {
            self.participants.push(origin.to_string());
        }

        let event = Arc::new(TimelineEvent {
            position: self.events.len() as u64,
            recorded_at: Utc::now(),
            kind,
        });
        self.events.push(Arc::clone(&event));
        event
    }

    /// Every event in append order.
    #[must_use]
    pub fn events(&self) -> &[Arc<TimelineEvent>] {
        &self.events
    }

    /// The last `n` events (all of them if fewer).
    #[must_use]
    pub fn recent(&self, n: usize) -> &[Arc<TimelineEvent>] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    /// Events at or after `position`.
    #[must_use]
    pub fn since(&self, position: u64) -> &[Arc<TimelineEvent>] {
        let start = usize::try_from(position).unwrap_or(usize::MAX).min(self.events.len());
        &self.events[start..]
    }

    /// The event at `position`, if appended.
    #[must_use]
    pub fn get(&self, position: u64) -> Option<&Arc<TimelineEvent>> {
        usize::try_from(position).ok().and_then(|i| self.events.get(i))
    }

    /// Characters that have originated at least one event, in first-seen order.
    #[must_use]
    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    /// Number of appended events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
