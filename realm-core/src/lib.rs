//! # rolerealm Core Library
//!
//! Turn orchestration and objective tracking for multi-character narratives.
//!
//! A handful of autonomous characters share one scene. Each round every
//! eligible character decides, through one generation call, whether to
//! speak, act or stay silent; the [`Orchestrator`] orders those decisions
//! into the shared [`Timeline`], delivers them to every character's memory,
//! lets the [`Narrator`] fill silences, and asks the [`ObjectiveTracker`]
//! whether the story has moved on.
//!
//! - **Timeline**: append-only log of messages, actions, scenes, entries, exits
//! - **Character agent**: persona + memory + state, rendered into a decision prompt
//! - **Scene narrator**: stagnation handling, location transitions
//! - **Objective tracker**: story cursor and per-character objectives
//! - **Orchestrator**: the round state machine binding them together
//!
//! All model access goes through [`realm_llm::Generator`], so the whole
//! engine runs offline against a [`realm_llm::ScriptedGenerator`].

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod character;
pub mod config;
pub mod decision;
pub mod departure;
pub mod error;
pub mod loader;
pub mod narrator;
pub mod objectives;
pub mod orchestrator;
pub mod story;
pub mod summary;
pub mod telemetry;
pub mod timeline;
pub mod types;

pub use agent::CharacterAgent;
pub use character::{Character, CharacterMemory, CharacterPersona, CharacterState, StateUpdate};
pub use config::RealmConfig;
pub use decision::{Decision, Intent};
pub use error::RealmError;
pub use loader::{CharacterLoader, StoryLoader};
pub use narrator::{FocalPresence, Narrator, SceneState, Transition, TransitionOrigin};
pub use objectives::{CharacterObjectiveUpdate, ObjectiveEvaluation, ObjectiveStatus, ObjectiveTracker};
pub use orchestrator::{
    CharacterDecision, DecisionFailure, EligibilityPolicy, Orchestrator, RoundPhase, RoundReport,
    SessionSummary, StopHandle,
};
pub use story::{ObjectiveState, Story};
pub use summary::{ConversationSummarizer, SummaryContext};
pub use timeline::{EventKind, Timeline, TimelineEvent};
pub use types::*;
