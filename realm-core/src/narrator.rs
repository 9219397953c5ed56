//! Scene Narrator: stagnation handling and location transitions.
//!
//! When a round passes with nobody speaking or acting, the narrator fills the
//! silence with a short environmental description. Descriptions are checked
//! against a small history so the same line is never used twice in a row;
//! if generation fails or repeats itself a canned line is used instead. The
//! narrator never fails: every path ends in some description.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, warn};

use realm_llm::{parser, Generator, PromptEngine, PromptId, SamplingParams};

use crate::config::NarratorConfig;
use crate::departure;
use crate::timeline::{EventKind, TimelineEvent};

/// Canned descriptions used when generation is unavailable or repetitive.
pub const FALLBACK_DESCRIPTIONS: &[&str] = &[
    "The fire crackles softly, filling the room with warmth and flickering light.",
    "Shadows dance across the walls as the firelight shifts.",
    "The room settles into a comfortable quiet, broken only by the occasional pop of a coal in the hearth.",
    "Outside, wind whispers against the windows while the room stays warm.",
    "The familiar scent of old books and wood smoke fills the air.",
];

/// Where the scene is and what it feels like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneState {
    /// Current location.
    pub location: String,
    /// Current atmosphere.
    pub atmosphere: String,
    /// Things in the scene worth describing.
    pub notable_features: Vec<String>,
}

/// Whether the focal character is still in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocalPresence {
    /// Still here.
    Present,
    /// Left or withdrew.
    Absent,
}

/// Where a description came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOrigin {
    /// Produced by the generator.
    Generated,
    /// Picked from [`FALLBACK_DESCRIPTIONS`].
    Fallback,
}

/// An environmental description produced during a silence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The description itself.
    pub description: String,
    /// Optional hint that time has moved on.
    pub time_progression: Option<String>,
    /// The tone branch the prompt was built with.
    pub presence: FocalPresence,
    /// Generated or canned.
    pub origin: TransitionOrigin,
}

impl Transition {
    /// Whether the focal character was judged absent.
    #[must_use]
    pub fn focal_absent(&self) -> bool {
        self.presence == FocalPresence::Absent
    }
}

#[derive(Debug, Deserialize)]
struct AmbientReply {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    time_progression: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationReply {
    #[serde(default)]
    transition: Option<String>,
}

/// Scene narrator.
pub struct Narrator {
    generator: Arc<dyn Generator>,
    prompts: Arc<PromptEngine>,
    scene: SceneState,
    history: VecDeque<String>,
    history_size: usize,
    stagnation_threshold: u32,
    sampling: SamplingParams,
    quiet_moments: u32,
    rng: StdRng,
}

impl std::fmt::Debug for Narrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Narrator")
            .field("scene", &self.scene)
            .field("history", &self.history)
            .field("stagnation_threshold", &self.stagnation_threshold)
            .finish_non_exhaustive()
    }
}

impl Narrator {
    /// Create a narrator from configuration.
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>, prompts: Arc<PromptEngine>, config: &NarratorConfig) -> Self {
        Self {
            generator,
            prompts,
            scene: SceneState {
                location: config.location.clone(),
                atmosphere: config.atmosphere.clone(),
                notable_features: config.notable_features.clone(),
            },
            history: VecDeque::with_capacity(config.history_size),
            history_size: config.history_size.max(1),
            stagnation_threshold: 1,
            sampling: config.sampling,
            quiet_moments: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Step in after this many silent rounds.
    #[must_use]
    pub fn with_stagnation_threshold(mut self, threshold: u32) -> Self {
        self.stagnation_threshold = threshold.max(1);
        self
    }

    /// Seed the fallback picker, for reproducible runs.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Current scene.
    #[must_use]
    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    /// Previous descriptions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    /// Silent rounds needed before stepping in.
    #[must_use]
    pub fn stagnation_threshold(&self) -> u32 {
        self.stagnation_threshold
    }

    /// Whether `silence_rounds` consecutive quiet rounds call for narration.
    #[must_use]
    pub fn detect_stagnation(&self, silence_rounds: u32) -> bool {
        silence_rounds >= self.stagnation_threshold
    }

    /// Change location and/or atmosphere; `None` keeps the current value.
    pub fn update_scene(&mut self, location: Option<&str>, atmosphere: Option<&str>) {
        if let Some(location) = location.filter(|l| !l.trim().is_empty()) {
            self.scene.location = location.to_string();
        }
        if let Some(atmosphere) = atmosphere.filter(|a| !a.trim().is_empty()) {
            self.scene.atmosphere = atmosphere.to_string();
        }
    }

    /// Describe the environment during a silence.
    pub async fn generate_transition(
        &mut self,
        recent_events: &[Arc<TimelineEvent>],
        silence_rounds: u32,
        focal_character: &str,
    ) -> Transition {
        self.quiet_moments += 1;
        let presence = focal_presence(recent_events, focal_character);
        let prompt = self.ambient_prompt(recent_events, silence_rounds, focal_character, presence);

        let generated = match self.generator.generate(&prompt, &self.sampling).await {
            Ok(text) => match parser::parse_json::<AmbientReply>(&text) {
                Ok(reply) => Some(reply),
                Err(e) => {
                    warn!(error = %e, "Narrator reply unparseable, using fallback");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Narrator generation failed, using fallback");
                None
            }
        };

        let accepted = generated.and_then(|reply| {
            let description = reply.description.map(|d| d.trim().to_string()).unwrap_or_default();
            if description.is_empty() {
                warn!("Narrator returned an empty description, using fallback");
                None
            } else if self.history.iter().any(|h| *h == description) {
                warn!("Narrator repeated a previous description, using fallback");
                None
            } else {
                let time_progression = reply
                    .time_progression
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("null"));
                Some((description, time_progression))
            }
        });

        let transition = match accepted {
            Some((description, time_progression)) => Transition {
                description,
                time_progression,
                presence,
                origin: TransitionOrigin::Generated,
            },
            None => Transition {
                description: self.fallback_description(),
                time_progression: None,
                presence,
                origin: TransitionOrigin::Fallback,
            },
        };

        self.remember(&transition.description);
        debug!(
            location = %self.scene.location,
            origin = ?transition.origin,
            presence = ?transition.presence,
            "Scene description"
        );
        transition
    }

    /// Narrate the group moving to `new_location`; the scene's location
    /// changes whether or not generation succeeds.
    pub async fn generate_location_transition(
        &mut self,
        new_location: &str,
        context: &str,
        characters_present: &[String],
    ) -> String {
        let characters = characters_present.join(", ");
        let prompt = self.prompts.render(
            PromptId::NarratorLocation,
            &[
                ("from_location", self.scene.location.as_str()),
                ("to_location", new_location),
                ("characters", characters.as_str()),
                ("context", context),
            ],
        );

        let generated = match self.generator.generate(&prompt, &self.sampling).await {
            Ok(text) => parser::parse_json::<LocationReply>(&text)
                .ok()
                .and_then(|r| r.transition)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Location narration failed, using fallback");
                None
            }
        };

        self.scene.location = new_location.to_string();
        generated.unwrap_or_else(|| format!("The group makes their way to {new_location}."))
    }

    fn ambient_prompt(
        &self,
        recent_events: &[Arc<TimelineEvent>],
        silence_rounds: u32,
        focal_character: &str,
        presence: FocalPresence,
    ) -> String {
        let recent_conversation = recent_events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Message { speaker, content, .. } => {
                    Some(format!("{speaker}: {}", truncate(content, 100)))
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        let recent_conversation = recent_conversation[recent_conversation.len().saturating_sub(3)..].join("\n");

        let mut history_section = String::new();
        if !self.history.is_empty() {
            history_section.push_str("\n\nPREVIOUS ENVIRONMENTAL DESCRIPTIONS (DO NOT REPEAT):");
            for previous in self.history.iter().skip(self.history.len().saturating_sub(3)) {
                let _ = write!(history_section, "\n- {}", truncate(previous, 100));
            }
        }

        let (focal_status, tone_instruction) = match presence {
            FocalPresence::Present => (
                "present".to_string(),
                "Everyone is still here; keep the description grounded in the shared space.".to_string(),
            ),
            FocalPresence::Absent => (
                "away/resting".to_string(),
                format!(
                    "{focal_character} has left the scene; describe the room carrying on without them, quieter and more private."
                ),
            ),
        };

        let rounds = self.quiet_moments.to_string();
        let silence = silence_rounds.to_string();
        let features = self.scene.notable_features.join(", ");
        self.prompts.render(
            PromptId::NarratorAmbient,
            &[
                ("location", self.scene.location.as_str()),
                ("atmosphere", self.scene.atmosphere.as_str()),
                ("features", features.as_str()),
                ("rounds", rounds.as_str()),
                ("focal_name", focal_character),
                ("focal_status", focal_status.as_str()),
                ("recent_conversation", recent_conversation.as_str()),
                ("silence_rounds", silence.as_str()),
                ("history_section", history_section.as_str()),
                ("tone_instruction", tone_instruction.as_str()),
            ],
        )
    }

    fn fallback_description(&mut self) -> String {
        let mut candidates: Vec<&str> = FALLBACK_DESCRIPTIONS
            .iter()
            .copied()
            .filter(|f| !self.history.iter().any(|h| h == f))
            .collect();
        if candidates.is_empty() {
            let last = self.history.back().map(String::as_str);
            candidates = FALLBACK_DESCRIPTIONS
                .iter()
                .copied()
                .filter(|f| Some(*f) != last)
                .collect();
        }
        let pick = self.rng.gen_range(0..candidates.len());
        candidates[pick].to_string()
    }

    fn remember(&mut self, description: &str) {
        if self.history.len() == self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(description.to_string());
    }
}

/// Whether `focal` has left, judged from their most recent action in `events`.
#[must_use]
pub fn focal_presence(events: &[Arc<TimelineEvent>], focal: &str) -> FocalPresence {
    let last = events.iter().rev().find(|e| {
        e.kind.origin() == focal
            && matches!(
                e.kind,
                EventKind::Message { .. } | EventKind::Action { .. } | EventKind::CharacterExit { .. }
            )
    });
    match last.map(|e| &e.kind) {
        Some(EventKind::CharacterExit { .. }) => FocalPresence::Absent,
        Some(kind) if kind.action_text().is_some_and(departure::is_departure) => FocalPresence::Absent,
        _ => FocalPresence::Present,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
