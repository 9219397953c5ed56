//! Objective Tracker: per-character objectives serving the story cursor.
//!
//! The tracker owns the [`Story`]. Each evaluation asks the generator either
//! to hand out first objectives (when nobody holds one) or to judge progress
//! on the current ones. The result is returned as an [`ObjectiveEvaluation`]
//! delta; the orchestrator applies it to character state and decides whether
//! to [`ObjectiveTracker::advance`].
//!
//! Evaluation never fails. Transport or parse errors produce the
//! deterministic `help achieve: <objective>` fallback with story completion
//! reported as false.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use realm_llm::{parser, Generator, LlmError, PromptEngine, PromptId, SamplingParams};

use crate::character::{Character, StateUpdate};
use crate::story::{ObjectiveState, Story};
use crate::timeline::TimelineEvent;

/// How a character's objective changed in an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    /// Newly handed out.
    Assigned,
    /// The previous one was achieved; `objective` is the replacement.
    Completed,
    /// Still working on the same one.
    Continuing,
}

/// One character's objective after an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterObjectiveUpdate {
    /// Who.
    pub character: String,
    /// The objective they now hold.
    pub objective: String,
    /// How it changed.
    pub status: ObjectiveStatus,
    /// Why.
    pub reasoning: String,
}

/// Result of [`ObjectiveTracker::assign_or_evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveEvaluation {
    /// Per-character results, in the order characters were given.
    pub updates: Vec<CharacterObjectiveUpdate>,
    /// Whether the current story objective has been achieved.
    pub story_objective_complete: bool,
    /// Why.
    pub reasoning: String,
}

impl ObjectiveEvaluation {
    /// State deltas that install each character's objective.
    pub fn state_updates(&self) -> impl Iterator<Item = (&str, StateUpdate)> + '_ {
        self.updates
            .iter()
            .map(|u| (u.character.as_str(), StateUpdate::objective(u.objective.clone())))
    }

    /// The update for `character`, if any.
    #[must_use]
    pub fn for_character(&self, character: &str) -> Option<&CharacterObjectiveUpdate> {
        self.updates.iter().find(|u| u.character == character)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawEvaluation {
    #[serde(default)]
    character_updates: HashMap<String, RawCharacterUpdate>,
    #[serde(default)]
    story_objective_complete: bool,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCharacterUpdate {
    #[serde(default)]
    objective: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

impl RawEvaluation {
    fn take(&mut self, name: &str) -> Option<RawCharacterUpdate> {
        let key = self
            .character_updates
            .keys()
            .find(|k| k.trim().eq_ignore_ascii_case(name))?
            .clone();
        self.character_updates.remove(&key)
    }
}

/// Owns the story and evaluates objectives against it.
pub struct ObjectiveTracker {
    story: Story,
    generator: Arc<dyn Generator>,
    prompts: Arc<PromptEngine>,
    sampling: SamplingParams,
}

impl std::fmt::Debug for ObjectiveTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectiveTracker")
            .field("story", &self.story)
            .field("sampling", &self.sampling)
            .finish_non_exhaustive()
    }
}

impl ObjectiveTracker {
    /// Track `story` using `generator` for assignment and evaluation.
    #[must_use]
    pub fn new(
        story: Story,
        generator: Arc<dyn Generator>,
        prompts: Arc<PromptEngine>,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            story,
            generator,
            prompts,
            sampling,
        }
    }

    /// The tracked story.
    #[must_use]
    pub fn story(&self) -> &Story {
        &self.story
    }

    /// Cursor state.
    #[must_use]
    pub fn state(&self) -> ObjectiveState {
        self.story.state()
    }

    /// The active story objective, or `None` once complete.
    #[must_use]
    pub fn get_current_objective(&self) -> Option<&str> {
        self.story.current_objective()
    }

    /// Whether every objective has been achieved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.story.is_complete()
    }

    /// Share of objectives achieved, 0 to 100.
    #[must_use]
    pub fn progress_percentage(&self) -> f32 {
        self.story.progress_percentage()
    }

    /// Advance the cursor. See [`Story::advance`].
    pub fn advance(&mut self) -> bool {
        let advanced = self.story.advance();
        match self.story.current_objective() {
            Some(next) => info!(
                index = self.story.current_objective_index(),
                objective = %next,
                "Story objective advanced"
            ),
            None => info!(title = %self.story.title, "Story complete"),
        }
        advanced
    }

    /// Story framing handed to every decision prompt.
    #[must_use]
    pub fn story_context(&self) -> String {
        let Some(objective) = self.story.current_objective() else {
            return "Story completed! All objectives achieved.".to_string();
        };
        format!(
            "STORY: {}\nProgress: {:.0}% ({} of {} objectives)\n\nCURRENT STORY OBJECTIVE:\n{}\n\nOVERALL STORY CONTEXT:\n{}\n\n\
             Work naturally toward the current objective through your own perspective and abilities.",
            self.story.title,
            self.story.progress_percentage(),
            self.story.current_objective_index() + 1,
            self.story.objectives.len(),
            objective,
            self.story.description,
        )
    }

    /// One-paragraph progress report.
    #[must_use]
    pub fn progress_summary(&self) -> String {
        match self.story.current_objective() {
            None => format!(
                "Story complete: {} (all {} objectives achieved)",
                self.story.title,
                self.story.objectives.len()
            ),
            Some(objective) => format!(
                "Story: {} | Progress: {:.0}% | Objective {} of {}: \"{}\"",
                self.story.title,
                self.story.progress_percentage(),
                self.story.current_objective_index() + 1,
                self.story.objectives.len(),
                objective
            ),
        }
    }

    /// Hand out first objectives, or judge progress on existing ones.
    pub async fn assign_or_evaluate(
        &self,
        active_characters: &[&Character],
        recent_events: &[Arc<TimelineEvent>],
    ) -> ObjectiveEvaluation {
        let Some(story_objective) = self.story.current_objective() else {
            return ObjectiveEvaluation {
                updates: Vec::new(),
                story_objective_complete: true,
                reasoning: "Story is complete".to_string(),
            };
        };
        if active_characters.is_empty() {
            return ObjectiveEvaluation {
                updates: Vec::new(),
                story_objective_complete: false,
                reasoning: "No active characters".to_string(),
            };
        }

        let first_turn = active_characters
            .iter()
            .all(|c| c.state.current_objective.is_none());
        let prompt = self.build_prompt(first_turn, story_objective, active_characters, recent_events);

        let raw = match self.request(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, first_turn, "Objective evaluation failed, using fallback objectives");
                return fallback_evaluation(first_turn, story_objective, active_characters, &e);
            }
        };

        let evaluation = if first_turn {
            first_turn_evaluation(raw, story_objective, active_characters)
        } else {
            steady_state_evaluation(raw, story_objective, active_characters)
        };
        debug!(
            first_turn,
            updates = evaluation.updates.len(),
            story_objective_complete = evaluation.story_objective_complete,
            "Objectives evaluated"
        );
        evaluation
    }

    async fn request(&self, prompt: &str) -> Result<RawEvaluation, LlmError> {
        let text = self.generator.generate(prompt, &self.sampling).await?;
        let value = parser::parse_json_value(&text)?;
        serde_json::from_value(value).map_err(|e| LlmError::ParseError(e.to_string()))
    }

    fn build_prompt(
        &self,
        first_turn: bool,
        story_objective: &str,
        characters: &[&Character],
        recent_events: &[Arc<TimelineEvent>],
    ) -> String {
        let mut roster = String::new();
        for c in characters {
            let _ = writeln!(
                roster,
                "- {}: Traits: {}. Speaking style: {}. Current Objective: {}",
                c.name(),
                c.persona.traits.join(", "),
                c.persona.speaking_style,
                c.state.current_objective.as_deref().unwrap_or("None"),
            );
        }
        let events = if recent_events.is_empty() {
            "No recent events".to_string()
        } else {
            recent_events
                .iter()
                .map(|e| e.kind.summary_line())
                .collect::<Vec<_>>()
                .join("\n")
        };

        if first_turn {
            self.prompts.render(
                PromptId::ObjectiveAssign,
                &[
                    ("story_title", self.story.title.as_str()),
                    ("story_description", self.story.description.as_str()),
                    ("current_objective", story_objective),
                    ("characters", roster.trim_end()),
                    ("recent_events", events.as_str()),
                ],
            )
        } else {
            let count = recent_events.len().to_string();
            self.prompts.render(
                PromptId::ObjectiveEvaluate,
                &[
                    ("current_objective", story_objective),
                    ("characters", roster.trim_end()),
                    ("event_count", count.as_str()),
                    ("recent_events", events.as_str()),
                ],
            )
        }
    }
}

/// The objective every character falls back to.
#[must_use]
pub fn fallback_objective(story_objective: &str) -> String {
    format!("help achieve: {story_objective}")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn first_turn_evaluation(
    mut raw: RawEvaluation,
    story_objective: &str,
    characters: &[&Character],
) -> ObjectiveEvaluation {
    let mut taken: HashSet<String> = HashSet::new();
    let mut updates = Vec::with_capacity(characters.len());

    for c in characters {
        let name = c.name();
        let entry = raw.take(name).unwrap_or_default();
        let (mut objective, reasoning) = match non_blank(entry.objective) {
            Some(objective) => (
                objective,
                non_blank(entry.reasoning).unwrap_or_else(|| "Assigned".to_string()),
            ),
            None => {
                warn!(character = %name, "No objective returned, assigning fallback");
                (fallback_objective(story_objective), "Fallback objective".to_string())
            }
        };

        if taken.contains(&objective.to_lowercase()) {
            let base = objective;
            objective = format!("{base} ({name}'s approach)");
            let mut attempt = 2u32;
            while taken.contains(&objective.to_lowercase()) {
                objective = format!("{base} ({name}'s approach {attempt})");
                attempt += 1;
            }
        }
        taken.insert(objective.to_lowercase());

        updates.push(CharacterObjectiveUpdate {
            character: name.to_string(),
            objective,
            status: ObjectiveStatus::Assigned,
            reasoning,
        });
    }

    ObjectiveEvaluation {
        updates,
        story_objective_complete: raw.story_objective_complete,
        reasoning: non_blank(raw.reasoning).unwrap_or_else(|| "Objectives assigned".to_string()),
    }
}

fn steady_state_evaluation(
    mut raw: RawEvaluation,
    story_objective: &str,
    characters: &[&Character],
) -> ObjectiveEvaluation {
    let mut updates = Vec::with_capacity(characters.len());

    for c in characters {
        let name = c.name();
        let current = c.state.current_objective.clone();
        let entry = raw.take(name);

        let update = match (entry, current) {
            (Some(entry), current) => {
                let completed = entry
                    .status
                    .as_deref()
                    .is_some_and(|s| s.trim().eq_ignore_ascii_case("completed"));
                let proposed = non_blank(entry.objective);
                let reasoning = non_blank(entry.reasoning).unwrap_or_else(|| "No reasoning provided".to_string());
                match (completed, current) {
                    (true, _) => CharacterObjectiveUpdate {
                        character: name.to_string(),
                        objective: proposed.unwrap_or_else(|| fallback_objective(story_objective)),
                        status: ObjectiveStatus::Completed,
                        reasoning,
                    },
                    (false, Some(current)) => CharacterObjectiveUpdate {
                        character: name.to_string(),
                        objective: current,
                        status: ObjectiveStatus::Continuing,
                        reasoning,
                    },
                    (false, None) => CharacterObjectiveUpdate {
                        character: name.to_string(),
                        objective: proposed.unwrap_or_else(|| fallback_objective(story_objective)),
                        status: ObjectiveStatus::Assigned,
                        reasoning,
                    },
                }
            }
            (None, Some(current)) => CharacterObjectiveUpdate {
                character: name.to_string(),
                objective: current,
                status: ObjectiveStatus::Continuing,
                reasoning: "Not evaluated; keeping current objective".to_string(),
            },
            (None, None) => CharacterObjectiveUpdate {
                character: name.to_string(),
                objective: fallback_objective(story_objective),
                status: ObjectiveStatus::Assigned,
                reasoning: "Fallback objective".to_string(),
            },
        };
        updates.push(update);
    }

    ObjectiveEvaluation {
        updates,
        story_objective_complete: raw.story_objective_complete,
        reasoning: non_blank(raw.reasoning).unwrap_or_else(|| "No reasoning provided".to_string()),
    }
}

fn fallback_evaluation(
    first_turn: bool,
    story_objective: &str,
    characters: &[&Character],
    error: &LlmError,
) -> ObjectiveEvaluation {
    let updates = characters
        .iter()
        .map(|c| match (&c.state.current_objective, first_turn) {
            (Some(current), false) => CharacterObjectiveUpdate {
                character: c.name().to_string(),
                objective: current.clone(),
                status: ObjectiveStatus::Continuing,
                reasoning: "Evaluation error".to_string(),
            },
            _ => CharacterObjectiveUpdate {
                character: c.name().to_string(),
                objective: fallback_objective(story_objective),
                status: ObjectiveStatus::Assigned,
                reasoning: "Fallback objective".to_string(),
            },
        })
        .collect();

    ObjectiveEvaluation {
        updates,
        story_objective_complete: false,
        reasoning: format!("Error during evaluation: {error}"),
    }
}
