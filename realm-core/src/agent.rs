//! Character Agent: perspective-bound prompting and the decide call.
//!
//! The agent never mutates the character it decides for. It renders what the
//! character is, how they feel and what they have perceived into one prompt,
//! makes exactly one generation call with the character's own sampling
//! parameters, and returns a validated [`Decision`].

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, warn};

use realm_llm::{Generator, PromptEngine, PromptId};

use crate::character::Character;
use crate::decision::{Decision, Intent};
use crate::error::Result;

/// Builds decision prompts and queries the generator for one character.
#[derive(Clone)]
pub struct CharacterAgent {
    generator: Arc<dyn Generator>,
    prompts: Arc<PromptEngine>,
    memory_window: Option<usize>,
}

impl std::fmt::Debug for CharacterAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterAgent")
            .field("memory_window", &self.memory_window)
            .finish_non_exhaustive()
    }
}

impl CharacterAgent {
    /// Create an agent over a generator and prompt set.
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>, prompts: Arc<PromptEngine>) -> Self {
        Self {
            generator,
            prompts,
            memory_window: None,
        }
    }

    /// Only show the last `n` perceived events in decision prompts.
    #[must_use]
    pub fn with_memory_window(mut self, n: Option<usize>) -> Self {
        self.memory_window = n;
        self
    }

    /// Decide whether `character` speaks, acts or stays silent.
    ///
    /// # Errors
    ///
    /// Transport failures surface as [`crate::RealmError::Generation`];
    /// malformed or contradictory replies as
    /// [`crate::RealmError::MalformedResponse`] /
    /// [`crate::RealmError::ContractViolation`].
    pub async fn decide(&self, character: &Character, story_context: Option<&str>) -> Result<Decision> {
        let name = character.name();
        let prompt = self.build_decision_prompt(character, story_context);
        let sampling = character.persona.sampling();

        let text = self.generator.generate(&prompt, &sampling).await?;
        let decision = Decision::parse(name, &text).inspect_err(|e| {
            warn!(character = %name, error = %e, "Rejected decision");
        })?;

        debug!(
            character = %name,
            intent = match decision.intent {
                Intent::Speak { .. } => "speak",
                Intent::Act { .. } => "act",
                Intent::Silent => "silent",
            },
            priority = decision.priority,
            "Decision made"
        );
        Ok(decision)
    }

    /// The full decision prompt as `character` would receive it.
    #[must_use]
    pub fn build_decision_prompt(&self, character: &Character, story_context: Option<&str>) -> String {
        let persona = persona_context(character);
        let state = state_context(character);
        let memory = memory_context(character, self.memory_window);
        let story = story_context
            .filter(|s| !s.trim().is_empty())
            .map(|s| format!("\n{s}\n"))
            .unwrap_or_default();

        self.prompts.render(
            PromptId::Decision,
            &[
                ("persona_context", persona.as_str()),
                ("state_context", state.as_str()),
                ("story_section", story.as_str()),
                ("memory_context", memory.as_str()),
            ],
        )
    }
}

/// Who the character is: traits, style, background, relationships, goals, knowledge.
#[must_use]
pub fn persona_context(character: &Character) -> String {
    let p = &character.persona;
    let mut out = format!(
        "You are {}.\nYOUR PERSONALITY:\n- Traits: {}\n- Speaking Style: {}\n- Background: {}\n",
        p.name,
        p.traits.join(", "),
        p.speaking_style,
        p.background,
    );

    if !p.relationships.is_empty() {
        out.push_str("YOUR RELATIONSHIPS:\n");
        for (other, relation) in &p.relationships {
            let _ = writeln!(out, "- {other}: {relation}");
        }
    }
    if !p.goals.is_empty() {
        out.push_str("\nYOUR GOALS & MOTIVATIONS:\n");
        for goal in &p.goals {
            let _ = writeln!(out, "- {goal}");
        }
    }
    if !p.knowledge_base.is_empty() {
        out.push_str("\nYOUR SPECIAL KNOWLEDGE:\n");
        for (topic, fact) in &p.knowledge_base {
            let _ = writeln!(out, "- {topic}: {fact}");
        }
    }
    out
}

/// How the character currently is.
#[must_use]
pub fn state_context(character: &Character) -> String {
    let s = &character.state;
    let mut out = format!("\nYOUR CURRENT STATE:\n- Mood: {}", s.mood);
    if let Some(focus) = &s.focus {
        let _ = write!(out, "\n- Focus: {focus}");
    }
    if let Some(action) = &s.current_action {
        let _ = write!(out, "\n- Current Action: {action}");
    }
    if let Some(objective) = &s.current_objective {
        let _ = write!(out, "\n- Your Objective: {objective}");
    }
    out.push('\n');
    out
}

/// What the character has perceived, rendered from their perspective.
#[must_use]
pub fn memory_context(character: &Character, window: Option<usize>) -> String {
    character
        .memory
        .window(window)
        .iter()
        .map(|event| event.kind.render_for(character.name()))
        .collect::<Vec<_>>()
        .join("\n")
}
