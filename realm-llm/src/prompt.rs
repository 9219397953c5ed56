//! Prompt templates for rolerealm generation calls.
//!
//! Every prompt is a versioned, testable artifact. The built-in templates are
//! the `const` strings below; a directory of TOML files can override any of
//! them without recompiling.

/// Per-character decision prompt. `{persona_context}` through
/// `{memory_context}` are pre-rendered by the caller.
pub const DECISION: &str = r#"{persona_context}{state_context}
{story_section}
WHAT YOU EXPERIENCED (your perspective):
{memory_context}

DECISION:
Based on YOUR experiences, YOUR traits, and YOUR current state, decide how you want to respond right now.

THREE OPTIONS:
1. SPEAK - Respond with dialogue (and an accompanying action)
2. ACT - React physically or emotionally WITHOUT speaking
3. SILENT - Do nothing, stay quiet

SPEAK when you are addressed, when someone reveals something that matters to you,
when an awkward silence needs breaking, or when the topic is highly relevant to YOU.
ACT when words would feel forced and body language says more.
STAY SILENT when you just spoke, when someone already said what you would say,
or when you have nothing new to add. Do not echo other characters.

Never repeat a physical action you already performed; keep your movements
physically consistent with what you did before.

OUTPUT FORMAT (strict JSON):
{
  "response_type": "speak" or "act" or "silent",
  "priority": 0.0 to 1.0 (how urgent your response is),
  "reasoning": "brief explanation of your decision",
  "action_description": "physical action - REQUIRED for act, optional for speak, null for silent",
  "message": "your dialogue for speak, otherwise null"
}"#;

/// First-turn objective assignment prompt.
pub const OBJECTIVE_ASSIGN: &str = r#"You are assigning objectives to characters in an interactive roleplay story.

STORY: {story_title}
{story_description}

CURRENT STORY OBJECTIVE (what needs to be achieved):
{current_objective}

ACTIVE CHARACTERS:
{characters}

RECENT CONTEXT:
{recent_events}

TASK: Assign ONE specific objective to EACH character that helps achieve the current story objective.
- Make objectives specific but flexible
- Consider each character's unique abilities and personality
- Objectives must complement each other; never give two characters the same objective
- Achievable through conversation or action in 3-10 turns

Respond ONLY with valid JSON:
{
  "character_updates": {
    "CharacterName": {
      "objective": "specific objective for this character",
      "status": "assigned",
      "reasoning": "why this objective fits them"
    }
  },
  "story_objective_complete": false,
  "reasoning": "Story objective just started"
}"#;

/// Steady-state objective evaluation prompt.
pub const OBJECTIVE_EVALUATE: &str = r#"You are evaluating story progression in an interactive roleplay.

CURRENT STORY OBJECTIVE (overall goal):
{current_objective}

ACTIVE CHARACTERS AND CURRENT OBJECTIVES:
{characters}

RECENT EVENTS (last {event_count}):
{recent_events}

EVALUATE AND UPDATE:
1. For EACH character:
   - If their objective is completed: give a NEW objective toward the current story objective, status "completed"
   - If ongoing: keep the same objective, status "continuing"
2. For the STORY OBJECTIVE: is it achieved? (even if some character objectives are incomplete)

Respond ONLY with valid JSON:
{
  "character_updates": {
    "CharacterName": {
      "objective": "new objective if completed, otherwise same as current",
      "status": "completed or continuing",
      "reasoning": "brief explanation"
    }
  },
  "story_objective_complete": true or false,
  "reasoning": "story objective status explanation"
}"#;

/// Environmental description when the conversation stalls.
pub const NARRATOR_AMBIENT: &str = r#"You are the narrator of an interactive roleplay story.

CURRENT SCENE:
- Location: {location}
- Atmosphere: {atmosphere}
- Notable features: {features}
- Quiet moments so far: {rounds}
- {focal_name} is {focal_status}

RECENT CONVERSATION:
{recent_conversation}

SITUATION:
A moment of silence has fallen ({silence_rounds} quiet round(s)).{history_section}

TASK:
Write a BRIEF environmental description (1-2 sentences) in present tense.
Focus on sensory detail, observe something NEW, and let time pass through subtle cues.
{tone_instruction}

OUTPUT FORMAT (strict JSON):
{
  "description": "your 1-2 sentence environmental description",
  "time_progression": "subtle hint about time passing, or null"
}"#;

/// Narrative bridge between two locations.
pub const NARRATOR_LOCATION: &str = r#"You are the narrator of an interactive roleplay story. Write a brief scene transition.

TRANSITION:
- From: {from_location}
- To: {to_location}
- Characters: {characters}
- Context: {context}

Write a vivid 2-3 sentence description of the characters moving to the new location, in present tense.

OUTPUT FORMAT (strict JSON):
{
  "transition": "your scene transition description"
}"#;

/// Conversation summary prompt.
pub const CONVERSATION_SUMMARY: &str = r#"You are summarizing a roleplay conversation between characters.
{context}

CONVERSATION:
{conversation}

TASK: Write a concise summary (2-4 sentences) covering the main topics, any important
decisions or revelations, the overall mood, and key character interactions or conflicts.

OUTPUT FORMAT (strict JSON):
{
  "summary": "your 2-4 sentence summary"
}"#;

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value in a single left-to-right
/// pass, so placeholders inside substituted values are left as written.
/// Unknown keys and other braces are copied through.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let found = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, value)| (*value, close))
        });
        match found {
            Some((value, close)) => {
                result.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                result.push('{');
                rest = after;
            }
        }
    }
    result.push_str(rest);
    result
}

// ---------------------------------------------------------------------------
// PromptEngine: Versioned TOML Template Loader
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Per-character speak / act / silent decision.
    Decision,
    /// First-turn character objective assignment.
    ObjectiveAssign,
    /// Steady-state objective evaluation.
    ObjectiveEvaluate,
    /// Environmental description during a silence.
    NarratorAmbient,
    /// Location change narration.
    NarratorLocation,
    /// Timeline summary.
    ConversationSummary,
}

impl PromptId {
    /// Returns the TOML filename (without path) for this prompt.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::Decision => "decision.toml",
            Self::ObjectiveAssign => "objective_assign.toml",
            Self::ObjectiveEvaluate => "objective_evaluate.toml",
            Self::NarratorAmbient => "narrator_ambient.toml",
            Self::NarratorLocation => "narrator_location.toml",
            Self::ConversationSummary => "conversation_summary.toml",
        }
    }

    /// All prompt IDs.
    #[must_use]
    pub fn all() -> &'static [PromptId] {
        &[
            Self::Decision,
            Self::ObjectiveAssign,
            Self::ObjectiveEvaluate,
            Self::NarratorAmbient,
            Self::NarratorLocation,
            Self::ConversationSummary,
        ]
    }

    fn builtin_template(self) -> &'static str {
        match self {
            Self::Decision => DECISION,
            Self::ObjectiveAssign => OBJECTIVE_ASSIGN,
            Self::ObjectiveEvaluate => OBJECTIVE_EVALUATE,
            Self::NarratorAmbient => NARRATOR_AMBIENT,
            Self::NarratorLocation => NARRATOR_LOCATION,
            Self::ConversationSummary => CONVERSATION_SUMMARY,
        }
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Decision => "decision",
            Self::ObjectiveAssign => "objective_assign",
            Self::ObjectiveEvaluate => "objective_evaluate",
            Self::NarratorAmbient => "narrator_ambient",
            Self::NarratorLocation => "narrator_location",
            Self::ConversationSummary => "conversation_summary",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PromptId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision" => Ok(Self::Decision),
            "objective_assign" => Ok(Self::ObjectiveAssign),
            "objective_evaluate" => Ok(Self::ObjectiveEvaluate),
            "narrator_ambient" => Ok(Self::NarratorAmbient),
            "narrator_location" => Ok(Self::NarratorLocation),
            "conversation_summary" => Ok(Self::ConversationSummary),
            _ => Err(format!("unknown prompt id: '{s}'")),
        }
    }
}

/// Metadata and template parsed from a TOML prompt file.
#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: TomlPromptData,
}

/// Inner `[prompt]` section of a TOML file.
#[derive(Debug, Clone, Deserialize)]
struct TomlPromptData {
    version: String,
    template: String,
}

/// A loaded, ready-to-render prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Prompt version string (e.g., "1.0").
    pub version: String,
    /// Template text (contains `{key}` placeholders).
    pub template: String,
}

/// Engine holding one template per [`PromptId`].
///
/// # Example
///
/// ```no_run
/// use realm_llm::prompt::{PromptEngine, PromptId};
///
/// let engine = PromptEngine::from_directory("prompts/v1").unwrap();
/// let text = engine.render(PromptId::NarratorLocation, &[("to_location", "the Great Hall")]);
/// ```
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<PromptId, PromptTemplate>,
}

impl PromptEngine {
    /// Create a `PromptEngine` pre-loaded with the built-in constant templates.
    #[must_use]
    pub fn builtin() -> Self {
        let templates = PromptId::all()
            .iter()
            .map(|id| {
                (
                    *id,
                    PromptTemplate {
                        version: "builtin".into(),
                        template: id.builtin_template().into(),
                    },
                )
            })
            .collect();
        Self { templates }
    }

    /// Load prompt templates from a directory of TOML files.
    ///
    /// Each TOML file must match a known [`PromptId`] filename. Templates
    /// missing from the directory keep their built-in version.
    ///
    /// # Errors
    ///
    /// Returns an error if a TOML file exists but cannot be parsed, or if the
    /// directory contains no template at all.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, String> {
        let dir = dir.as_ref();
        let mut engine = Self::builtin();
        let mut loaded = 0_usize;

        for id in PromptId::all() {
            let path: PathBuf = dir.join(id.filename());
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
                let parsed: TomlPromptFile = toml::from_str(&content)
                    .map_err(|e| format!("failed to parse {}: {e}", path.display()))?;

                engine.templates.insert(
                    *id,
                    PromptTemplate {
                        version: parsed.prompt.version,
                        template: parsed.prompt.template,
                    },
                );
                loaded += 1;
            }
        }

        if loaded == 0 {
            return Err(format!(
                "no prompt templates found in directory: {}",
                dir.display()
            ));
        }

        Ok(engine)
    }

    /// Get a loaded prompt template by ID.
    #[must_use]
    pub fn get(&self, id: PromptId) -> Option<&PromptTemplate> {
        self.templates.get(&id)
    }

    /// Render the template for `id`, replacing every `{key}` in `vars`.
    ///
    /// Every ID is always present (built-in templates back any override), so
    /// rendering cannot fail.
    #[must_use]
    pub fn render(&self, id: PromptId, vars: &[(&str, &str)]) -> String {
        let template = self
            .templates
            .get(&id)
            .map_or(id.builtin_template(), |t| t.template.as_str());
        render_template(template, vars)
    }

    /// Version string of the template in use for `id`.
    #[must_use]
    pub fn version(&self, id: PromptId) -> &str {
        self.templates.get(&id).map_or("builtin", |t| t.version.as_str())
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::builtin()
    }
}
