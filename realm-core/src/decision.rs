//! Decision protocol: turning a model reply into a validated [`Decision`].
//!
//! The model answers with loosely shaped JSON. [`Decision::parse`] normalizes
//! it and rejects anything that breaks the speak / act / silent field rules,
//! so a constructed [`Decision`] is always valid.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use realm_llm::parser;

use crate::error::{RealmError, Result};
use crate::timeline::EventKind;

/// Reasoning recorded when the model gives none.
pub const NO_REASONING: &str = "No reasoning provided";

/// What a character chose to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response_type", rename_all = "snake_case")]
pub enum Intent {
    /// Say something, optionally with body language.
    Speak {
        /// The dialogue.
        message: String,
        /// Accompanying action.
        action_description: Option<String>,
    },
    /// React physically without speaking.
    Act {
        /// The action.
        action_description: String,
    },
    /// Do nothing this round.
    Silent,
}

/// A validated decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// The chosen intent.
    #[serde(flatten)]
    pub intent: Intent,
    /// Urgency in `[0, 1]`.
    pub priority: f32,
    /// The model's stated rationale.
    pub reasoning: String,
}

/// The reply exactly as the model shaped it, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDecision {
    /// `"speak"`, `"act"` or `"silent"`, any case.
    #[serde(default)]
    pub response_type: Option<String>,
    /// A number, or a string holding one.
    #[serde(default)]
    pub priority: Option<Value>,
    /// Free-text rationale.
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Physical action.
    #[serde(default)]
    pub action_description: Option<String>,
    /// Dialogue.
    #[serde(default)]
    pub message: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn priority_of(value: Option<&Value>) -> f32 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    #[allow(clippy::cast_possible_truncation)]
    raw.filter(|p| p.is_finite())
        .map_or(0.0, |p| p.clamp(0.0, 1.0) as f32)
}

impl Decision {
    /// A silent decision.
    #[must_use]
    pub fn silent(reasoning: impl Into<String>) -> Self {
        Self {
            intent: Intent::Silent,
            priority: 0.0,
            reasoning: reasoning.into(),
        }
    }

    /// Parse and validate raw model output for `character`.
    ///
    /// # Errors
    ///
    /// [`RealmError::MalformedResponse`] when the text is not a JSON object,
    /// [`RealmError::ContractViolation`] when the fields contradict the
    /// response type.
    pub fn parse(character: &str, text: &str) -> Result<Self> {
        let value = parser::parse_json_value(text).map_err(|e| RealmError::MalformedResponse {
            character: character.to_string(),
            reason: e.to_string(),
        })?;
        if !value.is_object() {
            return Err(RealmError::MalformedResponse {
                character: character.to_string(),
                reason: "decision is not a JSON object".to_string(),
            });
        }
        let raw: RawDecision =
            serde_json::from_value(value).map_err(|e| RealmError::MalformedResponse {
                character: character.to_string(),
                reason: format!("unexpected decision shape: {e}"),
            })?;
        Self::from_raw(character, raw)
    }

    /// Validate an already-deserialized reply.
    ///
    /// # Errors
    ///
    /// [`RealmError::ContractViolation`] on speak without a message, act
    /// without an action, or act with a message.
    pub fn from_raw(character: &str, raw: RawDecision) -> Result<Self> {
        let violation = |reason: &str| RealmError::ContractViolation {
            character: character.to_string(),
            reason: reason.to_string(),
        };

        let priority = priority_of(raw.priority.as_ref());
        let reasoning = non_blank(raw.reasoning).unwrap_or_else(|| NO_REASONING.to_string());
        let message = non_blank(raw.message);
        let action = non_blank(raw.action_description);
        let kind = raw
            .response_type
            .map(|t| t.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let intent = match kind.as_str() {
            "speak" => Intent::Speak {
                message: message.ok_or_else(|| violation("speak decision without a message"))?,
                action_description: action,
            },
            "act" => {
                if message.is_some() {
                    return Err(violation("act decision carries a message"));
                }
                Intent::Act {
                    action_description: action
                        .ok_or_else(|| violation("act decision without an action"))?,
                }
            }
            _ => Intent::Silent,
        };

        Ok(Self {
            intent,
            priority,
            reasoning,
        })
    }

    /// Whether the character chose silence.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self.intent, Intent::Silent)
    }

    /// Whether the character chose to speak.
    #[must_use]
    pub fn is_speak(&self) -> bool {
        matches!(self.intent, Intent::Speak { .. })
    }

    /// The dialogue, if speaking.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match &self.intent {
            Intent::Speak { message, .. } => Some(message),
            Intent::Act { .. } | Intent::Silent => None,
        }
    }

    /// The physical action, if any.
    #[must_use]
    pub fn action_description(&self) -> Option<&str> {
        match &self.intent {
            Intent::Speak { action_description, .. } => action_description.as_deref(),
            Intent::Act { action_description } => Some(action_description),
            Intent::Silent => None,
        }
    }

    /// The timeline event this decision produces for `character`.
    #[must_use]
    pub fn to_event(&self, character: &str) -> Option<EventKind> {
        match &self.intent {
            Intent::Speak { message, action_description } => Some(EventKind::Message {
                speaker: character.to_string(),
                content: message.clone(),
                action_description: action_description.clone(),
            }),
            Intent::Act { action_description } => Some(EventKind::Action {
                character: character.to_string(),
                description: action_description.clone(),
            }),
            Intent::Silent => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speak_with_action() {
        let d = Decision::parse(
            "Ron",
            r#"{"response_type": "speak", "priority": 0.8, "reasoning": "greeted",
                "action_description": "waves", "message": "Hiya!"}"#,
        )
        .expect("valid speak");
        assert!(d.is_speak());
        assert_eq!(d.message(), Some("Hiya!"));
        assert_eq!(d.action_description(), Some("waves"));
        assert!((d.priority - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn act_decision() {
        let d = Decision::parse(
            "Hermione",
            r#"{"response_type": "ACT", "priority": 0.4, "reasoning": "processing",
                "action_description": "stares at the fire", "message": null}"#,
        )
        .expect("valid act");
        assert_eq!(
            d.intent,
            Intent::Act {
                action_description: "stares at the fire".into()
            }
        );
    }

    #[test]
    fn missing_or_unknown_type_is_silent() {
        let d = Decision::parse("Ron", r#"{"priority": 0.2}"#).expect("parses");
        assert!(d.is_silent());
        let d = Decision::parse("Ron", r#"{"response_type": "shrug"}"#).expect("parses");
        assert!(d.is_silent());
    }

    #[test]
    fn silent_drops_stray_fields() {
        let d = Decision::parse(
            "Ron",
            r#"{"response_type": "silent", "message": "oops", "action_description": "shrugs"}"#,
        )
        .expect("parses");
        assert!(d.is_silent());
        assert_eq!(d.message(), None);
        assert_eq!(d.action_description(), None);
        assert!(d.to_event("Ron").is_none());
    }

    #[test]
    fn defaults_for_priority_and_reasoning() {
        let d = Decision::parse("Ron", r#"{"response_type": "speak", "message": "Oi"}"#)
            .expect("parses");
        assert!(d.priority.abs() < f32::EPSILON);
        assert_eq!(d.reasoning, NO_REASONING);
    }

    #[test]
    fn priority_is_clamped_and_coerced() {
        let d = Decision::parse("Ron", r#"{"response_type": "silent", "priority": 3.5}"#)
            .expect("parses");
        assert!((d.priority - 1.0).abs() < f32::EPSILON);
        let d = Decision::parse("Ron", r#"{"response_type": "silent", "priority": -1}"#)
            .expect("parses");
        assert!(d.priority.abs() < f32::EPSILON);
        let d = Decision::parse("Ron", r#"{"response_type": "silent", "priority": "0.5"}"#)
            .expect("parses");
        assert!((d.priority - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn speak_without_message_violates_contract() {
        let err = Decision::parse("Ron", r#"{"response_type": "speak", "message": "   "}"#)
            .expect_err("blank message");
        assert!(matches!(err, RealmError::ContractViolation { .. }));
    }

    #[test]
    fn act_rules_are_enforced() {
        let err = Decision::parse("Ron", r#"{"response_type": "act"}"#).expect_err("no action");
        assert!(matches!(err, RealmError::ContractViolation { .. }));

        let err = Decision::parse(
            "Ron",
            r#"{"response_type": "act", "action_description": "nods", "message": "yes"}"#,
        )
        .expect_err("act with message");
        assert!(matches!(err, RealmError::ContractViolation { .. }));
    }

    #[test]
    fn non_json_is_malformed() {
        let err = Decision::parse("Ron", "I think I'll say hello").expect_err("prose");
        assert!(matches!(err, RealmError::MalformedResponse { .. }));
        assert!(err.is_contract_error());

        let err = Decision::parse("Ron", "[1, 2, 3]").expect_err("array");
        assert!(matches!(err, RealmError::MalformedResponse { .. }));
    }

    #[test]
    fn fenced_json_is_accepted() {
        let d = Decision::parse(
            "Ron",
            "```json\n{\"response_type\": \"speak\", \"message\": \"Right.\"}\n```",
        )
        .expect("fenced");
        assert_eq!(d.message(), Some("Right."));
    }

    #[test]
    fn events_from_decisions() {
        let d = Decision::parse(
            "Ron",
            r#"{"response_type": "act", "action_description": "pockets the rat"}"#,
        )
        .expect("parses");
        assert_eq!(
            d.to_event("Ron"),
            Some(EventKind::Action {
                character: "Ron".into(),
                description: "pockets the rat".into()
            })
        );
    }
}
