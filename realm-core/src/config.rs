//! Configuration for the rolerealm engine.
//!
//! Maps directly to `rolerealm.toml`. Every section is optional; missing
//! sections and fields fall back to the defaults below.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use realm_llm::{LlmClient, LlmProvider, PromptEngine, SamplingParams};

use crate::error::RealmError;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Generation backend settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Round loop tuning.
    #[serde(default)]
    pub round: RoundConfig,
    /// Scene narrator settings.
    #[serde(default)]
    pub narrator: NarratorConfig,
    /// Objective tracker settings.
    #[serde(default)]
    pub objectives: ObjectivesConfig,
    /// Conversation summary settings.
    #[serde(default)]
    pub summary: SummaryConfig,
    /// Prompt template overrides.
    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl RealmConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `RealmError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| RealmError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Build the HTTP generation client described by `[llm]`.
    ///
    /// # Errors
    /// Returns `RealmError::Config` for an unknown provider, or when the
    /// OpenAI-compatible provider's API key variable is unset.
    pub fn build_client(&self) -> crate::error::Result<LlmClient> {
        let llm = &self.llm;
        let provider = match llm.provider.to_ascii_lowercase().as_str() {
            "ollama" => LlmProvider::Ollama {
                base_url: llm.base_url.clone(),
            },
            "openai" | "openrouter" => {
                let api_key = std::env::var(&llm.api_key_env).map_err(|_| {
                    RealmError::Config(format!("environment variable {} is not set", llm.api_key_env))
                })?;
                LlmProvider::OpenAiCompatible {
                    base_url: llm.base_url.clone(),
                    api_key,
                }
            }
            "none" => LlmProvider::None,
            other => return Err(RealmError::Config(format!("unknown LLM provider: {other}"))),
        };

        Ok(LlmClient::new(provider, llm.model.clone(), llm.max_retries)
            .with_max_tokens(llm.max_tokens)
            .with_timeout(llm.request_timeout_ms))
    }

    /// The prompt set: builtin templates, overridden from `[prompts] directory`
    /// when one is configured.
    ///
    /// # Errors
    /// Returns `RealmError::Config` if the directory cannot be loaded.
    pub fn prompt_engine(&self) -> crate::error::Result<PromptEngine> {
        match &self.prompts.directory {
            Some(dir) => PromptEngine::from_directory(dir).map_err(RealmError::Config),
            None => Ok(PromptEngine::builtin()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error. `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key (OpenAI-compatible only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Retries after the first failed attempt.
    #[serde(default = "default_2")]
    pub max_retries: u32,
    /// HTTP timeout for a single request in milliseconds.
    #[serde(default = "default_30000")]
    pub request_timeout_ms: u64,
    /// Token limit per completion.
    #[serde(default = "default_400")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_ollama(),
            base_url: default_ollama_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_retries: 2,
            request_timeout_ms: 30_000,
            max_tokens: 400,
        }
    }
}

/// Round loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundConfig {
    /// Consecutive silent rounds before the narrator steps in.
    #[serde(default = "default_1")]
    pub stagnation_threshold: u32,
    /// Evaluate objectives every this many rounds.
    #[serde(default = "default_1")]
    pub objective_interval: u32,
    /// Skip characters who spoke in the previous round.
    #[serde(default = "default_true")]
    pub exclude_recent_speakers: bool,
    /// Only show this many recent events in decision prompts (all when unset).
    #[serde(default)]
    pub memory_window: Option<usize>,
    /// Deadline for one character's decision in milliseconds.
    #[serde(default = "default_30000")]
    pub decision_timeout_ms: u64,
    /// Number of recent timeline events the objective tracker sees.
    #[serde(default = "default_15_usize")]
    pub objective_event_window: usize,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            stagnation_threshold: 1,
            objective_interval: 1,
            exclude_recent_speakers: true,
            memory_window: None,
            decision_timeout_ms: 30_000,
            objective_event_window: 15,
        }
    }
}

/// Scene narrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarratorConfig {
    /// Starting location.
    #[serde(default = "default_location")]
    pub location: String,
    /// Starting atmosphere.
    #[serde(default = "default_atmosphere")]
    pub atmosphere: String,
    /// Things in the scene worth describing.
    #[serde(default = "default_features")]
    pub notable_features: Vec<String>,
    /// Previous descriptions remembered to avoid repeats.
    #[serde(default = "default_5_usize")]
    pub history_size: usize,
    /// Sampling for narration calls.
    #[serde(default = "default_narrator_sampling")]
    pub sampling: SamplingParams,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            atmosphere: default_atmosphere(),
            notable_features: default_features(),
            history_size: 5,
            sampling: default_narrator_sampling(),
        }
    }
}

/// Objective tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectivesConfig {
    /// Sampling for assignment and evaluation calls.
    #[serde(default = "default_objective_sampling")]
    pub sampling: SamplingParams,
}

impl Default for ObjectivesConfig {
    fn default() -> Self {
        Self {
            sampling: default_objective_sampling(),
        }
    }
}

/// Conversation summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Sampling for summary calls.
    #[serde(default = "default_summary_sampling")]
    pub sampling: SamplingParams,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            sampling: default_summary_sampling(),
        }
    }
}

/// Prompt template overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory of TOML prompt files overriding the builtins.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_model() -> String { "llama3.1:8b".to_string() }
fn default_api_key_env() -> String { "OPENROUTER_API_KEY".to_string() }
fn default_location() -> String { "Gryffindor Common Room".to_string() }
fn default_atmosphere() -> String { "warm and comfortable".to_string() }
fn default_features() -> Vec<String> {
    ["fireplace", "armchairs", "portraits", "windows"]
        .iter()
        .map(ToString::to_string)
        .collect()
}
fn default_narrator_sampling() -> SamplingParams { SamplingParams::new(0.8, 0.95, 0.3) }
fn default_objective_sampling() -> SamplingParams { SamplingParams::new(0.4, 0.9, 0.0) }
fn default_summary_sampling() -> SamplingParams { SamplingParams::new(0.5, 0.9, 0.0) }
fn default_1() -> u32 { 1 }
fn default_2() -> u32 { 2 }
fn default_400() -> u32 { 400 }
fn default_5_usize() -> usize { 5 }
fn default_15_usize() -> usize { 15 }
fn default_30000() -> u64 { 30_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = RealmConfig::from_toml("").expect("empty config");
        assert_eq!(config.round.stagnation_threshold, 1);
        assert_eq!(config.round.objective_event_window, 15);
        assert!(config.round.exclude_recent_speakers);
        assert_eq!(config.narrator.history_size, 5);
        assert_eq!(config.llm.provider, "ollama");
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = RealmConfig::from_toml(
            r#"
            [round]
            stagnation_threshold = 3
            memory_window = 20

            [narrator]
            location = "the Great Hall"
            sampling = { temperature = 1.2, top_p = 0.8, frequency_penalty = 0.1 }
            "#,
        )
        .expect("valid config");
        assert_eq!(config.round.stagnation_threshold, 3);
        assert_eq!(config.round.memory_window, Some(20));
        assert_eq!(config.round.decision_timeout_ms, 30_000);
        assert_eq!(config.narrator.location, "the Great Hall");
        assert_eq!(config.narrator.atmosphere, "warm and comfortable");
        assert!((config.narrator.sampling.temperature - 1.2).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = RealmConfig::from_toml("[round\nbroken").expect_err("invalid");
        assert!(matches!(err, RealmError::Config(_)));
    }

    #[test]
    fn none_provider_builds_an_unavailable_client() {
        let config = RealmConfig::from_toml("[llm]\nprovider = \"none\"").expect("valid");
        let client = config.build_client().expect("client");
        assert!(!client.is_available());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = RealmConfig::from_toml("[llm]\nprovider = \"carrier-owl\"").expect("valid");
        assert!(matches!(config.build_client(), Err(RealmError::Config(_))));
    }

    #[test]
    fn prompt_engine_defaults_to_builtin() {
        let engine = RealmConfig::default().prompt_engine().expect("builtin");
        assert!(engine.get(realm_llm::PromptId::Decision).is_some());
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rolerealm.toml");
        std::fs::write(&path, "[general]\nlog_level = \"debug\"\njson_logs = true\n").expect("write");
        let config = RealmConfig::from_file(&path).expect("load");
        assert_eq!(config.general.log_level, "debug");
        assert!(config.general.json_logs);
    }
}
