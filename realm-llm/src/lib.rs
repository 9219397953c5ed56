//! # realm-llm: Generation Service for rolerealm
//!
//! Provides a single seam, [`Generator`], through which every model call of
//! the narrative engine flows, plus the backends behind it:
//!   - **Ollama** (local)
//!   - **OpenAI-compatible API** (OpenRouter, Together, vLLM, ...)
//!   - **Scripted** (deterministic, offline; tests and dry runs)
//!
//! Every call carries explicit [`SamplingParams`]; there is no ambient
//! default. Responses are plain text; [`parser`] turns them into structured
//! data and reports anything that is not JSON as a parse error.
//!
//! # Architecture
//!
//! ```text
//! realm-core ──► Generator ──┬── LlmClient ──► Ollama / OpenAI-compatible
//!                            └── ScriptedGenerator
//! ```

pub mod client;
pub mod error;
pub mod generator;
pub mod parser;
pub mod prompt;
pub mod scripted;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use generator::Generator;
pub use prompt::{PromptEngine, PromptId};
pub use scripted::{ScriptedGenerator, ScriptedReply};
pub use types::{LlmRequest, LlmResponse, SamplingParams};
