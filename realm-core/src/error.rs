//! Error types for the rolerealm core library.

use realm_llm::LlmError;
use thiserror::Error;

/// Top-level error type for all rolerealm core operations.
#[derive(Error, Debug)]
pub enum RealmError {
    /// The generation service failed (transport, timeout, unavailable).
    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),

    /// The model returned text that is not structured data at all.
    #[error("Malformed response from {character}: {reason}")]
    MalformedResponse {
        /// Character whose decision failed.
        character: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The response parsed but breaks the speak / act / silent field rules.
    #[error("Decision contract violated by {character}: {reason}")]
    ContractViolation {
        /// Character whose decision failed.
        character: String,
        /// Which rule was broken.
        reason: String,
    },

    /// A decision did not arrive before the round's deadline.
    #[error("Decision for {character} timed out after {timeout_ms}ms")]
    Timeout {
        /// Character whose decision timed out.
        character: String,
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// No character with this name is in the scene.
    #[error("Unknown character: {0}")]
    UnknownCharacter(String),

    /// A character with this name is already in the scene.
    #[error("Character already present: {0}")]
    DuplicateCharacter(String),

    /// Loading a persona or story definition failed.
    #[error("Loader error: {0}")]
    Loader(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RealmError {
    /// Whether this error is a per-decision contract problem (as opposed to
    /// a transport failure).
    #[must_use]
    pub fn is_contract_error(&self) -> bool {
        matches!(
            self,
            RealmError::MalformedResponse { .. } | RealmError::ContractViolation { .. }
        )
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, RealmError>;
