//! The generation-service seam consumed by the narrative core.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::SamplingParams;

/// An opaque text-completion service.
///
/// The core only ever asks for one completion of one prompt with explicit
/// sampling parameters. Transport failures come back as `Err`; whether the
/// returned text is usable is the caller's business.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete `prompt` with the given sampling parameters.
    async fn generate(&self, prompt: &str, sampling: &SamplingParams) -> Result<String, LlmError>;
}
