//! Core types for generation requests and responses.

use serde::{Deserialize, Serialize};

/// Sampling parameters threaded into every generation call.
///
/// Each character carries its own set, which is what gives characters a
/// distinguishable voice under one shared model. There is deliberately no
/// `Default` impl: every caller states the parameters it generates with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature (0.0 = deterministic, higher = more creative).
    pub temperature: f32,
    /// Nucleus sampling cutoff (0.0 to 1.0).
    pub top_p: f32,
    /// Penalty applied to already-frequent tokens (-2.0 to 2.0).
    pub frequency_penalty: f32,
}

impl SamplingParams {
    /// Create sampling parameters, clamping each value to its valid range.
    #[must_use]
    pub fn new(temperature: f32, top_p: f32, frequency_penalty: f32) -> Self {
        Self {
            temperature: temperature.clamp(0.0, 2.0),
            top_p: top_p.clamp(0.0, 1.0),
            frequency_penalty: frequency_penalty.clamp(-2.0, 2.0),
        }
    }
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// The complete prompt text.
    pub prompt: String,
    /// Sampling parameters for this call.
    pub sampling: SamplingParams,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// Create a new request with the given prompt and sampling parameters.
    #[must_use]
    pub fn new(prompt: impl Into<String>, sampling: SamplingParams) -> Self {
        Self {
            prompt: prompt.into(),
            sampling,
            max_tokens: 400,
            timeout_ms: 30_000,
        }
    }

    /// Set the maximum number of generated tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A response from the LLM.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model was used.
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_params_are_clamped() {
        let params = SamplingParams::new(5.0, 1.5, -3.0);
        assert!((params.temperature - 2.0).abs() < f32::EPSILON);
        assert!((params.top_p - 1.0).abs() < f32::EPSILON);
        assert!((params.frequency_penalty + 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn request_builder_overrides() {
        let req = LlmRequest::new("hi", SamplingParams::new(0.7, 0.9, 0.0))
            .with_max_tokens(50)
            .with_timeout(1_000);
        assert_eq!(req.max_tokens, 50);
        assert_eq!(req.timeout_ms, 1_000);
        assert_eq!(req.prompt, "hi");
    }
}
