//! Conversation summaries.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use realm_llm::{parser, Generator, PromptEngine, PromptId, SamplingParams};

use crate::error::Result;
use crate::timeline::TimelineEvent;

/// Returned when there is nothing to summarize.
pub const EMPTY_SUMMARY: &str = "No conversation to summarize.";

/// Optional framing for a summary.
#[derive(Debug, Clone, Default)]
pub struct SummaryContext {
    /// Conversation title.
    pub title: Option<String>,
    /// Scene description.
    pub scene_description: Option<String>,
    /// Where it happened.
    pub location: Option<String>,
}

impl SummaryContext {
    fn render(&self) -> String {
        [
            self.title.as_ref().map(|t| format!("Title: {t}")),
            self.scene_description.as_ref().map(|s| format!("Scene: {s}")),
            self.location.as_ref().map(|l| format!("Location: {l}")),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct SummaryReply {
    #[serde(default)]
    summary: Option<String>,
}

/// Produces 2-4 sentence summaries of timeline spans.
pub struct ConversationSummarizer {
    generator: Arc<dyn Generator>,
    prompts: Arc<PromptEngine>,
    sampling: SamplingParams,
}

impl std::fmt::Debug for ConversationSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSummarizer")
            .field("sampling", &self.sampling)
            .finish_non_exhaustive()
    }
}

impl ConversationSummarizer {
    /// Create a summarizer.
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>, prompts: Arc<PromptEngine>, sampling: SamplingParams) -> Self {
        Self {
            generator,
            prompts,
            sampling,
        }
    }

    /// Summarize `events`.
    ///
    /// # Errors
    /// Generation and parse failures are returned; there is no fallback summary.
    pub async fn summarize(&self, events: &[Arc<TimelineEvent>], context: &SummaryContext) -> Result<String> {
        if events.is_empty() {
            return Ok(EMPTY_SUMMARY.to_string());
        }

        let conversation = events
            .iter()
            .map(|e| e.kind.summary_line())
            .collect::<Vec<_>>()
            .join("\n");
        let context = context.render();
        let prompt = self.prompts.render(
            PromptId::ConversationSummary,
            &[("context", context.as_str()), ("conversation", conversation.as_str())],
        );

        let text = self.generator.generate(&prompt, &self.sampling).await?;
        let reply: SummaryReply = parser::parse_json(&text)?;
        debug!(events = events.len(), "Conversation summarized");
        Ok(reply
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Unable to generate summary.".to_string()))
    }
}
