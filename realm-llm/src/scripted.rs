//! Scripted generator: a deterministic, offline [`Generator`].
//!
//! Replies are keyed on substrings of the prompt, so concurrent callers get
//! the reply meant for them regardless of scheduling order. Each rule holds a
//! queue of replies; the last reply of a rule repeats forever once the queue
//! is down to one entry. Every call is recorded for later inspection.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::LlmError;
use crate::generator::Generator;
use crate::types::SamplingParams;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this text.
    Text(String),
    /// Fail with a transport error carrying this message.
    Transport(String),
    /// Sleep for this long, then fail with a timeout.
    Stall(Duration),
}

/// A recorded generator call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The prompt that was sent.
    pub prompt: String,
    /// The sampling parameters it was sent with.
    pub sampling: SamplingParams,
}

#[derive(Debug)]
struct Rule {
    needle: String,
    replies: VecDeque<ScriptedReply>,
}

#[derive(Debug, Default)]
struct ScriptState {
    rules: Vec<Rule>,
    fallback: Option<ScriptedReply>,
    calls: Vec<RecordedCall>,
}

/// Deterministic generator driven by prompt-substring rules.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    state: Mutex<ScriptState>,
}

impl ScriptedGenerator {
    /// Create an empty script. With no rules every call fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `text` to prompts containing `needle`.
    #[must_use]
    pub fn on(self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.push(needle.into(), ScriptedReply::Text(text.into()));
        self
    }

    /// Fail with a transport error for prompts containing `needle`.
    #[must_use]
    pub fn on_error(self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.push(needle.into(), ScriptedReply::Transport(message.into()));
        self
    }

    /// Stall for `delay` on prompts containing `needle`.
    #[must_use]
    pub fn on_stall(self, needle: impl Into<String>, delay: Duration) -> Self {
        self.push(needle.into(), ScriptedReply::Stall(delay));
        self
    }

    /// Reply with `text` when no rule matches.
    #[must_use]
    pub fn otherwise(self, text: impl Into<String>) -> Self {
        self.state.lock().fallback = Some(ScriptedReply::Text(text.into()));
        self
    }

    /// Append a reply for `needle`, creating the rule on first use.
    pub fn push(&self, needle: String, reply: ScriptedReply) {
        let mut state = self.state.lock();
        if let Some(rule) = state.rules.iter_mut().find(|r| r.needle == needle) {
            rule.replies.push_back(reply);
        } else {
            state.rules.push(Rule {
                needle,
                replies: VecDeque::from([reply]),
            });
        }
    }

    /// All calls made so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls whose prompt contained `needle`.
    #[must_use]
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.prompt.contains(needle))
            .count()
    }

    fn next_reply(&self, prompt: &str, sampling: &SamplingParams) -> Option<ScriptedReply> {
        let mut state = self.state.lock();
        state.calls.push(RecordedCall {
            prompt: prompt.to_string(),
            sampling: *sampling,
        });

        let matched = state
            .rules
            .iter_mut()
            .find(|r| prompt.contains(&r.needle))
            .and_then(|rule| {
                if rule.replies.len() > 1 {
                    rule.replies.pop_front()
                } else {
                    rule.replies.front().cloned()
                }
            });

        matched.or_else(|| state.fallback.clone())
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, sampling: &SamplingParams) -> Result<String, LlmError> {
        // The lock is released before any await point.
        let reply = self.next_reply(prompt, sampling);

        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Transport(message)) => Err(LlmError::RequestFailed(message)),
            Some(ScriptedReply::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Err(LlmError::Timeout(delay.as_millis() as u64))
            }
            None => {
                let head: String = prompt.chars().take(60).collect();
                Err(LlmError::ScriptExhausted(head))
            }
        }
    }
}
