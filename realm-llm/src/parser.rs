//! Structured-response parsing.
//!
//! Models frequently wrap JSON in a markdown fence even when asked not to.
//! Only a leading fence marker and a trailing one are stripped; anything else
//! that is not valid JSON is a parse error.

use serde::de::DeserializeOwned;

use crate::error::LlmError;

/// Strip an optional ```` ```json ```` / ```` ``` ```` opening marker and a
/// trailing ```` ``` ```` from `text`, trimming surrounding whitespace.
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }

    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }

    body.trim()
}

/// Parse `text` into a generic JSON value.
///
/// # Errors
///
/// Returns [`LlmError::ParseError`] if the fenced-stripped text is not JSON.
pub fn parse_json_value(text: &str) -> Result<serde_json::Value, LlmError> {
    parse_json(text)
}

/// Parse `text` into `T`.
///
/// # Errors
///
/// Returns [`LlmError::ParseError`] if the fenced-stripped text is not JSON or
/// does not match `T`.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let body = strip_code_fence(text);
    serde_json::from_str(body)
        .map_err(|e| LlmError::ParseError(format!("JSON parse error: {e}, raw text: '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Summary {
        summary: String,
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "  ```\n{\"a\": 1}```  ";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn leaves_plain_json_alone() {
        assert_eq!(strip_code_fence(" {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn parses_typed_response() {
        let parsed: Summary =
            parse_json("```json\n{\"summary\": \"They argued.\"}\n```").expect("valid json");
        assert_eq!(parsed.summary, "They argued.");
    }

    #[test]
    fn prose_is_a_parse_error() {
        let err = parse_json_value("Sure! Here is what Ron says...").expect_err("not json");
        assert!(matches!(err, LlmError::ParseError(_)));
        assert!(!err.is_transport());
    }

    #[test]
    fn fence_in_the_middle_is_not_stripped() {
        assert!(parse_json_value("Answer: ```{\"a\": 1}```").is_err());
    }
}
