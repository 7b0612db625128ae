//! Defensive parsing of language-model replies.
//!
//! Models are asked for strict JSON but regularly wrap it in prose or code
//! fences. Every call site goes through the same ordered list of strategies:
//! parse the whole reply, then parse the outermost `{...}` block found in it.
//! The first strategy that yields a usable value wins.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Outermost brace-delimited block, spanning newlines.
static OBJECT_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("object block regex"));

/// One way of turning reply text into a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// The trimmed reply is itself a JSON object.
    RawJson,
    /// The first `{` through the last `}` of the reply is a JSON object.
    EmbeddedObject,
}

/// Strategies in the order they are attempted.
pub const STRATEGIES: [ParseStrategy; 2] = [ParseStrategy::RawJson, ParseStrategy::EmbeddedObject];

impl ParseStrategy {
    /// Apply this strategy to `content`.
    pub fn apply(self, content: &str) -> Option<Map<String, Value>> {
        let candidate = match self {
            Self::RawJson => content.trim(),
            Self::EmbeddedObject => OBJECT_BLOCK_RE.find(content)?.as_str(),
        };
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

/// Parse the first JSON object any strategy can find in `content`.
pub fn parse_object(content: &str) -> Option<Map<String, Value>> {
    STRATEGIES.iter().find_map(|s| s.apply(content))
}

/// Extract a string field, trying each strategy until one yields it.
///
/// A strategy that parses but lacks the field (or holds a non-string) does
/// not stop the search.
pub fn extract_string_field(content: &str, field: &str) -> Option<String> {
    STRATEGIES.iter().find_map(|s| {
        s.apply(content)?
            .get(field)
            .and_then(Value::as_str)
            .map(|v| v.trim().to_string())
    })
}

/// Extract a string field, or fall back to the whole trimmed reply.
///
/// Used where a plain-prose answer is still acceptable.
pub fn extract_string_field_or_text(content: &str, field: &str) -> String {
    extract_string_field(content, field).unwrap_or_else(|| content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_json_wins() {
        let reply = r#" {"abstract": "We build boats."} "#;
        assert_eq!(
            extract_string_field(reply, "abstract").as_deref(),
            Some("We build boats.")
        );
    }

    #[test]
    fn embedded_block_in_code_fence() {
        let reply = "Sure! Here it is:\n```json\n{\n  \"abstract\": \"Roofing in Austin\"\n}\n```";
        assert_eq!(
            extract_string_field(reply, "abstract").as_deref(),
            Some("Roofing in Austin")
        );
    }

    #[test]
    fn missing_field_is_none() {
        assert_eq!(extract_string_field(r#"{"summary": "x"}"#, "abstract"), None);
        assert_eq!(extract_string_field(r#"{"abstract": 42}"#, "abstract"), None);
        assert_eq!(extract_string_field("no json here", "abstract"), None);
    }

    #[test]
    fn text_fallback_returns_prose() {
        let reply = "  Hey Sam, loved the new patio gallery.  ";
        assert_eq!(
            extract_string_field_or_text(reply, "icebreaker"),
            "Hey Sam, loved the new patio gallery."
        );
        assert_eq!(
            extract_string_field_or_text(r#"{"icebreaker":"Hi there"}"#, "icebreaker"),
            "Hi there"
        );
    }

    #[test]
    fn parse_object_for_tool_arguments() {
        let args = parse_object(r#"{"campaign_id":"c1","dry_run":false}"#).unwrap();
        assert_eq!(args["campaign_id"], "c1");
        assert_eq!(args["dry_run"], false);
        assert!(parse_object("[1,2,3]").is_none());
        assert!(parse_object("").is_none());
    }
}
