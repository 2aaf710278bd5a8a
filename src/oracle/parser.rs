//! Oracle response normalization
//!
//! Turns untrusted completion text into a typed `OracleOutcome`:
//! 1. strip ``` fencing (```json or bare)
//! 2. parse the remainder as JSON
//! 3. failing that, parse the first balanced `{...}` object in the text
//!    that deserializes
//!
//! Nothing here panics or returns `Err`; every failure is a `ParseError`
//! that keeps the raw text for auditing.

use serde::de::DeserializeOwned;

/// Normalized result of one oracle call
#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome<T> {
    Parsed(T),
    ParseError { raw: String, reason: String },
    Unavailable { reason: String },
}

impl<T> OracleOutcome<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, OracleOutcome::Parsed(_))
    }

    /// The parsed value or the degraded default
    pub fn unwrap_or_else(self, fallback: impl FnOnce() -> T) -> T {
        match self {
            OracleOutcome::Parsed(value) => value,
            _ => fallback(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OracleOutcome::Parsed(_) => "parsed",
            OracleOutcome::ParseError { .. } => "parse_error",
            OracleOutcome::Unavailable { .. } => "unavailable",
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OracleOutcome<U> {
        match self {
            OracleOutcome::Parsed(value) => OracleOutcome::Parsed(f(value)),
            OracleOutcome::ParseError { raw, reason } => OracleOutcome::ParseError { raw, reason },
            OracleOutcome::Unavailable { reason } => OracleOutcome::Unavailable { reason },
        }
    }
}

/// Remove markdown code fences around a response
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let body = if let Some(start) = trimmed.find("```json") {
        &trimmed[start + "```json".len()..]
    } else if let Some(start) = trimmed.find("```") {
        &trimmed[start + 3..]
    } else {
        return trimmed;
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Candidate objects tried before giving up
const MAX_CANDIDATES: usize = 16;

/// Balanced object opening at byte `open`, ignoring braces inside strings
fn balanced_object_at(text: &str, open: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, &byte) in bytes[open..].iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match byte {
                b'\\' => escape_next = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..=open + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Balanced objects starting at each `{` in `text`, in order
pub fn json_object_candidates(text: &str) -> impl Iterator<Item = &str> {
    text.match_indices('{')
        .filter_map(move |(open, _)| balanced_object_at(text, open))
}

/// First balanced JSON object in `text`
pub fn find_json_object(text: &str) -> Option<&str> {
    json_object_candidates(text).next()
}

/// Parse oracle text into `T`
pub fn parse_response<T: DeserializeOwned>(raw: &str) -> OracleOutcome<T> {
    let body = strip_fences(raw);
    if body.is_empty() {
        return OracleOutcome::ParseError {
            raw: raw.to_string(),
            reason: "empty response".to_string(),
        };
    }

    let first_error = match serde_json::from_str::<T>(body) {
        Ok(value) => return OracleOutcome::Parsed(value),
        Err(e) => e.to_string(),
    };

    // prose around the object, or a fence the model forgot to close;
    // a brace in the prose can open a candidate that is not the answer
    for object in json_object_candidates(raw).take(MAX_CANDIDATES) {
        if let Ok(value) = serde_json::from_str::<T>(object) {
            return OracleOutcome::Parsed(value);
        }
    }

    OracleOutcome::ParseError {
        raw: raw.to_string(),
        reason: first_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Classification, RemediationPlan};

    #[test]
    fn test_strip_json_fence() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(strip_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_find_object_in_prose() {
        let text = r#"Analysis follows {"msg": "braces {inside} strings", "n": {"deep": 1}} trailing"#;
        assert_eq!(
            find_json_object(text),
            Some(r#"{"msg": "braces {inside} strings", "n": {"deep": 1}}"#)
        );
    }

    #[test]
    fn test_find_object_with_escaped_quotes() {
        let text = r#"{"msg": "Quote: \"}\""}"#;
        assert_eq!(find_json_object(text), Some(text));
    }

    #[test]
    fn test_find_object_none_when_unbalanced() {
        assert_eq!(find_json_object("{\"open\": 1"), None);
        assert_eq!(find_json_object("no json here"), None);
    }

    #[test]
    fn test_brace_in_quoted_prose_is_skipped() {
        let raw = r#"The log said "retry {later}". Answer: {"current_failures": [], "trigger_remediation": true}"#;
        assert_eq!(find_json_object(raw), Some("{later}"));
        match parse_response::<Classification>(raw) {
            OracleOutcome::Parsed(c) => {
                assert!(c.current_failures.is_empty());
                assert!(c.trigger_remediation);
            }
            other => panic!("expected parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_candidates_in_order() {
        let text = r#"a {x} b {"k": "}"} c"#;
        let found: Vec<&str> = json_object_candidates(text).collect();
        assert_eq!(found, vec!["{x}", r#"{"k": "}"}"#]);
    }

    #[test]
    fn test_parse_classification_fenced() {
        let raw = "```json\n{\"current_failures\": [], \"trigger_remediation\": false}\n```";
        let outcome: OracleOutcome<Classification> = parse_response(raw);
        assert!(outcome.is_parsed());
    }

    #[test]
    fn test_parse_with_leading_prose() {
        let raw = "Sure! {\"current_failures\": [{\"type\": \"CPU Saturation\", \"severity\": \"HIGH\"}], \"trigger_remediation\": true}";
        match parse_response::<Classification>(raw) {
            OracleOutcome::Parsed(c) => {
                assert_eq!(c.current_failures.len(), 1);
                assert!(c.trigger_remediation);
            }
            other => panic!("expected parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_keeps_raw() {
        let raw = "I think the database is unhappy.";
        match parse_response::<Classification>(raw) {
            OracleOutcome::ParseError { raw: kept, .. } => assert_eq!(kept, raw),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field_is_parse_error() {
        let outcome = parse_response::<RemediationPlan>("{\"prerequisites\": []}");
        assert_eq!(outcome.label(), "parse_error");
        let plan = outcome.unwrap_or_else(RemediationPlan::empty);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_empty_response() {
        assert_eq!(parse_response::<Classification>("   ").label(), "parse_error");
    }
}
