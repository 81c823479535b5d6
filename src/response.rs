//! Lenient parsing of structured model replies.
//!
//! Models asked for "ONLY a JSON object" still wrap it in code fences or
//! prose. Parsing falls through a fixed chain:
//!
//! 1. strict: the whole reply is a JSON object
//! 2. fenced: the body of a fenced code block is a JSON object
//! 3. extracted: the span from the first `{` to the last `}` is a JSON object
//!
//! and reports `ParseError` when none of them apply.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)```").expect("valid fence regex"));

static PAIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-?\d+)\s*[,;\s]\s*(-?\d+)").expect("valid pair regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no JSON object found in response: {0}")]
    NoJsonObject(String),
    #[error("response is JSON but not an object")]
    NotAnObject,
}

/// How a reply was recovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    Strict,
    Fenced,
    Extracted,
}

/// Parse a JSON object out of a model reply
pub fn parse_json_object(text: &str) -> Result<(Map<String, Value>, ParseStrategy), ParseError> {
    let trimmed = text.trim();

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => return Ok((map, ParseStrategy::Strict)),
        Ok(_) => return Err(ParseError::NotAnObject),
        Err(_) => {}
    }

    if let Some(body) = FENCE_RE.captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body.as_str().trim()) {
            return Ok((map, ParseStrategy::Fenced));
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok((map, ParseStrategy::Extracted));
            }
        }
    }

    Err(ParseError::NoJsonObject(snippet(trimmed)))
}

/// Read a boolean field, accepting `true`/`false` strings
pub fn lenient_bool(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Read a string field, trimming whitespace
pub fn lenient_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).map(str::trim)
}

/// Extract a pixel coordinate from a reply.
///
/// Accepts `{"x": 10, "y": 20}`, `{"coordinates": [10, 20]}`, a bare
/// `[10, 20]` or `10,20` text. Returns `None` for anything else, including
/// a JSON object that explicitly reports `"found": false`.
pub fn parse_coordinate(text: &str) -> Option<(i32, i32)> {
    if let Ok((map, _)) = parse_json_object(text) {
        if lenient_bool(&map, "found") == Some(false) {
            return None;
        }
        let x = map.get("x").and_then(number);
        let y = map.get("y").and_then(number);
        if let (Some(x), Some(y)) = (x, y) {
            return Some((x, y));
        }
        for key in ["coordinates", "point", "center"] {
            if let Some(Value::Array(items)) = map.get(key) {
                if let [x, y] = items.as_slice() {
                    return Some((number(x)?, number(y)?));
                }
            }
        }
        return None;
    }

    let caps = PAIR_RE.captures(text)?;
    let x = caps.get(1)?.as_str().parse().ok()?;
    let y = caps.get(2)?.as_str().parse().ok()?;
    Some((x, y))
}

fn number(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f.round() as i32),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i32),
        _ => None,
    }
}

/// Short single-line excerpt for error messages and logs
pub fn snippet(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 120 {
        format!("{}...", flat.chars().take(120).collect::<String>())
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_object() {
        let (map, strategy) = parse_json_object(r#" {"completed": true} "#).unwrap();
        assert_eq!(strategy, ParseStrategy::Strict);
        assert_eq!(lenient_bool(&map, "completed"), Some(true));
    }

    #[test]
    fn test_fenced_object() {
        let reply = "```json\n{\"completed\": false, \"next_expected_state\": \"sync\"}\n```";
        let (map, strategy) = parse_json_object(reply).unwrap();
        assert_eq!(strategy, ParseStrategy::Fenced);
        assert_eq!(lenient_str(&map, "next_expected_state"), Some("sync"));
    }

    #[test]
    fn test_object_inside_prose() {
        let reply = "Looking at the screen, I think: {\"completed\": true, \"pass\": \"true\"} hope that helps";
        let (map, strategy) = parse_json_object(reply).unwrap();
        assert_eq!(strategy, ParseStrategy::Extracted);
        assert_eq!(lenient_bool(&map, "pass"), Some(true));
    }

    #[test]
    fn test_unparseable_reply() {
        assert!(matches!(
            parse_json_object("The vault appears to be open."),
            Err(ParseError::NoJsonObject(_))
        ));
        assert!(matches!(parse_json_object("{ broken"), Err(ParseError::NoJsonObject(_))));
        assert_eq!(parse_json_object("[1, 2]"), Err(ParseError::NotAnObject));
    }

    #[test]
    fn test_coordinate_shapes() {
        assert_eq!(parse_coordinate(r#"{"x": 540, "y": 1200}"#), Some((540, 1200)));
        assert_eq!(parse_coordinate(r#"{"x": "540.4", "y": 1199.6}"#), Some((540, 1200)));
        assert_eq!(parse_coordinate(r#"{"coordinates": [10, 20]}"#), Some((10, 20)));
        assert_eq!(parse_coordinate("[10, 20]"), Some((10, 20)));
        assert_eq!(parse_coordinate("tap at 300,400"), Some((300, 400)));
    }

    #[test]
    fn test_coordinate_not_found() {
        assert_eq!(parse_coordinate(r#"{"found": false, "x": 0, "y": 0}"#), None);
        assert_eq!(parse_coordinate(r#"{"reason": "no such button"}"#), None);
        assert_eq!(parse_coordinate("I cannot see it"), None);
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "word ".repeat(100);
        assert!(snippet(&long).ends_with("..."));
        assert_eq!(snippet("a\n  b"), "a b");
    }
}
