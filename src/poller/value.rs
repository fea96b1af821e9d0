//! Polled value types and payload parsing

use super::fetcher::FetchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text shown in the overlay before the first successful fetch
pub const PLACEHOLDER_TEXT: &str = "Waiting for data";

/// A single scalar reported by the data endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// Numeric payload, kept in its original JSON representation
    Number(serde_json::Number),
    /// Textual payload
    Text(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Number(n) => write!(f, "{n}"),
            ScalarValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for ScalarValue {
    fn from(value: u64) -> Self {
        ScalarValue::Number(value.into())
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

/// Latest published value plus its freshness marker.
///
/// `sequence` starts at 0 and grows by one on every successful fetch, so a
/// higher sequence is always fresher. Failed fetches leave the whole value
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolledValue {
    pub value: Option<ScalarValue>,
    pub sequence: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PolledValue {
    /// Text drawn in the overlay badge
    pub fn display_text(&self) -> String {
        match &self.value {
            Some(value) => value.to_string(),
            None => PLACEHOLDER_TEXT.to_string(),
        }
    }

    /// Whether this value was published after `other`
    pub fn is_fresher_than(&self, other: &PolledValue) -> bool {
        self.sequence > other.sequence
    }

    /// Successor of this value after a successful fetch
    pub(crate) fn advanced(&self, value: ScalarValue) -> Self {
        Self {
            value: Some(value),
            sequence: self.sequence + 1,
            updated_at: Some(Utc::now()),
        }
    }
}

/// Parse an endpoint body into a scalar.
///
/// Accepts a bare JSON number, a non-empty JSON string, or a single line of
/// plain text. Everything else is a malformed payload.
pub fn parse_scalar(body: &str) -> Result<ScalarValue, FetchError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(FetchError::Malformed("empty body".to_string()));
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Number(n)) => Ok(ScalarValue::Number(n)),
        Ok(serde_json::Value::String(s)) if !s.trim().is_empty() => {
            Ok(ScalarValue::Text(s.trim().to_string()))
        }
        Ok(other) => Err(FetchError::Malformed(format!(
            "expected a number or string, got {}",
            json_kind(&other)
        ))),
        Err(_) if !trimmed.contains('\n') => Ok(ScalarValue::Text(trimmed.to_string())),
        Err(_) => Err(FetchError::Malformed("multi-line text body".to_string())),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "an empty string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_keeps_representation() {
        let value = parse_scalar("850123\n").unwrap();
        assert_eq!(value.to_string(), "850123");
    }

    #[test]
    fn test_parse_float_and_strings() {
        assert_eq!(parse_scalar("21.5").unwrap().to_string(), "21.5");
        assert_eq!(
            parse_scalar("\"  hello \"").unwrap(),
            ScalarValue::Text("hello".to_string())
        );
        assert_eq!(
            parse_scalar("sunny").unwrap(),
            ScalarValue::Text("sunny".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for body in ["", "   ", "{\"height\": 1}", "[1,2]", "true", "null", "\"\"", "a\nb"] {
            assert!(
                matches!(parse_scalar(body), Err(FetchError::Malformed(_))),
                "body {body:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display_text_placeholder() {
        let initial = PolledValue::default();
        assert_eq!(initial.display_text(), PLACEHOLDER_TEXT);

        let next = initial.advanced(100.into());
        assert_eq!(next.display_text(), "100");
        assert_eq!(next.sequence, 1);
        assert!(next.updated_at.is_some());
        assert!(next.is_fresher_than(&initial));
    }
}
