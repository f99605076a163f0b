//! CDC envelope parsing.
//!
//! Incoming records carry a JSON document of the form:
//!
//! ```json
//! {
//!   "message": {
//!     "data":       { "PK_Column": 42, "name": "Alice", "age": 31 },
//!     "beforeData": { "PK_Column": 42, "name": "Alice", "age": 30 },
//!     "headers": {
//!       "changeSequence": "20240101000000000000000000001",
//!       "operation": "UPDATE",
//!       "timestamp": "2024-01-01T00:00:00.000"
//!     }
//!   }
//! }
//! ```

use crate::error::ParseError;
use serde_json::{Map, Value};

/// Primary-key column name used when none is configured.
pub const DEFAULT_PK_FIELD: &str = "PK_Column";

/// Correlation headers copied into every change message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeHeaders {
    pub change_sequence: String,
    pub operation: String,
    pub timestamp: String,
}

/// The parts of a CDC record the pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Row image before the change. `Null` for inserts.
    pub before: Value,
    /// Row image after the change.
    pub after: Value,
    pub headers: ChangeHeaders,
    /// Primary key read from the after-image, `0` when absent.
    pub source_pk: i64,
}

/// Extracts [`Envelope`]s from raw record payloads.
#[derive(Debug, Clone)]
pub struct EnvelopeParser {
    pk_field: String,
}

impl Default for EnvelopeParser {
    fn default() -> Self {
        Self::new(DEFAULT_PK_FIELD)
    }
}

impl EnvelopeParser {
    /// Creates a parser that reads the primary key from `pk_field`.
    pub fn new(pk_field: impl Into<String>) -> Self {
        Self {
            pk_field: pk_field.into(),
        }
    }

    /// Parses a raw payload.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the payload is not JSON, when `message`,
    /// `message.data` or `message.headers` is missing, or when one of the
    /// correlation headers is missing or not a scalar. A missing
    /// `beforeData` is accepted.
    pub fn parse(&self, payload: &[u8]) -> Result<Envelope, ParseError> {
        let root: Value = serde_json::from_slice(payload)?;

        let message = object_at(&root, "message", "message")?;
        let after = message
            .get("data")
            .cloned()
            .ok_or(ParseError::MissingField("message.data"))?;
        let before = message.get("beforeData").cloned().unwrap_or(Value::Null);

        let headers_value = message
            .get("headers")
            .ok_or(ParseError::MissingField("message.headers"))?;
        let headers = headers_value
            .as_object()
            .ok_or_else(|| ParseError::InvalidField {
                path: "message.headers",
                reason: "expected an object".to_string(),
            })?;

        let headers = ChangeHeaders {
            change_sequence: header_text(headers, "changeSequence", "message.headers.changeSequence")?,
            operation: header_text(headers, "operation", "message.headers.operation")?,
            timestamp: header_text(headers, "timestamp", "message.headers.timestamp")?,
        };

        let source_pk = after
            .get(self.pk_field.as_str())
            .map(coerce_pk)
            .unwrap_or(0);

        Ok(Envelope {
            before,
            after,
            headers,
            source_pk,
        })
    }
}

fn object_at<'a>(
    parent: &'a Value,
    key: &str,
    path: &'static str,
) -> Result<&'a Map<String, Value>, ParseError> {
    let value = parent.get(key).ok_or(ParseError::MissingField(path))?;
    value.as_object().ok_or_else(|| ParseError::InvalidField {
        path,
        reason: "expected an object".to_string(),
    })
}

/// Reads a header as text. Numbers and booleans are rendered; null and
/// containers are rejected.
fn header_text(
    headers: &Map<String, Value>,
    key: &str,
    path: &'static str,
) -> Result<String, ParseError> {
    match headers.get(key) {
        None | Some(Value::Null) => Err(ParseError::MissingField(path)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(ParseError::InvalidField {
            path,
            reason: "expected a scalar".to_string(),
        }),
    }
}

/// Lenient integer conversion for the primary-key column: floats are
/// truncated, numeric strings parsed, booleans map to 1/0, anything else is 0.
fn coerce_pk(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn update_record() -> Value {
        json!({
            "message": {
                "data": {"PK_Column": 42, "name": "Alice", "age": 31},
                "beforeData": {"PK_Column": 42, "name": "Alice", "age": 30},
                "headers": {
                    "changeSequence": "0001",
                    "operation": "UPDATE",
                    "timestamp": "2024-01-01T00:00:00"
                }
            }
        })
    }

    #[test]
    fn parses_update_record() {
        let envelope = EnvelopeParser::default()
            .parse(&payload(update_record()))
            .unwrap();

        assert_eq!(envelope.source_pk, 42);
        assert_eq!(envelope.headers.change_sequence, "0001");
        assert_eq!(envelope.headers.operation, "UPDATE");
        assert_eq!(envelope.headers.timestamp, "2024-01-01T00:00:00");
        assert_eq!(envelope.before["age"], json!(30));
        assert_eq!(envelope.after["age"], json!(31));
    }

    #[test]
    fn missing_before_image_is_tolerated() {
        let mut record = update_record();
        record["message"]
            .as_object_mut()
            .unwrap()
            .remove("beforeData");

        let envelope = EnvelopeParser::default().parse(&payload(record)).unwrap();
        assert_eq!(envelope.before, Value::Null);
    }

    #[test]
    fn missing_pk_defaults_to_zero() {
        let mut record = update_record();
        record["message"]["data"]
            .as_object_mut()
            .unwrap()
            .remove("PK_Column");

        let envelope = EnvelopeParser::default().parse(&payload(record)).unwrap();
        assert_eq!(envelope.source_pk, 0);
    }

    #[test]
    fn pk_field_is_configurable() {
        let envelope = EnvelopeParser::new("name")
            .parse(&payload(update_record()))
            .unwrap();
        // "Alice" is not numeric
        assert_eq!(envelope.source_pk, 0);

        let mut record = update_record();
        record["message"]["data"]["id"] = json!("17");
        let envelope = EnvelopeParser::new("id").parse(&payload(record)).unwrap();
        assert_eq!(envelope.source_pk, 17);
    }

    #[test]
    fn pk_coercion_is_lenient() {
        assert_eq!(coerce_pk(&json!(9.9)), 9);
        assert_eq!(coerce_pk(&json!(" 12 ")), 12);
        assert_eq!(coerce_pk(&json!("3.7")), 3);
        assert_eq!(coerce_pk(&json!(true)), 1);
        assert_eq!(coerce_pk(&json!(null)), 0);
        assert_eq!(coerce_pk(&json!({"nested": 1})), 0);
    }

    #[test]
    fn numeric_headers_are_read_as_text() {
        let mut record = update_record();
        record["message"]["headers"]["changeSequence"] = json!(12345);

        let envelope = EnvelopeParser::default().parse(&payload(record)).unwrap();
        assert_eq!(envelope.headers.change_sequence, "12345");
    }

    #[test]
    fn rejects_malformed_json() {
        let err = EnvelopeParser::default().parse(b"{not json").unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn rejects_missing_required_paths() {
        let parser = EnvelopeParser::default();

        let err = parser.parse(&payload(json!({"other": {}}))).unwrap_err();
        assert!(matches!(err, ParseError::MissingField("message")));

        let mut record = update_record();
        record["message"].as_object_mut().unwrap().remove("data");
        let err = parser.parse(&payload(record)).unwrap_err();
        assert!(matches!(err, ParseError::MissingField("message.data")));

        let mut record = update_record();
        record["message"].as_object_mut().unwrap().remove("headers");
        let err = parser.parse(&payload(record)).unwrap_err();
        assert!(matches!(err, ParseError::MissingField("message.headers")));
    }

    #[test]
    fn rejects_missing_or_null_headers() {
        let parser = EnvelopeParser::default();

        let mut record = update_record();
        record["message"]["headers"]
            .as_object_mut()
            .unwrap()
            .remove("operation");
        let err = parser.parse(&payload(record)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingField("message.headers.operation")
        ));

        let mut record = update_record();
        record["message"]["headers"]["timestamp"] = Value::Null;
        let err = parser.parse(&payload(record)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingField("message.headers.timestamp")
        ));

        let mut record = update_record();
        record["message"]["headers"]["changeSequence"] = json!([1]);
        let err = parser.parse(&payload(record)).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { .. }));
    }
}
