//! Change message and patch operation definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a patch operation, serialized in lowercase (`"add"`, `"remove"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

/// A single operation of a structural patch.
///
/// `path` (and `from`, for `move`/`copy`) are JSON Pointers rooted at the
/// after-image of the row, not at the surrounding CDC envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: OpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl PatchOperation {
    /// Adds `value` at `path`.
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpKind::Add,
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    /// Removal carries no value.
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: OpKind::Remove,
            path: path.into(),
            value: None,
            from: None,
        }
    }

    /// Replaces the value at `path`.
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpKind::Replace,
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    /// Moves the value at `from` to `path`.
    pub fn move_from(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            op: OpKind::Move,
            path: path.into(),
            value: None,
            from: Some(from.into()),
        }
    }

    /// Copies the value at `from` to `path`.
    pub fn copy_from(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            op: OpKind::Copy,
            path: path.into(),
            value: None,
            from: Some(from.into()),
        }
    }

    /// Asserts that the value at `path` equals `value`.
    pub fn test(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpKind::Test,
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }
}

/// Compact change notification emitted for every CDC record whose
/// before and after images differ.
///
/// Field order matches the serialized output:
///
/// ```json
/// {"correlation_id":"1","operation":"UPDATE","timestamp":"T1",
///  "source_table":"customers","source_pk":42,
///  "changes":[{"op":"replace","path":"/age","value":31}]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMessage {
    /// The CDC change sequence of the originating event.
    pub correlation_id: String,
    pub operation: String,
    pub timestamp: String,
    /// Record key of the source event, i.e. the table identifier.
    pub source_table: String,
    /// Primary key of the row, or `0` when the row carried none.
    pub source_pk: i64,
    /// Never empty.
    pub changes: Vec<PatchOperation>,
}

impl ChangeMessage {
    /// Serializes the message as a single line of compact JSON.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remove_serializes_without_value() {
        let op = PatchOperation::remove("/name");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json, json!({"op": "remove", "path": "/name"}));
    }

    #[test]
    fn move_serializes_from() {
        let op = PatchOperation::move_from("/a", "/b");
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"op":"move","path":"/b","from":"/a"}"#);
    }

    #[test]
    fn change_message_keeps_field_order() {
        let msg = ChangeMessage {
            correlation_id: "1".to_string(),
            operation: "INSERT".to_string(),
            timestamp: "T1".to_string(),
            source_table: "customers".to_string(),
            source_pk: 0,
            changes: vec![PatchOperation::add("/id", json!(7))],
        };

        assert_eq!(
            msg.to_json_line().unwrap(),
            r#"{"correlation_id":"1","operation":"INSERT","timestamp":"T1","source_table":"customers","source_pk":0,"changes":[{"op":"add","path":"/id","value":7}]}"#
        );
    }

    #[test]
    fn op_kind_parses_lowercase() {
        let op: PatchOperation =
            serde_json::from_str(r#"{"op":"test","path":"/x","value":true}"#).unwrap();
        assert_eq!(op.op, OpKind::Test);
        assert_eq!(op.value, Some(json!(true)));
    }
}
