//! Assembly of outgoing change messages.

use crate::diff::diff;
use crate::envelope::Envelope;
use cdc_messages::{ChangeMessage, PatchOperation};

/// Combines an envelope's correlation headers with a patch.
///
/// Returns `None` when `patch` is empty so that records whose images are
/// identical produce no output. `source_table` is the record key, not a
/// field of the payload.
pub fn build(
    envelope: &Envelope,
    source_table: &str,
    patch: Vec<PatchOperation>,
) -> Option<ChangeMessage> {
    if patch.is_empty() {
        return None;
    }

    Some(ChangeMessage {
        correlation_id: envelope.headers.change_sequence.clone(),
        operation: envelope.headers.operation.clone(),
        timestamp: envelope.headers.timestamp.clone(),
        source_table: source_table.to_string(),
        source_pk: envelope.source_pk,
        changes: patch,
    })
}

/// Diffs the envelope's images and builds the resulting message.
pub fn transform(envelope: &Envelope, source_table: &str) -> Option<ChangeMessage> {
    build(envelope, source_table, diff(&envelope.before, &envelope.after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ChangeHeaders, EnvelopeParser};
    use serde_json::{json, Value};

    fn envelope(before: Value, after: Value, source_pk: i64) -> Envelope {
        Envelope {
            before,
            after,
            headers: ChangeHeaders {
                change_sequence: "7".to_string(),
                operation: "UPDATE".to_string(),
                timestamp: "T7".to_string(),
            },
            source_pk,
        }
    }

    #[test]
    fn empty_patch_builds_nothing() {
        let env = envelope(json!({"a": 1}), json!({"a": 1}), 3);
        assert!(build(&env, "customers", Vec::new()).is_none());
        assert!(transform(&env, "customers").is_none());
    }

    #[test]
    fn copies_headers_key_and_patch() {
        let env = envelope(json!({"a": 1}), json!({"a": 2}), 3);
        let patch = vec![PatchOperation::replace("/a", json!(2))];

        let msg = build(&env, "orders", patch.clone()).unwrap();
        assert_eq!(msg.correlation_id, "7");
        assert_eq!(msg.operation, "UPDATE");
        assert_eq!(msg.timestamp, "T7");
        assert_eq!(msg.source_table, "orders");
        assert_eq!(msg.source_pk, 3);
        assert_eq!(msg.changes, patch);
    }

    #[test]
    fn insert_without_pk_column_matches_expected_output() {
        let raw = json!({
            "message": {
                "data": {"id": 7, "name": "Bob"},
                "beforeData": {},
                "headers": {"changeSequence": "1", "operation": "INSERT", "timestamp": "T1"}
            }
        });
        let env = EnvelopeParser::default()
            .parse(&serde_json::to_vec(&raw).unwrap())
            .unwrap();

        let msg = transform(&env, "customers").unwrap();
        assert_eq!(
            msg.to_json_line().unwrap(),
            r#"{"correlation_id":"1","operation":"INSERT","timestamp":"T1","source_table":"customers","source_pk":0,"changes":[{"op":"add","path":"/id","value":7},{"op":"add","path":"/name","value":"Bob"}]}"#
        );
    }
}
