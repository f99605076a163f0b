//! Structural diff between the before and after images of a row.

use cdc_messages::{pointer, PatchOperation};
use serde_json::{Map, Value};

/// Computes the patch that turns `before` into `after`.
///
/// Operations are relative to the root of the documents and are meant to be
/// applied in order against `before`. A `null` image on either side is
/// treated as an empty object, so inserts produce a list of `add`s and
/// deletes a list of `remove`s.
///
/// Arrays are compared index by index. No move detection is attempted.
pub fn diff(before: &Value, after: &Value) -> Vec<PatchOperation> {
    let empty = Value::Object(Map::new());
    let before = if before.is_null() { &empty } else { before };
    let after = if after.is_null() { &empty } else { after };

    let mut ops = Vec::new();
    diff_values(before, after, "", &mut ops);
    ops
}

fn diff_values(before: &Value, after: &Value, path: &str, ops: &mut Vec<PatchOperation>) {
    // Map equality ignores key order.
    if before == after {
        return;
    }

    match (before, after) {
        (Value::Object(b), Value::Object(a)) => diff_objects(b, a, path, ops),
        (Value::Array(b), Value::Array(a)) => diff_arrays(b, a, path, ops),
        _ => ops.push(PatchOperation::replace(path, after.clone())),
    }
}

fn diff_objects(
    before: &Map<String, Value>,
    after: &Map<String, Value>,
    path: &str,
    ops: &mut Vec<PatchOperation>,
) {
    for (key, old) in before {
        let child = pointer::push(path, key);
        match after.get(key) {
            Some(new) => diff_values(old, new, &child, ops),
            None => ops.push(PatchOperation::remove(child)),
        }
    }

    for (key, new) in after {
        if !before.contains_key(key) {
            ops.push(PatchOperation::add(pointer::push(path, key), new.clone()));
        }
    }
}

fn diff_arrays(before: &[Value], after: &[Value], path: &str, ops: &mut Vec<PatchOperation>) {
    let common = before.len().min(after.len());

    for (idx, (old, new)) in before.iter().zip(after).enumerate() {
        diff_values(old, new, &pointer::push_index(path, idx), ops);
    }

    // Trailing removals go highest index first so each one is still valid
    // when the patch is replayed in order.
    for idx in (common..before.len()).rev() {
        ops.push(PatchOperation::remove(pointer::push_index(path, idx)));
    }

    for (idx, new) in after.iter().enumerate().skip(common) {
        ops.push(PatchOperation::add(pointer::push_index(path, idx), new.clone()));
    }
}
