//! Replaying patch operations against a document.

use crate::message::PatchOperation;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while applying a patch.
#[derive(Error, Debug)]
pub enum PatchError {
    /// An operation lacks a member its kind requires, e.g. `add` without `value`.
    #[error("malformed patch: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("patch rejected: {0}")]
    Rejected(#[from] json_patch::PatchError),
}

/// Applies `ops` to `doc` in order.
///
/// The patch is applied atomically: if any operation fails, `doc` is left
/// untouched.
pub fn apply(doc: &mut Value, ops: &[PatchOperation]) -> Result<(), PatchError> {
    let patch: json_patch::Patch = serde_json::from_value(serde_json::to_value(ops)?)?;
    json_patch::patch(doc, &patch)?;
    Ok(())
}
