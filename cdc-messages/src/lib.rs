//! Wire types for CDC change messages.
//!
//! This crate holds the types that cross the boundary between the differ and
//! whoever reads its output: the [`ChangeMessage`] envelope, the JSON Patch
//! style [`PatchOperation`] it carries, and the helpers needed to replay a
//! patch against a document.
//!
//! # Example
//!
//! ```
//! use cdc_messages::{apply, PatchOperation};
//! use serde_json::json;
//!
//! let mut row = json!({"name": "Alice", "age": 30});
//! let changes = vec![PatchOperation::replace("/age", json!(31))];
//!
//! apply(&mut row, &changes).unwrap();
//! assert_eq!(row, json!({"name": "Alice", "age": 31}));
//! ```

mod message;
mod patch;
pub mod pointer;

pub use message::{ChangeMessage, OpKind, PatchOperation};
pub use patch::{apply, PatchError};
