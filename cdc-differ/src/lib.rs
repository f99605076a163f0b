//! CDC before/after differ.
//!
//! Consumes change-data-capture envelopes from one Kafka partition, diffs the
//! `beforeData` and `data` row images of each record and emits a compact
//! [`ChangeMessage`] listing only the fields that changed.
//!
//! # Pipeline
//!
//! - [`EnvelopeParser`] pulls the images, correlation headers and primary key
//!   out of the raw payload
//! - [`diff`] computes a JSON Patch style list of operations
//! - [`build`] assembles the outgoing message, or nothing when the images
//!   are identical
//! - [`ConsumptionLoop`] polls the transport, runs each record through the
//!   above and hands results to a [`ChangeSink`] until the
//!   [`ShutdownSignal`] is stopped
//!
//! # Example
//!
//! ```
//! use cdc_differ::{transform, EnvelopeParser};
//!
//! let payload = br#"{"message": {
//!     "beforeData": {"name": "Alice", "age": 30},
//!     "data": {"name": "Alice", "age": 31},
//!     "headers": {"changeSequence": "1", "operation": "UPDATE", "timestamp": "T1"}
//! }}"#;
//!
//! let envelope = EnvelopeParser::default().parse(payload).unwrap();
//! let message = transform(&envelope, "customers").unwrap();
//!
//! assert_eq!(
//!     message.to_json_line().unwrap(),
//!     r#"{"correlation_id":"1","operation":"UPDATE","timestamp":"T1","source_table":"customers","source_pk":0,"changes":[{"op":"replace","path":"/age","value":31}]}"#
//! );
//! ```

mod builder;
pub mod config;
mod consumer;
mod diff;
mod envelope;
mod error;
mod producer;
mod shutdown;
mod sink;

pub use builder::{build, transform};
pub use config::AppConfig;
pub use consumer::{
    ConsumerConfig, ConsumptionLoop, KafkaSource, LoopState, LoopStats, Record, RecordSource,
    StartPosition,
};
pub use diff::diff;
pub use envelope::{ChangeHeaders, Envelope, EnvelopeParser, DEFAULT_PK_FIELD};
pub use error::{CdcError, ParseError, Result};
pub use producer::TopicSink;
pub use shutdown::ShutdownSignal;
pub use sink::{ChangeSink, MemorySink, StdoutSink, WriterSink};

/// Re-export the wire types for convenience
pub use cdc_messages::{ChangeMessage, OpKind, PatchOperation};
