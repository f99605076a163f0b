//! Error types for the CDC differ.

use thiserror::Error;

/// Result type alias for differ operations.
pub type Result<T> = std::result::Result<T, CdcError>;

/// Loop-level and startup errors.
#[derive(Error, Debug)]
pub enum CdcError {
    /// Error from the underlying rdkafka library.
    #[error("Kafka error: {0}")]
    Transport(#[from] rdkafka::error::KafkaError),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A record could not be turned into an envelope.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The output sink rejected a message.
    #[error("Sink error: {0}")]
    Sink(String),

    /// Error serializing a change message.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdcError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        CdcError::Config(msg.into())
    }

    pub fn sink<S: Into<String>>(msg: S) -> Self {
        CdcError::Sink(msg.into())
    }
}

/// Per-record failure while reading a CDC envelope. Recoverable: the record
/// is logged and skipped.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("field '{path}' is invalid: {reason}")]
    InvalidField { path: &'static str, reason: String },
}
