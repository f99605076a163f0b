//! Environment-based configuration.
//!
//! All settings are read from `CDC_`-prefixed environment variables, after an
//! optional `.env` file in the working directory has been loaded:
//!
//! - `CDC_BROKERS`: Kafka bootstrap servers (required)
//! - `CDC_GROUP_ID`: consumer group id (default: "cdc-differ")
//! - `CDC_PARTITION`: the partition to read (default: "0")
//! - `CDC_START_FROM`: "end" or "beginning" (default: "end")
//! - `CDC_POLL_TIMEOUT_MS`: poll wait in milliseconds (default: "100")
//! - `CDC_IDLE_SLEEP_MS`: pause after each batch in milliseconds (default: "10")
//! - `CDC_MAX_BATCH_SIZE`: records per batch (default: "500")
//! - `CDC_PK_FIELD`: primary-key column in the after-image (default: "PK_Column")
//! - `CDC_OUTPUT_TOPIC`: publish change messages to this topic instead of stdout
//! - `CDC_CLIENT_PROPERTIES`: extra librdkafka properties as
//!   `key=value` pairs separated by commas,
//!   e.g. `security.protocol=SSL,ssl.ca.location=/etc/ca.pem`

use crate::consumer::{ConsumerConfig, StartPosition};
use crate::envelope::DEFAULT_PK_FIELD;
use crate::error::{CdcError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const ENV_PREFIX: &str = "CDC_";

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub consumer: ConsumerConfig,
    /// When set, change messages go to this Kafka topic.
    pub output_topic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    brokers: String,
    #[serde(default = "default_group_id")]
    group_id: String,
    #[serde(default)]
    partition: i32,
    #[serde(default = "default_start_from")]
    start_from: String,
    #[serde(default = "default_poll_timeout_ms")]
    poll_timeout_ms: u64,
    #[serde(default = "default_idle_sleep_ms")]
    idle_sleep_ms: u64,
    #[serde(default = "default_max_batch_size")]
    max_batch_size: usize,
    #[serde(default = "default_pk_field")]
    pk_field: String,
    output_topic: Option<String>,
    client_properties: Option<String>,
}

fn default_group_id() -> String {
    "cdc-differ".to_string()
}

fn default_start_from() -> String {
    "end".to_string()
}

fn default_poll_timeout_ms() -> u64 {
    100
}

fn default_idle_sleep_ms() -> u64 {
    10
}

fn default_max_batch_size() -> usize {
    500
}

fn default_pk_field() -> String {
    DEFAULT_PK_FIELD.to_string()
}

/// Loads `.env` (if present) and reads the configuration from the process
/// environment.
///
/// # Errors
///
/// Returns [`CdcError::Config`] if a required variable is missing or any
/// value is invalid.
pub fn load_from_env() -> Result<AppConfig> {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => return Err(CdcError::config(format!("failed to read .env: {}", e))),
    }

    let raw = envy::prefixed(ENV_PREFIX)
        .from_env::<RawSettings>()
        .map_err(|e| CdcError::config(format!("{} ({}* variables)", e, ENV_PREFIX)))?;
    let config = build(raw)?;

    info!(
        brokers = %config.consumer.brokers,
        group_id = %config.consumer.group_id,
        partition = config.consumer.partition,
        output_topic = ?config.output_topic,
        "Configuration loaded"
    );
    Ok(config)
}

/// Reads the configuration from an explicit set of variables.
pub fn load_from_iter<I>(vars: I) -> Result<AppConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let raw = envy::prefixed(ENV_PREFIX)
        .from_iter::<_, RawSettings>(vars)
        .map_err(|e| CdcError::config(format!("{} ({}* variables)", e, ENV_PREFIX)))?;
    build(raw)
}

fn build(raw: RawSettings) -> Result<AppConfig> {
    if raw.brokers.trim().is_empty() {
        return Err(CdcError::config("CDC_BROKERS must not be empty"));
    }
    if raw.partition < 0 {
        return Err(CdcError::config(format!(
            "CDC_PARTITION must be non-negative, got {}",
            raw.partition
        )));
    }
    if raw.poll_timeout_ms == 0 {
        return Err(CdcError::config("CDC_POLL_TIMEOUT_MS must be greater than zero"));
    }
    if raw.max_batch_size == 0 {
        return Err(CdcError::config("CDC_MAX_BATCH_SIZE must be greater than zero"));
    }
    if raw.pk_field.is_empty() {
        return Err(CdcError::config("CDC_PK_FIELD must not be empty"));
    }

    let start_position: StartPosition = raw.start_from.parse()?;

    let mut consumer = ConsumerConfig::new(raw.brokers, raw.group_id)
        .with_partition(raw.partition)
        .with_start_position(start_position)
        .with_poll_timeout(Duration::from_millis(raw.poll_timeout_ms))
        .with_idle_sleep(Duration::from_millis(raw.idle_sleep_ms))
        .with_max_batch_size(raw.max_batch_size)
        .with_pk_field(raw.pk_field);

    if let Some(properties) = raw.client_properties.as_deref() {
        for (key, value) in parse_client_properties(properties)? {
            consumer = consumer.with_client_property(key, value);
        }
    }

    let output_topic = raw.output_topic.filter(|topic| !topic.trim().is_empty());

    Ok(AppConfig {
        consumer,
        output_topic,
    })
}

fn parse_client_properties(input: &str) -> Result<Vec<(String, String)>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(CdcError::config(format!(
                "invalid client property '{}', expected key=value",
                pair
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn applies_defaults() {
        let config = load_from_iter(vars(&[("CDC_BROKERS", "kafka:9092")])).unwrap();

        assert_eq!(config.consumer.brokers, "kafka:9092");
        assert_eq!(config.consumer.group_id, "cdc-differ");
        assert_eq!(config.consumer.partition, 0);
        assert_eq!(config.consumer.start_position, StartPosition::End);
        assert_eq!(config.consumer.poll_timeout, Duration::from_millis(100));
        assert_eq!(config.consumer.idle_sleep, Duration::from_millis(10));
        assert_eq!(config.consumer.max_batch_size, 500);
        assert_eq!(config.consumer.pk_field, "PK_Column");
        assert!(config.consumer.client_properties.is_empty());
        assert!(config.output_topic.is_none());
    }

    #[test]
    fn reads_every_setting() {
        let config = load_from_iter(vars(&[
            ("CDC_BROKERS", "a:9092,b:9092"),
            ("CDC_GROUP_ID", "g1"),
            ("CDC_PARTITION", "3"),
            ("CDC_START_FROM", "beginning"),
            ("CDC_POLL_TIMEOUT_MS", "250"),
            ("CDC_IDLE_SLEEP_MS", "0"),
            ("CDC_MAX_BATCH_SIZE", "10"),
            ("CDC_PK_FIELD", "id"),
            ("CDC_OUTPUT_TOPIC", "changes"),
            (
                "CDC_CLIENT_PROPERTIES",
                "security.protocol=SSL, ssl.ca.location=/etc/ca.pem",
            ),
        ]))
        .unwrap();

        assert_eq!(config.consumer.group_id, "g1");
        assert_eq!(config.consumer.partition, 3);
        assert_eq!(config.consumer.start_position, StartPosition::Beginning);
        assert_eq!(config.consumer.poll_timeout, Duration::from_millis(250));
        assert_eq!(config.consumer.idle_sleep, Duration::ZERO);
        assert_eq!(config.consumer.max_batch_size, 10);
        assert_eq!(config.consumer.pk_field, "id");
        assert_eq!(config.output_topic.as_deref(), Some("changes"));
        assert_eq!(
            config.consumer.client_properties,
            vec![
                ("security.protocol".to_string(), "SSL".to_string()),
                ("ssl.ca.location".to_string(), "/etc/ca.pem".to_string()),
            ]
        );
    }

    #[test]
    fn missing_brokers_is_a_config_error() {
        let err = load_from_iter(vars(&[("CDC_GROUP_ID", "g1")])).unwrap_err();
        assert!(matches!(err, CdcError::Config(_)));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let cases = [
            vec![("CDC_BROKERS", "k:9092"), ("CDC_PARTITION", "x")],
            vec![("CDC_BROKERS", "k:9092"), ("CDC_PARTITION", "-1")],
            vec![("CDC_BROKERS", "k:9092"), ("CDC_POLL_TIMEOUT_MS", "0")],
            vec![("CDC_BROKERS", "k:9092"), ("CDC_MAX_BATCH_SIZE", "0")],
            vec![("CDC_BROKERS", "k:9092"), ("CDC_START_FROM", "sideways")],
            vec![("CDC_BROKERS", "k:9092"), ("CDC_CLIENT_PROPERTIES", "novalue")],
            vec![("CDC_BROKERS", " ")],
        ];

        for case in cases {
            let err = load_from_iter(vars(&case)).unwrap_err();
            assert!(matches!(err, CdcError::Config(_)), "{:?}", case);
        }
    }

    #[test]
    fn blank_output_topic_means_stdout() {
        let config = load_from_iter(vars(&[
            ("CDC_BROKERS", "k:9092"),
            ("CDC_OUTPUT_TOPIC", ""),
        ]))
        .unwrap();
        assert!(config.output_topic.is_none());
    }
}
