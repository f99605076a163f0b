//! Publishes a few sample CDC envelopes so the differ has something to
//! consume.
//!
//! ```bash
//! CDC_BROKERS=localhost:9092 cargo run --example publish_envelopes -- customers.cdc
//! ```
//!
//! Start `cdc-differ customers.cdc` first: it only reads records produced
//! after it attached.

use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde_json::json;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let brokers = std::env::var("CDC_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
    let topic = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: publish_envelopes <topic>"))?;

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("message.timeout.ms", "5000")
        .create()?;

    let envelopes = [
        json!({"message": {
            "data": {"PK_Column": 1, "name": "Alice", "age": 30},
            "headers": {"changeSequence": "1", "operation": "INSERT", "timestamp": "2024-01-01T00:00:00"}
        }}),
        json!({"message": {
            "beforeData": {"PK_Column": 1, "name": "Alice", "age": 30},
            "data": {"PK_Column": 1, "name": "Alice", "age": 31},
            "headers": {"changeSequence": "2", "operation": "UPDATE", "timestamp": "2024-01-01T00:00:01"}
        }}),
        // Identical images: the differ emits nothing for this one.
        json!({"message": {
            "beforeData": {"PK_Column": 1, "name": "Alice", "age": 31},
            "data": {"PK_Column": 1, "name": "Alice", "age": 31},
            "headers": {"changeSequence": "3", "operation": "UPDATE", "timestamp": "2024-01-01T00:00:02"}
        }}),
    ];

    for envelope in &envelopes {
        let payload = serde_json::to_vec(envelope)?;
        let record = FutureRecord::to(&topic)
            .partition(0)
            .key("customers")
            .payload(&payload);
        match producer.send(record, Duration::from_secs(5)).await {
            Ok((partition, offset)) => {
                info!("Sent envelope (partition: {}, offset: {})", partition, offset)
            }
            Err((e, _)) => return Err(e.into()),
        }
    }

    info!("Published {} envelopes to '{}'", envelopes.len(), topic);
    Ok(())
}
