//! Kafka-backed change sink.

use crate::consumer::ConsumerConfig;
use crate::error::Result;
use crate::sink::ChangeSink;
use async_trait::async_trait;
use cdc_messages::ChangeMessage;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as RdProducer};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, error, info};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes change messages to a Kafka topic.
///
/// Each message is serialized to JSON and keyed by its `source_table`, so
/// all changes of one table land on the same partition in order.
pub struct TopicSink {
    inner: FutureProducer,
    topic: String,
}

impl TopicSink {
    /// Creates a producer against the same brokers (and extra client
    /// properties) the consumer uses.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer cannot be created.
    pub fn new(config: &ConsumerConfig, topic: impl Into<String>) -> Result<Self> {
        let topic = topic.into();
        info!(
            "Creating Kafka producer with brokers: {}, topic: {}",
            config.brokers, topic
        );

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000");
        for (key, value) in &config.client_properties {
            client_config.set(key, value);
        }

        Self::from_config(client_config, topic)
    }

    /// Creates a sink from a pre-built client configuration.
    pub fn from_config(config: ClientConfig, topic: impl Into<String>) -> Result<Self> {
        let producer: FutureProducer = config.create()?;
        Ok(Self {
            inner: producer,
            topic: topic.into(),
        })
    }
}

#[async_trait]
impl ChangeSink for TopicSink {
    async fn emit(&mut self, message: &ChangeMessage) -> Result<()> {
        let payload = message.to_json_line()?;

        debug!(
            "Sending change message to topic '{}' with key '{}' ({} bytes)",
            self.topic,
            message.source_table,
            payload.len()
        );

        let record = FutureRecord::to(&self.topic)
            .payload(&payload)
            .key(&message.source_table);

        match self.inner.send(record, SEND_TIMEOUT).await {
            Ok((partition, offset)) => {
                debug!(
                    "Change message {} delivered (partition: {}, offset: {})",
                    message.correlation_id, partition, offset
                );
                Ok(())
            }
            Err((kafka_err, _msg)) => {
                error!(
                    "Failed to send change message {} to topic '{}': {}",
                    message.correlation_id, self.topic, kafka_err
                );
                Err(kafka_err.into())
            }
        }
    }

    async fn flush(&mut self) -> Result<()> {
        RdProducer::flush(&self.inner, FLUSH_TIMEOUT)?;
        Ok(())
    }
}
