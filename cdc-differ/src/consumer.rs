//! Kafka consumption loop feeding records through the diff pipeline.

use crate::builder;
use crate::envelope::{EnvelopeParser, DEFAULT_PK_FIELD};
use crate::error::{CdcError, Result};
use crate::shutdown::ShutdownSignal;
use crate::sink::ChangeSink;
use async_trait::async_trait;
use rdkafka::consumer::{Consumer as RdConsumer, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// How many payload bytes to include when logging a rejected record.
const PAYLOAD_LOG_LIMIT: usize = 256;

/// Where the read cursor is placed when the partition is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Only records produced from now on.
    #[default]
    End,
    /// Replay everything the broker still retains.
    Beginning,
}

impl StartPosition {
    fn offset(self) -> Offset {
        match self {
            StartPosition::End => Offset::End,
            StartPosition::Beginning => Offset::Beginning,
        }
    }
}

impl FromStr for StartPosition {
    type Err = CdcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "end" | "latest" => Ok(StartPosition::End),
            "beginning" | "earliest" => Ok(StartPosition::Beginning),
            other => Err(CdcError::config(format!(
                "unknown start position '{}', expected 'end' or 'beginning'",
                other
            ))),
        }
    }
}

/// Configuration for the consumer and the pipeline it drives.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Comma-separated list of Kafka brokers.
    pub brokers: String,

    /// Consumer group ID. Offsets are never committed.
    pub group_id: String,

    /// The single partition to read.
    pub partition: i32,

    pub start_position: StartPosition,

    /// Upper bound on how long one poll waits for records.
    pub poll_timeout: Duration,

    /// Pause after each batch.
    pub idle_sleep: Duration,

    /// Maximum number of records handed to the pipeline per poll.
    pub max_batch_size: usize,

    /// Name of the primary-key column inside the after-image.
    pub pk_field: String,

    /// Extra librdkafka properties, applied after the defaults.
    pub client_properties: Vec<(String, String)>,
}

impl ConsumerConfig {
    /// Creates a new consumer configuration.
    ///
    /// # Arguments
    ///
    /// * `brokers` - Comma-separated list of Kafka brokers
    /// * `group_id` - Consumer group ID
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            partition: 0,
            start_position: StartPosition::End,
            poll_timeout: Duration::from_millis(100),
            idle_sleep: Duration::from_millis(10),
            max_batch_size: 500,
            pk_field: DEFAULT_PK_FIELD.to_string(),
            client_properties: Vec::new(),
        }
    }

    /// Sets the partition to read.
    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }

    /// Sets where reading starts once the partition is assigned.
    pub fn with_start_position(mut self, position: StartPosition) -> Self {
        self.start_position = position;
        self
    }

    /// Sets how long one poll waits for records.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the pause after each batch.
    pub fn with_idle_sleep(mut self, duration: Duration) -> Self {
        self.idle_sleep = duration;
        self
    }

    /// Sets the maximum number of records per batch.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Sets the primary-key column name.
    pub fn with_pk_field(mut self, field: impl Into<String>) -> Self {
        self.pk_field = field.into();
        self
    }

    /// Adds a raw librdkafka property (e.g. `security.protocol`).
    pub fn with_client_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.client_properties.push((key.into(), value.into()));
        self
    }

    /// Builds the rdkafka client configuration.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false");
        for (key, value) in &self.client_properties {
            client_config.set(key, value);
        }
        client_config
    }
}

/// A record as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Source table identifier.
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub partition: i32,
    pub offset: i64,
}

impl Record {
    pub fn new(key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            key: Some(key.into()),
            payload: Some(payload.into()),
            partition: 0,
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    fn from_message(message: &BorrowedMessage<'_>) -> Self {
        Self {
            key: message
                .key()
                .map(|key| String::from_utf8_lossy(key).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec),
            partition: message.partition(),
            offset: message.offset(),
        }
    }
}

/// The transport the loop reads from.
#[async_trait]
pub trait RecordSource: Send {
    /// Attaches to the configured partition.
    fn subscribe(&mut self) -> Result<()>;

    /// Waits up to `timeout` for records. An empty batch is not an error.
    ///
    /// Records already read are never dropped for an error; the error is
    /// returned by the following call instead.
    async fn poll_batch(&mut self, timeout: Duration) -> Result<Vec<Record>>;

    /// Releases the connection.
    fn close(&mut self) -> Result<()>;
}

/// Reads a single partition of a Kafka topic.
pub struct KafkaSource {
    inner: StreamConsumer,
    topic: String,
    partition: i32,
    start_position: StartPosition,
    max_batch_size: usize,
    /// Receive error hit while draining, reported by the next poll.
    deferred: Option<KafkaError>,
}

impl KafkaSource {
    /// Creates the underlying consumer. No broker traffic happens until
    /// [`subscribe`](RecordSource::subscribe).
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot be created.
    pub fn new(config: &ConsumerConfig, topic: impl Into<String>) -> Result<Self> {
        info!(
            "Creating Kafka consumer with brokers: {}, group: {}",
            config.brokers, config.group_id
        );

        let consumer: StreamConsumer = config.client_config().create()?;

        Ok(Self {
            inner: consumer,
            topic: topic.into(),
            partition: config.partition,
            start_position: config.start_position,
            max_batch_size: config.max_batch_size.max(1),
            deferred: None,
        })
    }
}

#[async_trait]
impl RecordSource for KafkaSource {
    fn subscribe(&mut self) -> Result<()> {
        info!(
            topic = %self.topic,
            partition = self.partition,
            start = ?self.start_position,
            "Assigning partition"
        );

        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(&self.topic, self.partition, self.start_position.offset())?;
        self.inner.assign(&assignment)?;
        Ok(())
    }

    async fn poll_batch(&mut self, timeout: Duration) -> Result<Vec<Record>> {
        if let Some(err) = self.deferred.take() {
            return Err(err.into());
        }

        let mut batch = Vec::new();
        match tokio::time::timeout(timeout, self.inner.recv()).await {
            Ok(message) => batch.push(Record::from_message(&message?)),
            Err(_) => return Ok(batch),
        }

        // Drain whatever is already buffered without waiting again.
        let inner = &self.inner;
        self.deferred = drain_buffered(&mut batch, self.max_batch_size, move || async move {
            match tokio::time::timeout(Duration::ZERO, inner.recv()).await {
                Ok(message) => Some(message.map(|m| Record::from_message(&m))),
                Err(_) => None,
            }
        })
        .await;

        Ok(batch)
    }

    fn close(&mut self) -> Result<()> {
        info!(topic = %self.topic, "Releasing partition assignment");
        self.inner.unassign()?;
        Ok(())
    }
}

/// Appends records from `next` to `batch` until `next` yields `None` or
/// `limit` is reached.
///
/// A receive error stops the drain and is returned instead of discarding the
/// records already in `batch`.
async fn drain_buffered<F, Fut>(batch: &mut Vec<Record>, limit: usize, mut next: F) -> Option<KafkaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<KafkaResult<Record>>>,
{
    while batch.len() < limit {
        match next().await {
            Some(Ok(record)) => batch.push(record),
            Some(Err(err)) => {
                warn!(
                    buffered = batch.len(),
                    "Receive failed while draining, deferring error: {}", err
                );
                return Some(err);
            }
            None => break,
        }
    }
    None
}

/// Lifecycle of a [`ConsumptionLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Subscribing,
    Polling,
    ProcessingBatch,
    Draining,
    Closed,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Counters reported when the loop closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub batches: u64,
    pub records: u64,
    /// Change messages handed to the sink.
    pub emitted: u64,
    /// Records dropped because they could not be parsed.
    pub skipped: u64,
}

/// Drives `source` through the pipeline and into `sink`.
pub struct ConsumptionLoop<S, K> {
    source: S,
    sink: K,
    parser: EnvelopeParser,
    poll_timeout: Duration,
    idle_sleep: Duration,
    state: LoopState,
    stats: LoopStats,
}

impl<S, K> ConsumptionLoop<S, K>
where
    S: RecordSource,
    K: ChangeSink,
{
    pub fn new(source: S, sink: K, config: &ConsumerConfig) -> Self {
        Self {
            source,
            sink,
            parser: EnvelopeParser::new(config.pk_field.clone()),
            poll_timeout: config.poll_timeout,
            idle_sleep: config.idle_sleep,
            state: LoopState::Subscribing,
            stats: LoopStats::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs until `signal` is stopped or the transport fails.
    ///
    /// The source is always closed and the sink flushed before returning.
    /// A stop request that arrives while the loop is waiting on the
    /// transport or sleeping between batches takes effect immediately.
    ///
    /// # Errors
    ///
    /// Returns the transport or sink error that terminated the loop.
    pub async fn run(mut self, signal: ShutdownSignal) -> Result<LoopStats> {
        info!("Starting consumer loop");
        self.transition(LoopState::Subscribing);

        let outcome = match self.source.subscribe() {
            Ok(()) => self.consume(&signal).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            error!("Consumer loop terminated: {}", e);
        }

        self.transition(LoopState::Draining);
        let drained = self.drain().await;
        self.transition(LoopState::Closed);

        info!(
            batches = self.stats.batches,
            records = self.stats.records,
            emitted = self.stats.emitted,
            skipped = self.stats.skipped,
            "Consumer stopped"
        );

        outcome?;
        drained?;
        Ok(self.stats)
    }

    async fn consume(&mut self, signal: &ShutdownSignal) -> Result<()> {
        loop {
            self.transition(LoopState::Polling);

            let batch = tokio::select! {
                biased;
                _ = signal.stopped() => {
                    info!("Poll interrupted by shutdown");
                    return Ok(());
                }
                polled = self.source.poll_batch(self.poll_timeout) => polled?,
            };

            if !batch.is_empty() {
                self.transition(LoopState::ProcessingBatch);
                self.process_batch(batch).await?;
            }

            tokio::select! {
                biased;
                _ = signal.stopped() => {}
                _ = sleep(self.idle_sleep) => {}
            }

            if signal.is_stopped() {
                info!("Shutdown signal received, stopping consumer");
                return Ok(());
            }
        }
    }

    /// Records are handled strictly in the order the transport returned them.
    async fn process_batch(&mut self, batch: Vec<Record>) -> Result<()> {
        self.stats.batches += 1;
        debug!(size = batch.len(), "Processing batch");

        for record in batch {
            self.stats.records += 1;
            self.process_record(record).await?;
        }
        Ok(())
    }

    async fn process_record(&mut self, record: Record) -> Result<()> {
        let source_table = record.key.as_deref().unwrap_or_default();

        let Some(payload) = record.payload.as_deref() else {
            warn!(
                key = source_table,
                partition = record.partition,
                offset = record.offset,
                "Received record with no payload"
            );
            self.stats.skipped += 1;
            return Ok(());
        };

        let envelope = match self.parser.parse(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(
                    key = source_table,
                    partition = record.partition,
                    offset = record.offset,
                    payload = %payload_fragment(payload),
                    "Skipping malformed record: {}",
                    e
                );
                self.stats.skipped += 1;
                return Ok(());
            }
        };

        match builder::transform(&envelope, source_table) {
            Some(message) => {
                debug!(
                    key = source_table,
                    correlation_id = %message.correlation_id,
                    changes = message.changes.len(),
                    "Emitting change message"
                );
                self.sink.emit(&message).await?;
                self.stats.emitted += 1;
            }
            None => debug!(
                key = source_table,
                offset = record.offset,
                "Before and after images are identical"
            ),
        }
        Ok(())
    }

    async fn drain(&mut self) -> Result<()> {
        let flushed = self.sink.flush().await;
        let closed = self.source.close();
        flushed?;
        closed
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Consumer state change");
            self.state = next;
        }
    }
}

fn payload_fragment(payload: &[u8]) -> String {
    let end = payload.len().min(PAYLOAD_LOG_LIMIT);
    let mut fragment = String::from_utf8_lossy(&payload[..end]).into_owned();
    if payload.len() > end {
        fragment.push_str("...");
    }
    fragment
}
