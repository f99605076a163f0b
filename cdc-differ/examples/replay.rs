//! Runs the diff pipeline over CDC envelopes read from stdin, no broker
//! required.
//!
//! Each input line is either a bare JSON envelope or `<table>\t<envelope>`.
//! Change messages are printed to stdout, one per line.
//!
//! ```bash
//! echo '{"message":{"beforeData":{"age":30},"data":{"age":31},"headers":{"changeSequence":"1","operation":"UPDATE","timestamp":"T1"}}}' \
//!   | cargo run --example replay -- customers
//! ```

use async_trait::async_trait;
use cdc_differ::{ConsumerConfig, ConsumptionLoop, Record, RecordSource, ShutdownSignal, StdoutSink};
use std::io::BufRead;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Hands every stdin line over as one batch, then asks the loop to stop.
struct StdinSource {
    records: Option<Vec<Record>>,
    signal: ShutdownSignal,
}

#[async_trait]
impl RecordSource for StdinSource {
    fn subscribe(&mut self) -> cdc_differ::Result<()> {
        Ok(())
    }

    async fn poll_batch(&mut self, _timeout: Duration) -> cdc_differ::Result<Vec<Record>> {
        match self.records.take() {
            Some(records) => Ok(records),
            None => {
                self.signal.stop();
                Ok(Vec::new())
            }
        }
    }

    fn close(&mut self) -> cdc_differ::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let default_table = std::env::args().nth(1).unwrap_or_else(|| "replay".to_string());

    let mut records = Vec::new();
    for (offset, line) in std::io::stdin().lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (table, payload) = match line.split_once('\t') {
            Some((table, payload)) => (table.to_string(), payload.to_string()),
            None => (default_table.clone(), line),
        };
        records.push(Record::new(table, payload).with_offset(offset as i64));
    }
    info!("Replaying {} records", records.len());

    let signal = ShutdownSignal::new();
    let source = StdinSource {
        records: Some(records),
        signal: signal.clone(),
    };
    let config = ConsumerConfig::new("unused", "replay").with_idle_sleep(Duration::ZERO);

    let stats = ConsumptionLoop::new(source, StdoutSink::stdout(), &config)
        .run(signal)
        .await?;
    info!(
        "Emitted {} change messages, skipped {} records",
        stats.emitted, stats.skipped
    );
    Ok(())
}
