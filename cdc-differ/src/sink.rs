//! Output sinks for change messages.

use crate::error::{CdcError, Result};
use async_trait::async_trait;
use cdc_messages::ChangeMessage;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Destination for change messages.
///
/// The consumption loop awaits `emit` before moving on to the next record,
/// so a sink sees messages in transport order.
#[async_trait]
pub trait ChangeSink: Send {
    async fn emit(&mut self, message: &ChangeMessage) -> Result<()>;

    /// Called once while the loop drains.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes each message as one line of compact JSON.
pub struct WriterSink<W> {
    writer: W,
}

/// Line-delimited JSON on standard output.
pub type StdoutSink = WriterSink<tokio::io::Stdout>;

impl StdoutSink {
    pub fn stdout() -> Self {
        WriterSink::new(tokio::io::stdout())
    }
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> ChangeSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&mut self, message: &ChangeMessage) -> Result<()> {
        let mut line = message.to_json_line()?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Collects messages in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<ChangeMessage>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn messages(&self) -> Vec<ChangeMessage> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChangeSink for MemorySink {
    async fn emit(&mut self, message: &ChangeMessage) -> Result<()> {
        let mut guard = self
            .messages
            .lock()
            .map_err(|_| CdcError::sink("memory sink lock poisoned"))?;
        guard.push(message.clone());
        Ok(())
    }
}
