use cdc_differ::{
    config, ConsumptionLoop, KafkaSource, LoopStats, ShutdownSignal, StdoutSink, TopicSink,
};
use clap::Parser;
use std::future::{pending, Future};
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Diffs CDC before/after images read from a Kafka topic and prints the
/// changed fields as JSON lines.
#[derive(Debug, Parser)]
#[command(name = "cdc-differ", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Topic carrying the CDC envelopes.
    topic: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging();

    let config = config::load_from_env()?;
    let signal = ShutdownSignal::new();

    let source = KafkaSource::new(&config.consumer, &cli.topic)?;
    let consumer: JoinHandle<cdc_differ::Result<LoopStats>> = match &config.output_topic {
        Some(topic) => {
            let sink = TopicSink::new(&config.consumer, topic)?;
            tokio::spawn(ConsumptionLoop::new(source, sink, &config.consumer).run(signal.clone()))
        }
        None => {
            let sink = StdoutSink::stdout();
            tokio::spawn(ConsumptionLoop::new(source, sink, &config.consumer).run(signal.clone()))
        }
    };

    tokio::spawn(stop_on_signal(signal.clone()));

    info!(topic = %cli.topic, "Waiting for changes");

    // The loop always drains before its task finishes.
    let stats = consumer.await??;
    info!(
        emitted = stats.emitted,
        skipped = stats.skipped,
        "Consumer shut down gracefully"
    );
    Ok(())
}

/// Logs go to stderr; stdout carries only change messages.
///
/// The level is controlled with `RUST_LOG` and defaults to `cdc_differ=info`.
fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cdc_differ=info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Stops `shutdown` on SIGTERM or SIGINT (Ctrl+C on other platforms).
///
/// Each handler is installed on its own, so failing to install one never
/// disables the other.
async fn stop_on_signal(shutdown: ShutdownSignal) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let sigterm = unix_signal(SignalKind::terminate())
            .map_err(|e| error!("Failed to install SIGTERM handler: {}", e))
            .ok()
            .map(|mut sigterm| async move {
                sigterm.recv().await;
            });
        let sigint = unix_signal(SignalKind::interrupt())
            .map_err(|e| error!("Failed to install SIGINT handler, falling back to Ctrl+C: {}", e))
            .ok()
            .map(|mut sigint| async move {
                sigint.recv().await;
            });

        tokio::select! {
            _ = listener_or(sigterm, pending()) => {
                info!("Received SIGTERM, initiating graceful shutdown")
            }
            _ = listener_or(sigint, ctrl_c()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown")
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }

    shutdown.stop();
}

/// Waits for `listener`, or for `fallback` when the listener could not be
/// installed.
async fn listener_or<L, F>(listener: Option<L>, fallback: F)
where
    L: Future<Output = ()>,
    F: Future<Output = ()>,
{
    match listener {
        Some(listener) => listener.await,
        None => fallback.await,
    }
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;
    use std::time::Duration;

    #[tokio::test]
    async fn missing_listener_does_not_block_the_other() {
        let fired = tokio::select! {
            _ = listener_or(None::<std::future::Ready<()>>, pending()) => "terminate",
            _ = listener_or(Some(ready(())), pending()) => "interrupt",
        };
        assert_eq!(fired, "interrupt");
    }

    #[tokio::test]
    async fn missing_listener_waits_on_fallback() {
        listener_or(None::<std::future::Ready<()>>, ready(())).await;

        let never = listener_or(None::<std::future::Ready<()>>, pending());
        assert!(tokio::time::timeout(Duration::from_millis(20), never)
            .await
            .is_err());
    }
}
