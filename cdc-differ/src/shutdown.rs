//! Process-wide stop flag shared between the control task and the
//! consumption loop.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cloneable stop signal. All clones observe the same state.
///
/// Starts in the running state and moves to stopped exactly once. Once
/// [`stop`](Self::stop) has returned, [`is_stopped`](Self::is_stopped)
/// returns `true` on every thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Calling it again has no further effect.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            info!("Requesting consumer shutdown");
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`stop`](Self::stop) has been called. Used to cut
    /// blocking waits short.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}
