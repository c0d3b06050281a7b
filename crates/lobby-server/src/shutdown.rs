//! Graceful shutdown of listeners, sessions, and timers.
//!
//! Every long-running task selects on a token handed out here. Per-connection
//! sessions take a child token so the lobby can tear one connection down
//! without touching the rest.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the server-wide cancellation token.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// A coordinator that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a listener or timer task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token for one connection: fires on shutdown, or on its own.
    pub fn session_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Fire the token. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether [`ShutdownCoordinator::shutdown`] was called.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the token, wait up to `timeout` for `handles`, and abort whatever
    /// is still running. Returns how many tasks were aborted.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> usize {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(tasks = handles.len(), timeout_ms = timeout.as_millis(), "stopping server tasks");

        let deadline = tokio::time::Instant::now() + timeout;
        let mut aborted = 0;
        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            warn!(aborted, "tasks ignored shutdown and were aborted");
        }
        aborted
    }
}
