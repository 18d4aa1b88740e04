//! Server shutdown: stop intake, close every push connection, drain tasks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use taxdesk_core::close_code;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::ConnectionRegistry;

/// How long [`ShutdownCoordinator::drain`] waits when the caller has no
/// preference.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the server's shutdown sequence.
///
/// Background tasks (the listener and the event bridge) watch [`token`]
/// and are registered with [`track`]. [`begin`] cancels the token and closes
/// every live push connection with 1001 so clients reconnect elsewhere.
///
/// [`token`]: Self::token
/// [`track`]: Self::track
/// [`begin`]: Self::begin
pub struct ShutdownCoordinator {
    token: CancellationToken,
    registry: Arc<ConnectionRegistry>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// Coordinator that closes the connections held by `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Token cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register a background task to be awaited by [`drain`](Self::drain).
    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop intake and close every live push connection with 1001.
    ///
    /// Returns how many connections were asked to close; repeat calls return 0.
    pub fn begin(&self) -> usize {
        if self.token.is_cancelled() {
            return 0;
        }
        self.token.cancel();
        let closed = self.registry.close_all(close_code::GOING_AWAY);
        info!(closed, "closing push connections for shutdown");
        closed
    }

    /// [`begin`](Self::begin), then wait up to `timeout` for every tracked
    /// task. Returns `false` if the wait timed out.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let _ = self.begin();
        let handles = std::mem::take(&mut *self.tasks.lock());
        info!(task_count = handles.len(), timeout_secs = timeout.as_secs(), "waiting for server tasks");

        match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!(error = %e, "server task failed during shutdown");
                    }
                }
                true
            }
            Err(_) => {
                warn!(
                    remaining_connections = self.registry.connection_count(),
                    "shutdown timed out after {timeout:?}"
                );
                false
            }
        }
    }
}
