//! Graceful shutdown coordinator.
//!
//! A 4-step sequence: stop accepting, drain sessions, kill child
//! processes, cancel anything left over the drain budget.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::session::SessionManager;
use crate::transport::StdioClientTransport;

/// Coordinates an orderly shutdown across whichever pieces a running
/// server has: its session manager, any stdio child processes it owns,
/// and a cancellation token in-flight tool calls can observe.
pub struct ShutdownCoordinator {
    sessions: SessionManager,
    drain_budget: Duration,
    token: CancellationToken,
    child_transports: Mutex<Vec<Arc<StdioClientTransport>>>,
}

impl ShutdownCoordinator {
    /// Build a coordinator for the given session manager and drain
    /// budget (default 10s).
    #[must_use]
    pub fn new(sessions: SessionManager, drain_budget: Duration) -> Self {
        Self { sessions, drain_budget, token: CancellationToken::new(), child_transports: Mutex::new(Vec::new()) }
    }

    /// A token that every in-flight tool invocation should race against;
    /// cancelled once the drain budget is exhausted.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register a stdio child-process transport so it gets killed during
    /// shutdown.
    pub async fn track_child(&self, transport: Arc<StdioClientTransport>) {
        self.child_transports.lock().await.push(transport);
    }

    /// Wait for Ctrl-C (or, on unix, SIGTERM), then run the shutdown
    /// sequence. Intended to be raced against a server's accept loop via
    /// `tokio::select!` or `axum::serve(...).with_graceful_shutdown`.
    pub async fn wait_for_signal(&self) {
        wait_for_stop_signal().await;
        tracing::info!("shutdown signal received");
        self.run().await;
    }

    /// Execute the 4-step sequence directly, without waiting on a
    /// signal. Exposed for tests and for callers driving shutdown from
    /// their own trigger (e.g. an admin endpoint).
    pub async fn run(&self) {
        // Step 1 (stop accepting new connections) is the caller's
        // responsibility: they stop polling their listener/accept loop
        // once this coordinator's signal fires, which is why
        // `wait_for_signal` is meant to race the accept loop rather than
        // be awaited after it.

        // Step 2: drain sessions within budget.
        tracing::info!(budget_secs = self.drain_budget.as_secs(), "draining sessions");
        self.sessions.close_all(self.drain_budget).await;

        // Step 3: kill any stdio child processes.
        let children = self.child_transports.lock().await;
        for child in children.iter() {
            child.close().await;
        }
        drop(children);

        // Step 4: cancel anything still in flight beyond the budget.
        self.token.cancel();
        tracing::info!("shutdown sequence complete");
    }
}

#[cfg(unix)]
async fn wait_for_stop_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
