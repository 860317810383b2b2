//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Every connection session holds a child of the root token, so one cancel
//! reaches the accept loop and every open `WebSocket` at once.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coordinates graceful shutdown across the accept loop and all sessions.
pub struct ShutdownCoordinator {
    root: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    /// A clone of the root token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Begin shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel everything and wait up to `grace` for the given tasks.
    ///
    /// Tasks still running after the grace period are left to the runtime;
    /// session state is in-memory only, so nothing needs flushing.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, grace: Duration) {
        self.shutdown();
        info!(
            task_count = tasks.len(),
            grace_secs = grace.as_secs(),
            "waiting for sessions to drain"
        );
        let all = futures::future::join_all(tasks);
        if tokio::time::timeout(grace, all).await.is_err() {
            warn!("shutdown grace period elapsed with tasks still running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn shutdown_is_sticky_and_idempotent() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn child_tokens_follow_the_root() {
        let coord = ShutdownCoordinator::new();
        let child = coord.token().child_token();
        assert!(!child.is_cancelled());
        coord.shutdown();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
            true
        });

        coord.shutdown();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn drain_waits_for_cooperative_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();

        let task = tokio::spawn(async move {
            token.cancelled().await;
        });

        coord.drain(vec![task], Duration::from_secs(1)).await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_gives_up_after_the_grace_period() {
        let coord = ShutdownCoordinator::new();

        // A task that ignores cancellation entirely.
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        coord.drain(vec![task], Duration::from_millis(50)).await;
        assert!(coord.is_shutting_down());
    }
}
