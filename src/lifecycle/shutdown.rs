//! Shutdown coordination.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Background loops subscribe to the broadcast channel; in-flight
/// confirmation waits hold child tokens, so a trigger also stops them.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            token: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Token cancelled when shutdown triggers.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn trigger(&self) {
        self.token.cancel();
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Wait for `tasks` to finish, abandoning any still running after `deadline`.
    pub async fn drain(tasks: Vec<JoinHandle<()>>, deadline: Duration) {
        let count = tasks.len();
        let joined = async {
            for task in tasks {
                let _ = task.await;
            }
        };
        match tokio::time::timeout(deadline, joined).await {
            Ok(()) => tracing::info!(tasks = count, "Background tasks stopped"),
            Err(_) => tracing::warn!(
                tasks = count,
                deadline_secs = deadline.as_secs(),
                "Background tasks did not stop before the deadline"
            ),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
