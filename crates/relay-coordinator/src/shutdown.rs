//! Graceful shutdown coordination.
//!
//! Supplemented beyond the distilled spec: every long-running task this
//! crate spawns (per-order drivers, the scheduler loop, chain watchers)
//! needs to drain in bounded time on SIGINT/SIGTERM rather than being
//! killed mid-transition. One `CancellationToken` fans out to all of them;
//! `wait_for_drain` bounds how long the process waits before giving up.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct Shutdown {
    token: CancellationToken,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    drain_timeout: Duration,
}

impl Shutdown {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            drain_timeout,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn track(&self, handle: tokio::task::JoinHandle<()>) {
        self.tasks.lock().await.push(handle);
    }

    /// Signal every tracked task and wait up to `drain_timeout` for them to
    /// finish. Tasks still running past the deadline are abandoned (their
    /// next persisted checkpoint is what a restart resumes from).
    pub async fn shutdown(&self) {
        self.token.cancel();
        let handles = std::mem::take(&mut *self.tasks.lock().await);
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.drain_timeout, drain).await.is_err() {
            warn!(timeout_secs = self.drain_timeout.as_secs(), "shutdown drain timed out, abandoning remaining tasks");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelling_trips_the_shared_token() {
        let shutdown = Shutdown::new(Duration::from_millis(50));
        let token = shutdown.token();
        assert!(!token.is_cancelled());
        shutdown.shutdown().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_tracked_tasks_to_finish() {
        let shutdown = Shutdown::new(Duration::from_secs(1));
        let token = shutdown.token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        shutdown.track(handle).await;
        shutdown.shutdown().await;
    }
}
