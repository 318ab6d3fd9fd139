//! Shutdown coordination for the gateway.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time;

/// Coordinator for graceful shutdown.
///
/// Background tasks are spawned through the coordinator so they can be
/// joined on drain. Each task gets its own subscription to the shutdown
/// broadcast.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    tasks: Mutex<JoinSet<()>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Spawn a background task that stops when shutdown fires.
    pub fn spawn<F, Fut>(&self, name: &'static str, task: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = task(self.subscribe());
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.spawn(async move {
            fut.await;
            tracing::debug!(task = name, "Background task stopped");
        });
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still registered.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Trigger shutdown and wait up to `grace` for every task to stop.
    /// Tasks still running after the grace period are aborted.
    pub async fn drain(&self, grace: Duration) {
        self.trigger();
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };

        let joined = time::timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Background task failed");
                }
            }
        })
        .await;

        if joined.is_err() {
            tracing::warn!(
                remaining = tasks.len(),
                "Grace period elapsed, aborting background tasks"
            );
            tasks.shutdown().await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_joins_cooperative_tasks() {
        let shutdown = Shutdown::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&stopped);
        shutdown.spawn("worker", move |mut rx| async move {
            let _ = rx.recv().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(shutdown.task_count(), 1);

        shutdown.drain(Duration::from_secs(1)).await;

        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(shutdown.task_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_aborts_stuck_tasks() {
        let shutdown = Shutdown::new();
        shutdown.spawn("stuck", |_rx| std::future::pending::<()>());

        let started = std::time::Instant::now();
        shutdown.drain(Duration::from_millis(50)).await;

        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
