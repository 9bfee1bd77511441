//! Request-scoped tracking of background work
//!
//! Cache fills must not delay a response, but they must finish before the
//! request is torn down. [`ExecutionContext::wait_until`] spawns the work on
//! the runtime and keeps its handle; [`ExecutionContext::drain`] waits for
//! everything spawned so far, including work spawned while draining.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Tracks background work that must finish before shutdown
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` and track it until [`drain`](Self::drain)
    ///
    /// Must be called from within a tokio runtime.
    pub fn wait_until<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().spawn(future);
    }

    /// Number of tracked tasks that have not been collected yet
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Wait for every tracked task to finish
    pub async fn drain(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            debug!(count = tasks.len(), "Draining background tasks");
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Background task failed");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_until_does_not_block() {
        let ctx = ExecutionContext::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let done = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&done);
        ctx.wait_until(async move {
            let _ = rx.await;
            flag.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(ctx.pending(), 1);
        assert_eq!(done.load(Ordering::SeqCst), 0);

        tx.send(()).unwrap();
        ctx.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.pending(), 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_nested_tasks() {
        let ctx = ExecutionContext::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner_ctx = ctx.clone();
        let flag = Arc::clone(&done);
        ctx.wait_until(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let flag = Arc::clone(&flag);
            inner_ctx.wait_until(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                flag.fetch_add(1, Ordering::SeqCst);
            });
        });

        ctx.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drain_survives_panicking_task() {
        let ctx = ExecutionContext::new();
        ctx.wait_until(async { panic!("cache fill blew up") });
        ctx.drain().await;
        assert_eq!(ctx.pending(), 0);
    }
}
