//! Detached background tasks.
//!
//! Revalidation fetches outlive the request that started them. They are
//! spawned here so the worker can tell how many are still in flight and
//! wait for them to drain.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Counter of in-flight background tasks.
#[derive(Debug, Clone)]
pub struct BackgroundTasks {
    pending: Arc<watch::Sender<usize>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            pending: Arc::new(tx),
        }
    }

    /// Spawn a tracked task. Dropping the returned handle detaches it.
    pub fn spawn<Fut>(&self, future: Fut) -> JoinHandle<Fut::Output>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        self.pending.send_modify(|n| *n += 1);
        let guard = PendingGuard(Arc::clone(&self.pending));
        tokio::spawn(async move {
            let _guard = guard;
            future.await
        })
    }

    /// Number of tasks still running.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until no tracked task is running.
    pub async fn settle(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the counter when the task finishes, panics included.
struct PendingGuard(Arc<watch::Sender<usize>>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}
