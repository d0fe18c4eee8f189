//! Fire-and-forget side effects.
//!
//! Access-trail updates and owner notifications must never make the request
//! that triggered them fail. They run as independent tasks: at most once, no
//! retry, failures logged and dropped.

use crate::error::GatewayResult;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Runner for best-effort background side effects.
///
/// With a Tokio runtime handle, tasks go to the blocking pool (gateway calls
/// are blocking I/O) and the caller does not wait for them. Without one,
/// tasks run inline on the calling thread.
pub struct BackgroundTasks {
    handle: Option<Handle>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    /// Uses the current Tokio runtime if there is one, inline otherwise.
    pub fn from_current() -> Self {
        Self {
            handle: Handle::try_current().ok(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Spawns onto the given runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Runs every task inline.
    pub fn inline() -> Self {
        Self {
            handle: None,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Returns true if tasks run on the calling thread.
    pub fn is_inline(&self) -> bool {
        self.handle.is_none()
    }

    /// Runs `f` in the background. A failure is logged under `task`.
    pub fn spawn<F>(&self, task: &'static str, f: F)
    where
        F: FnOnce() -> GatewayResult<()> + Send + 'static,
    {
        let run = move || {
            if let Err(e) = f() {
                tracing::warn!(task, error = %e, "background task failed");
            }
        };

        match &self.handle {
            Some(handle) => {
                let join = handle.spawn_blocking(run);
                let mut pending = self.pending.lock();
                pending.retain(|h| !h.is_finished());
                pending.push(join);
            }
            None => run(),
        }
    }

    /// Number of spawned tasks not yet known to be finished.
    pub fn pending(&self) -> usize {
        self.pending.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Waits for every task spawned so far.
    pub async fn drain(&self) {
        let handles = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "background task panicked or was cancelled");
            }
        }
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::from_current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn inline_tasks_run_immediately() {
        let tasks = BackgroundTasks::inline();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        tasks.spawn("count", move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(tasks.is_inline());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.pending(), 0);
    }

    #[test]
    fn failures_are_swallowed() {
        let tasks = BackgroundTasks::inline();
        tasks.spawn("fail", || Err(GatewayError::backend("boom")));
    }

    #[test]
    fn no_runtime_means_inline() {
        assert!(BackgroundTasks::from_current().is_inline());
    }

    #[tokio::test]
    async fn runtime_tasks_complete_after_drain() {
        let tasks = BackgroundTasks::from_current();
        assert!(!tasks.is_inline());

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let c = Arc::clone(&counter);
            tasks.spawn("count", move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        tasks.spawn("fail", || Err(GatewayError::backend("boom")));

        tasks.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(tasks.pending(), 0);
    }
}
