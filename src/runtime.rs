//! Runtime helpers for async operations
//!
//! The scheduler and compositor only need three things from a runtime:
//! spawning detached work, sleeping between queue pops, and a wall clock for
//! cache timestamps. Keeping them here means the rest of the crate never names
//! tokio directly.

use crate::prelude::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Handle to a spawned async task
#[derive(Debug)]
pub struct TaskHandle(JoinHandle<()>);

impl TaskHandle {
    /// Check if the task is finished
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    /// Abort the task. Only used on shutdown; scheduler cancellation is
    /// generation based and never aborts a transfer.
    pub fn cancel(&self) {
        self.0.abort();
    }
}

/// Spawn a detached future on the ambient tokio runtime
pub fn spawn<F>(future: F) -> TaskHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    TaskHandle(tokio::spawn(future))
}

/// Async delay used for rate limiting
pub async fn async_delay(duration: Duration) {
    if duration.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(duration).await;
    }
}

/// Milliseconds since the Unix epoch, the unit stored in the tile-cache document.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawned_task_finishes() {
        let handle = spawn(async {
            async_delay(Duration::from_millis(5)).await;
        });

        assert!(!handle.is_finished());

        async_delay(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }

    #[test]
    fn test_unix_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(unix_millis() > 1_577_836_800_000);
    }
}
