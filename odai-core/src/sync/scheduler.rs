//! Cancellable delayed tasks.

use std::time::Duration;

use tokio::task::JoinHandle;

/// A callback scheduled to run once after a delay.
///
/// Dropping the handle cancels the callback if it has not run yet, so the
/// owner of a retry timer replaces it simply by overwriting the field that
/// holds it.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Schedules `f` to run after `delay` on the current Tokio runtime.
    pub fn after<F>(delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        Self { handle }
    }

    /// Cancels the callback if it has not run yet.
    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
