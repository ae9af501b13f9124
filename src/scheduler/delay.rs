use std::time::Duration;

use tokio::time::Instant;

/// One-shot deferred callbacks on the tokio runtime. There is no cancel
/// handle; a pending callback is lost if the process exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayScheduler;

impl DelayScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Runs `on_fire` once, no earlier than `delay` from now. Returns the
    /// instant it is due.
    #[cfg(test)]
    pub fn schedule<F>(&self, delay: Duration, on_fire: F) -> Instant
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_at(Instant::now() + delay, on_fire)
    }

    pub fn schedule_at<F>(&self, due: Instant, on_fire: F) -> Instant
    where
        F: FnOnce() + Send + 'static,
    {
        tokio::spawn(async move {
            tokio::time::sleep_until(due).await;
            on_fire();
        });
        due
    }
}
