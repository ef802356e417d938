use std::time::Duration;

use async_trait::async_trait;

use super::traits::IdleScheduler;

/// Fallback idle scheduler: treats "idle" as a fixed short delay.
///
/// Hosts with a real idle signal (frame scheduler, event-loop hook)
/// provide their own [`IdleScheduler`]; this one just keeps deferred
/// drains from running in the same instant they were enqueued.
pub struct DelayIdle {
    delay: Duration,
}

impl DelayIdle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl IdleScheduler for DelayIdle {
    async fn wait_idle(&self) {
        tokio::time::sleep(self.delay).await;
    }
}
