use std::time::Duration;
use tracing::debug;

/// Pauses the calling flow after every `every_n` requests.
///
/// Not shared between tasks: the crawl issues one request at a time and each
/// category owns a fresh limiter, so the counter is a plain integer.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    every_n: u32,
    pause: Duration,
    count: u32,
}

impl RateLimiter {
    pub fn new(every_n: u32, pause: Duration) -> Self {
        Self {
            every_n,
            pause,
            count: 0,
        }
    }

    /// Count one request. Sleeps for the configured pause when the count is a
    /// multiple of `every_n` and returns whether it did.
    pub async fn tick(&mut self) -> bool {
        self.count += 1;
        if self.every_n == 0 || self.count % self.every_n != 0 {
            return false;
        }

        debug!(count = self.count, pause_ms = self.pause.as_millis() as u64, "Pacing pause");
        tokio::time::sleep(self.pause).await;
        true
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}
