//! Suspension points.
//!
//! The poll interval and the resolver backoff are the only waits in an
//! orchestration run; both go through [`Sleeper`].

use async_trait::async_trait;
use std::time::Duration;

/// Waits for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspends the current run for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_advances_clock() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
