//! Test fixtures.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::time::Duration;

use crate::core::{JobSummary, RequestStatus, Timestamp};
use crate::sleeper::Sleeper;

/// A fixed reference instant: 2025-07-10T12:00:00Z.
#[must_use]
pub fn base_time() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// `base_time()` shifted by `minutes` (may be negative).
#[must_use]
pub fn at_minutes(minutes: i64) -> Timestamp {
    base_time() + ChronoDuration::minutes(minutes)
}

/// A succeeded listing row submitted `minutes` after `base_time()`.
#[must_use]
pub fn summary(id: &str, name: &str, minutes: i64) -> JobSummary {
    JobSummary::new(id, name, RequestStatus::Succeeded, Some(at_minutes(minutes)))
}

/// Records every wait and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with no recorded waits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested wait, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().clone()
    }

    /// Sum of all requested waits.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.calls.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().push(duration);
        tokio::task::yield_now().await;
    }
}
