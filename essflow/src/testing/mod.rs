//! Testing utilities for orchestration code.
//!
//! This module provides:
//! - A scripted in-memory [`JobService`](crate::client::JobService)
//! - A sleeper that records waits instead of sleeping
//! - Fixture builders for listings and timestamps

mod fixtures;
mod service;

pub use fixtures::{at_minutes, base_time, summary, RecordingSleeper};
pub use service::ScriptedJobService;
