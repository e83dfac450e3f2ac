//! Orchestration policy: polling, child resolution, artifacts, import parameters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ConfigError;
use crate::resolver::BackoffPolicy;

/// Polling budget applied to every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Give up after this many milliseconds of accumulated waiting.
    #[serde(default = "default_poll_timeout_ms")]
    pub timeout_ms: u64,
    /// Wait between status queries, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

fn default_poll_timeout_ms() -> u64 {
    30 * 60 * 1_000
}

fn default_poll_interval_ms() -> u64 {
    30 * 1_000
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_poll_timeout_ms(),
            interval_ms: default_poll_interval_ms(),
        }
    }
}

impl PollConfig {
    /// Creates a poll configuration with millisecond precision.
    #[must_use]
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout_ms: duration_ms(timeout),
            interval_ms: duration_ms(interval),
        }
    }

    /// Total polling budget.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Wait between queries.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Rejects a zero interval, which would poll the scheduler in a tight loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "interval_ms".to_string(),
                message: "poll interval must be at least 1 ms".to_string(),
            });
        }
        Ok(())
    }
}

/// Child job resolution policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Passes over the full strategy list.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Wait before the first pass; pass `n` waits `n` times this.
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: u64,
    /// Only jobs submitted within this window after the parent count as
    /// time-proximity matches.
    #[serde(default = "default_proximity_window")]
    pub proximity_window_seconds: u64,
    /// Lowercase terms that mark a job name as report-like.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Path or name of the expected report; its file stem scores an extra point.
    #[serde(default = "default_target_report")]
    pub target_report_identifier: String,
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay() -> u64 {
    30
}

fn default_proximity_window() -> u64 {
    60 * 60
}

fn default_keywords() -> Vec<String> {
    ["autoinvoice", "child", "report", "execution", "generate"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn default_target_report() -> String {
    "/Custom/Receivables/Reports/AUTOINVOICE_CHILD_ESS_JOB_REPORT.xdo".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_seconds: default_base_delay(),
            proximity_window_seconds: default_proximity_window(),
            keywords: default_keywords(),
            target_report_identifier: default_target_report(),
        }
    }
}

impl ResolverConfig {
    /// Creates a resolver configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_seconds(mut self, seconds: u64) -> Self {
        self.base_delay_seconds = seconds;
        self
    }

    /// Sets the report identifier matched against job names.
    #[must_use]
    pub fn with_target_report(mut self, identifier: impl Into<String>) -> Self {
        self.target_report_identifier = identifier.into();
        self
    }

    /// Replaces the keyword set.
    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Time-proximity window.
    #[must_use]
    pub fn proximity_window(&self) -> Duration {
        Duration::from_secs(self.proximity_window_seconds)
    }

    /// Wait schedule for the outer retry loop.
    ///
    /// Fails when `max_attempts` or `base_delay_seconds` is zero.
    pub fn backoff_policy(&self) -> Result<BackoffPolicy, ConfigError> {
        BackoffPolicy::linear(
            self.max_attempts,
            Duration::from_secs(self.base_delay_seconds),
        )
    }
}

/// Artifact retrieval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Fetch the parent's own output when no child artifact is found.
    #[serde(default = "default_parent_fallback")]
    pub parent_fallback: bool,
}

fn default_parent_fallback() -> bool {
    true
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            parent_fallback: default_parent_fallback(),
        }
    }
}

/// Business parameters of the import stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportParameters {
    /// Business unit the transactions belong to.
    #[serde(default = "default_business_unit")]
    pub business_unit: String,
    /// Transaction batch source.
    #[serde(default = "default_batch_source")]
    pub batch_source: String,
    /// Accounting date; today's date when unset.
    #[serde(default)]
    pub accounting_date: Option<NaiveDate>,
    /// Interface loader details id of the target interface table.
    #[serde(default = "default_interface_details_id")]
    pub interface_details_id: String,
}

fn default_business_unit() -> String {
    "300000003170678".to_string()
}

fn default_batch_source() -> String {
    "MILGARD EBS SPREADSHEET".to_string()
}

fn default_interface_details_id() -> String {
    "2".to_string()
}

impl Default for ImportParameters {
    fn default() -> Self {
        Self {
            business_unit: default_business_unit(),
            batch_source: default_batch_source(),
            accounting_date: None,
            interface_details_id: default_interface_details_id(),
        }
    }
}

impl ImportParameters {
    /// Sets the business unit.
    #[must_use]
    pub fn with_business_unit(mut self, business_unit: impl Into<String>) -> Self {
        self.business_unit = business_unit.into();
        self
    }

    /// Sets the batch source.
    #[must_use]
    pub fn with_batch_source(mut self, batch_source: impl Into<String>) -> Self {
        self.batch_source = batch_source.into();
        self
    }

    /// Sets the accounting date.
    #[must_use]
    pub fn with_accounting_date(mut self, date: NaiveDate) -> Self {
        self.accounting_date = Some(date);
        self
    }

    /// Accounting date as `YYYY-MM-DD`, defaulting to today (UTC).
    #[must_use]
    pub fn accounting_date_string(&self) -> String {
        self.accounting_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
            .format("%Y-%m-%d")
            .to_string()
    }
}

/// Everything the end-to-end workflow needs besides the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Polling budget for both stages.
    #[serde(default)]
    pub poll: PollConfig,
    /// Child resolution policy.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Artifact policy.
    #[serde(default)]
    pub artifact: ArtifactConfig,
}

impl WorkflowConfig {
    /// Creates a workflow configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the polling budget.
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Sets the resolver policy.
    #[must_use]
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Checks the polling budget and the resolver schedule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poll.validate()?;
        self.resolver.backoff_policy().map(|_| ())
    }

    /// Enables or disables the parent-artifact fallback.
    #[must_use]
    pub fn with_parent_fallback(mut self, enabled: bool) -> Self {
        self.artifact.parent_fallback = enabled;
        self
    }
}
