//! Scheduler job request, handle and status types.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::timestamps::Timestamp;

/// The status reported by the scheduler for a request.
///
/// A request moves from `Running` into exactly one terminal value.
/// `Unknown` covers strings the scheduler may add in later releases and is
/// treated as non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Queued, waiting, or executing.
    Running,
    /// Completed normally.
    Succeeded,
    /// Completed with warnings; output is usable.
    Warning,
    /// Completed with an error.
    Error,
    /// Failed, cancelled, or expired.
    Failed,
    /// Unrecognised status string.
    Unknown,
}

impl Default for RequestStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl RequestStatus {
    /// Normalises a raw scheduler status string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCEEDED" | "SUCCESS" | "COMPLETED" => Self::Succeeded,
            "WARNING" => Self::Warning,
            "ERROR" => Self::Error,
            "FAILED" | "CANCELLED" | "CANCELED" | "EXPIRED" => Self::Failed,
            "RUNNING" | "WAIT" | "WAITING" | "READY" | "PENDING" | "BLOCKED" | "PAUSED"
            | "SCHEDULED" | "HOLD" | "CANCELLING" | "COMPLETING" | "FINISHED" | "VALIDATING" => {
                Self::Running
            }
            _ => Self::Unknown,
        }
    }

    /// Returns true once the scheduler will report no further change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Warning | Self::Error | Self::Failed)
    }

    /// Returns true for terminal states a pipeline may continue from.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Warning)
    }

    /// Returns true for terminal states that abort a pipeline stage.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Failed)
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job to submit: package, definition and ordered positional parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Scheduler package path of the job definition.
    pub package_name: String,
    /// Job definition name inside the package.
    pub definition_name: String,
    /// Positional parameters; empty strings are preserved as empty slots.
    pub parameters: Vec<String>,
}

impl JobRequest {
    /// Creates a new job request.
    #[must_use]
    pub fn new(
        package_name: impl Into<String>,
        definition_name: impl Into<String>,
        parameters: Vec<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            definition_name: definition_name.into(),
            parameters,
        }
    }

    /// Comma-joined parameter list as the scheduler expects it.
    #[must_use]
    pub fn parameter_string(&self) -> String {
        self.parameters.join(",")
    }
}

/// Handle to a submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Opaque scheduler request id.
    pub request_id: String,
    /// When the submission was acknowledged.
    pub submitted_at: Timestamp,
}

impl JobHandle {
    /// Creates a handle stamped with the current time.
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            submitted_at: chrono::Utc::now(),
        }
    }
}

/// One status observation. A new poll produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Opaque scheduler request id.
    pub request_id: String,
    /// Normalised status.
    pub status: RequestStatus,
    /// Scheduler phase string, empty when not reported.
    #[serde(default)]
    pub phase: String,
    /// Scheduler state string, empty when not reported.
    #[serde(default)]
    pub state: String,
    /// The item exactly as the scheduler returned it.
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

impl JobStatus {
    /// Creates a status with no phase, state or payload.
    #[must_use]
    pub fn new(request_id: impl Into<String>, status: RequestStatus) -> Self {
        Self {
            request_id: request_id.into(),
            status,
            phase: String::new(),
            state: String::new(),
            raw_payload: serde_json::Value::Null,
        }
    }

    /// Sets the phase.
    #[must_use]
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    /// Sets the state.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    /// Attaches the raw payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.raw_payload = payload;
        self
    }

    /// Shorthand for `self.status.is_terminal()`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A row of a job listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Opaque scheduler request id.
    pub id: String,
    /// Job name as listed.
    pub name: String,
    /// Normalised status.
    pub status: RequestStatus,
    /// Submission time, when the listing carried a parseable one.
    pub submitted_at: Option<Timestamp>,
}

impl JobSummary {
    /// Creates a summary.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        status: RequestStatus,
        submitted_at: Option<Timestamp>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            submitted_at,
        }
    }
}
