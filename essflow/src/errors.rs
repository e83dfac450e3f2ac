//! Error types for essflow.
//!
//! Two layers: [`ClientError`] describes a single remote call, and
//! [`OrchestrationError`] describes why an orchestration step aborted. Every
//! orchestration error carries `step`, `job_id` and `status` as structured
//! fields so callers never need to parse the message text.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::core::RequestStatus;

/// Status reported for a stage whose polling budget ran out.
pub const TIMEOUT_STATUS: &str = "TIMEOUT";

/// Failure of a single call to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Credentials were rejected. Never retried.
    #[error("Authentication rejected by {endpoint} (HTTP {status}): {message}")]
    Auth {
        /// Endpoint label.
        endpoint: String,
        /// HTTP status code (401 or 403).
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Network failure, timeout, or non-2xx response.
    #[error("Transport error calling {endpoint}: {message}")]
    Transport {
        /// Endpoint label.
        endpoint: String,
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Response body or reason.
        message: String,
    },

    /// A 2xx response whose body could not be used.
    #[error("Malformed response from {endpoint}: {message}")]
    MalformedResponse {
        /// Endpoint label.
        endpoint: String,
        /// What was wrong with it.
        message: String,
    },

    /// A status query returned no item for the request id.
    #[error("Request {request_id} not found")]
    NotFound {
        /// The queried request id.
        request_id: String,
    },
}

impl ClientError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Creates a malformed response error.
    #[must_use]
    pub fn malformed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(request_id: impl Into<String>) -> Self {
        Self::NotFound {
            request_id: request_id.into(),
        }
    }

    /// Returns true for credential rejection.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// HTTP status code carried by the error, if any.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } => Some(*status),
            Self::Transport { status, .. } => *status,
            Self::MalformedResponse { .. } | Self::NotFound { .. } => None,
        }
    }
}

/// Orchestration step at which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Document upload.
    Upload,
    /// Interface loader submission.
    InterfaceSubmit,
    /// Interface loader polling.
    InterfacePoll,
    /// Import job submission.
    AutoinvoiceSubmit,
    /// Import job polling.
    AutoinvoicePoll,
    /// Child job resolution.
    ChildResolution,
    /// Artifact download.
    ArtifactFetch,
}

impl Step {
    /// Wire label of the step.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::InterfaceSubmit => "interface_submit",
            Self::InterfacePoll => "interface_poll",
            Self::AutoinvoiceSubmit => "autoinvoice_submit",
            Self::AutoinvoicePoll => "autoinvoice_poll",
            Self::ChildResolution => "child_resolution",
            Self::ArtifactFetch => "artifact_fetch",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error category, one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Credentials rejected.
    AuthError,
    /// Network or non-2xx failure.
    TransportError,
    /// Job reached ERROR or FAILED.
    JobFailedError,
    /// Polling budget exhausted.
    PollTimeoutError,
    /// No child job after every strategy and retry.
    ChildJobNotFound,
    /// Every artifact endpoint failed.
    ArtifactUnavailable,
    /// Invalid configuration.
    ConfigError,
}

impl ErrorKind {
    /// Name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthError => "AuthError",
            Self::TransportError => "TransportError",
            Self::JobFailedError => "JobFailedError",
            Self::PollTimeoutError => "PollTimeoutError",
            Self::ChildJobNotFound => "ChildJobNotFound",
            Self::ArtifactUnavailable => "ArtifactUnavailable",
            Self::ConfigError => "ConfigError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one artifact endpoint did not yield an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointFailure {
    /// Endpoint label.
    pub endpoint: String,
    /// HTTP status, if a response was received.
    pub status: Option<u16>,
    /// Human-readable reason.
    pub reason: String,
}

impl EndpointFailure {
    /// Creates an endpoint failure.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        status: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            status,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.endpoint, status, self.reason),
            None => write!(f, "{}: {}", self.endpoint, self.reason),
        }
    }
}

fn join_failures(failures: &[EndpointFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn not_found_causes(last_lookup_error: Option<&str>, fallback_error: Option<&str>) -> String {
    let mut causes = String::new();
    if let Some(err) = last_lookup_error {
        causes.push_str(&format!(" (last lookup error: {err})"));
    }
    if let Some(err) = fallback_error {
        causes.push_str(&format!(" (parent fallback failed: {err})"));
    }
    causes
}

/// Why an orchestration aborted.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Credentials rejected. Aborts immediately.
    #[error("Authentication failed at step '{step}': {source}")]
    Auth {
        /// Step being executed.
        step: Step,
        /// Job involved, if any.
        job_id: Option<String>,
        /// Underlying call error.
        #[source]
        source: ClientError,
    },

    /// A remote call failed.
    #[error("Transport failure at step '{step}': {source}")]
    Transport {
        /// Step being executed.
        step: Step,
        /// Job involved, if any.
        job_id: Option<String>,
        /// Underlying call error.
        #[source]
        source: ClientError,
    },

    /// A job reached ERROR or FAILED.
    #[error("Job {job_id} finished with status {status} at step '{step}'")]
    JobFailed {
        /// Polling step.
        step: Step,
        /// The failed job.
        job_id: String,
        /// The exact terminal status observed.
        status: RequestStatus,
    },

    /// The polling budget ran out before a terminal status.
    #[error("Timed out after {}s waiting for job {job_id} at step '{step}'", elapsed.as_secs())]
    PollTimeout {
        /// Polling step.
        step: Step,
        /// The job being polled.
        job_id: String,
        /// Accumulated wait.
        elapsed: Duration,
        /// Last non-terminal status seen, if any query succeeded.
        last_status: Option<RequestStatus>,
    },

    /// No child job could be located.
    #[error(
        "No child job found for parent {parent_request_id} after {attempts} attempt(s){}. {}",
        not_found_causes(last_lookup_error.as_deref(), fallback_error.as_deref()),
        suggestion
    )]
    ChildJobNotFound {
        /// Parent request id.
        parent_request_id: String,
        /// Resolver attempts made.
        attempts: usize,
        /// Last lookup failure, when some passes failed instead of coming up empty.
        last_lookup_error: Option<String>,
        /// Why the parent-output fallback failed, when it was tried.
        fallback_error: Option<String>,
        /// What the operator can do next.
        suggestion: String,
    },

    /// Every artifact endpoint failed.
    #[error("No artifact available for job {job_id}: {}", join_failures(failures))]
    ArtifactUnavailable {
        /// Job whose artifact was requested.
        job_id: String,
        /// One entry per endpoint tried, in order.
        failures: Vec<EndpointFailure>,
    },

    /// Configuration was invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl OrchestrationError {
    /// Maps a call error to `Auth` or `Transport` for the given step.
    #[must_use]
    pub fn from_client(step: Step, job_id: Option<String>, source: ClientError) -> Self {
        if source.is_auth() {
            Self::Auth {
                step,
                job_id,
                source,
            }
        } else {
            Self::Transport {
                step,
                job_id,
                source,
            }
        }
    }

    /// The error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::AuthError,
            Self::Transport { .. } => ErrorKind::TransportError,
            Self::JobFailed { .. } => ErrorKind::JobFailedError,
            Self::PollTimeout { .. } => ErrorKind::PollTimeoutError,
            Self::ChildJobNotFound { .. } => ErrorKind::ChildJobNotFound,
            Self::ArtifactUnavailable { .. } => ErrorKind::ArtifactUnavailable,
            Self::Config(_) => ErrorKind::ConfigError,
        }
    }

    /// Step at which the error occurred.
    #[must_use]
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::Auth { step, .. }
            | Self::Transport { step, .. }
            | Self::JobFailed { step, .. }
            | Self::PollTimeout { step, .. } => Some(*step),
            Self::ChildJobNotFound { .. } => Some(Step::ChildResolution),
            Self::ArtifactUnavailable { .. } => Some(Step::ArtifactFetch),
            Self::Config(_) => None,
        }
    }

    /// Job the error concerns.
    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Auth { job_id, .. } | Self::Transport { job_id, .. } => job_id.as_deref(),
            Self::JobFailed { job_id, .. }
            | Self::PollTimeout { job_id, .. }
            | Self::ArtifactUnavailable { job_id, .. } => Some(job_id),
            Self::ChildJobNotFound {
                parent_request_id, ..
            } => Some(parent_request_id),
            Self::Config(_) => None,
        }
    }

    /// Status to report: the terminal job status, or `TIMEOUT`.
    #[must_use]
    pub fn status(&self) -> Option<String> {
        match self {
            Self::JobFailed { status, .. } => Some(status.to_string()),
            Self::PollTimeout { .. } => Some(TIMEOUT_STATUS.to_string()),
            _ => None,
        }
    }

    /// Returns true if the error must not be retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Config(_))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind().as_str()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(step) = self.step() {
            map.insert("step".to_string(), serde_json::json!(step.as_str()));
        }
        if let Some(job_id) = self.job_id() {
            map.insert("job_id".to_string(), serde_json::json!(job_id));
        }
        if let Some(status) = self.status() {
            map.insert("status".to_string(), serde_json::json!(status));
        }

        match self {
            Self::Auth { source, .. } | Self::Transport { source, .. } => {
                if let Some(code) = source.http_status() {
                    map.insert("http_status".to_string(), serde_json::json!(code));
                }
            }
            Self::PollTimeout {
                elapsed,
                last_status,
                ..
            } => {
                map.insert("elapsed_secs".to_string(), serde_json::json!(elapsed.as_secs()));
                if let Some(last) = last_status {
                    map.insert("last_status".to_string(), serde_json::json!(last.as_str()));
                }
            }
            Self::ChildJobNotFound {
                attempts,
                last_lookup_error,
                fallback_error,
                suggestion,
                ..
            } => {
                map.insert("attempts".to_string(), serde_json::json!(attempts));
                map.insert("suggestion".to_string(), serde_json::json!(suggestion));
                if let Some(err) = last_lookup_error {
                    map.insert("last_lookup_error".to_string(), serde_json::json!(err));
                }
                if let Some(err) = fallback_error {
                    map.insert("fallback_error".to_string(), serde_json::json!(err));
                }
            }
            Self::ArtifactUnavailable { failures, .. } => {
                map.insert("failures".to_string(), serde_json::json!(failures));
            }
            Self::JobFailed { .. } | Self::Config(_) => {}
        }

        map
    }
}

/// Remediation hints per error kind.
pub struct ErrorSuggestions;

impl ErrorSuggestions {
    /// Gets the hint for an error kind.
    #[must_use]
    pub fn get(kind: ErrorKind) -> &'static str {
        match kind {
            ErrorKind::AuthError => {
                "Check the integration user's credentials and that it holds the scheduler roles."
            }
            ErrorKind::TransportError => {
                "Check connectivity to the ERP host; the call can be repeated once it is reachable."
            }
            ErrorKind::JobFailedError => {
                "Open the job's log in the scheduler to see why it failed before resubmitting."
            }
            ErrorKind::PollTimeoutError => {
                "The job may still be running; check its status in the scheduler \
                 before resubmitting."
            }
            ErrorKind::ChildJobNotFound => {
                "The execution report may still be generating. Look up the import job's \
                 child requests in Scheduled Processes and fetch its output manually, \
                 or retry later."
            }
            ErrorKind::ArtifactUnavailable => {
                "The job finished but published no output; confirm the job's output \
                 settings and that the integration user can read it."
            }
            ErrorKind::ConfigError => "Set the missing ORACLE_* environment variables.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_client_splits_auth() {
        let auth = ClientError::Auth {
            endpoint: "submit".to_string(),
            status: 401,
            message: "bad creds".to_string(),
        };
        let err = OrchestrationError::from_client(Step::InterfaceSubmit, None, auth);
        assert_eq!(err.kind(), ErrorKind::AuthError);
        assert!(err.is_fatal());

        let transport = ClientError::transport("submit", "connection reset");
        let err = OrchestrationError::from_client(Step::InterfaceSubmit, None, transport);
        assert_eq!(err.kind(), ErrorKind::TransportError);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_job_failed_to_dict() {
        let err = OrchestrationError::JobFailed {
            step: Step::InterfacePoll,
            job_id: "100".to_string(),
            status: RequestStatus::Error,
        };

        let dict = err.to_dict();
        assert_eq!(dict.get("type").unwrap(), "JobFailedError");
        assert_eq!(dict.get("step").unwrap(), "interface_poll");
        assert_eq!(dict.get("job_id").unwrap(), "100");
        assert_eq!(dict.get("status").unwrap(), "ERROR");
    }

    #[test]
    fn test_poll_timeout_reports_timeout_status() {
        let err = OrchestrationError::PollTimeout {
            step: Step::AutoinvoicePoll,
            job_id: "7".to_string(),
            elapsed: Duration::from_secs(120),
            last_status: Some(RequestStatus::Running),
        };

        assert_eq!(err.status().as_deref(), Some(TIMEOUT_STATUS));
        let dict = err.to_dict();
        assert_eq!(dict.get("elapsed_secs").unwrap(), 120);
        assert_eq!(dict.get("last_status").unwrap(), "RUNNING");
        assert!(err.to_string().contains("120s"));
    }

    #[test]
    fn test_artifact_unavailable_lists_each_endpoint() {
        let err = OrchestrationError::ArtifactUnavailable {
            job_id: "9".to_string(),
            failures: vec![
                EndpointFailure::new("job_output", Some(404), "not found"),
                EndpointFailure::new("report_service", None, "connection refused"),
            ],
        };

        let msg = err.to_string();
        assert!(msg.contains("job_output (HTTP 404): not found"));
        assert!(msg.contains("report_service: connection refused"));
        assert_eq!(err.step(), Some(Step::ArtifactFetch));
    }

    #[test]
    fn test_child_not_found_keeps_causes() {
        let err = OrchestrationError::ChildJobNotFound {
            parent_request_id: "500".to_string(),
            attempts: 3,
            last_lookup_error: Some("list: connection reset".to_string()),
            fallback_error: Some("No artifact available for job 500".to_string()),
            suggestion: ErrorSuggestions::get(ErrorKind::ChildJobNotFound).to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("after 3 attempt(s) (last lookup error: list: connection reset)"));
        assert!(msg.contains("(parent fallback failed: No artifact available for job 500)"));
        let dict = err.to_dict();
        assert_eq!(dict["last_lookup_error"], "list: connection reset");
        assert_eq!(dict["fallback_error"], "No artifact available for job 500");
        assert_eq!(dict["job_id"], "500");
    }

    #[test]
    fn test_suggestions_cover_every_kind() {
        for kind in [
            ErrorKind::AuthError,
            ErrorKind::TransportError,
            ErrorKind::JobFailedError,
            ErrorKind::PollTimeoutError,
            ErrorKind::ChildJobNotFound,
            ErrorKind::ArtifactUnavailable,
            ErrorKind::ConfigError,
        ] {
            assert!(!ErrorSuggestions::get(kind).is_empty());
        }
    }
}
