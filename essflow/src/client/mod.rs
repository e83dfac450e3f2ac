//! Remote job client.
//!
//! [`JobService`] is the port every component talks to; [`ErpClient`] is the
//! HTTP implementation. Every call is one round trip with no caching and no
//! retry at this layer.

mod finder;
mod http;
mod wire;

pub use finder::{FileType, Finder, RelationshipQuery};
pub use http::ErpClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{JobHandle, JobRequest, JobStatus, JobSummary};
use crate::errors::ClientError;

/// Content type the content store expects for import bundles.
pub const ZIP_CONTENT_TYPE: &str = "zip";

/// A prepared document to stage in the content store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    /// Raw file bytes; encoded on the wire.
    pub content: Vec<u8>,
    /// Content-store account; the configured account when `None`.
    pub account: Option<String>,
    /// Content type label.
    pub content_type: String,
    /// File name shown in the content store.
    pub file_name: String,
}

impl DocumentUpload {
    /// Creates a zip upload to the configured account.
    #[must_use]
    pub fn zip(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            content,
            account: None,
            content_type: ZIP_CONTENT_TYPE.to_string(),
            file_name: file_name.into(),
        }
    }

    /// Overrides the content-store account.
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }
}

/// The three places a job's output may be published, in retrieval order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactEndpoint {
    /// Execution details with every output file.
    JobOutput,
    /// Execution details restricted to the execution report.
    ExecutionReport,
    /// The scheduler's report-service output resource.
    ReportService,
}

impl ArtifactEndpoint {
    /// Every endpoint, in the order they are tried.
    pub const ALL: [Self; 3] = [Self::JobOutput, Self::ExecutionReport, Self::ReportService];

    /// Label used in logs and failure reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobOutput => "job_output",
            Self::ExecutionReport => "execution_report",
            Self::ReportService => "report_service",
        }
    }
}

impl fmt::Display for ArtifactEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one artifact download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactFetch {
    /// Non-empty body received.
    Available(Vec<u8>),
    /// The endpoint answered but had nothing usable.
    NotAvailable {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Why nothing was returned.
        reason: String,
    },
}

impl ArtifactFetch {
    /// Creates a `NotAvailable` result.
    #[must_use]
    pub fn not_available(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::NotAvailable {
            status,
            reason: reason.into(),
        }
    }
}

/// Authenticated access to the remote job service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobService: Send + Sync {
    /// Submits a job and returns its handle.
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ClientError>;

    /// Queries the current status of a request.
    ///
    /// Returns `ClientError::NotFound` when the scheduler has no such request.
    async fn query_status(&self, request_id: &str) -> Result<JobStatus, ClientError>;

    /// Lists requests matching a finder.
    async fn list_recent(&self, finder: &Finder) -> Result<Vec<JobSummary>, ClientError>;

    /// Downloads a job's output from one endpoint.
    async fn fetch_artifact(
        &self,
        job_id: &str,
        endpoint: ArtifactEndpoint,
    ) -> Result<ArtifactFetch, ClientError>;

    /// Stages a document in the content store and returns its document id.
    async fn upload_document(&self, upload: &DocumentUpload) -> Result<String, ClientError>;

    /// Asks the legacy report service for the child of `parent_request_id`.
    async fn legacy_child_lookup(
        &self,
        parent_request_id: &str,
    ) -> Result<Option<String>, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_endpoint_order() {
        let labels: Vec<&str> = ArtifactEndpoint::ALL
            .iter()
            .map(ArtifactEndpoint::as_str)
            .collect();
        assert_eq!(labels, vec!["job_output", "execution_report", "report_service"]);
    }

    #[test]
    fn test_document_upload_defaults() {
        let upload = DocumentUpload::zip("batch.zip", vec![1, 2, 3]);
        assert_eq!(upload.content_type, "zip");
        assert!(upload.account.is_none());
        assert_eq!(
            upload.with_account("fin$/x$").account.as_deref(),
            Some("fin$/x$")
        );
    }
}
