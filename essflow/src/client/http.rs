//! HTTP implementation of [`JobService`] over the ERP integration resource.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use super::finder::{FileType, Finder};
use super::wire::{
    self, DocumentItem, JobItem, ListResponse, SubmitRequest, SubmitResponse, UploadRequest,
    UploadResponse,
};
use super::{ArtifactEndpoint, ArtifactFetch, DocumentUpload, JobService};
use crate::config::ServiceConfig;
use crate::core::{JobHandle, JobRequest, JobStatus, JobSummary};
use crate::errors::ClientError;

/// Longest response excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Client for the ERP scheduler and content store.
#[derive(Debug, Clone)]
pub struct ErpClient {
    config: Arc<ServiceConfig>,
    http: reqwest::Client,
}

impl ErpClient {
    /// Creates a client using the configured per-call timeout.
    pub fn new(config: Arc<ServiceConfig>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ClientError::transport("client", format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { config, http })
    }

    /// The shared configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.config.username, Some(self.config.password()))
    }

    async fn send(
        &self,
        endpoint: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| ClientError::transport(endpoint, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = truncate(&body);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Auth {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Err(ClientError::Transport {
            endpoint: endpoint.to_string(),
            status: Some(status.as_u16()),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = self
            .send(endpoint, builder.header(reqwest::header::ACCEPT, "application/json"))
            .await?;
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::transport(endpoint, e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ClientError::malformed(endpoint, e.to_string()))
    }

    async fn list(&self, endpoint: &str, finder: &Finder) -> Result<ListResponse, ClientError> {
        let builder = self
            .http
            .get(self.config.integrations_url())
            .query(&[("finder", finder.expression())]);
        self.send_json(endpoint, builder).await
    }

    async fn fetch_execution_details(
        &self,
        endpoint: ArtifactEndpoint,
        job_id: &str,
        file_type: FileType,
    ) -> Result<ArtifactFetch, ClientError> {
        let label = endpoint.as_str();
        let listing = match self
            .list(label, &Finder::execution_details(job_id, file_type))
            .await
        {
            Ok(listing) => listing,
            Err(ClientError::Transport {
                status: Some(status),
                message,
                ..
            }) => return Ok(ArtifactFetch::not_available(Some(status), message)),
            Err(err) => return Err(err),
        };

        for raw in listing.items {
            let item: DocumentItem = match serde_json::from_value(raw) {
                Ok(item) => item,
                Err(e) => {
                    debug!(
                        endpoint = label,
                        job_id,
                        error = %e,
                        "Skipping unreadable document item"
                    );
                    continue;
                }
            };
            let Some(content) = item.content.filter(|c| !c.trim().is_empty()) else {
                continue;
            };
            let bytes = wire::decode_document(&content)
                .map_err(|e| {
                    ClientError::malformed(label, format!("DocumentContent is not base64: {e}"))
                })?;
            if !bytes.is_empty() {
                return Ok(ArtifactFetch::Available(bytes));
            }
        }
        Ok(ArtifactFetch::not_available(
            Some(StatusCode::OK.as_u16()),
            "no document content",
        ))
    }

    async fn fetch_report_service(&self, job_id: &str) -> Result<ArtifactFetch, ClientError> {
        let label = ArtifactEndpoint::ReportService.as_str();
        let builder = self.http.get(self.config.report_service_url(job_id));
        let response = match self.send(label, builder).await {
            Ok(response) => response,
            Err(ClientError::Transport {
                status: Some(status),
                message,
                ..
            }) => return Ok(ArtifactFetch::not_available(Some(status), message)),
            Err(err) => return Err(err),
        };
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(label, e.to_string()))?;
        if bytes.is_empty() {
            return Ok(ArtifactFetch::not_available(Some(status), "empty body"));
        }
        Ok(ArtifactFetch::Available(bytes.to_vec()))
    }
}

#[async_trait]
impl JobService for ErpClient {
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ClientError> {
        let endpoint = "submit";
        let builder = self
            .http
            .post(self.config.integrations_url())
            .json(&SubmitRequest::new(request));
        let response: SubmitResponse = self.send_json(endpoint, builder).await?;
        let request_id = response.assigned_id().ok_or_else(|| {
            ClientError::malformed(
                endpoint,
                format!(
                    "no request id assigned for {} (ReqstId={:?})",
                    request.definition_name, response.request_id
                ),
            )
        })?;
        debug!(request_id, definition = %request.definition_name, "Job submitted");
        Ok(JobHandle::new(request_id))
    }

    async fn query_status(&self, request_id: &str) -> Result<JobStatus, ClientError> {
        let listing = self.list("status", &Finder::job_status(request_id)).await?;
        let raw = listing
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::not_found(request_id))?;
        let item: JobItem = serde_json::from_value(raw.clone())
            .map_err(|e| ClientError::malformed("status", e.to_string()))?;
        Ok(item.into_status(request_id, raw))
    }

    async fn list_recent(&self, finder: &Finder) -> Result<Vec<JobSummary>, ClientError> {
        let listing = self.list("list", finder).await?;
        Ok(listing
            .items
            .into_iter()
            .filter_map(|raw| serde_json::from_value::<JobItem>(raw).ok())
            .filter_map(JobItem::into_summary)
            .collect())
    }

    async fn fetch_artifact(
        &self,
        job_id: &str,
        endpoint: ArtifactEndpoint,
    ) -> Result<ArtifactFetch, ClientError> {
        match endpoint {
            ArtifactEndpoint::JobOutput => {
                self.fetch_execution_details(endpoint, job_id, FileType::All)
                    .await
            }
            ArtifactEndpoint::ExecutionReport => {
                self.fetch_execution_details(endpoint, job_id, FileType::Out)
                    .await
            }
            ArtifactEndpoint::ReportService => self.fetch_report_service(job_id).await,
        }
    }

    async fn upload_document(&self, upload: &DocumentUpload) -> Result<String, ClientError> {
        let endpoint = "upload";
        let account = upload.account.as_deref().unwrap_or(&self.config.ucm_account);
        let body = UploadRequest::new(
            &upload.content,
            account,
            &upload.content_type,
            &upload.file_name,
        );
        let builder = self.http.post(self.config.integrations_url()).json(&body);
        let response: UploadResponse = self.send_json(endpoint, builder).await?;
        response
            .document_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ClientError::malformed(endpoint, "no DocumentId in upload response"))
    }

    async fn legacy_child_lookup(
        &self,
        parent_request_id: &str,
    ) -> Result<Option<String>, ClientError> {
        let endpoint = "legacy_report";
        let envelope = wire::run_report_envelope(
            &self.config.username,
            self.config.password(),
            &self.config.legacy_report_path,
            parent_request_id,
        );
        let builder = self
            .http
            .post(self.config.legacy_service_url())
            .header(reqwest::header::CONTENT_TYPE, "application/soap+xml; charset=utf-8")
            .body(envelope);
        let response = self.send(endpoint, builder).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::transport(endpoint, e.to_string()))?;
        wire::parse_run_report(&body).map_err(|message| {
            warn!(parent_request_id, %message, "Unreadable legacy report response");
            ClientError::malformed(endpoint, message)
        })
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
