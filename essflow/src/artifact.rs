//! Artifact retrieval with ordered endpoint fallback.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{ArtifactEndpoint, ArtifactFetch, JobService};
use crate::errors::{ClientError, EndpointFailure, OrchestrationError, Step};
use crate::events::{names, EventSink};

/// A downloaded artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedArtifact {
    /// Job the artifact belongs to.
    pub job_id: String,
    /// Endpoint that produced it.
    pub endpoint: ArtifactEndpoint,
    /// Raw artifact bytes, never empty.
    pub bytes: Vec<u8>,
}

impl RetrievedArtifact {
    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a retrieved artifact.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Downloads the output of a job, trying each [`ArtifactEndpoint`] in order.
#[derive(Clone)]
pub struct ArtifactRetriever {
    service: Arc<dyn JobService>,
    events: Arc<dyn EventSink>,
}

impl ArtifactRetriever {
    /// Creates a retriever.
    #[must_use]
    pub fn new(service: Arc<dyn JobService>, events: Arc<dyn EventSink>) -> Self {
        Self { service, events }
    }

    /// Returns the first non-empty body, or `ArtifactUnavailable` listing why
    /// each endpoint failed. Credential rejection aborts at once.
    pub async fn fetch(&self, job_id: &str) -> Result<RetrievedArtifact, OrchestrationError> {
        let mut failures = Vec::with_capacity(ArtifactEndpoint::ALL.len());

        for endpoint in ArtifactEndpoint::ALL {
            debug!(job_id, endpoint = %endpoint, "Requesting artifact");
            let failure = match self.service.fetch_artifact(job_id, endpoint).await {
                Ok(ArtifactFetch::Available(bytes)) if !bytes.is_empty() => {
                    info!(job_id, endpoint = %endpoint, bytes = bytes.len(), "Artifact retrieved");
                    self.events
                        .emit(
                            names::ARTIFACT_RETRIEVED,
                            json!({
                                "job_id": job_id,
                                "endpoint": endpoint.as_str(),
                                "bytes": bytes.len(),
                            }),
                        )
                        .await;
                    return Ok(RetrievedArtifact {
                        job_id: job_id.to_string(),
                        endpoint,
                        bytes,
                    });
                }
                Ok(ArtifactFetch::Available(_)) => {
                    EndpointFailure::new(endpoint.as_str(), None, "empty body")
                }
                Ok(ArtifactFetch::NotAvailable { status, reason }) => {
                    EndpointFailure::new(endpoint.as_str(), status, reason)
                }
                Err(err) if err.is_auth() => {
                    return Err(OrchestrationError::from_client(
                        Step::ArtifactFetch,
                        Some(job_id.to_string()),
                        err,
                    ));
                }
                Err(err) => endpoint_error(endpoint, &err),
            };

            warn!(job_id, endpoint = %endpoint, reason = %failure, "Artifact endpoint failed");
            self.events
                .emit(
                    names::ARTIFACT_ENDPOINT_FAILED,
                    json!({
                        "job_id": job_id,
                        "endpoint": failure.endpoint,
                        "status": failure.status,
                        "reason": failure.reason,
                    }),
                )
                .await;
            failures.push(failure);
        }

        Err(OrchestrationError::ArtifactUnavailable {
            job_id: job_id.to_string(),
            failures,
        })
    }
}

fn endpoint_error(endpoint: ArtifactEndpoint, err: &ClientError) -> EndpointFailure {
    EndpointFailure::new(endpoint.as_str(), err.http_status(), err.to_string())
}
