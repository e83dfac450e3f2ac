//! End-to-end report workflow.
//!
//! Runs the import pipeline, locates the execution-report job the import
//! spawned, and downloads its output. When no child output can be obtained
//! the import job's own output is used if the parent fallback is enabled.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifact::{ArtifactRetriever, RetrievedArtifact};
use crate::client::{DocumentUpload, ErpClient, JobService};
use crate::config::{ConfigError, ImportParameters, ServiceConfig, WorkflowConfig};
use crate::coordinator::{CompletedRun, SubmissionCoordinator};
use crate::core::ChildJobCandidate;
use crate::errors::{ErrorKind, ErrorSuggestions, OrchestrationError, Step};
use crate::events::EventSink;
use crate::observability::SpanTimer;
use crate::poller::StatusPoller;
use crate::resolver::{ChildJobResolver, Resolution};
use crate::sleeper::{Sleeper, TokioSleeper};

/// Receives the downloaded report, e.g. to format it.
#[async_trait]
pub trait ArtifactHandler: Send + Sync {
    /// Called once per successful run with the artifact that was kept.
    async fn handle(&self, artifact: &RetrievedArtifact);
}

/// Everything a successful workflow run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowReport {
    /// The completed import pipeline.
    pub run: CompletedRun,
    /// The child job, if one was located.
    pub child: Option<ChildJobCandidate>,
    /// The artifact that was retrieved.
    pub artifact: RetrievedArtifact,
    /// True when the artifact is the import job's own output.
    pub fallback_used: bool,
}

/// Import pipeline plus report retrieval.
pub struct ReportWorkflow {
    coordinator: SubmissionCoordinator,
    resolver: ChildJobResolver,
    retriever: ArtifactRetriever,
    config: WorkflowConfig,
    handler: Option<Arc<dyn ArtifactHandler>>,
}

impl ReportWorkflow {
    /// Wires every component to `service`.
    ///
    /// Fails when `config` does not pass [`WorkflowConfig::validate`].
    pub fn new(
        service: Arc<dyn JobService>,
        config: WorkflowConfig,
        sleeper: Arc<dyn Sleeper>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let poller = StatusPoller::new(service.clone(), sleeper.clone(), events.clone());
        let resolver =
            ChildJobResolver::new(service.clone(), sleeper, events.clone(), &config.resolver)?;
        Ok(Self {
            coordinator: SubmissionCoordinator::new(
                service.clone(),
                poller,
                config.poll,
                events.clone(),
            ),
            resolver,
            retriever: ArtifactRetriever::new(service, events),
            config,
            handler: None,
        })
    }

    /// Builds a workflow talking to the ERP over HTTP with real sleeps.
    pub fn connect(
        service_config: Arc<ServiceConfig>,
        config: WorkflowConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, OrchestrationError> {
        let client = ErpClient::new(service_config)
            .map_err(|err| OrchestrationError::from_client(Step::Upload, None, err))?;
        Ok(Self::new(
            Arc::new(client),
            config,
            Arc::new(TokioSleeper),
            events,
        )?)
    }

    /// Sets the collaborator that receives the artifact.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ArtifactHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Runs the pipeline and retrieves the report.
    ///
    /// Every call submits new remote jobs; nothing is deduplicated.
    pub async fn run(
        &self,
        upload: &DocumentUpload,
        params: &ImportParameters,
    ) -> Result<WorkflowReport, OrchestrationError> {
        let timer = SpanTimer::start("report_workflow");
        let completed = self.coordinator.run(upload, params).await?;
        let parent_id = completed.import_job.request_id.clone();

        // The parent's submission time is read from the scheduler, whose clock
        // is the one child submission times are stamped with.
        let resolution = self
            .resolver
            .resolve_with_backoff(&parent_id, None)
            .await
            .map_err(|err| {
                OrchestrationError::from_client(Step::ChildResolution, Some(parent_id.clone()), err)
            })?;

        let all_passes_failed = resolution.all_passes_failed();
        let (child, artifact, fallback_used) = match resolution {
            Resolution::Found { candidate, .. } => {
                match self.retriever.fetch(&candidate.candidate_id).await {
                    Ok(artifact) => (Some(candidate), artifact, false),
                    Err(err) if err.is_fatal() || !self.config.artifact.parent_fallback => {
                        return Err(err);
                    }
                    Err(err) => {
                        warn!(
                            parent_request_id = %parent_id,
                            child_id = %candidate.candidate_id,
                            error = %err,
                            "Child artifact unavailable; using parent output"
                        );
                        // Report the child's failure if the parent has nothing either
                        match self.retriever.fetch(&parent_id).await {
                            Ok(artifact) => (Some(candidate), artifact, true),
                            Err(parent_err) if parent_err.is_fatal() => return Err(parent_err),
                            Err(parent_err) => {
                                warn!(
                                    parent_request_id = %parent_id,
                                    error = %parent_err,
                                    "Parent output unavailable too"
                                );
                                return Err(err);
                            }
                        }
                    }
                }
            }
            Resolution::NotFound {
                attempts,
                last_error,
                ..
            } => {
                // Every pass failed: the lookup itself is broken, not the child missing
                if let (true, Some(err)) = (all_passes_failed, &last_error) {
                    return Err(OrchestrationError::from_client(
                        Step::ChildResolution,
                        Some(parent_id),
                        err.clone(),
                    ));
                }
                let last_lookup_error = last_error.as_ref().map(ToString::to_string);
                if !self.config.artifact.parent_fallback {
                    return Err(child_not_found(parent_id, attempts, last_lookup_error, None));
                }
                warn!(
                    parent_request_id = %parent_id,
                    attempts,
                    "No child job found; using parent output"
                );
                match self.retriever.fetch(&parent_id).await {
                    Ok(artifact) => (None, artifact, true),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        return Err(child_not_found(
                            parent_id,
                            attempts,
                            last_lookup_error,
                            Some(err.to_string()),
                        ));
                    }
                }
            }
        };

        info!(
            run_id = %completed.run.run_id,
            job_id = %artifact.job_id,
            endpoint = %artifact.endpoint,
            bytes = artifact.len(),
            fallback_used,
            duration_ms = timer.elapsed_ms(),
            "{} finished",
            timer.name()
        );
        if let Some(handler) = &self.handler {
            handler.handle(&artifact).await;
        }

        Ok(WorkflowReport {
            run: completed,
            child,
            artifact,
            fallback_used,
        })
    }
}

fn child_not_found(
    parent_request_id: String,
    attempts: usize,
    last_lookup_error: Option<String>,
    fallback_error: Option<String>,
) -> OrchestrationError {
    OrchestrationError::ChildJobNotFound {
        parent_request_id,
        attempts,
        last_lookup_error,
        fallback_error,
        suggestion: ErrorSuggestions::get(ErrorKind::ChildJobNotFound).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ArtifactEndpoint, ArtifactFetch, Finder};
    use crate::config::ResolverConfig;
    use crate::core::{DiscoveryMethod, PipelineState, RequestStatus};
    use crate::errors::ClientError;
    use crate::events::NoOpEventSink;
    use crate::testing::{summary, RecordingSleeper, ScriptedJobService};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    // Scripted submissions get ids 100 (interface) and 101 (import)
    const IMPORT_ID: &str = "101";

    #[derive(Default)]
    struct KeepingHandler {
        seen: Mutex<Vec<RetrievedArtifact>>,
    }

    #[async_trait]
    impl ArtifactHandler for KeepingHandler {
        async fn handle(&self, artifact: &RetrievedArtifact) {
            self.seen.lock().push(artifact.clone());
        }
    }

    fn workflow(service: Arc<ScriptedJobService>, config: WorkflowConfig) -> ReportWorkflow {
        ReportWorkflow::new(
            service,
            config,
            Arc::new(RecordingSleeper::new()),
            Arc::new(NoOpEventSink),
        )
        .unwrap()
    }

    fn upload() -> DocumentUpload {
        DocumentUpload::zip("AutoInvoice.zip", b"PK".to_vec())
    }

    fn with_child(service: &ScriptedJobService) {
        service.set_listing(
            Finder::AllJobs,
            vec![
                summary(IMPORT_ID, "AutoInvoiceImportEss", 0),
                summary("501", "AUTOINVOICE_REPORT_CHILD", 5),
            ],
        );
    }

    #[tokio::test]
    async fn test_child_report_retrieved() {
        let service = Arc::new(ScriptedJobService::new());
        with_child(&service);
        service.set_artifact(
            "501",
            ArtifactEndpoint::JobOutput,
            Ok(ArtifactFetch::Available(b"<report/>".to_vec())),
        );
        let handler = Arc::new(KeepingHandler::default());

        let report = workflow(service, WorkflowConfig::default())
            .with_handler(handler.clone())
            .run(&upload(), &ImportParameters::default())
            .await
            .unwrap();

        assert_eq!(report.run.run.state, PipelineState::Done);
        assert_eq!(report.run.import_job.request_id, IMPORT_ID);
        let child = report.child.unwrap();
        assert_eq!(child.candidate_id, "501");
        assert_eq!(child.discovery_method, DiscoveryMethod::KeywordScore);
        assert_eq!(report.artifact.job_id, "501");
        assert!(!report.fallback_used);
        assert_eq!(handler.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_parent_fallback_when_no_child() {
        let service = Arc::new(ScriptedJobService::new());
        service.set_artifact(
            IMPORT_ID,
            ArtifactEndpoint::ReportService,
            Ok(ArtifactFetch::Available(b"parent".to_vec())),
        );

        let report = workflow(service, WorkflowConfig::default())
            .run(&upload(), &ImportParameters::default())
            .await
            .unwrap();

        assert_eq!(report.child, None);
        assert!(report.fallback_used);
        assert_eq!(report.artifact.job_id, IMPORT_ID);
        assert_eq!(report.artifact.bytes, b"parent".to_vec());
    }

    #[tokio::test]
    async fn test_child_not_found_without_fallback() {
        let service = Arc::new(ScriptedJobService::new());
        let config = WorkflowConfig::default()
            .with_parent_fallback(false)
            .with_resolver(ResolverConfig::default().with_max_attempts(2));

        let err = workflow(service.clone(), config)
            .run(&upload(), &ImportParameters::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ChildJobNotFound);
        assert_eq!(err.job_id(), Some(IMPORT_ID));
        match &err {
            OrchestrationError::ChildJobNotFound {
                attempts,
                last_lookup_error,
                fallback_error,
                suggestion,
                ..
            } => {
                assert_eq!(*attempts, 2);
                assert_eq!(*last_lookup_error, None);
                assert_eq!(*fallback_error, None);
                assert!(!suggestion.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(service.artifact_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_listing_reported_as_transport_error() {
        let service = Arc::new(ScriptedJobService::new());
        service.script_listing(
            Finder::AllJobs,
            [Err(ClientError::transport("list", "connection refused"))],
        );
        let config = WorkflowConfig::default().with_parent_fallback(false);

        let err = workflow(service, config)
            .run(&upload(), &ImportParameters::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransportError);
        assert_eq!(err.step(), Some(Step::ChildResolution));
        assert_eq!(err.job_id(), Some(IMPORT_ID));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_partial_lookup_failure_kept_on_not_found() {
        let service = Arc::new(ScriptedJobService::new());
        service.script_listing(
            Finder::AllJobs,
            [Err(ClientError::transport("list", "connection reset")), Ok(vec![])],
        );

        let err = workflow(service, WorkflowConfig::default())
            .run(&upload(), &ImportParameters::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ChildJobNotFound);
        let dict = err.to_dict();
        assert!(dict["last_lookup_error"]
            .as_str()
            .unwrap()
            .contains("connection reset"));
        // Parent fallback was tried and had no output either
        assert!(dict["fallback_error"]
            .as_str()
            .unwrap()
            .contains(&format!("No artifact available for job {IMPORT_ID}")));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = WorkflowConfig::default()
            .with_resolver(ResolverConfig::default().with_base_delay_seconds(0));

        let result = ReportWorkflow::new(
            Arc::new(ScriptedJobService::new()),
            config,
            Arc::new(RecordingSleeper::new()),
            Arc::new(NoOpEventSink),
        );

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_child_artifact_missing_falls_back_to_parent() {
        let service = Arc::new(ScriptedJobService::new());
        with_child(&service);
        service.set_artifact(
            IMPORT_ID,
            ArtifactEndpoint::JobOutput,
            Ok(ArtifactFetch::Available(b"parent".to_vec())),
        );

        let report = workflow(service, WorkflowConfig::default())
            .run(&upload(), &ImportParameters::default())
            .await
            .unwrap();

        assert_eq!(report.child.unwrap().candidate_id, "501");
        assert!(report.fallback_used);
        assert_eq!(report.artifact.job_id, IMPORT_ID);
    }

    #[tokio::test]
    async fn test_child_failure_reported_when_parent_has_nothing() {
        let service = Arc::new(ScriptedJobService::new());
        with_child(&service);

        let err = workflow(service, WorkflowConfig::default())
            .run(&upload(), &ImportParameters::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ArtifactUnavailable);
        assert_eq!(err.job_id(), Some("501"));
    }

    #[tokio::test]
    async fn test_pipeline_failure_skips_resolution() {
        let service = Arc::new(ScriptedJobService::new());
        service.script_statuses("100", [RequestStatus::Error]);

        let err = workflow(service.clone(), WorkflowConfig::default())
            .run(&upload(), &ImportParameters::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::JobFailedError);
        assert!(service.list_calls().is_empty());
        assert!(service.artifact_calls().is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_during_resolution() {
        let service = Arc::new(ScriptedJobService::new());
        service.script_listing(
            Finder::AllJobs,
            [Err(ClientError::Auth {
                endpoint: "list".to_string(),
                status: 401,
                message: "expired".to_string(),
            })],
        );

        let err = workflow(service, WorkflowConfig::default())
            .run(&upload(), &ImportParameters::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthError);
        assert_eq!(err.step(), Some(Step::ChildResolution));
        assert_eq!(err.job_id(), Some(IMPORT_ID));
    }

    #[tokio::test]
    async fn test_rerun_submits_new_jobs() {
        let service = Arc::new(ScriptedJobService::new());
        service.set_artifact(
            "101",
            ArtifactEndpoint::JobOutput,
            Ok(ArtifactFetch::Available(b"first".to_vec())),
        );
        service.set_artifact(
            "103",
            ArtifactEndpoint::JobOutput,
            Ok(ArtifactFetch::Available(b"second".to_vec())),
        );
        let workflow = workflow(service.clone(), WorkflowConfig::default());

        let first = workflow.run(&upload(), &ImportParameters::default()).await.unwrap();
        let second = workflow.run(&upload(), &ImportParameters::default()).await.unwrap();

        // Identical inputs are not deduplicated
        assert_eq!(service.submissions().len(), 4);
        assert_eq!(service.uploads().len(), 2);
        assert_eq!(first.run.import_job.request_id, "101");
        assert_eq!(second.run.import_job.request_id, "103");
        assert_ne!(first.run.run.run_id, second.run.run.run_id);
    }
}
