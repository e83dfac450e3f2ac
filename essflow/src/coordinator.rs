//! Job submission coordinator: upload, interface load, import.
//!
//! Stages run strictly in order and a stage is only submitted after the
//! previous one was observed in the success set. Nothing is rolled back when
//! a later stage fails.

use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::client::{DocumentUpload, JobService};
use crate::config::{ImportParameters, PollConfig};
use crate::core::{JobHandle, JobRequest, PipelineRun, PipelineState, StageRecord};
use crate::errors::{OrchestrationError, Step};
use crate::events::{names, EventSink};
use crate::poller::{PollOutcome, StatusPoller};

/// Package of the interface loader job.
pub const INTERFACE_LOADER_PACKAGE: &str =
    "oracle/apps/ess/financials/commonModules/shared/common/interfaceLoader";
/// Definition of the interface loader job.
pub const INTERFACE_LOADER_DEFINITION: &str = "InterfaceLoaderController";
/// Package of the AutoInvoice import job.
pub const AUTOINVOICE_PACKAGE: &str =
    "/oracle/apps/ess/financials/receivables/transactions/autoInvoices/";
/// Definition of the AutoInvoice import job.
pub const AUTOINVOICE_DEFINITION: &str = "AutoInvoiceImportEss";

/// Stage label of the interface loader in [`PipelineRun::stages`].
pub const INTERFACE_STAGE: &str = "interface";
/// Stage label of the import in [`PipelineRun::stages`].
pub const AUTOINVOICE_STAGE: &str = "autoinvoice";

/// Unused AutoInvoice positions between the accounting date and the flags.
const AUTOINVOICE_EMPTY_SLOTS: usize = 19;

/// Interface loader request for a staged document.
#[must_use]
pub fn interface_loader_request(interface_details_id: &str, document_id: &str) -> JobRequest {
    JobRequest::new(
        INTERFACE_LOADER_PACKAGE,
        INTERFACE_LOADER_DEFINITION,
        vec![
            interface_details_id.to_string(),
            document_id.to_string(),
            "N".to_string(),
            "N".to_string(),
            "N".to_string(),
        ],
    )
}

/// AutoInvoice import request.
#[must_use]
pub fn autoinvoice_request(params: &ImportParameters) -> JobRequest {
    let mut parameters = vec![
        params.business_unit.clone(),
        params.batch_source.clone(),
        params.accounting_date_string(),
    ];
    parameters.extend(std::iter::repeat(String::new()).take(AUTOINVOICE_EMPTY_SLOTS));
    parameters.push("Y".to_string());
    parameters.push("N".to_string());
    JobRequest::new(AUTOINVOICE_PACKAGE, AUTOINVOICE_DEFINITION, parameters)
}

/// A run that reached `DONE`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRun {
    /// The run record, in state `DONE`.
    pub run: PipelineRun,
    /// Document id from the upload stage.
    pub document_id: String,
    /// Interface loader request id.
    pub interface_job_id: String,
    /// Handle of the import job, the parent of the report job.
    pub import_job: JobHandle,
}

/// A run that aborted, with every stage recorded up to the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct AbortedRun {
    /// The run record, in state `FAILED` with outcome `Aborted`.
    pub run: Box<PipelineRun>,
    /// Why the run aborted.
    #[source]
    pub error: OrchestrationError,
}

impl AbortedRun {
    /// Drops the run record and keeps the error.
    #[must_use]
    pub fn into_error(self) -> OrchestrationError {
        self.error
    }
}

impl From<AbortedRun> for OrchestrationError {
    fn from(aborted: AbortedRun) -> Self {
        aborted.error
    }
}

/// Sequences the upload, interface-load and import stages.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    service: Arc<dyn JobService>,
    poller: StatusPoller,
    poll_config: PollConfig,
    events: Arc<dyn EventSink>,
}

impl SubmissionCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(
        service: Arc<dyn JobService>,
        poller: StatusPoller,
        poll_config: PollConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            service,
            poller,
            poll_config,
            events,
        }
    }

    /// Runs every stage. Every call submits new remote jobs.
    ///
    /// On failure the returned [`AbortedRun`] keeps the run record so callers
    /// can inspect the stages that did execute.
    pub async fn run(
        &self,
        upload: &DocumentUpload,
        params: &ImportParameters,
    ) -> Result<CompletedRun, AbortedRun> {
        let mut run = PipelineRun::new();
        info!(run_id = %run.run_id, file = %upload.file_name, "Starting import pipeline");

        match self.execute(&mut run, upload, params).await {
            Ok((document_id, interface_job_id, import_job)) => {
                self.events
                    .emit(
                        names::PIPELINE_COMPLETED,
                        json!({
                            "run_id": run.run_id.to_string(),
                            "document_id": document_id,
                            "interface_job_id": interface_job_id,
                            "import_job_id": import_job.request_id,
                        }),
                    )
                    .await;
                info!(
                    run_id = %run.run_id,
                    import_job_id = %import_job.request_id,
                    "Import pipeline completed"
                );
                Ok(CompletedRun {
                    run,
                    document_id,
                    interface_job_id,
                    import_job,
                })
            }
            Err(err) => {
                let step = err.step().map_or("unknown", |s| s.as_str());
                run.fail(step);
                error!(
                    run_id = %run.run_id,
                    step,
                    job_id = %err.job_id().unwrap_or_default(),
                    status = %err.status().unwrap_or_default(),
                    error = %err,
                    "Import pipeline aborted"
                );
                let mut payload = json!({"run_id": run.run_id.to_string()});
                if let Some(map) = payload.as_object_mut() {
                    map.extend(err.to_dict());
                }
                self.events.emit(names::PIPELINE_FAILED, payload).await;
                Err(AbortedRun {
                    run: Box::new(run),
                    error: err,
                })
            }
        }
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        upload: &DocumentUpload,
        params: &ImportParameters,
    ) -> Result<(String, String, JobHandle), OrchestrationError> {
        let document_id = self
            .service
            .upload_document(upload)
            .await
            .map_err(|e| OrchestrationError::from_client(Step::Upload, None, e))?;
        run.document_id = Some(document_id.clone());
        self.stage_completed(run, "upload", json!({"document_id": document_id}))
            .await;
        advance(run, PipelineState::LoadingInterface);

        let interface = self
            .submit_and_poll(
                run,
                INTERFACE_STAGE,
                interface_loader_request(&params.interface_details_id, &document_id),
                Step::InterfaceSubmit,
                Step::InterfacePoll,
            )
            .await?;
        advance(run, PipelineState::Importing);

        let import = self
            .submit_and_poll(
                run,
                AUTOINVOICE_STAGE,
                autoinvoice_request(params),
                Step::AutoinvoiceSubmit,
                Step::AutoinvoicePoll,
            )
            .await?;
        advance(run, PipelineState::Done);

        Ok((document_id, interface.request_id, import))
    }

    async fn submit_and_poll(
        &self,
        run: &mut PipelineRun,
        stage: &str,
        request: JobRequest,
        submit_step: Step,
        poll_step: Step,
    ) -> Result<JobHandle, OrchestrationError> {
        let handle = self
            .service
            .submit(&request)
            .await
            .map_err(|e| OrchestrationError::from_client(submit_step, None, e))?;
        let job_id = handle.request_id.clone();
        info!(run_id = %run.run_id, stage, request_id = %job_id, "Job submitted");
        self.events
            .emit(
                names::JOB_SUBMITTED,
                json!({
                    "run_id": run.run_id.to_string(),
                    "stage": stage,
                    "request_id": job_id,
                    "definition": request.definition_name,
                }),
            )
            .await;

        let outcome = self
            .poller
            .poll(&job_id, &self.poll_config)
            .await
            .map_err(|e| OrchestrationError::from_client(poll_step, Some(job_id.clone()), e))?;

        match outcome {
            PollOutcome::Terminal(status) => {
                let observed = status.status;
                run.record(StageRecord {
                    stage: stage.to_string(),
                    request,
                    handle: handle.clone(),
                    status: Some(status),
                });
                if observed.is_failure() {
                    return Err(OrchestrationError::JobFailed {
                        step: poll_step,
                        job_id,
                        status: observed,
                    });
                }
                self.stage_completed(
                    run,
                    stage,
                    json!({"request_id": job_id, "status": observed.as_str()}),
                )
                .await;
                Ok(handle)
            }
            PollOutcome::TimedOut {
                elapsed,
                last_status,
            } => {
                let last = last_status.as_ref().map(|s| s.status);
                warn!(run_id = %run.run_id, stage, request_id = %job_id, "Stage timed out");
                run.record(StageRecord {
                    stage: stage.to_string(),
                    request,
                    handle,
                    status: last_status,
                });
                Err(OrchestrationError::PollTimeout {
                    step: poll_step,
                    job_id,
                    elapsed,
                    last_status: last,
                })
            }
        }
    }

    async fn stage_completed(&self, run: &PipelineRun, stage: &str, detail: serde_json::Value) {
        let mut payload = json!({"run_id": run.run_id.to_string(), "stage": stage});
        if let (Some(map), serde_json::Value::Object(extra)) = (payload.as_object_mut(), detail) {
            map.extend(extra);
        }
        self.events.emit(names::STAGE_COMPLETED, payload).await;
    }
}

fn advance(run: &mut PipelineRun, to: PipelineState) {
    if let Err(err) = run.transition(to) {
        warn!(run_id = %run.run_id, %err, "Ignoring illegal pipeline transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RequestStatus, RunOutcome};
    use crate::errors::{ClientError, ErrorKind};
    use crate::events::CollectingEventSink;
    use crate::testing::{RecordingSleeper, ScriptedJobService};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Harness {
        service: Arc<ScriptedJobService>,
        events: Arc<CollectingEventSink>,
        coordinator: SubmissionCoordinator,
    }

    fn harness() -> Harness {
        let service = Arc::new(ScriptedJobService::new());
        let events = Arc::new(CollectingEventSink::new());
        let poller = StatusPoller::new(
            service.clone(),
            Arc::new(RecordingSleeper::new()),
            events.clone(),
        );
        let poll = PollConfig::new(Duration::from_secs(300), Duration::from_secs(30));
        let coordinator = SubmissionCoordinator::new(service.clone(), poller, poll, events.clone());
        Harness {
            service,
            events,
            coordinator,
        }
    }

    fn upload() -> DocumentUpload {
        DocumentUpload::zip("RaInterfaceLinesAll.zip", b"PK".to_vec())
    }

    fn params() -> ImportParameters {
        ImportParameters::default()
            .with_accounting_date(NaiveDate::from_ymd_opt(2025, 7, 10).unwrap())
    }

    #[test]
    fn test_interface_loader_parameters() {
        let request = interface_loader_request("2", "511142");
        assert_eq!(request.parameter_string(), "2,511142,N,N,N");
        assert_eq!(request.definition_name, "InterfaceLoaderController");
    }

    #[test]
    fn test_autoinvoice_parameters() {
        let request = autoinvoice_request(&params());
        assert_eq!(request.parameters.len(), 24);
        assert_eq!(
            request.parameter_string(),
            "300000003170678,MILGARD EBS SPREADSHEET,2025-07-10,,,,,,,,,,,,,,,,,,,,Y,N"
        );
    }

    #[tokio::test]
    async fn test_stage_two_uses_stage_one_values() {
        let h = harness();
        h.service.set_upload_result(Ok("DOC-42"));
        h.service.script_statuses(
            "100",
            [RequestStatus::Running, RequestStatus::Running, RequestStatus::Succeeded],
        );

        let completed = h.coordinator.run(&upload(), &params()).await.unwrap();

        let submissions = h.service.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].parameters[1], "DOC-42");
        assert_eq!(h.service.status_queries("100"), 3);
        assert_eq!(completed.document_id, "DOC-42");
        assert_eq!(completed.interface_job_id, "100");
        assert_eq!(completed.import_job.request_id, "101");
        assert_eq!(completed.run.state, PipelineState::Done);
        assert_eq!(completed.run.outcome, RunOutcome::Completed);
        assert_eq!(completed.run.job_id(AUTOINVOICE_STAGE), Some("101"));
    }

    #[tokio::test]
    async fn test_warning_is_a_usable_completion() {
        let h = harness();
        h.service.script_statuses("100", [RequestStatus::Warning]);
        h.service.script_statuses("101", [RequestStatus::Warning]);

        let completed = h.coordinator.run(&upload(), &params()).await.unwrap();
        assert_eq!(completed.run.stages.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_statuses_abort_with_exact_status() {
        for status in [RequestStatus::Error, RequestStatus::Failed] {
            let h = harness();
            h.service.script_statuses("100", [status]);

            let err = h.coordinator.run(&upload(), &params()).await.unwrap_err().error;

            assert_eq!(err.kind(), ErrorKind::JobFailedError);
            assert_eq!(err.step(), Some(Step::InterfacePoll));
            assert_eq!(err.job_id(), Some("100"));
            assert_eq!(err.status().as_deref(), Some(status.as_str()));
            // The import stage is never submitted
            assert_eq!(h.service.submissions().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_aborted_run_keeps_stage_records() {
        let h = harness();
        h.service.script_statuses("101", [RequestStatus::Running, RequestStatus::Error]);

        let aborted = h.coordinator.run(&upload(), &params()).await.unwrap_err();

        assert_eq!(aborted.run.state, PipelineState::Failed);
        assert_eq!(
            aborted.run.outcome,
            RunOutcome::Aborted {
                step: "autoinvoice_poll".to_string()
            }
        );
        assert!(aborted.run.finished_at.is_some());
        assert_eq!(aborted.run.document_id.as_deref(), Some("DOC-1"));
        let observed: Vec<(String, Option<RequestStatus>)> = aborted
            .run
            .stages
            .iter()
            .map(|r| (r.stage.clone(), r.status.as_ref().map(|s| s.status)))
            .collect();
        assert_eq!(
            observed,
            vec![
                (INTERFACE_STAGE.to_string(), Some(RequestStatus::Succeeded)),
                (AUTOINVOICE_STAGE.to_string(), Some(RequestStatus::Error)),
            ]
        );
        assert_eq!(aborted.error.kind(), ErrorKind::JobFailedError);
    }

    #[tokio::test]
    async fn test_import_failure_reports_autoinvoice_poll() {
        let h = harness();
        h.service.script_statuses("101", [RequestStatus::Error]);

        let err = h.coordinator.run(&upload(), &params()).await.unwrap_err().error;

        assert_eq!(err.step(), Some(Step::AutoinvoicePoll));
        assert_eq!(err.job_id(), Some("101"));
        let failed = h.events.events_of_type("pipeline.failed");
        assert_eq!(failed.len(), 1);
        let payload = &failed[0].data;
        assert_eq!(payload["step"], "autoinvoice_poll");
        assert_eq!(payload["status"], "ERROR");
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_before_submission() {
        let h = harness();
        h.service.set_upload_result(Err(ClientError::Transport {
            endpoint: "upload".to_string(),
            status: Some(500),
            message: "boom".to_string(),
        }));

        let err = h.coordinator.run(&upload(), &params()).await.unwrap_err().error;

        assert_eq!(err.kind(), ErrorKind::TransportError);
        assert_eq!(err.step(), Some(Step::Upload));
        assert!(h.service.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_poll_timeout_reports_timeout_status() {
        let h = harness();
        h.service.script_statuses("100", [RequestStatus::Running]);

        let err = h.coordinator.run(&upload(), &params()).await.unwrap_err().error;

        assert_eq!(err.kind(), ErrorKind::PollTimeoutError);
        assert_eq!(err.status().as_deref(), Some("TIMEOUT"));
        assert_eq!(err.step(), Some(Step::InterfacePoll));
    }

    #[tokio::test]
    async fn test_auth_failure_on_submit_is_fatal() {
        let h = harness();
        h.service.push_submit_result(Err(ClientError::Auth {
            endpoint: "submit".to_string(),
            status: 401,
            message: "bad credentials".to_string(),
        }));

        let err = h.coordinator.run(&upload(), &params()).await.unwrap_err().error;

        assert!(err.is_fatal());
        assert_eq!(err.step(), Some(Step::InterfaceSubmit));
    }

    #[tokio::test]
    async fn test_events_follow_stage_order() {
        let h = harness();
        h.coordinator.run(&upload(), &params()).await.unwrap();

        let stages: Vec<String> = h
            .events
            .events_of_type("pipeline.stage_completed")
            .into_iter()
            .filter_map(|event| event.data["stage"].as_str().map(str::to_string))
            .collect();
        assert_eq!(stages, vec!["upload", "interface", "autoinvoice"]);
        assert_eq!(h.events.events_of_type("pipeline.completed").len(), 1);
    }
}
