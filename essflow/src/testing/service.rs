//! Scripted in-memory job service.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::client::{ArtifactEndpoint, ArtifactFetch, DocumentUpload, Finder, JobService};
use crate::core::{JobHandle, JobRequest, JobStatus, JobSummary, RequestStatus};
use crate::errors::ClientError;

/// Pops the next scripted answer, repeating the last one forever.
fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[derive(Debug)]
struct State {
    next_request_id: u64,
    submit_results: VecDeque<Result<String, ClientError>>,
    submissions: Vec<JobRequest>,
    statuses: HashMap<String, VecDeque<Result<JobStatus, ClientError>>>,
    default_status: RequestStatus,
    status_queries: HashMap<String, usize>,
    listings: HashMap<Finder, VecDeque<Result<Vec<JobSummary>, ClientError>>>,
    list_calls: Vec<Finder>,
    artifacts: HashMap<(String, ArtifactEndpoint), Result<ArtifactFetch, ClientError>>,
    artifact_calls: Vec<(String, ArtifactEndpoint)>,
    upload_result: Result<String, ClientError>,
    uploads: Vec<DocumentUpload>,
    legacy: HashMap<String, Result<Option<String>, ClientError>>,
    legacy_calls: Vec<String>,
}

/// A [`JobService`] answering from scripts and recording every call.
///
/// Unscripted calls get neutral answers: submissions receive sequential ids
/// starting at 100, status queries report the default status (SUCCEEDED),
/// listings are empty, artifacts are not available (HTTP 404), the upload
/// returns `DOC-1` and the legacy lookup finds nothing.
#[derive(Debug)]
pub struct ScriptedJobService {
    state: Mutex<State>,
}

impl Default for ScriptedJobService {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedJobService {
    /// Creates a service with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_request_id: 100,
                submit_results: VecDeque::new(),
                submissions: Vec::new(),
                statuses: HashMap::new(),
                default_status: RequestStatus::Succeeded,
                status_queries: HashMap::new(),
                listings: HashMap::new(),
                list_calls: Vec::new(),
                artifacts: HashMap::new(),
                artifact_calls: Vec::new(),
                upload_result: Ok("DOC-1".to_string()),
                uploads: Vec::new(),
                legacy: HashMap::new(),
                legacy_calls: Vec::new(),
            }),
        }
    }

    /// Queues the result of the next submission.
    pub fn push_submit_result(&self, result: Result<&str, ClientError>) {
        self.state
            .lock()
            .submit_results
            .push_back(result.map(str::to_string));
    }

    /// Status answered for request ids without a script.
    pub fn set_default_status(&self, status: RequestStatus) {
        self.state.lock().default_status = status;
    }

    /// Scripts the statuses of `request_id`, one per query; the last repeats.
    pub fn script_statuses<I>(&self, request_id: &str, statuses: I)
    where
        I: IntoIterator<Item = RequestStatus>,
    {
        let queue = statuses
            .into_iter()
            .map(|status| Ok(JobStatus::new(request_id, status)))
            .collect();
        self.state
            .lock()
            .statuses
            .insert(request_id.to_string(), queue);
    }

    /// Scripts raw status query results for `request_id`; the last repeats.
    pub fn script_status_results<I>(&self, request_id: &str, results: I)
    where
        I: IntoIterator<Item = Result<JobStatus, ClientError>>,
    {
        self.state
            .lock()
            .statuses
            .insert(request_id.to_string(), results.into_iter().collect());
    }

    /// Answers `finder` with `rows` on every call.
    pub fn set_listing(&self, finder: Finder, rows: Vec<JobSummary>) {
        self.script_listing(finder, [Ok(rows)]);
    }

    /// Scripts successive answers for `finder`; the last repeats.
    pub fn script_listing<I>(&self, finder: Finder, results: I)
    where
        I: IntoIterator<Item = Result<Vec<JobSummary>, ClientError>>,
    {
        self.state
            .lock()
            .listings
            .insert(finder, results.into_iter().collect());
    }

    /// Scripts one artifact endpoint of a job.
    pub fn set_artifact(
        &self,
        job_id: &str,
        endpoint: ArtifactEndpoint,
        result: Result<ArtifactFetch, ClientError>,
    ) {
        self.state
            .lock()
            .artifacts
            .insert((job_id.to_string(), endpoint), result);
    }

    /// Sets the upload result.
    pub fn set_upload_result(&self, result: Result<&str, ClientError>) {
        self.state.lock().upload_result = result.map(str::to_string);
    }

    /// Scripts the legacy lookup for a parent.
    pub fn set_legacy_result(
        &self,
        parent_request_id: &str,
        result: Result<Option<String>, ClientError>,
    ) {
        self.state
            .lock()
            .legacy
            .insert(parent_request_id.to_string(), result);
    }

    /// Every submitted request, in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<JobRequest> {
        self.state.lock().submissions.clone()
    }

    /// Number of status queries made for `request_id`.
    #[must_use]
    pub fn status_queries(&self, request_id: &str) -> usize {
        self.state
            .lock()
            .status_queries
            .get(request_id)
            .copied()
            .unwrap_or(0)
    }

    /// Every list query, in order.
    #[must_use]
    pub fn list_calls(&self) -> Vec<Finder> {
        self.state.lock().list_calls.clone()
    }

    /// Every artifact request, in order.
    #[must_use]
    pub fn artifact_calls(&self) -> Vec<(String, ArtifactEndpoint)> {
        self.state.lock().artifact_calls.clone()
    }

    /// Every uploaded document.
    #[must_use]
    pub fn uploads(&self) -> Vec<DocumentUpload> {
        self.state.lock().uploads.clone()
    }

    /// Parents passed to the legacy lookup, in order.
    #[must_use]
    pub fn legacy_calls(&self) -> Vec<String> {
        self.state.lock().legacy_calls.clone()
    }
}

#[async_trait]
impl JobService for ScriptedJobService {
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ClientError> {
        let mut state = self.state.lock();
        state.submissions.push(request.clone());
        let request_id = match state.submit_results.pop_front() {
            Some(result) => result?,
            None => {
                let id = state.next_request_id;
                state.next_request_id += 1;
                id.to_string()
            }
        };
        Ok(JobHandle::new(request_id))
    }

    async fn query_status(&self, request_id: &str) -> Result<JobStatus, ClientError> {
        let mut state = self.state.lock();
        *state
            .status_queries
            .entry(request_id.to_string())
            .or_insert(0) += 1;
        let default_status = state.default_status;
        match state.statuses.get_mut(request_id).and_then(next_scripted) {
            Some(result) => result,
            None => Ok(JobStatus::new(request_id, default_status)),
        }
    }

    async fn list_recent(&self, finder: &Finder) -> Result<Vec<JobSummary>, ClientError> {
        let mut state = self.state.lock();
        state.list_calls.push(finder.clone());
        state
            .listings
            .get_mut(finder)
            .and_then(next_scripted)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_artifact(
        &self,
        job_id: &str,
        endpoint: ArtifactEndpoint,
    ) -> Result<ArtifactFetch, ClientError> {
        let mut state = self.state.lock();
        let key = (job_id.to_string(), endpoint);
        state.artifact_calls.push(key.clone());
        state
            .artifacts
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Ok(ArtifactFetch::not_available(Some(404), "not found")))
    }

    async fn upload_document(&self, upload: &DocumentUpload) -> Result<String, ClientError> {
        let mut state = self.state.lock();
        state.uploads.push(upload.clone());
        state.upload_result.clone()
    }

    async fn legacy_child_lookup(
        &self,
        parent_request_id: &str,
    ) -> Result<Option<String>, ClientError> {
        let mut state = self.state.lock();
        state.legacy_calls.push(parent_request_id.to_string());
        state
            .legacy
            .get(parent_request_id)
            .cloned()
            .unwrap_or(Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_sequential_ids_and_recording() {
        let service = ScriptedJobService::new();
        let request = JobRequest::new("pkg", "Def", vec![]);

        assert_eq!(service.submit(&request).await.unwrap().request_id, "100");
        assert_eq!(service.submit(&request).await.unwrap().request_id, "101");
        assert_eq!(service.submissions().len(), 2);
    }

    #[tokio::test]
    async fn test_last_status_repeats() {
        let service = ScriptedJobService::new();
        service.script_statuses("5", [RequestStatus::Running, RequestStatus::Error]);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(service.query_status("5").await.unwrap().status);
        }
        assert_eq!(
            seen,
            vec![RequestStatus::Running, RequestStatus::Error, RequestStatus::Error]
        );
        assert_eq!(service.status_queries("5"), 3);
    }

    #[tokio::test]
    async fn test_unscripted_answers() {
        let service = ScriptedJobService::new();
        assert!(service.list_recent(&Finder::AllJobs).await.unwrap().is_empty());
        assert_eq!(
            service
                .fetch_artifact("1", ArtifactEndpoint::JobOutput)
                .await
                .unwrap(),
            ArtifactFetch::not_available(Some(404), "not found")
        );
        assert_eq!(service.legacy_child_lookup("1").await.unwrap(), None);
    }
}
