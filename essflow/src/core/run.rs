//! Pipeline run record and its state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::job::{JobHandle, JobRequest, JobStatus};
use super::timestamps::Timestamp;

/// Coordinator state. `Failed` is absorbing and reachable from any
/// non-terminal state; `Done` is reachable only from `Importing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Staging the document in the content store.
    Uploading,
    /// Running the interface loader.
    LoadingInterface,
    /// Running the import job.
    Importing,
    /// Both jobs reached a success status.
    Done,
    /// A stage aborted the run.
    Failed,
}

impl PipelineState {
    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The state that follows a successful stage.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Uploading => Some(Self::LoadingInterface),
            Self::LoadingInterface => Some(Self::Importing),
            Self::Importing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Whether `self -> to` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploading => write!(f, "UPLOADING"),
            Self::LoadingInterface => write!(f, "LOADING_INTERFACE"),
            Self::Importing => write!(f, "IMPORTING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Illegal pipeline transition: {from} -> {to}")]
pub struct TransitionError {
    /// Current state.
    pub from: PipelineState,
    /// Requested state.
    pub to: PipelineState,
}

/// One polled stage: what was submitted, the handle, and the final status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage label, e.g. `interface` or `autoinvoice`.
    pub stage: String,
    /// The submitted request.
    pub request: JobRequest,
    /// The handle returned on submission.
    pub handle: JobHandle,
    /// Last observed status; `None` when polling timed out before any answer.
    pub status: Option<JobStatus>,
}

/// Overall result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Still in progress.
    Pending,
    /// Reached `Done`.
    Completed,
    /// Aborted at the named step.
    Aborted {
        /// Step label (`upload`, `interface_poll`, ...).
        step: String,
    },
}

/// Record of one orchestration call. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Local run id, for log correlation only.
    pub run_id: Uuid,
    /// Current state.
    pub state: PipelineState,
    /// Document id returned by the upload stage.
    pub document_id: Option<String>,
    /// Polled stages in submission order.
    pub stages: Vec<StageRecord>,
    /// Overall outcome.
    pub outcome: RunOutcome,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run reached a terminal state.
    pub finished_at: Option<Timestamp>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    /// Starts a new run in `Uploading`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: PipelineState::Uploading,
            document_id: None,
            stages: Vec::new(),
            outcome: RunOutcome::Pending,
            started_at: chrono::Utc::now(),
            finished_at: None,
        }
    }

    /// Moves to `to`, rejecting illegal transitions.
    pub fn transition(&mut self, to: PipelineState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError { from: self.state, to });
        }
        self.state = to;
        if to.is_terminal() {
            self.finished_at = Some(chrono::Utc::now());
        }
        if to == PipelineState::Done {
            self.outcome = RunOutcome::Completed;
        }
        Ok(())
    }

    /// Marks the run failed at `step`. No-op once terminal.
    pub fn fail(&mut self, step: impl Into<String>) {
        if self.transition(PipelineState::Failed).is_ok() {
            self.outcome = RunOutcome::Aborted { step: step.into() };
        }
    }

    /// Appends a stage record.
    pub fn record(&mut self, record: StageRecord) {
        self.stages.push(record);
    }

    /// Request id of the named stage, if it was submitted.
    #[must_use]
    pub fn job_id(&self, stage: &str) -> Option<&str> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.handle.request_id.as_str())
    }
}
