//! Lifecycle events.
//!
//! Components receive an [`EventSink`] in their constructor and emit the
//! events named in [`names`]. There is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// Event names emitted by the orchestration components.
pub mod names {
    /// A job was accepted by the scheduler.
    pub const JOB_SUBMITTED: &str = "job.submitted";
    /// A status query returned a non-terminal status.
    pub const JOB_POLLED: &str = "job.polled";
    /// A status query returned a terminal status.
    pub const JOB_TERMINAL: &str = "job.terminal";
    /// The polling budget ran out.
    pub const JOB_POLL_TIMEOUT: &str = "job.poll_timeout";
    /// A pipeline stage finished successfully.
    pub const STAGE_COMPLETED: &str = "pipeline.stage_completed";
    /// The pipeline aborted.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// The pipeline reached `DONE`.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A resolver pass started.
    pub const RESOLVER_ATTEMPT: &str = "resolver.attempt";
    /// A resolver strategy produced the winning candidate.
    pub const RESOLVER_STRATEGY_MATCHED: &str = "resolver.strategy_matched";
    /// Every resolver pass came up empty.
    pub const RESOLVER_EXHAUSTED: &str = "resolver.exhausted";
    /// One artifact endpoint yielded nothing.
    pub const ARTIFACT_ENDPOINT_FAILED: &str = "artifact.endpoint_failed";
    /// An artifact was downloaded.
    pub const ARTIFACT_RETRIEVED: &str = "artifact.retrieved";
}
