//! Core data types shared by every component.

mod candidate;
mod job;
mod run;
mod timestamps;

pub use candidate::{best_candidate, rank_candidates, ChildJobCandidate, DiscoveryMethod};
pub use job::{JobHandle, JobRequest, JobStatus, JobSummary, RequestStatus};
pub use run::{PipelineRun, PipelineState, RunOutcome, StageRecord, TransitionError};
pub use timestamps::{parse_submission_time, Timestamp, TimestampError};
