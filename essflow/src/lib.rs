//! # Essflow
//!
//! Orchestration of dependent jobs on an ERP enterprise scheduler.
//!
//! Essflow drives a fixed import pipeline against the scheduler's REST
//! integration resource and then recovers the output of a job the scheduler
//! spawned on its own:
//!
//! - **Submission coordination**: upload a document, run the interface loader,
//!   run the AutoInvoice import, each stage gated on the previous one succeeding
//! - **Status polling**: one bounded wait-until-terminal primitive for every stage
//! - **Child job resolution**: four ordered discovery strategies repeated with
//!   progressive backoff
//! - **Artifact retrieval**: three download endpoints tried in order
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use essflow::prelude::*;
//!
//! let service = Arc::new(ServiceConfig::from_env()?);
//! let events = Arc::new(NoOpEventSink);
//! let workflow = ReportWorkflow::connect(service, WorkflowConfig::default(), events)?;
//!
//! let upload = DocumentUpload::zip("AutoInvoice.zip", bytes);
//! let report = workflow.run(&upload, &ImportParameters::default()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifact;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod poller;
pub mod resolver;
pub mod sleeper;
pub mod testing;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifact::{ArtifactRetriever, RetrievedArtifact};
    pub use crate::client::{
        ArtifactEndpoint, ArtifactFetch, DocumentUpload, ErpClient, Finder, JobService,
        RelationshipQuery,
    };
    pub use crate::config::{
        ArtifactConfig, ImportParameters, PollConfig, ResolverConfig, ServiceConfig,
        WorkflowConfig,
    };
    pub use crate::coordinator::{AbortedRun, CompletedRun, SubmissionCoordinator};
    pub use crate::core::{
        ChildJobCandidate, DiscoveryMethod, JobHandle, JobRequest, JobStatus, JobSummary,
        PipelineRun, PipelineState, RequestStatus, Timestamp,
    };
    pub use crate::errors::{ClientError, ErrorKind, ErrorSuggestions, OrchestrationError, Step};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::poller::{PollOutcome, StatusPoller};
    pub use crate::resolver::{BackoffPolicy, ChildJobResolver, Resolution};
    pub use crate::sleeper::{Sleeper, TokioSleeper};
    pub use crate::workflow::{ArtifactHandler, ReportWorkflow, WorkflowReport};
}
