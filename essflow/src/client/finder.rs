//! Typed finder expressions for the integration resource's list queries.

use serde::{Deserialize, Serialize};
use std::fmt;

const STATUS_FINDER: &str = "ESSJobStatusRF";
const EXECUTION_DETAILS_FINDER: &str = "ESSJobExecutionDetailsRF";

/// Which files an execution-details query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    /// Every output file of the request.
    All,
    /// The request's execution report only.
    Out,
}

impl FileType {
    /// Wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Out => "OUT",
        }
    }
}

/// A list query against the integration resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finder {
    /// Status of one request.
    JobStatus {
        /// Request to query.
        request_id: String,
    },
    /// Every recently submitted request visible to the user.
    AllJobs,
    /// Requests whose parent is the given request.
    ParentRequest {
        /// Parent request id.
        request_id: String,
    },
    /// Requests whose root is the given request.
    RootRequest {
        /// Root request id.
        request_id: String,
    },
    /// Requests belonging to the given request set.
    RequestSet {
        /// Request set id.
        request_id: String,
    },
    /// Output files of a request.
    ExecutionDetails {
        /// Request whose files are listed.
        request_id: String,
        /// Which files.
        file_type: FileType,
    },
}

impl Finder {
    /// Status query for one request.
    #[must_use]
    pub fn job_status(request_id: impl Into<String>) -> Self {
        Self::JobStatus {
            request_id: request_id.into(),
        }
    }

    /// Output-files query for one request.
    #[must_use]
    pub fn execution_details(request_id: impl Into<String>, file_type: FileType) -> Self {
        Self::ExecutionDetails {
            request_id: request_id.into(),
            file_type,
        }
    }

    /// The `finder` query-parameter value.
    #[must_use]
    pub fn expression(&self) -> String {
        match self {
            Self::JobStatus { request_id } => format!("{STATUS_FINDER};requestId={request_id}"),
            Self::AllJobs => STATUS_FINDER.to_string(),
            Self::ParentRequest { request_id } => {
                format!("{STATUS_FINDER};parentRequestId={request_id}")
            }
            Self::RootRequest { request_id } => {
                format!("{STATUS_FINDER};rootRequestId={request_id}")
            }
            Self::RequestSet { request_id } => {
                format!("{STATUS_FINDER};requestSetId={request_id}")
            }
            Self::ExecutionDetails {
                request_id,
                file_type,
            } => format!(
                "{EXECUTION_DETAILS_FINDER};requestId={request_id},fileType={}",
                file_type.as_str()
            ),
        }
    }
}

impl fmt::Display for Finder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

/// Query shapes that may expose a link from a parent request to its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipQuery {
    /// `parentRequestId`.
    Parent,
    /// `rootRequestId`.
    Root,
    /// `requestSetId`.
    RequestSet,
}

impl RelationshipQuery {
    /// Every shape, in the order they are tried.
    pub const ALL: [Self; 3] = [Self::Parent, Self::Root, Self::RequestSet];

    /// Builds the finder for `parent_request_id`.
    #[must_use]
    pub fn finder(&self, parent_request_id: &str) -> Finder {
        let request_id = parent_request_id.to_string();
        match self {
            Self::Parent => Finder::ParentRequest { request_id },
            Self::Root => Finder::RootRequest { request_id },
            Self::RequestSet => Finder::RequestSet { request_id },
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Root => "root",
            Self::RequestSet => "request_set",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expressions() {
        assert_eq!(
            Finder::job_status("100").expression(),
            "ESSJobStatusRF;requestId=100"
        );
        assert_eq!(Finder::AllJobs.expression(), "ESSJobStatusRF");
        assert_eq!(
            Finder::execution_details("7", FileType::Out).to_string(),
            "ESSJobExecutionDetailsRF;requestId=7,fileType=OUT"
        );
    }

    #[test]
    fn test_relationship_shapes_in_order() {
        let expressions: Vec<String> = RelationshipQuery::ALL
            .iter()
            .map(|q| q.finder("500").expression())
            .collect();
        assert_eq!(
            expressions,
            vec![
                "ESSJobStatusRF;parentRequestId=500".to_string(),
                "ESSJobStatusRF;rootRequestId=500".to_string(),
                "ESSJobStatusRF;requestSetId=500".to_string(),
            ]
        );
    }
}
