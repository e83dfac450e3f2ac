//! Child job candidates and their ranking.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::timestamps::Timestamp;

/// How a candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryMethod {
    /// Keyword score over recently listed jobs.
    KeywordScore,
    /// A listing query exposing a parent/root/set link.
    RelationshipLink,
    /// Submitted shortly after the parent.
    TimeProximity,
    /// The legacy report service.
    LegacyLookup,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeywordScore => write!(f, "keyword_score"),
            Self::RelationshipLink => write!(f, "relationship_link"),
            Self::TimeProximity => write!(f, "time_proximity"),
            Self::LegacyLookup => write!(f, "legacy_lookup"),
        }
    }
}

/// A possible child job of a completed parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildJobCandidate {
    /// Request id of the candidate.
    pub candidate_id: String,
    /// Job name, empty when the discovery source did not report one.
    pub job_name: String,
    /// Strategy that produced the candidate.
    pub discovery_method: DiscoveryMethod,
    /// Keyword match score.
    pub score: u32,
    /// Submission time, if known.
    pub submitted_at: Option<Timestamp>,
}

impl ChildJobCandidate {
    /// Creates a candidate.
    #[must_use]
    pub fn new(
        candidate_id: impl Into<String>,
        job_name: impl Into<String>,
        discovery_method: DiscoveryMethod,
        score: u32,
        submitted_at: Option<Timestamp>,
    ) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            job_name: job_name.into(),
            discovery_method,
            score,
            submitted_at,
        }
    }

    /// Ranking order: higher score first, then most recent submission first.
    ///
    /// Candidates without a submission time sort after those with one.
    #[must_use]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| other.submitted_at.cmp(&self.submitted_at))
    }
}

/// Sorts candidates best-first.
pub fn rank_candidates(candidates: &mut [ChildJobCandidate]) {
    candidates.sort_by(ChildJobCandidate::rank_cmp);
}

/// Returns the best candidate, if any.
#[must_use]
pub fn best_candidate(candidates: Vec<ChildJobCandidate>) -> Option<ChildJobCandidate> {
    candidates.into_iter().min_by(ChildJobCandidate::rank_cmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn at(minutes: i64) -> Option<Timestamp> {
        Some(Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap() + Duration::minutes(minutes))
    }

    fn candidate(id: &str, score: u32, minutes: i64) -> ChildJobCandidate {
        ChildJobCandidate::new(id, "JOB", DiscoveryMethod::KeywordScore, score, at(minutes))
    }

    #[test]
    fn test_higher_score_wins() {
        let best = best_candidate(vec![
            candidate("a", 1, 50),
            candidate("b", 3, 0),
            candidate("c", 0, 90),
        ])
        .unwrap();
        assert_eq!(best.candidate_id, "b");
    }

    #[test]
    fn test_tie_broken_by_recency() {
        let best = best_candidate(vec![candidate("old", 2, 1), candidate("new", 2, 5)]).unwrap();
        assert_eq!(best.candidate_id, "new");
    }

    #[test]
    fn test_missing_time_sorts_last_on_tie() {
        let mut undated = candidate("undated", 2, 0);
        undated.submitted_at = None;
        let mut all = vec![undated, candidate("dated", 2, 0)];
        rank_candidates(&mut all);
        assert_eq!(all[0].candidate_id, "dated");
    }

    #[test]
    fn test_empty_has_no_best() {
        assert!(best_candidate(Vec::new()).is_none());
    }

    #[test]
    fn test_discovery_method_serialize() {
        let json = serde_json::to_string(&DiscoveryMethod::TimeProximity).unwrap();
        assert_eq!(json, r#""TIME_PROXIMITY""#);
        assert_eq!(DiscoveryMethod::LegacyLookup.to_string(), "legacy_lookup");
    }
}
