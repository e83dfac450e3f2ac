//! Child job resolution.
//!
//! The scheduler spawns the execution-report job of an import asynchronously
//! and exposes no dependable link to it. [`ChildJobResolver`] locates it with
//! four strategies tried in fixed order; the first one producing a candidate
//! wins. [`ChildJobResolver::resolve_with_backoff`] repeats the whole pass
//! with progressive waits because the child may not exist yet.
//!
//! Each pass lists recent jobs once; the keyword and time-proximity
//! strategies both work on that listing.

mod backoff;
mod keywords;

pub use backoff::BackoffPolicy;
pub use keywords::{normalize, report_stem, KeywordMatcher};

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{Finder, JobService, RelationshipQuery};
use crate::config::{ConfigError, ResolverConfig};
use crate::core::{best_candidate, ChildJobCandidate, DiscoveryMethod, JobSummary, Timestamp};
use crate::errors::ClientError;
use crate::events::{names, EventSink};
use crate::sleeper::Sleeper;

/// Result of the retrying resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A child was located.
    Found {
        /// The winning candidate.
        candidate: ChildJobCandidate,
        /// One-based attempt that found it.
        attempt: usize,
    },
    /// Every attempt came up empty.
    NotFound {
        /// Attempts made.
        attempts: usize,
        /// Passes that ended in a lookup failure rather than an empty result.
        failed_passes: usize,
        /// Most recent lookup failure, if any pass failed.
        last_error: Option<ClientError>,
    },
}

impl Resolution {
    /// True when every pass failed, so "not found" was never actually observed.
    #[must_use]
    pub fn all_passes_failed(&self) -> bool {
        match self {
            Self::NotFound {
                attempts,
                failed_passes,
                ..
            } => *attempts > 0 && failed_passes == attempts,
            Self::Found { .. } => false,
        }
    }

    /// The candidate, if found.
    #[must_use]
    pub fn candidate(&self) -> Option<&ChildJobCandidate> {
        match self {
            Self::Found { candidate, .. } => Some(candidate),
            Self::NotFound { .. } => None,
        }
    }
}

/// Locates the child job spawned by a completed parent.
#[derive(Clone)]
pub struct ChildJobResolver {
    service: Arc<dyn JobService>,
    sleeper: Arc<dyn Sleeper>,
    events: Arc<dyn EventSink>,
    matcher: KeywordMatcher,
    proximity_window: Option<chrono::Duration>,
    backoff: BackoffPolicy,
}

impl ChildJobResolver {
    /// Creates a resolver.
    ///
    /// Fails when the configuration asks for zero attempts or a zero wait.
    pub fn new(
        service: Arc<dyn JobService>,
        sleeper: Arc<dyn Sleeper>,
        events: Arc<dyn EventSink>,
        config: &ResolverConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            service,
            sleeper,
            events,
            matcher: KeywordMatcher::new(&config.keywords, &config.target_report_identifier),
            proximity_window: chrono::Duration::from_std(config.proximity_window()).ok(),
            backoff: config.backoff_policy()?,
        })
    }

    /// The keyword matcher in use.
    #[must_use]
    pub fn matcher(&self) -> &KeywordMatcher {
        &self.matcher
    }

    /// Runs up to `max_attempts` passes, waiting before each one.
    ///
    /// A pass that fails with a transport error counts as empty. Credential
    /// rejection ends the loop with an error.
    pub async fn resolve_with_backoff(
        &self,
        parent_request_id: &str,
        parent_submitted_at: Option<Timestamp>,
    ) -> Result<Resolution, ClientError> {
        let mut last_error = None;
        let mut failed_passes = 0;
        let schedule = self.backoff.schedule();

        for (index, wait) in schedule.iter().enumerate() {
            let attempt = index + 1;
            info!(
                parent_request_id,
                attempt,
                max_attempts = schedule.len(),
                wait_secs = wait.as_secs(),
                "Waiting before child job lookup"
            );
            self.events
                .emit(
                    names::RESOLVER_ATTEMPT,
                    json!({
                        "parent_request_id": parent_request_id,
                        "attempt": attempt,
                        "wait_secs": wait.as_secs(),
                    }),
                )
                .await;
            self.sleeper.sleep(*wait).await;

            match self.resolve(parent_request_id, parent_submitted_at).await {
                Ok(Some(candidate)) => {
                    self.events
                        .emit(
                            names::RESOLVER_STRATEGY_MATCHED,
                            json!({
                                "parent_request_id": parent_request_id,
                                "attempt": attempt,
                                "strategy": candidate.discovery_method.to_string(),
                                "candidate_id": candidate.candidate_id,
                                "score": candidate.score,
                            }),
                        )
                        .await;
                    return Ok(Resolution::Found { candidate, attempt });
                }
                Ok(None) => {
                    debug!(parent_request_id, attempt, "No child job found in this pass");
                }
                Err(err) if err.is_auth() => return Err(err),
                Err(err) => {
                    warn!(parent_request_id, attempt, error = %err, "Child job lookup failed");
                    failed_passes += 1;
                    last_error = Some(err);
                }
            }
        }

        warn!(
            parent_request_id,
            attempts = schedule.len(),
            failed_passes,
            "Child job not found"
        );
        self.events
            .emit(
                names::RESOLVER_EXHAUSTED,
                json!({
                    "parent_request_id": parent_request_id,
                    "attempts": schedule.len(),
                    "failed_passes": failed_passes,
                    "last_error": last_error.as_ref().map(ToString::to_string),
                }),
            )
            .await;
        Ok(Resolution::NotFound {
            attempts: schedule.len(),
            failed_passes,
            last_error,
        })
    }

    /// One pass over the four strategies, in priority order.
    pub async fn resolve(
        &self,
        parent_request_id: &str,
        parent_submitted_at: Option<Timestamp>,
    ) -> Result<Option<ChildJobCandidate>, ClientError> {
        let recent = self.service.list_recent(&Finder::AllJobs).await?;

        let by_keyword = self.by_keyword_score(parent_request_id, &recent);
        if let Some(found) = best_candidate(by_keyword) {
            return Ok(Some(self.matched(parent_request_id, found)));
        }

        let by_link = self.by_relationship_link(parent_request_id).await?;
        if let Some(found) = best_candidate(by_link) {
            return Ok(Some(self.matched(parent_request_id, found)));
        }

        if let Some(found) = self
            .by_time_proximity(parent_request_id, parent_submitted_at, &recent)
            .await?
        {
            return Ok(Some(self.matched(parent_request_id, found)));
        }

        Ok(self
            .by_legacy_lookup(parent_request_id)
            .await
            .map(|found| self.matched(parent_request_id, found)))
    }

    fn matched(&self, parent_request_id: &str, candidate: ChildJobCandidate) -> ChildJobCandidate {
        info!(
            parent_request_id,
            strategy = %candidate.discovery_method,
            candidate_id = %candidate.candidate_id,
            job_name = %candidate.job_name,
            score = candidate.score,
            "Child job candidate selected"
        );
        candidate
    }

    fn scored(
        &self,
        parent_request_id: &str,
        rows: &[JobSummary],
        method: DiscoveryMethod,
    ) -> Vec<ChildJobCandidate> {
        rows.iter()
            .filter(|row| row.id != parent_request_id)
            .filter_map(|row| {
                let score = self.matcher.score(&row.name);
                (score > 0).then(|| {
                    ChildJobCandidate::new(
                        row.id.clone(),
                        row.name.clone(),
                        method,
                        score,
                        row.submitted_at,
                    )
                })
            })
            .collect()
    }

    /// Strategy 1: score every recent job by keyword.
    fn by_keyword_score(
        &self,
        parent_request_id: &str,
        recent: &[JobSummary],
    ) -> Vec<ChildJobCandidate> {
        let candidates = self.scored(parent_request_id, recent, DiscoveryMethod::KeywordScore);
        debug!(parent_request_id, candidates = candidates.len(), "Keyword strategy done");
        candidates
    }

    /// Strategy 2: query shapes that may expose a parent link.
    ///
    /// Shapes the scheduler rejects are skipped; only credential rejection
    /// ends the strategy early.
    async fn by_relationship_link(
        &self,
        parent_request_id: &str,
    ) -> Result<Vec<ChildJobCandidate>, ClientError> {
        for shape in RelationshipQuery::ALL {
            let rows = match self.service.list_recent(&shape.finder(parent_request_id)).await {
                Ok(rows) => rows,
                Err(err) if err.is_auth() => return Err(err),
                Err(err) => {
                    debug!(
                        parent_request_id,
                        shape = shape.as_str(),
                        error = %err,
                        "Relationship query not usable"
                    );
                    continue;
                }
            };
            let candidates =
                self.scored(parent_request_id, &rows, DiscoveryMethod::RelationshipLink);
            if !candidates.is_empty() {
                return Ok(candidates);
            }
        }
        Ok(Vec::new())
    }

    /// Strategy 3: the matching job in `recent` submitted soonest after the parent.
    ///
    /// The parent's time comes from `recent` when it is listed there, and from
    /// a status query otherwise.
    async fn by_time_proximity(
        &self,
        parent_request_id: &str,
        parent_submitted_at: Option<Timestamp>,
        recent: &[JobSummary],
    ) -> Result<Option<ChildJobCandidate>, ClientError> {
        let listed_time = || {
            recent
                .iter()
                .find(|row| row.id == parent_request_id)
                .and_then(|row| row.submitted_at)
        };
        let parent_time = match parent_submitted_at.or_else(listed_time) {
            Some(time) => Some(time),
            None => self
                .service
                .list_recent(&Finder::job_status(parent_request_id))
                .await?
                .into_iter()
                .find(|row| row.id == parent_request_id)
                .and_then(|row| row.submitted_at),
        };
        let Some(parent_time) = parent_time else {
            debug!(parent_request_id, "Parent submission time unknown");
            return Ok(None);
        };

        let window_end = self
            .proximity_window
            .and_then(|window| parent_time.checked_add_signed(window));
        Ok(self
            .scored(parent_request_id, recent, DiscoveryMethod::TimeProximity)
            .into_iter()
            .filter(|c| {
                c.submitted_at.is_some_and(|t| {
                    t > parent_time && window_end.map_or(true, |end| t <= end)
                })
            })
            .min_by(|a, b| {
                a.submitted_at
                    .cmp(&b.submitted_at)
                    .then_with(|| a.rank_cmp(b))
            }))
    }

    /// Strategy 4: the legacy report service. Every failure means "no candidate".
    async fn by_legacy_lookup(&self, parent_request_id: &str) -> Option<ChildJobCandidate> {
        match self.service.legacy_child_lookup(parent_request_id).await {
            Ok(Some(child_id)) if !child_id.is_empty() && child_id != parent_request_id => {
                Some(ChildJobCandidate::new(
                    child_id,
                    String::new(),
                    DiscoveryMethod::LegacyLookup,
                    0,
                    None,
                ))
            }
            Ok(_) => None,
            Err(err) => {
                debug!(parent_request_id, error = %err, "Legacy lookup failed; ignoring");
                None
            }
        }
    }
}
