//! Wait-until-terminal primitive shared by every stage.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::JobService;
use crate::config::PollConfig;
use crate::core::JobStatus;
use crate::errors::ClientError;
use crate::events::{names, EventSink};
use crate::sleeper::Sleeper;

/// Shortest wait between queries; a zero interval would never accumulate.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How a poll ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A terminal status was observed.
    Terminal(JobStatus),
    /// The budget ran out first.
    TimedOut {
        /// Accumulated waiting.
        elapsed: Duration,
        /// Last status a query returned, if any succeeded.
        last_status: Option<JobStatus>,
    },
}

impl PollOutcome {
    /// The terminal status, if one was observed.
    #[must_use]
    pub fn terminal(&self) -> Option<&JobStatus> {
        match self {
            Self::Terminal(status) => Some(status),
            Self::TimedOut { .. } => None,
        }
    }
}

/// Polls a request until it reaches a terminal status or the budget runs out.
///
/// Carries no pipeline knowledge; the caller decides what a terminal status
/// means.
#[derive(Clone)]
pub struct StatusPoller {
    service: Arc<dyn JobService>,
    sleeper: Arc<dyn Sleeper>,
    events: Arc<dyn EventSink>,
}

impl StatusPoller {
    /// Creates a poller.
    #[must_use]
    pub fn new(
        service: Arc<dyn JobService>,
        sleeper: Arc<dyn Sleeper>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            service,
            sleeper,
            events,
        }
    }

    /// Polls with a [`PollConfig`] budget.
    pub async fn poll(
        &self,
        request_id: &str,
        config: &PollConfig,
    ) -> Result<PollOutcome, ClientError> {
        self.poll_until_terminal(request_id, config.timeout(), config.interval())
            .await
    }

    /// Queries `request_id` until terminal, sleeping `interval` between queries.
    ///
    /// Transport failures, malformed responses and not-found answers count as
    /// "try again next interval"; their waits still count toward `timeout`.
    /// Credential rejection is returned immediately. Once a terminal status is
    /// seen no further query is made.
    pub async fn poll_until_terminal(
        &self,
        request_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<PollOutcome, ClientError> {
        let interval = interval.max(MIN_POLL_INTERVAL);
        let mut elapsed = Duration::ZERO;
        let mut last_status: Option<JobStatus> = None;
        let mut queries: u32 = 0;

        loop {
            queries += 1;
            match self.service.query_status(request_id).await {
                Ok(status) if status.is_terminal() => {
                    info!(
                        request_id,
                        status = %status.status,
                        queries,
                        elapsed_secs = elapsed.as_secs(),
                        "Job reached terminal status"
                    );
                    self.events
                        .emit(
                            names::JOB_TERMINAL,
                            json!({
                                "request_id": request_id,
                                "status": status.status.as_str(),
                                "elapsed_secs": elapsed.as_secs(),
                            }),
                        )
                        .await;
                    return Ok(PollOutcome::Terminal(status));
                }
                Ok(status) => {
                    debug!(request_id, status = %status.status, queries, "Job not finished");
                    self.events
                        .emit(
                            names::JOB_POLLED,
                            json!({
                                "request_id": request_id,
                                "status": status.status.as_str(),
                            }),
                        )
                        .await;
                    last_status = Some(status);
                }
                Err(err) if err.is_auth() => return Err(err),
                Err(err) => {
                    warn!(
                        request_id,
                        error = %err,
                        queries,
                        "Status query failed; will retry next interval"
                    );
                }
            }

            self.sleeper.sleep(interval).await;
            elapsed += interval;

            if elapsed >= timeout {
                warn!(
                    request_id,
                    elapsed_secs = elapsed.as_secs(),
                    queries,
                    "Polling budget exhausted"
                );
                self.events
                    .emit(
                        names::JOB_POLL_TIMEOUT,
                        json!({
                            "request_id": request_id,
                            "elapsed_secs": elapsed.as_secs(),
                            "last_status": last_status.as_ref().map(|s| s.status.as_str()),
                        }),
                    )
                    .await;
                return Ok(PollOutcome::TimedOut {
                    elapsed,
                    last_status,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockJobService;
    use crate::core::RequestStatus;
    use crate::events::{CollectingEventSink, NoOpEventSink};
    use crate::testing::{RecordingSleeper, ScriptedJobService};
    use mockall::Sequence;
    use pretty_assertions::assert_eq;

    fn poller(service: Arc<dyn JobService>, sleeper: Arc<RecordingSleeper>) -> StatusPoller {
        StatusPoller::new(service, sleeper, Arc::new(NoOpEventSink))
    }

    #[tokio::test]
    async fn test_running_twice_then_succeeded() {
        let service = Arc::new(ScriptedJobService::new());
        service.script_statuses(
            "100",
            [RequestStatus::Running, RequestStatus::Running, RequestStatus::Succeeded],
        );
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = poller(service.clone(), sleeper.clone())
            .poll_until_terminal("100", Duration::from_secs(600), Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(outcome.terminal().unwrap().status, RequestStatus::Succeeded);
        assert_eq!(service.status_queries("100"), 3);
        assert_eq!(sleeper.total(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_no_query_after_terminal() {
        let mut mock = MockJobService::new();
        let mut seq = Sequence::new();
        mock.expect_query_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(JobStatus::new(id, RequestStatus::Running)));
        mock.expect_query_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(JobStatus::new(id, RequestStatus::Error)));

        let sleeper = Arc::new(RecordingSleeper::new());
        let outcome = poller(Arc::new(mock), sleeper.clone())
            .poll_until_terminal("7", Duration::from_secs(600), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(outcome.terminal().unwrap().status, RequestStatus::Error);
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(10)]);
    }

    #[tokio::test]
    async fn test_timeout_bounds_total_wait() {
        let service = Arc::new(ScriptedJobService::new());
        service.script_statuses("9", [RequestStatus::Running]);
        let sleeper = Arc::new(RecordingSleeper::new());
        let timeout = Duration::from_secs(100);
        let interval = Duration::from_secs(30);

        let outcome = poller(service.clone(), sleeper.clone())
            .poll_until_terminal("9", timeout, interval)
            .await
            .unwrap();

        match outcome {
            PollOutcome::TimedOut {
                elapsed,
                last_status,
            } => {
                assert_eq!(elapsed, Duration::from_secs(120));
                assert_eq!(last_status.unwrap().status, RequestStatus::Running);
            }
            PollOutcome::Terminal(status) => panic!("unexpected terminal status {status:?}"),
        }
        assert!(sleeper.total() <= timeout + interval);
        // One query per interval, none after the budget is spent
        assert_eq!(service.status_queries("9"), 4);
    }

    #[tokio::test]
    async fn test_transport_error_is_retried_next_interval() {
        let mut mock = MockJobService::new();
        let mut seq = Sequence::new();
        mock.expect_query_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ClientError::transport("status", "connection reset")));
        mock.expect_query_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Err(ClientError::not_found(id)));
        mock.expect_query_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(JobStatus::new(id, RequestStatus::Warning)));

        let sleeper = Arc::new(RecordingSleeper::new());
        let outcome = poller(Arc::new(mock), sleeper.clone())
            .poll_until_terminal("3", Duration::from_secs(600), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.terminal().unwrap().status, RequestStatus::Warning);
        assert_eq!(sleeper.total(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_transport_errors_still_time_out() {
        let mut mock = MockJobService::new();
        mock.expect_query_status()
            .returning(|_| Err(ClientError::transport("status", "unreachable")));

        let sleeper = Arc::new(RecordingSleeper::new());
        let outcome = poller(Arc::new(mock), sleeper)
            .poll_until_terminal("3", Duration::from_secs(20), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                elapsed: Duration::from_secs(20),
                last_status: None,
            }
        );
    }

    #[tokio::test]
    async fn test_auth_error_aborts_immediately() {
        let mut mock = MockJobService::new();
        mock.expect_query_status().times(1).returning(|_| {
            Err(ClientError::Auth {
                endpoint: "status".to_string(),
                status: 401,
                message: "expired".to_string(),
            })
        });

        let sleeper = Arc::new(RecordingSleeper::new());
        let err = poller(Arc::new(mock), sleeper.clone())
            .poll_until_terminal("3", Duration::from_secs(600), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let service = Arc::new(ScriptedJobService::new());
        service.script_statuses("1", [RequestStatus::Running, RequestStatus::Succeeded]);
        let events = Arc::new(CollectingEventSink::new());
        let poller = StatusPoller::new(service, Arc::new(RecordingSleeper::new()), events.clone());

        poller.poll("1", &PollConfig::default()).await.unwrap();

        assert_eq!(events.event_types(), vec!["job.polled", "job.terminal"]);
        assert_eq!(events.events_for("1").len(), 2);
    }
}
