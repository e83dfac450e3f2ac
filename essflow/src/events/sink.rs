//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, Level};

/// Payload keys that identify what an event is about, most specific first.
const CORRELATION_KEYS: [&str; 4] = ["request_id", "job_id", "parent_request_id", "run_id"];

/// Receives orchestration events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits `name`, one of [`super::names`], with its JSON payload.
    async fn emit(&self, name: &'static str, data: Value);
}

/// One event kept by [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Event name.
    pub name: &'static str,
    /// Payload as emitted.
    pub data: Value,
}

/// The job, parent or run an event payload refers to.
fn correlation_id(data: &Value) -> Option<&str> {
    CORRELATION_KEYS
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _name: &'static str, _data: Value) {}
}

/// Writes events to `tracing`, tagged with the job they concern.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`. Anything other than DEBUG logs at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, name: &'static str, data: Value) {
        let subject = correlation_id(&data).unwrap_or("-");
        if self.level == Level::DEBUG {
            debug!(event = name, subject, event_data = %data, "Orchestration event");
        } else {
            info!(event = name, subject, event_data = %data, "Orchestration event");
        }
    }
}

/// Keeps every event in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().clone()
    }

    /// Event names only, in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(|event| event.name).collect()
    }

    /// Events whose name starts with `prefix`, e.g. `"resolver."`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| event.name.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Events concerning one job, parent or run id.
    #[must_use]
    pub fn events_for(&self, subject: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| correlation_id(&event.data) == Some(subject))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, name: &'static str, data: Value) {
        self.events.write().push(RecordedEvent { name, data });
    }
}
