//! Per-run progress events.
//!
//! Every run carries its own [`ProgressSink`]; there is no process-wide
//! subscriber list, so observers of concurrent runs only see their own events.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use strum::{Display, EnumString, IntoStaticStr};

/// Pipeline stage that produced an event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Design,
    Generation,
    Testing,
    Verification,
    Workflow,
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// Short machine-friendly event name such as `batch_start` or `check_done`
    pub event: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProgressEvent {
    pub fn new(stage: Stage, event: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            event: event.into(),
            message: message.into(),
            iteration: None,
            data: None,
        }
    }

    #[must_use]
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Receiver for a single run's progress events.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Sink that records events in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: &ProgressEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::Arc;

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Verification.to_string(), "verification");
        assert_eq!(Stage::from_str("generation").unwrap(), Stage::Generation);
    }

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let event = ProgressEvent::new(Stage::Design, "start", "Extracting design");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stage"], "design");
        assert!(json.get("iteration").is_none());
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_collecting_sinks_are_isolated() {
        let a = Arc::new(CollectingSink::new());
        let b = Arc::new(CollectingSink::new());

        a.emit(&ProgressEvent::new(Stage::Workflow, "x", "one").with_iteration(1));
        b.emit(&ProgressEvent::new(Stage::Workflow, "y", "two"));
        b.emit(&ProgressEvent::new(Stage::Workflow, "z", "three"));

        assert_eq!(a.events().len(), 1);
        assert_eq!(a.events()[0].iteration, Some(1));
        assert_eq!(b.events().len(), 2);
    }
}
