use std::sync::Arc;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::json;
use specforge_utils::{ExitCode, ProgressEvent, ProgressSink, Stage};
use specforge_verify::VerificationReport;
use strum::Display;
use tracing::debug;

/// Where the controller is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowState {
    Designing,
    Generating,
    Verifying,
    Repairing,
    Succeeded,
    DesignFailed,
    Exhausted,
    Cancelled,
}

impl WorkflowState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::DesignFailed | Self::Exhausted | Self::Cancelled
        )
    }

    /// Whether moving to `next` is a legal step of the state machine.
    #[must_use]
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, next) {
            (_, Cancelled) => !self.is_terminal(),
            (Designing, Generating | DesignFailed) => true,
            (Generating, Verifying | Repairing | Exhausted) => true,
            (Verifying, Succeeded | Repairing | Exhausted) => true,
            (Repairing, Generating) => true,
            _ => false,
        }
    }
}

/// The current state of one run. Every move is checked against
/// [`WorkflowState::can_transition_to`] and reported as a `state` event.
pub(crate) struct StateTracker {
    state: WorkflowState,
    progress: Arc<dyn ProgressSink>,
}

impl StateTracker {
    pub(crate) fn start(progress: Arc<dyn ProgressSink>) -> Self {
        let tracker = Self {
            state: WorkflowState::Designing,
            progress,
        };
        tracker.report(None, None);
        tracker
    }

    pub(crate) fn current(&self) -> WorkflowState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: WorkflowState, iteration: Option<u32>) -> Result<()> {
        let from = self.state;
        if !from.can_transition_to(next) {
            bail!("Illegal workflow transition from {from} to {next}");
        }
        debug!(%from, to = %next, "Workflow state changed");
        self.state = next;
        self.report(Some(from), iteration);
        Ok(())
    }

    /// Move to the terminal state of `outcome`.
    pub(crate) fn finish(&mut self, outcome: RunOutcome, iteration: Option<u32>) -> Result<RunOutcome> {
        self.advance(outcome.state(), iteration)?;
        Ok(outcome)
    }

    fn report(&self, from: Option<WorkflowState>, iteration: Option<u32>) {
        let mut event = ProgressEvent::new(Stage::Workflow, "state", self.state.to_string())
            .with_data(json!({ "from": from, "to": self.state }));
        if let Some(iteration) = iteration {
            event = event.with_iteration(iteration);
        }
        self.progress.emit(&event);
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    DesignFailed,
    Exhausted,
    Cancelled,
}

impl RunOutcome {
    #[must_use]
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Succeeded => ExitCode::SUCCESS,
            Self::DesignFailed => ExitCode::EXTRACTION_FAILED,
            Self::Exhausted => ExitCode::EXHAUSTED,
            Self::Cancelled => ExitCode::CANCELLED,
        }
    }

    #[must_use]
    pub fn state(self) -> WorkflowState {
        match self {
            Self::Succeeded => WorkflowState::Succeeded,
            Self::DesignFailed => WorkflowState::DesignFailed,
            Self::Exhausted => WorkflowState::Exhausted,
            Self::Cancelled => WorkflowState::Cancelled,
        }
    }
}

/// One generate-then-verify pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    /// Paths of the artifact set that was materialized, empty when generation failed
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
    /// Raw test output; only the latest record keeps it
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub test_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<VerificationReport>,
    /// Digest carried into the next iteration's prompts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl IterationRecord {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.report.as_ref().is_some_and(|r| r.passed)
    }
}

/// Append-only iteration history. Raw output of older iterations is dropped
/// when a new one is recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IterationHistory(Vec<IterationRecord>);

impl IterationHistory {
    pub fn push(&mut self, record: IterationRecord) {
        for older in &mut self.0 {
            older.test_output.clear();
            if let Some(report) = older.report.as_mut()
                && let Some(run) = report.test_run.as_mut()
            {
                run.output.clear();
            }
        }
        self.0.push(record);
    }

    #[must_use]
    pub fn latest(&self) -> Option<&IterationRecord> {
        self.0.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &IterationRecord> {
        self.0.iter()
    }
}
