//! Workflow controller for specforge.
//!
//! A run extracts a design from the spec (or reuses the cached one), plans
//! generation batches once, then alternates generation and verification until
//! the battery passes, the iteration budget runs out, or the run is cancelled.
//! The outcome and per-iteration history are written to
//! `_specforge_report.json` in the output directory.

mod analysis;
mod cache;
mod controller;
mod materialize;
mod state;
mod summary;

pub use analysis::{analysis_prompt, analyze_failures};
pub use cache::{cached_design, load_design_file, spec_hash, store_design};
pub use controller::WorkflowController;
pub use materialize::{MaterializeStats, materialize};
pub use state::{IterationHistory, IterationRecord, RunOutcome, WorkflowState};
pub use summary::{REPORT_FILE, RunSummary};
