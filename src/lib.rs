//! specforge - turn a Markdown product spec into a tested, container-ready
//! FastAPI service.
//!
//! A run extracts a structured design from the spec, splits it into ordered
//! generation batches, generates every file through a provider, and verifies
//! the result with a fixed check battery. Failing checks are digested into
//! feedback for the next iteration, up to a bounded number of iterations.
//!
//! # Library use
//!
//! ```no_run
//! use std::sync::Arc;
//! use specforge::{RunConfig, WorkflowController};
//! use specforge::llm::gateway_from_run_config;
//! use specforge_runner::NativeRunner;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = RunConfig::builder().output_dir("./output").build()?;
//! let gateway = Arc::new(gateway_from_run_config(&config)?);
//! let controller = WorkflowController::new(config, gateway, Arc::new(NativeRunner::new()));
//! let summary = controller.run("# My service\n...").await?;
//! println!("{}", summary.outcome);
//! # Ok(())
//! # }
//! ```
//!
//! The member crates are re-exported as modules for lower-level access.

pub mod cli;

pub use specforge_config::{CheckKind, RunConfig, RunConfigBuilder};
pub use specforge_design::StructuredDesign;
pub use specforge_engine::{RunOutcome, RunSummary, WorkflowController};
pub use specforge_utils::{ExitCode, SpecforgeError};
pub use specforge_verify::{VerificationReport, Verifier};

pub use specforge_config as config;
pub use specforge_design as design;
pub use specforge_engine as engine;
pub use specforge_llm as llm;
pub use specforge_verify as verify;
