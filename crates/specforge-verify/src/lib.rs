//! Post-generation verification for specforge.
//!
//! A [`Verifier`] runs six independent checks against a materialized project:
//! the test suite, a startup smoke test, a container build, route coverage
//! against the design, test meaningfulness and project structure. Each check
//! yields a [`CheckResult`]; the [`VerificationReport`] combines them.
//!
//! Project code only ever runs inside a per-project virtual environment (see
//! [`prepare_environment`]).

mod checks;
mod environment;
mod pytest;
mod report;
mod verifier;

pub use environment::{PythonEnv, TEST_PACKAGES, VENV_DIR, prepare_environment, venv_python};
pub use pytest::{PytestCounts, parse_pytest_counts};
pub use report::{CheckResult, CheckStatus, TestRunSummary, VerificationReport};
pub use verifier::Verifier;
