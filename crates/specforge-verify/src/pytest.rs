//! Counting results in pytest's terminal output.

use once_cell::sync::Lazy;
use regex::Regex;

static PASSED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) passed").expect("valid regex"));
static FAILED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) failed").expect("valid regex"));
static ERRORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) errors?\b").expect("valid regex"));

/// Counts from pytest's final summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PytestCounts {
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
}

impl PytestCounts {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.errors
    }
}

/// Parse pass/fail/error counts. The last match of each wins, so per-test
/// lines that happen to mention "passed" do not override the summary.
///
/// A run with a nonzero exit and no counted tests (collection crash, import
/// error) is recorded as one error so it never looks like an empty success.
#[must_use]
pub fn parse_pytest_counts(output: &str, exit_code: Option<i32>) -> PytestCounts {
    let last = |re: &Regex| -> u32 {
        re.captures_iter(output)
            .last()
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0)
    };
    let mut counts = PytestCounts {
        passed: last(&PASSED),
        failed: last(&FAILED),
        errors: last(&ERRORS),
    };
    if counts.total() == 0 && exit_code != Some(0) {
        counts.errors = 1;
    }
    counts
}
