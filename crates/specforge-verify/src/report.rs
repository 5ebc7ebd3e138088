use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use specforge_config::CheckKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

impl CheckStatus {
    fn symbol(self) -> &'static str {
        match self {
            Self::Pass => "✓ pass",
            Self::Fail => "✗ fail",
            Self::Skipped => "- skip",
        }
    }
}

/// Outcome of one verification check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub kind: CheckKind,
    pub status: CheckStatus,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<serde_json::Value>,
}

impl CheckResult {
    fn new(kind: CheckKind, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: kind.title().to_string(),
            kind,
            status,
            detail: detail.into(),
            evidence: None,
        }
    }

    pub fn pass(kind: CheckKind, detail: impl Into<String>) -> Self {
        Self::new(kind, CheckStatus::Pass, detail)
    }

    pub fn fail(kind: CheckKind, detail: impl Into<String>) -> Self {
        Self::new(kind, CheckStatus::Fail, detail)
    }

    pub fn skipped(kind: CheckKind, detail: impl Into<String>) -> Self {
        Self::new(kind, CheckStatus::Skipped, detail)
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = Some(evidence);
        self
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == CheckStatus::Fail
    }
}

/// Result of one test command run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunSummary {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    /// Environment setup log followed by the test command's output
    pub output: String,
}

impl TestRunSummary {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
            && !self.timed_out
            && self.total > 0
            && self.failed == 0
            && self.errors == 0
    }
}

/// Ordered check results with the overall verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub checks: Vec<CheckResult>,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_run: Option<TestRunSummary>,
}

impl VerificationReport {
    /// Build a report. `gates` decides which checks count toward the verdict;
    /// skipped checks never fail it.
    pub fn from_checks(
        checks: Vec<CheckResult>,
        test_run: Option<TestRunSummary>,
        gates: impl Fn(CheckKind) -> bool,
    ) -> Self {
        let passed = checks
            .iter()
            .filter(|c| gates(c.kind))
            .all(|c| c.status != CheckStatus::Fail);
        Self {
            checks,
            passed,
            test_run,
        }
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.count(CheckStatus::Pass)
    }

    #[must_use]
    pub fn fail_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    #[must_use]
    pub fn skip_count(&self) -> usize {
        self.count(CheckStatus::Skipped)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.is_failure())
    }

    #[must_use]
    pub fn check(&self, kind: CheckKind) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.kind == kind)
    }

    #[must_use]
    pub fn summary_line(&self) -> String {
        let mut line = format!("{} passed, {} failed", self.pass_count(), self.fail_count());
        if self.skip_count() > 0 {
            let _ = write!(line, ", {} skipped", self.skip_count());
        }
        line
    }

    /// Plain-text table for terminals.
    #[must_use]
    pub fn render_table(&self) -> String {
        let name_width = self
            .checks
            .iter()
            .map(|c| c.name.chars().count())
            .chain(std::iter::once("Check".len()))
            .max()
            .unwrap_or(5);

        let mut out = String::from("Verification Report\n");
        let _ = writeln!(out, "  {:<name_width$}  {:<6}  Details", "Check", "Status");
        for check in &self.checks {
            let mut lines = check.detail.lines();
            let first = lines.next().unwrap_or("");
            let _ = writeln!(
                out,
                "  {:<name_width$}  {}  {first}",
                check.name,
                check.status.symbol()
            );
            for more in lines {
                let _ = writeln!(out, "  {:<name_width$}          {more}", "");
            }
        }
        let verdict = if self.passed { "✓" } else { "✗" };
        let _ = writeln!(
            out,
            "  {:<name_width$}  {verdict}       {}",
            "TOTAL",
            self.summary_line()
        );
        out
    }
}
