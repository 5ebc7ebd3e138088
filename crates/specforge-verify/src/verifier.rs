use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use specforge_config::{CheckKind, ChecksConfig, RunConfig, TargetProfile, Timeouts};
use specforge_design::StructuredDesign;
use specforge_runner::ProcessRunner;
use specforge_utils::{NullSink, ProgressEvent, ProgressSink, Stage};
use tracing::{info, warn};

use crate::checks::{self, CheckContext};
use crate::environment::{PythonEnv, prepare_environment};
use crate::report::{CheckResult, TestRunSummary, VerificationReport};

/// Runs the fixed check battery against a project directory.
///
/// Checks are isolated from each other: an error or a panic inside one check
/// becomes that check's failure and the battery carries on.
pub struct Verifier {
    runner: Arc<dyn ProcessRunner>,
    checks: ChecksConfig,
    timeouts: Timeouts,
    profile: TargetProfile,
    progress: Arc<dyn ProgressSink>,
}

impl Verifier {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        checks: ChecksConfig,
        timeouts: Timeouts,
        profile: TargetProfile,
    ) -> Self {
        Self {
            runner,
            checks,
            timeouts,
            profile,
            progress: Arc::new(NullSink),
        }
    }

    pub fn from_config(config: &RunConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self::new(
            runner,
            config.checks.clone(),
            config.timeouts,
            config.profile.clone(),
        )
        .with_progress(Arc::clone(&config.progress))
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&self, project_dir: &Path, design: &StructuredDesign) -> VerificationReport {
        let enabled = |kind| self.checks.is_enabled(kind);

        let env: Option<PythonEnv> = (enabled(CheckKind::Tests) || enabled(CheckKind::Smoke))
            .then(|| {
                self.emit("env_setup", "Preparing Python environment", None);
                prepare_environment(self.runner.as_ref(), project_dir, &self.profile, &self.timeouts)
            });

        let mut results = Vec::new();
        let mut test_run: Option<TestRunSummary> = None;

        for kind in CheckKind::all() {
            if !enabled(kind) {
                results.push(CheckResult::skipped(kind, "Disabled by configuration"));
                continue;
            }
            self.emit("check_start", kind.title(), Some(json!({ "check": kind })));

            let ctx = CheckContext {
                runner: self.runner.as_ref(),
                project_dir,
                design,
                profile: &self.profile,
                timeouts: &self.timeouts,
                checks: &self.checks,
                env: env.as_ref(),
                test_run: test_run.as_ref(),
            };

            let result = match kind {
                CheckKind::Tests => match isolated(kind, || checks::tests::check(&ctx)) {
                    Ok((result, summary)) => {
                        test_run = Some(summary);
                        result
                    }
                    Err(failure) => {
                        test_run = Some(TestRunSummary {
                            errors: 1,
                            total: 1,
                            output: failure.detail.clone(),
                            ..TestRunSummary::default()
                        });
                        failure
                    }
                },
                CheckKind::Smoke => settle(isolated(kind, || checks::smoke::check(&ctx))),
                CheckKind::Container => settle(isolated(kind, || checks::container::check(&ctx))),
                CheckKind::Coverage => settle(isolated(kind, || checks::coverage::check(&ctx))),
                CheckKind::Meaningful => settle(isolated(kind, || checks::meaningful::check(&ctx))),
                CheckKind::Structure => settle(isolated(kind, || checks::structure::check(&ctx))),
            };

            info!(check = %kind, status = ?result.status, "{}", result.detail.lines().next().unwrap_or(""));
            self.emit(
                "check_done",
                &format!("{}: {}", kind.title(), result.detail.lines().next().unwrap_or("")),
                Some(json!({ "check": kind, "status": result.status })),
            );
            results.push(result);
        }

        let report = VerificationReport::from_checks(results, test_run, |kind| {
            self.checks.is_gating(kind)
        });
        self.emit(
            "report",
            &report.summary_line(),
            Some(json!({ "passed": report.passed })),
        );
        report
    }

    fn emit(&self, event: &str, message: &str, data: Option<serde_json::Value>) {
        let mut ev = ProgressEvent::new(Stage::Verification, event, message);
        if let Some(data) = data {
            ev = ev.with_data(data);
        }
        self.progress.emit(&ev);
    }
}

/// Run one check, turning errors and panics into a failing result.
fn isolated<T>(
    kind: CheckKind,
    check: impl FnOnce() -> anyhow::Result<T>,
) -> Result<T, CheckResult> {
    match catch_unwind(AssertUnwindSafe(check)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            warn!(check = %kind, error = %format!("{err:#}"), "Check errored");
            Err(CheckResult::fail(kind, format!("Check error: {err:#}")))
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(check = %kind, panic = %message, "Check panicked");
            Err(CheckResult::fail(kind, format!("Check crashed: {message}")))
        }
    }
}

fn settle(outcome: Result<CheckResult, CheckResult>) -> CheckResult {
    outcome.unwrap_or_else(|failure| failure)
}
