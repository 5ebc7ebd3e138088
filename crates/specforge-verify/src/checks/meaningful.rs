use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use specforge_config::CheckKind;

use super::{CheckContext, python_files};
use crate::report::CheckResult;

static TEST_FUNCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:async\s+)?def\s+test_\w*\s*\(").expect("valid regex"));
static ASSERTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*assert\b").expect("valid regex"));

/// Enough tests for the size of the API.
pub(crate) fn check(ctx: &CheckContext<'_>) -> anyhow::Result<CheckResult> {
    let endpoints = ctx.design.endpoints.len();
    let required = required_tests(endpoints, ctx.checks.min_test_ratio, ctx.checks.min_tests);

    let (found, source) = match ctx.test_run.filter(|run| run.total > 0) {
        Some(run) => (run.total, "collected"),
        None => static_test_count(ctx),
    };

    let evidence = json!({
        "tests": found,
        "counted_from": source,
        "endpoints": endpoints,
        "required": required,
    });
    let result = if found >= required {
        CheckResult::pass(
            CheckKind::Meaningful,
            format!("{found} tests for {endpoints} endpoints (minimum: {required})"),
        )
    } else {
        CheckResult::fail(
            CheckKind::Meaningful,
            format!("Only {found} tests for {endpoints} endpoints (expected at least {required})"),
        )
    };
    Ok(result.with_evidence(evidence))
}

#[must_use]
pub(crate) fn required_tests(endpoints: usize, ratio: f64, floor: u32) -> u32 {
    let scaled = (endpoints as f64 * ratio.max(0.0)).ceil() as u32;
    scaled.max(floor)
}

/// Test functions in the test directory, or assertions when no test
/// functions are found.
fn static_test_count(ctx: &CheckContext<'_>) -> (u32, &'static str) {
    let sources: Vec<String> = python_files(ctx.project_dir, &ctx.profile.test_dir)
        .iter()
        .filter_map(|file| ctx.read(file))
        .collect();
    let functions: usize = sources.iter().map(|s| TEST_FUNCTION.find_iter(s).count()).sum();
    if functions > 0 {
        return (functions as u32, "test functions");
    }
    let assertions: usize = sources.iter().map(|s| ASSERTION.find_iter(s).count()).sum();
    (assertions as u32, "assertions")
}
