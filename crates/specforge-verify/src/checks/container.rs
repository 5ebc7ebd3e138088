use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use specforge_config::CheckKind;
use specforge_runner::{CommandSpec, RunnerError};
use tracing::{debug, warn};

use super::CheckContext;
use crate::environment::tail;
use crate::report::CheckResult;

const DOCKERFILE: &str = "Dockerfile";

static BUILDS: AtomicU64 = AtomicU64::new(0);

/// Image tag for one build. Concurrent runs must never share a tag, since
/// each removes its image when done.
pub(crate) fn build_tag(prefix: &str, project: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    let build = BUILDS.fetch_add(1, Ordering::Relaxed);
    let mut base = format!(
        "{}-{}",
        tag_component(prefix, "specforge"),
        tag_component(project, "project")
    );
    base.truncate(96);
    format!("{base}-{}-{millis}-{build}", std::process::id())
}

/// Lowercase ASCII words of `text` joined by `-`.
fn tag_component(text: &str, fallback: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    if words.is_empty() {
        fallback.to_string()
    } else {
        words.join("-")
    }
}

/// Build the project's image, then remove it.
///
/// A missing container runtime is a skip, not a failure.
pub(crate) fn check(ctx: &CheckContext<'_>) -> anyhow::Result<CheckResult> {
    let Ok(docker) = which::which("docker") else {
        return Ok(CheckResult::skipped(
            CheckKind::Container,
            "docker not found on PATH",
        ));
    };
    check_with(ctx, docker.as_os_str())
}

pub(crate) fn check_with(
    ctx: &CheckContext<'_>,
    docker: &std::ffi::OsStr,
) -> anyhow::Result<CheckResult> {
    let ps = CommandSpec::new(docker).arg("ps");
    match ctx.runner.run(&ps, ctx.timeouts.container_probe) {
        Ok(out) if out.success() => {}
        Ok(_) | Err(_) => {
            return Ok(CheckResult::skipped(
                CheckKind::Container,
                "docker daemon is not reachable",
            ));
        }
    }

    if !ctx.path(DOCKERFILE).is_file() {
        return Ok(CheckResult::fail(CheckKind::Container, "Missing Dockerfile"));
    }

    let tag = build_tag(&ctx.profile.image_tag, &ctx.design.project_name);
    let build = CommandSpec::new(docker)
        .args(["build", ".", "-t"])
        .arg(&tag)
        .arg("--no-cache")
        .cwd(ctx.project_dir);
    debug!(command = %build.display(), "Building container image");

    let result = match ctx.runner.run(&build, ctx.timeouts.container_build) {
        Ok(out) if out.success() => {
            let rmi = CommandSpec::new(docker).args(["rmi", "-f"]).arg(&tag);
            if let Err(e) = ctx.runner.run(&rmi, ctx.timeouts.container_probe) {
                warn!(tag = %tag, error = %e, "Failed to remove verification image");
            }
            CheckResult::pass(CheckKind::Container, "Image built successfully")
        }
        Ok(out) => {
            let stderr = out.stderr_string();
            let source = if stderr.trim().is_empty() { out.stdout_string() } else { stderr };
            CheckResult::fail(
                CheckKind::Container,
                format!("Build failed:\n{}", tail(source.trim_end(), 5)),
            )
            .with_evidence(json!({ "exit_code": out.exit_code }))
        }
        Err(RunnerError::Timeout { timeout_seconds }) => CheckResult::fail(
            CheckKind::Container,
            format!("Docker build timed out ({timeout_seconds}s)"),
        ),
        Err(e) => CheckResult::fail(CheckKind::Container, format!("Docker build failed: {e}")),
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{ScriptedRunner, output};
    use crate::report::CheckStatus;
    use specforge_config::{ChecksConfig, TargetProfile, Timeouts};
    use specforge_design::StructuredDesign;
    use specforge_runner::ProcessOutput;
    use std::ffi::OsStr;
    use std::path::Path;

    fn run_check(runner: &ScriptedRunner, dir: &Path) -> CheckResult {
        let design = StructuredDesign::from_json_str(r#"{"project_name": "p"}"#).unwrap();
        let profile = TargetProfile::default();
        let timeouts = Timeouts::default();
        let checks = ChecksConfig::default();
        let ctx = CheckContext {
            runner,
            project_dir: dir,
            design: &design,
            profile: &profile,
            timeouts: &timeouts,
            checks: &checks,
            env: None,
            test_run: None,
        };
        check_with(&ctx, OsStr::new("docker")).unwrap()
    }

    fn with_dockerfile() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM python:3.12-slim\n").unwrap();
        dir
    }

    #[test]
    fn test_unreachable_daemon_is_skipped() {
        let dir = with_dockerfile();
        let runner = ScriptedRunner::new(|_| output(1, "Cannot connect to the Docker daemon"));
        let result = run_check(&runner, dir.path());
        assert_eq!(result.status, CheckStatus::Skipped);
        assert_eq!(runner.calls(), vec!["docker ps"]);
    }

    #[test]
    fn test_missing_dockerfile_fails() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(|_| output(0, ""));
        let result = run_check(&runner, dir.path());
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(result.detail, "Missing Dockerfile");
    }

    #[test]
    fn test_successful_build_removes_image() {
        let dir = with_dockerfile();
        let runner = ScriptedRunner::new(|_| output(0, ""));
        let result = run_check(&runner, dir.path());
        assert_eq!(result.status, CheckStatus::Pass);
        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], "docker ps");
        let tag = calls[1]
            .strip_prefix("docker build . -t ")
            .and_then(|rest| rest.strip_suffix(" --no-cache"))
            .unwrap();
        assert!(tag.starts_with("specforge-verify-p-"), "{tag}");
        assert_eq!(calls[2], format!("docker rmi -f {tag}"));
    }

    #[test]
    fn test_build_tags_are_unique_and_valid() {
        let first = build_tag("specforge-verify", "URL Shortener!");
        let second = build_tag("specforge-verify", "URL Shortener!");
        assert_ne!(first, second);
        let pid = std::process::id().to_string();
        assert!(first.starts_with(&format!("specforge-verify-url-shortener-{pid}-")), "{first}");
        assert!(first.len() <= 128);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        );
        assert!(build_tag("x", "***").starts_with("x-project-"));
    }

    #[test]
    fn test_failed_build_reports_stderr_tail() {
        let dir = with_dockerfile();
        let runner = ScriptedRunner::new(|cmd| {
            if cmd.display().contains("build") {
                let stderr = (1..=8).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
                Ok(ProcessOutput::new(Vec::new(), stderr.into_bytes(), Some(1), false))
            } else {
                output(0, "")
            }
        });
        let result = run_check(&runner, dir.path());
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(result.detail, "Build failed:\nline 4\nline 5\nline 6\nline 7\nline 8");
        assert_eq!(runner.calls().len(), 2);
    }
}
