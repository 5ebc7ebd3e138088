use serde_json::json;
use specforge_config::CheckKind;
use specforge_design::base_requirement_name;

use super::{CheckContext, python_files};
use crate::report::CheckResult;

/// Essential files exist and the manifest lists the web framework.
pub(crate) fn check(ctx: &CheckContext<'_>) -> anyhow::Result<CheckResult> {
    let profile = ctx.profile;
    let mut issues = Vec::new();

    if !ctx.path(&profile.entry_point).is_file() {
        issues.push(format!("Missing {}", profile.entry_point));
    }

    match ctx.read(&profile.manifest) {
        None => issues.push(format!("Missing {}", profile.manifest)),
        Some(manifest) => {
            if !manifest_lists(&manifest, &profile.web_framework) {
                issues.push(format!(
                    "{} missing '{}'",
                    profile.manifest, profile.web_framework
                ));
            }
        }
    }

    let test_dir = profile.test_dir.trim_end_matches('/');
    let has_tests = python_files(ctx.project_dir, test_dir).iter().any(|file| {
        file.rsplit('/')
            .next()
            .is_some_and(|name| name.starts_with("test_"))
    });
    if !has_tests {
        issues.push(format!("No test files in {test_dir}/"));
    }

    if !ctx.path("Dockerfile").is_file() {
        issues.push("Missing Dockerfile".to_string());
    }

    let conftest = format!("{test_dir}/conftest.py");
    if !ctx.path(&conftest).is_file() {
        issues.push(format!("Missing {conftest}"));
    }

    if issues.is_empty() {
        return Ok(CheckResult::pass(
            CheckKind::Structure,
            "All essential files present",
        ));
    }
    Ok(CheckResult::fail(CheckKind::Structure, issues.join("; "))
        .with_evidence(json!({ "issues": issues })))
}

fn manifest_lists(manifest: &str, dependency: &str) -> bool {
    let wanted = base_requirement_name(dependency);
    manifest
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .any(|line| base_requirement_name(line) == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{ScriptedRunner, output};
    use crate::report::CheckStatus;
    use specforge_config::{ChecksConfig, TargetProfile, Timeouts};
    use specforge_design::StructuredDesign;
    use std::path::Path;

    fn run_check(dir: &Path) -> CheckResult {
        let design = StructuredDesign::from_json_str(r#"{"project_name": "p"}"#).unwrap();
        let runner = ScriptedRunner::new(|_| output(0, ""));
        let profile = TargetProfile::default();
        let timeouts = Timeouts::default();
        let checks = ChecksConfig::default();
        let ctx = CheckContext {
            runner: &runner,
            project_dir: dir,
            design: &design,
            profile: &profile,
            timeouts: &timeouts,
            checks: &checks,
            env: None,
            test_run: None,
        };
        check(&ctx).unwrap()
    }

    fn write(dir: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let full = dir.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
    }

    #[test]
    fn test_complete_project_passes() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            &[
                ("app/main.py", ""),
                ("requirements.txt", "# web\nFastAPI[all]>=0.110\nuvicorn\n"),
                ("tests/conftest.py", ""),
                ("tests/test_health.py", ""),
                ("Dockerfile", ""),
            ],
        );
        let result = run_check(dir.path());
        assert_eq!(result.status, CheckStatus::Pass, "{}", result.detail);
    }

    #[test]
    fn test_empty_project_lists_every_issue() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_check(dir.path());
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(
            result.detail,
            "Missing app/main.py; Missing requirements.txt; No test files in tests/; \
             Missing Dockerfile; Missing tests/conftest.py"
        );
    }

    #[test]
    fn test_manifest_without_framework() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            &[
                ("app/main.py", ""),
                ("requirements.txt", "fastapi-utils\n# fastapi\n"),
                ("tests/conftest.py", ""),
                ("tests/test_a.py", ""),
                ("Dockerfile", ""),
            ],
        );
        let result = run_check(dir.path());
        assert_eq!(result.detail, "requirements.txt missing 'fastapi'");
    }
}
