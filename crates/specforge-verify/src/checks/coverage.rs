use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use specforge_config::CheckKind;

use super::{CheckContext, python_files};
use crate::report::CheckResult;

const MAX_LISTED_MISSING: usize = 10;

static INCLUDE_ROUTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)include_router\(\s*(\w+).*?prefix\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

static ROUTE_DECORATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)@\w+\.(get|post|put|patch|delete)\(\s*["']([^"']*)["']"#).expect("valid regex")
});

static PATH_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]+\}").expect("valid regex"));

/// Every endpoint in the design must be declared somewhere in the project,
/// after composing router prefixes from the entry point.
pub(crate) fn check(ctx: &CheckContext<'_>) -> anyhow::Result<CheckResult> {
    let endpoints = &ctx.design.endpoints;
    if endpoints.is_empty() {
        return Ok(CheckResult::pass(
            CheckKind::Coverage,
            "No endpoints in the design to verify",
        ));
    }

    let main = ctx.read(&ctx.profile.entry_point).unwrap_or_default();
    let prefixes = router_prefixes(&main);
    let test_dir = format!("{}/", ctx.profile.test_dir.trim_end_matches('/'));

    let mut routes = BTreeSet::new();
    for file in python_files(ctx.project_dir, ".") {
        if file.starts_with(&test_dir) {
            continue;
        }
        let Some(content) = ctx.read(&file) else {
            continue;
        };
        let prefix = if file == ctx.profile.entry_point {
            None
        } else {
            prefix_for(&file, &main, &prefixes)
        };
        collect_routes(&content, prefix, &mut routes);
    }

    let mut matched = Vec::new();
    let mut missing = Vec::new();
    for endpoint in endpoints {
        let label = format!("{} {}", endpoint.method.as_str(), endpoint.path);
        if is_covered(endpoint.method.as_str(), &endpoint.path, &routes) {
            matched.push(label);
        } else {
            missing.push(label);
        }
    }

    let evidence = json!({
        "matched": matched,
        "missing": missing,
        "routes": routes.iter().collect::<Vec<_>>(),
    });
    let total = endpoints.len();
    if missing.is_empty() {
        return Ok(CheckResult::pass(
            CheckKind::Coverage,
            format!(
                "All {total} design endpoints found in generated code ({} routes total)",
                routes.len()
            ),
        )
        .with_evidence(evidence));
    }

    let covered = total - missing.len();
    let mut listed = missing[..missing.len().min(MAX_LISTED_MISSING)].join(", ");
    if missing.len() > MAX_LISTED_MISSING {
        listed.push_str(&format!(" (+{} more)", missing.len() - MAX_LISTED_MISSING));
    }
    Ok(CheckResult::fail(
        CheckKind::Coverage,
        format!(
            "{covered}/{total} endpoints covered ({}%). Missing: {listed}",
            covered * 100 / total
        ),
    )
    .with_evidence(evidence))
}

/// `(router variable, prefix)` pairs declared in the entry point.
fn router_prefixes(main: &str) -> Vec<(String, String)> {
    INCLUDE_ROUTER
        .captures_iter(main)
        .map(|c| (c[1].to_string(), c[2].trim_end_matches('/').to_string()))
        .collect()
}

/// Prefix mounted for a router module: first by how the entry point imports
/// it, then by the module's basename appearing in the variable or prefix.
fn prefix_for<'p>(file: &str, main: &str, prefixes: &'p [(String, String)]) -> Option<&'p str> {
    let module = file.trim_end_matches(".py").replace('/', ".");
    let basename = module.rsplit('.').next().unwrap_or(&module).to_string();

    for (var, prefix) in prefixes {
        let import = format!(
            r"from\s+(?:{}|[\w.]*\b{})\s+import[^\n]*\b{}\b",
            regex::escape(&module),
            regex::escape(&basename),
            regex::escape(var)
        );
        if Regex::new(&import).is_ok_and(|re| re.is_match(main)) {
            return Some(prefix);
        }
    }
    prefixes
        .iter()
        .find(|(var, prefix)| var.contains(&basename) || prefix.contains(&basename))
        .map(|(_, prefix)| prefix.as_str())
}

fn collect_routes(content: &str, prefix: Option<&str>, routes: &mut BTreeSet<String>) {
    for caps in ROUTE_DECORATOR.captures_iter(content) {
        let method = caps[1].to_ascii_uppercase();
        let path = &caps[2];
        routes.insert(format!("{method} {}", normalize(path)));
        if let Some(prefix) = prefix {
            let full = if path == "/" || path.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix}{path}")
            };
            routes.insert(format!("{method} {}", normalize(&full)));
        }
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Match allowing any parameter name in place of each `{param}`.
fn is_covered(method: &str, path: &str, routes: &BTreeSet<String>) -> bool {
    let path = normalize(path);
    let mut pattern = format!("^{} ", regex::escape(method));
    let mut last = 0;
    for m in PATH_PARAM.find_iter(&path) {
        pattern.push_str(&regex::escape(&path[last..m.start()]));
        pattern.push_str(r"\{[^}/]+\}");
        last = m.end();
    }
    pattern.push_str(&regex::escape(&path[last..]));
    pattern.push('$');

    Regex::new(&pattern).is_ok_and(|re| routes.iter().any(|r| re.is_match(r)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{ScriptedRunner, output};
    use crate::report::CheckStatus;
    use serde_json::json;
    use specforge_config::{ChecksConfig, TargetProfile, Timeouts};
    use specforge_design::StructuredDesign;
    use std::path::Path;

    fn write(dir: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let full = dir.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
    }

    fn run_check(dir: &Path, endpoints: serde_json::Value) -> CheckResult {
        let design: StructuredDesign =
            serde_json::from_value(json!({"project_name": "p", "endpoints": endpoints})).unwrap();
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

    #[test]
    fn test_prefixed_routers_matched_by_import_alias() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            &[
                (
                    "app/main.py",
                    "from fastapi import FastAPI\n\
                     from app.routers.links import router as links_router\n\
                     app = FastAPI()\n\
                     app.include_router(links_router, prefix=\"/api/links/\")\n\
                     @app.get(\"/health\")\n\
                     def health():\n    return {}\n",
                ),
                (
                    "app/routers/links.py",
                    "@router.post(\"/\")\ndef create(): ...\n\
                     @router.get('/{link_id}')\ndef read(link_id: int): ...\n",
                ),
            ],
        );
        let result = run_check(
            dir.path(),
            json!([
                {"method": "GET", "path": "/health"},
                {"method": "POST", "path": "/api/links"},
                {"method": "GET", "path": "/api/links/{code}"}
            ]),
        );
        assert_eq!(result.status, CheckStatus::Pass, "{}", result.detail);
        let evidence = result.evidence.unwrap();
        assert_eq!(evidence["matched"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_full_paths_without_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            &[
                ("app/main.py", "app.include_router(users.router)\n"),
                ("app/routers/users.py", "@router.delete(\"/users/{id}\")\ndef d(id): ...\n"),
            ],
        );
        let result = run_check(dir.path(), json!([{"method": "DELETE", "path": "/users/{user_id}"}]));
        assert_eq!(result.status, CheckStatus::Pass);
    }

    #[test]
    fn test_prefix_by_basename_fallback() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            &[
                (
                    "app/main.py",
                    "from app.routers import orders\napp.include_router(orders.router, prefix='/orders')\n",
                ),
                ("app/routers/orders.py", "@router.get(\"/{id}/items\")\ndef i(): ...\n"),
            ],
        );
        let result = run_check(dir.path(), json!([{"method": "GET", "path": "/orders/{order_id}/items"}]));
        assert_eq!(result.status, CheckStatus::Pass, "{}", result.detail);
    }

    #[test]
    fn test_missing_endpoints_are_listed_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &[("app/main.py", "@app.get('/a')\ndef a(): ...\n")]);
        let mut endpoints = vec![json!({"method": "GET", "path": "/a"})];
        for i in 0..12 {
            endpoints.push(json!({"method": "GET", "path": format!("/missing{i}")}));
        }
        let result = run_check(dir.path(), json!(endpoints));
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.detail.starts_with("1/13 endpoints covered (7%). Missing: GET /missing0"));
        assert!(result.detail.ends_with("(+2 more)"));
        assert_eq!(result.evidence.unwrap()["missing"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn test_method_must_match_and_tests_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            &[
                ("app/main.py", "@app.get('/items')\ndef a(): ...\n"),
                ("tests/test_items.py", "@app.post('/items')\ndef fake(): ...\n"),
            ],
        );
        let result = run_check(dir.path(), json!([{"method": "POST", "path": "/items"}]));
        assert_eq!(result.status, CheckStatus::Fail);
    }

    #[test]
    fn test_no_endpoints_passes() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_check(dir.path(), json!([]));
        assert_eq!(result.status, CheckStatus::Pass);
    }

    #[test]
    fn test_param_does_not_span_segments() {
        let routes: BTreeSet<String> = ["GET /a/{x}/b".to_string()].into();
        assert!(is_covered("GET", "/a/{id}/b", &routes));
        assert!(!is_covered("GET", "/a/{id}", &routes));
        assert!(!is_covered("POST", "/a/{id}/b", &routes));
    }
}
