//! Batch planning.
//!
//! Order: `core`, one `surface:<group>` per endpoint group, `healthcheck`,
//! one `tests:<group>` per group, `infra`. Groups are sorted by key so the
//! same design always yields the same plan.

use std::collections::BTreeMap;
use tracing::debug;

use specforge_design::{EndpointSpec, StructuredDesign};

use crate::batch::{ArtifactTarget, BatchKind, GenerationBatch};

pub const ENTRY_POINT: &str = "app/main.py";
pub const AUTH_MODULE: &str = "app/auth.py";
pub const MANIFEST: &str = "requirements.txt";
pub const HEALTH_TEST: &str = "tests/test_healthcheck.py";
pub const CONFTEST: &str = "tests/conftest.py";

/// Name of the always-present health check test batch. Group keys never
/// appear bare as batch names, so it cannot collide.
pub const HEALTH_BATCH: &str = "healthcheck";

const PYTHON_KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "false", "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "none", "nonlocal", "not", "or", "pass", "raise", "return", "true", "try", "while",
    "with", "yield",
];

/// Python module name of a group's router.
#[must_use]
pub fn router_module(group: &str) -> String {
    if PYTHON_KEYWORDS.contains(&group) {
        format!("{group}_routes")
    } else {
        group.to_string()
    }
}

#[must_use]
pub fn router_path(group: &str) -> String {
    format!("app/routers/{}.py", router_module(group))
}

/// Test module of a group. Never collides with [`HEALTH_TEST`].
#[must_use]
pub fn group_test_path(group: &str) -> String {
    if group == "healthcheck" {
        "tests/test_healthcheck_routes.py".to_string()
    } else {
        format!("tests/test_{group}.py")
    }
}

/// Endpoints partitioned by group key, keys in sorted order.
#[must_use]
pub fn endpoint_groups(design: &StructuredDesign) -> BTreeMap<String, Vec<&EndpointSpec>> {
    let mut groups: BTreeMap<String, Vec<&EndpointSpec>> = BTreeMap::new();
    for endpoint in &design.endpoints {
        groups
            .entry(endpoint.group_or_default())
            .or_default()
            .push(endpoint);
    }
    groups
}

/// Derive the ordered batch list for a design.
#[must_use]
pub fn plan_batches(design: &StructuredDesign) -> Vec<GenerationBatch> {
    let groups = endpoint_groups(design);
    let needs_auth = design.any_endpoint_requires_auth();

    let mut batches = Vec::with_capacity(groups.len() * 2 + 3);
    batches.push(core_batch(design, &groups, needs_auth));

    for (group, endpoints) in &groups {
        batches.push(GenerationBatch::new(
            BatchKind::Surface,
            Some(group),
            vec![ArtifactTarget::new(
                router_path(group),
                router_instructions(group, endpoints),
            )],
        ));
    }

    batches.push(health_test_batch(needs_auth));

    for (group, endpoints) in &groups {
        batches.push(GenerationBatch::new(
            BatchKind::Tests,
            Some(group),
            vec![ArtifactTarget::new(
                group_test_path(group),
                test_instructions(group, endpoints),
            )],
        ));
    }

    batches.push(infra_batch(design));

    debug!(
        batches = batches.len(),
        groups = groups.len(),
        auth = needs_auth,
        "Planned generation batches"
    );
    batches
}

fn core_batch(
    design: &StructuredDesign,
    groups: &BTreeMap<String, Vec<&EndpointSpec>>,
    needs_auth: bool,
) -> GenerationBatch {
    let model_names: Vec<&str> = design
        .database_models
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    let modules: Vec<String> = groups.keys().map(|g| router_module(g)).collect();

    let mut targets = vec![
        ArtifactTarget::new("app/__init__.py", "Package marker. May be empty."),
        ArtifactTarget::new(
            "app/config.py",
            "Settings loaded from environment variables listed in the design, with the \
             documented defaults. Expose a module-level `settings` object.",
        ),
        ArtifactTarget::new(
            "app/database.py",
            "Database engine and session setup. Provide `init_db()` that creates all tables \
             and a `get_session` dependency yielding a session.",
        ),
        ArtifactTarget::new(
            "app/models.py",
            format!(
                "Persistence models for: {}. Keep field names, types and constraints exactly \
                 as designed.",
                if model_names.is_empty() {
                    "(none declared)".to_string()
                } else {
                    model_names.join(", ")
                }
            ),
        ),
        ArtifactTarget::new(
            "app/schemas.py",
            "Request and response models for every endpoint's request body and response shape.",
        ),
    ];

    if needs_auth {
        targets.push(ArtifactTarget::new(
            AUTH_MODULE,
            "Authorization support: credential verification and a dependency that rejects \
             unauthenticated requests with 401. Used by every endpoint whose auth is not `none`.",
        ));
    }

    targets.push(ArtifactTarget::new(
        "app/routers/__init__.py",
        "Package marker for the router modules. May be empty.",
    ));
    targets.push(ArtifactTarget::new(
        ENTRY_POINT,
        format!(
            "Application entry point exposing `app`. Initialize the database on startup, add \
             the designed middlewares, serve GET /health returning 200 with a JSON status, and \
             include the router of each module in app/routers ({}) via \
             `app.include_router(<module>.router)`. Each router module exposes `router`.",
            if modules.is_empty() {
                "none".to_string()
            } else {
                modules.join(", ")
            }
        ),
    ));

    GenerationBatch::new(BatchKind::Core, None, targets)
}

fn describe_endpoints(endpoints: &[&EndpointSpec]) -> String {
    endpoints
        .iter()
        .map(|e| {
            let auth = if e.requires_auth() { " [auth]" } else { "" };
            if e.summary.is_empty() {
                format!("{} {}{auth}", e.method, e.path)
            } else {
                format!("{} {}{auth}: {}", e.method, e.path, e.summary)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn router_instructions(group: &str, endpoints: &[&EndpointSpec]) -> String {
    format!(
        "Router for the `{group}` endpoints. Expose `router`. Declare each route with its \
         full path (no prefix on the router) so paths match the design exactly: {}",
        describe_endpoints(endpoints)
    )
}

fn test_instructions(group: &str, endpoints: &[&EndpointSpec]) -> String {
    format!(
        "Tests for the `{group}` endpoints using the shared client fixture from \
         tests/conftest.py. Cover success and error cases of: {}",
        describe_endpoints(endpoints)
    )
}

fn health_test_batch(needs_auth: bool) -> GenerationBatch {
    let conftest = if needs_auth {
        "Shared fixtures: an isolated temporary database, a test client for `app.main.app`, \
         and helpers producing valid credentials for authorized endpoints."
    } else {
        "Shared fixtures: an isolated temporary database and a test client for `app.main.app`."
    };
    GenerationBatch {
        name: HEALTH_BATCH.to_string(),
        kind: BatchKind::Tests,
        group: None,
        targets: vec![
            ArtifactTarget::new("tests/__init__.py", "Package marker. May be empty."),
            ArtifactTarget::new(CONFTEST, conftest),
            ArtifactTarget::new(
                HEALTH_TEST,
                "Tests that GET /health returns 200 and a JSON body.",
            ),
        ],
    }
}

fn infra_batch(design: &StructuredDesign) -> GenerationBatch {
    let deployment = &design.deployment;
    GenerationBatch::new(
        BatchKind::Infra,
        None,
        vec![
            ArtifactTarget::new(
                MANIFEST,
                "One requirement per line for every declared dependency, plus the test \
                 dependencies. No duplicates.",
            ),
            ArtifactTarget::new(
                "Dockerfile",
                format!(
                    "Container build from `{}` installing requirements.txt and serving \
                     `app.main:app` with uvicorn on port {}.",
                    deployment.base_image, deployment.port
                ),
            ),
            ArtifactTarget::new(
                "docker-compose.yml",
                format!(
                    "Single service built from the Dockerfile, publishing port {}, mounting \
                     volumes {:?} and loading env files {:?}.",
                    deployment.port, deployment.volumes, deployment.environment_files
                ),
            ),
            ArtifactTarget::new(
                ".env.example",
                "Every environment variable in the design with its default or an example value.",
            ),
            ArtifactTarget::new(
                "README.md",
                "Project overview, setup, how to run locally and in a container, how to run \
                 the tests, and the endpoint list.",
            ),
        ],
    )
}
