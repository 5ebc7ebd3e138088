//! Drives batch-by-batch generation through the provider gateway.
//!
//! The coordinator is pure with respect to storage: it returns an
//! [`ArtifactSet`] and leaves writing files to the caller.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use specforge_design::StructuredDesign;
use specforge_llm::ProviderGateway;
use specforge_planner::{GenerationBatch, MANIFEST, design_slice};
use specforge_utils::{CancelFlag, NullSink, ProgressEvent, ProgressSink, Stage};

use crate::artifact::{ArtifactSet, validate_artifact_path};
use crate::error::{AttemptFailure, GenerationFailure};
use crate::fixups::apply_fixups;
use crate::parse::parse_files_response;
use crate::prompts::{BatchPrompt, batch_system_prompt};

/// Attempts per batch: one call plus two retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Which projection of the design goes into batch prompts.
#[derive(Debug, Clone, Copy)]
pub enum DesignView<'a> {
    /// The batch's slice of the full design, as JSON
    Full,
    /// The condensed design text, shared by every batch
    Condensed(&'a str),
}

/// Everything one generation pass needs.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub batches: &'a [GenerationBatch],
    pub design: &'a StructuredDesign,
    pub view: DesignView<'a>,
    /// Digested feedback from the previous iteration
    pub feedback: Option<&'a str>,
    pub iteration: u32,
}

pub struct GenerationCoordinator {
    gateway: Arc<dyn ProviderGateway>,
    max_attempts: u32,
    manifest_path: String,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
}

impl GenerationCoordinator {
    #[must_use]
    pub fn new(gateway: Arc<dyn ProviderGateway>) -> Self {
        Self {
            gateway,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            manifest_path: MANIFEST.to_string(),
            progress: Arc::new(NullSink),
            cancel: CancelFlag::new(),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_manifest_path(mut self, path: impl Into<String>) -> Self {
        self.manifest_path = path.into();
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn emit(&self, iteration: u32, event: &str, message: String, data: serde_json::Value) {
        self.progress.emit(
            &ProgressEvent::new(Stage::Generation, event, message)
                .with_iteration(iteration)
                .with_data(data),
        );
    }

    /// Generate every batch in order.
    ///
    /// The first batch that exhausts its attempts aborts the pass; nothing
    /// generated before it is returned.
    pub async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<ArtifactSet, GenerationFailure> {
        let system = batch_system_prompt(request.design);
        let mut files = ArtifactSet::new();

        for (index, batch) in request.batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(batch = %batch.name, "Generation cancelled");
                return Err(GenerationFailure::Cancelled {
                    batch: batch.name.clone(),
                });
            }

            self.emit(
                request.iteration,
                "batch_start",
                format!("Generating {} ({}/{})", batch.name, index + 1, request.batches.len()),
                json!({"batch": batch.name, "paths": batch.paths().collect::<Vec<_>>()}),
            );

            let design_text = match request.view {
                DesignView::Full => {
                    serde_json::to_string_pretty(&design_slice(request.design, batch))
                        .unwrap_or_default()
                }
                DesignView::Condensed(text) => text.to_string(),
            };
            let prompt = BatchPrompt {
                batch,
                design_text: &design_text,
                feedback: request.feedback,
                existing: &files,
            }
            .render();

            let produced = self
                .generate_batch(batch, &system, &prompt, request.iteration)
                .await?;
            let count = produced.len();
            for (path, content) in produced {
                if let Err(e) = files.insert(path, content) {
                    warn!(batch = %batch.name, error = %e, "Rejected generated path");
                }
            }

            self.emit(
                request.iteration,
                "batch_done",
                format!("Got {count} {} files", batch.name),
                json!({"batch": batch.name, "files": count}),
            );
        }

        for note in apply_fixups(&mut files, &self.manifest_path) {
            debug!(fixup = %note, "Applied fixup");
        }

        info!(
            iteration = request.iteration,
            files = files.len(),
            bytes = files.total_bytes(),
            "Generation complete"
        );
        Ok(files)
    }

    async fn generate_batch(
        &self,
        batch: &GenerationBatch,
        system: &str,
        prompt: &str,
        iteration: u32,
    ) -> Result<BTreeMap<String, String>, GenerationFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(batch, system, prompt).await {
                Ok(files) => {
                    debug!(batch = %batch.name, attempt, files = files.len(), "Batch generated");
                    return Ok(files);
                }
                Err(cause) if attempt >= self.max_attempts => {
                    warn!(batch = %batch.name, attempt, error = %cause, "Batch failed");
                    self.emit(
                        iteration,
                        "batch_failed",
                        format!("{} failed after {attempt} attempts: {cause}", batch.name),
                        json!({"batch": batch.name, "attempts": attempt}),
                    );
                    return Err(GenerationFailure::BatchFailed {
                        batch: batch.name.clone(),
                        attempts: attempt,
                        cause,
                    });
                }
                Err(cause) => {
                    warn!(
                        batch = %batch.name,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %cause,
                        "Batch attempt failed, retrying"
                    );
                }
            }
        }
    }

    async fn attempt(
        &self,
        batch: &GenerationBatch,
        system: &str,
        prompt: &str,
    ) -> Result<BTreeMap<String, String>, AttemptFailure> {
        let response = self.gateway.complete(system, prompt).await?;
        if response.trim().is_empty() {
            return Err(AttemptFailure::EmptyResponse);
        }

        let parsed = parse_files_response(&response).map_err(AttemptFailure::Unparseable)?;
        debug!(batch = %batch.name, stage = ?parsed.stage, files = parsed.files.len(), "Parsed response");
        accept_batch_files(batch, parsed.files)
    }
}

/// Keep only safe paths that belong to the batch.
fn accept_batch_files(
    batch: &GenerationBatch,
    files: BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, AttemptFailure> {
    let mut accepted = BTreeMap::new();
    for (raw_path, content) in files {
        let path = raw_path.trim().trim_start_matches("./").to_string();
        if let Err(e) = validate_artifact_path(&path) {
            warn!(batch = %batch.name, error = %e, "Dropping unsafe path");
            continue;
        }
        if !batch.contains_path(&path) {
            warn!(batch = %batch.name, path = %path, "Dropping file outside the batch");
            continue;
        }
        accepted.insert(path, content);
    }

    if accepted.is_empty() {
        return Err(AttemptFailure::NoExpectedFiles {
            expected: batch.paths().collect::<Vec<_>>().join(", "),
        });
    }

    let missing: Vec<&str> = batch.paths().filter(|p| !accepted.contains_key(*p)).collect();
    if !missing.is_empty() {
        warn!(batch = %batch.name, missing = ?missing, "Batch response is missing files");
    }
    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use regex::Regex;
    use specforge_llm::{LlmError, ScriptedGateway};
    use specforge_planner::plan_batches;
    use specforge_utils::CollectingSink;

    static TARGET_LINE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^\d+\. (\S+) - ").unwrap());

    /// Answer with a stub file for every requested path.
    fn stub_files(user: &str) -> Result<String, LlmError> {
        let files: BTreeMap<String, String> = TARGET_LINE
            .captures_iter(user)
            .map(|c| {
                let path = c[1].to_string();
                let content = if path == "requirements.txt" {
                    "fastapi\npasslib\n".to_string()
                } else {
                    format!("# {path}\n")
                };
                (path, content)
            })
            .collect();
        Ok(serde_json::to_string(&files).unwrap())
    }

    fn design() -> StructuredDesign {
        serde_json::from_value(json!({
            "project_name": "shop",
            "dependencies": ["fastapi", "uvicorn"],
            "endpoints": [
                {"method": "GET", "path": "/users", "tags": ["users"]},
                {"method": "GET", "path": "/orders", "tags": ["orders"]}
            ]
        }))
        .unwrap()
    }

    fn request<'a>(
        batches: &'a [GenerationBatch],
        design: &'a StructuredDesign,
        view: DesignView<'a>,
        feedback: Option<&'a str>,
    ) -> GenerationRequest<'a> {
        GenerationRequest {
            batches,
            design,
            view,
            feedback,
            iteration: 1,
        }
    }

    #[tokio::test]
    async fn test_generates_every_planned_file() {
        let d = design();
        let batches = plan_batches(&d);
        let gateway = Arc::new(ScriptedGateway::from_fn(|_, user| stub_files(user)));
        let coordinator = GenerationCoordinator::new(gateway.clone());

        let files = coordinator
            .generate(&request(&batches, &d, DesignView::Full, None))
            .await
            .unwrap();

        let expected: usize = batches.iter().map(|b| b.targets.len()).sum();
        assert_eq!(files.len(), expected);
        assert_eq!(gateway.call_count(), batches.len());
        // passlib in the manifest triggers the bcrypt pin
        assert_eq!(
            files.get("requirements.txt"),
            Some("fastapi\npasslib\nbcrypt==4.0.1\n")
        );
    }

    #[tokio::test]
    async fn test_empty_responses_exhaust_attempts_and_abort() {
        let d = design();
        let batches = plan_batches(&d);
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(String::new()),
            Ok("   ".to_string()),
            Err(LlmError::EmptyResponse),
            Ok("{\"app/__init__.py\": \"\"}".to_string()),
        ]));
        let coordinator = GenerationCoordinator::new(gateway.clone());

        let err = coordinator
            .generate(&request(&batches, &d, DesignView::Full, None))
            .await
            .unwrap_err();

        match err {
            GenerationFailure::BatchFailed {
                batch,
                attempts,
                cause,
            } => {
                assert_eq!(batch, "core");
                assert_eq!(attempts, DEFAULT_MAX_ATTEMPTS);
                assert!(matches!(cause, AttemptFailure::EmptyResponse));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_garbage() {
        let d = design();
        let batches = plan_batches(&d);
        let core = &batches[..1];
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok("Sorry, here is some prose.".to_string()),
            Ok("--- app/config.py ---\nDEBUG = False\n".to_string()),
        ]));
        let coordinator = GenerationCoordinator::new(gateway.clone());

        let files = coordinator
            .generate(&request(core, &d, DesignView::Full, None))
            .await
            .unwrap();
        assert_eq!(files.get("app/config.py"), Some("DEBUG = False\n"));
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_foreign_and_unsafe_paths_are_dropped() {
        let d = design();
        let batches = plan_batches(&d);
        let users = batches.iter().find(|b| b.name == "surface:users").unwrap();
        let reply = json!({
            "./app/routers/users.py": "router = None\n",
            "app/routers/orders.py": "sneaky\n",
            "../escape.py": "bad\n"
        })
        .to_string();
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(reply)]));
        let coordinator = GenerationCoordinator::new(gateway);

        let files = coordinator
            .generate(&request(std::slice::from_ref(users), &d, DesignView::Full, None))
            .await
            .unwrap();
        assert_eq!(files.paths().collect::<Vec<_>>(), ["app/routers/users.py"]);
    }

    #[tokio::test]
    async fn test_reply_without_expected_files_is_a_failed_attempt() {
        let d = design();
        let batches = plan_batches(&d);
        let gateway = Arc::new(ScriptedGateway::from_fn(|_, _| {
            Ok(json!({"other.py": "x"}).to_string())
        }));
        let coordinator = GenerationCoordinator::new(gateway.clone()).with_max_attempts(2);

        let err = coordinator
            .generate(&request(&batches, &d, DesignView::Full, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationFailure::BatchFailed {
                cause: AttemptFailure::NoExpectedFiles { .. },
                attempts: 2,
                ..
            }
        ));
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_batch() {
        let d = design();
        let batches = plan_batches(&d);
        let gateway = Arc::new(ScriptedGateway::from_fn(|_, user| stub_files(user)));
        let cancel = CancelFlag::new();
        cancel.cancel();
        let coordinator = GenerationCoordinator::new(gateway.clone()).with_cancel(cancel);

        let err = coordinator
            .generate(&request(&batches, &d, DesignView::Full, None))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_condensed_view_and_feedback_reach_prompts() {
        let d = design();
        let batches = plan_batches(&d);
        let gateway = Arc::new(ScriptedGateway::from_fn(|_, user| stub_files(user)));
        let coordinator = GenerationCoordinator::new(gateway.clone());

        coordinator
            .generate(&request(
                &batches,
                &d,
                DesignView::Condensed("Project: shop\nEndpoints:\n  GET /users"),
                Some("(×3) NameError: name 'Session' is not defined"),
            ))
            .await
            .unwrap();

        for (_, user) in gateway.prompts() {
            assert!(user.starts_with("System Design:\nProject: shop\n"));
            assert!(!user.contains("\"project_name\""));
            assert!(user.contains("(×3) NameError"));
        }
    }

    #[tokio::test]
    async fn test_full_view_uses_design_json_and_reports_progress() {
        let d = design();
        let batches = plan_batches(&d);
        let gateway = Arc::new(ScriptedGateway::from_fn(|_, user| stub_files(user)));
        let sink = Arc::new(CollectingSink::new());
        let coordinator = GenerationCoordinator::new(gateway.clone()).with_progress(sink.clone());

        coordinator
            .generate(&request(&batches, &d, DesignView::Full, None))
            .await
            .unwrap();

        let prompts = gateway.prompts();
        assert!(prompts[0].1.contains("\"project_name\": \"shop\""));
        assert!(!prompts[0].1.contains("previous attempt"));
        // Later batches see earlier files for import reference.
        assert!(prompts[1].1.contains("--- app/models.py ---"));

        let events = sink.events();
        let starts = events.iter().filter(|e| e.event == "batch_start").count();
        assert_eq!(starts, batches.len());
        assert!(events.iter().all(|e| e.iteration == Some(1)));
    }
}
