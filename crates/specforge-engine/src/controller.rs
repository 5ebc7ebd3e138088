//! The design, generate, verify and repair loop.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use specforge_config::RunConfig;
use specforge_design::{DesignExtractor, LlmDesignExtractor, StructuredDesign};
use specforge_feedback::{DigestInput, FailureDigester, condense_design};
use specforge_generation::{DesignView, GenerationCoordinator, GenerationRequest};
use specforge_llm::ProviderGateway;
use specforge_planner::plan_batches;
use specforge_runner::ProcessRunner;
use specforge_utils::lock::LOCK_FILE_NAME;
use specforge_utils::{OutputLock, ProgressEvent, Stage};
use specforge_verify::{VerificationReport, Verifier};

use crate::analysis::analyze_failures;
use crate::cache::{cached_design, spec_hash, store_design};
use crate::materialize::materialize;
use crate::state::{IterationHistory, IterationRecord, RunOutcome, StateTracker, WorkflowState};
use crate::summary::RunSummary;

/// Runs one spec through design extraction and up to `max_iterations`
/// generate-and-verify passes.
///
/// Each pass regenerates the whole project. From the second pass on, prompts
/// carry the condensed design and a digest of what failed last time.
pub struct WorkflowController {
    config: RunConfig,
    gateway: Arc<dyn ProviderGateway>,
    runner: Arc<dyn ProcessRunner>,
    extractor: Arc<dyn DesignExtractor>,
}

impl WorkflowController {
    pub fn new(
        config: RunConfig,
        gateway: Arc<dyn ProviderGateway>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let extractor = Arc::new(LlmDesignExtractor::new(Arc::clone(&gateway)));
        Self {
            config,
            gateway,
            runner,
            extractor,
        }
    }

    /// Replace the provider-backed design extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn DesignExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn emit(&self, stage: Stage, event: &str, message: String, iteration: Option<u32>) {
        let mut event = ProgressEvent::new(stage, event, message);
        if let Some(iteration) = iteration {
            event = event.with_iteration(iteration);
        }
        self.config.progress.emit(&event);
    }

    /// Run the workflow to a terminal outcome.
    ///
    /// Errors are reserved for the output directory itself (locking,
    /// cleaning, writing). Provider and verification problems end up in the
    /// returned summary.
    pub async fn run(&self, spec_text: &str) -> Result<RunSummary> {
        let started_at = Utc::now();
        let output_dir = self.config.output_dir.clone();
        let _lock = OutputLock::acquire(&output_dir)?;
        if self.config.clean {
            clean_output_dir(&output_dir)?;
        }

        let hash = spec_hash(spec_text);
        let mut summary = RunSummary {
            outcome: RunOutcome::Exhausted,
            spec_hash: hash.clone(),
            project_name: None,
            output_dir: output_dir.clone(),
            design_error: None,
            design_from_cache: false,
            iterations: IterationHistory::default(),
            started_at,
            finished_at: started_at,
        };

        info!(
            output_dir = %output_dir.display(),
            max_iterations = self.config.max_iterations,
            "Starting run"
        );
        self.emit(
            Stage::Workflow,
            "run_start",
            format!("Writing project to {}", output_dir.display()),
            None,
        );
        let mut states = StateTracker::start(Arc::clone(&self.config.progress));

        let previous_files = if self.config.clean {
            BTreeSet::new()
        } else {
            previous_run_files(&output_dir)
        };

        if self.config.cancel.is_cancelled() {
            summary.outcome = states.finish(RunOutcome::Cancelled, None)?;
            return self.finish(summary);
        }

        let design = match self.design(spec_text, &hash, &mut summary, &mut states).await? {
            Some(design) => design,
            None => return self.finish(summary),
        };
        summary.project_name = Some(design.project_name.clone());

        summary.outcome = self
            .iterate(&design, previous_files, &mut summary.iterations, &mut states)
            .await?;
        self.finish(summary)
    }

    async fn design(
        &self,
        spec_text: &str,
        hash: &str,
        summary: &mut RunSummary,
        states: &mut StateTracker,
    ) -> Result<Option<StructuredDesign>> {
        let output_dir = &self.config.output_dir;
        if !self.config.clean
            && let Some(design) = cached_design(output_dir, hash)
        {
            info!(project = %design.project_name, "Reusing cached design");
            self.emit(
                Stage::Design,
                "design_cached",
                format!("Reusing design for {}", design.project_name),
                None,
            );
            summary.design_from_cache = true;
            return Ok(Some(design));
        }

        self.emit(Stage::Design, "design_start", "Extracting design".to_string(), None);
        match self.extractor.extract(spec_text).await {
            Ok(design) => {
                info!(
                    project = %design.project_name,
                    endpoints = design.endpoints.len(),
                    "Design extracted"
                );
                store_design(output_dir, &design)?;
                self.emit(
                    Stage::Design,
                    "design_done",
                    format!(
                        "{} with {} endpoints",
                        design.project_name,
                        design.endpoints.len()
                    ),
                    None,
                );
                Ok(Some(design))
            }
            Err(failure) => {
                let reason = failure.reason();
                warn!(error = %reason, "Design extraction failed");
                self.emit(Stage::Design, "design_failed", reason.clone(), None);
                summary.outcome = states.finish(RunOutcome::DesignFailed, None)?;
                summary.design_error = Some(reason);
                Ok(None)
            }
        }
    }

    async fn iterate(
        &self,
        design: &StructuredDesign,
        mut previous_files: BTreeSet<String>,
        history: &mut IterationHistory,
        states: &mut StateTracker,
    ) -> Result<RunOutcome> {
        let output_dir = self.config.output_dir.clone();
        let max_iterations = self.config.max_iterations;
        let batches = plan_batches(design);
        let condensed = condense_design(design);
        let coordinator = GenerationCoordinator::new(Arc::clone(&self.gateway))
            .with_manifest_path(self.config.profile.manifest.clone())
            .with_progress(Arc::clone(&self.config.progress))
            .with_cancel(self.config.cancel.clone());
        let verifier = Arc::new(Verifier::from_config(&self.config, Arc::clone(&self.runner)));
        let digester = FailureDigester::new();
        let mut feedback: Option<String> = None;

        for iteration in 1..=max_iterations {
            if self.config.cancel.is_cancelled() {
                return states.finish(RunOutcome::Cancelled, Some(iteration));
            }
            states.advance(WorkflowState::Generating, Some(iteration))?;
            info!(iteration, max_iterations, batches = batches.len(), "Starting iteration");
            self.emit(
                Stage::Workflow,
                "iteration_start",
                format!("Iteration {iteration}/{max_iterations}"),
                Some(iteration),
            );

            let view = if iteration == 1 {
                DesignView::Full
            } else {
                DesignView::Condensed(&condensed)
            };
            let request = GenerationRequest {
                batches: &batches,
                design,
                view,
                feedback: feedback.as_deref(),
                iteration,
            };
            let artifacts = match coordinator.generate(&request).await {
                Ok(artifacts) => artifacts,
                Err(failure) if failure.is_cancelled() => {
                    return states.finish(RunOutcome::Cancelled, Some(iteration));
                }
                Err(failure) => {
                    let message = failure.to_string();
                    warn!(iteration, error = %message, "Generation failed");
                    let digest = digester.digest_messages([message.clone()]).into_string();
                    history.push(IterationRecord {
                        iteration,
                        files: Vec::new(),
                        generation_error: Some(message),
                        test_output: String::new(),
                        report: None,
                        feedback: Some(digest.clone()),
                    });
                    if iteration == max_iterations {
                        return states.finish(RunOutcome::Exhausted, Some(iteration));
                    }
                    states.advance(WorkflowState::Repairing, Some(iteration))?;
                    feedback = Some(digest);
                    continue;
                }
            };

            let stats = materialize(&output_dir, &artifacts, &previous_files)?;
            info!(
                iteration,
                written = stats.written,
                removed = stats.removed,
                "Project materialized"
            );
            previous_files = artifacts.paths().map(str::to_string).collect();
            let files: Vec<String> = previous_files.iter().cloned().collect();

            if self.config.cancel.is_cancelled() {
                history.push(IterationRecord {
                    iteration,
                    files,
                    generation_error: None,
                    test_output: String::new(),
                    report: None,
                    feedback: None,
                });
                return states.finish(RunOutcome::Cancelled, Some(iteration));
            }

            states.advance(WorkflowState::Verifying, Some(iteration))?;

            let report = {
                let verifier = Arc::clone(&verifier);
                let dir = output_dir.clone();
                let design = design.clone();
                tokio::task::spawn_blocking(move || verifier.run(&dir, &design))
                    .await
                    .context("Verification task failed")?
            };
            info!(
                iteration,
                passed = report.passed,
                summary = %report.summary_line(),
                "Verification finished"
            );
            self.emit(
                Stage::Workflow,
                "iteration_done",
                report.summary_line(),
                Some(iteration),
            );

            let test_output = report
                .test_run
                .as_ref()
                .map(|run| run.output.clone())
                .unwrap_or_default();

            if report.passed || iteration == max_iterations {
                let passed = report.passed;
                history.push(IterationRecord {
                    iteration,
                    files,
                    generation_error: None,
                    test_output,
                    report: Some(report),
                    feedback: None,
                });
                let outcome = if passed {
                    RunOutcome::Succeeded
                } else {
                    RunOutcome::Exhausted
                };
                return states.finish(outcome, Some(iteration));
            }

            let analysis = self.analysis(&report, &test_output, &artifacts).await;
            let check_failures: Vec<String> = report
                .failures()
                .map(|check| format!("{}: {}", check.name, check.detail))
                .collect();
            let digest = digester
                .digest(&DigestInput {
                    test_output: &test_output,
                    analysis: &analysis,
                    check_failures: &check_failures,
                })
                .into_string();

            history.push(IterationRecord {
                iteration,
                files,
                generation_error: None,
                test_output,
                report: Some(report),
                feedback: Some(digest.clone()),
            });
            states.advance(WorkflowState::Repairing, Some(iteration))?;
            feedback = Some(digest);
        }

        bail!(
            "Iteration loop ended in state {} without an outcome",
            states.current()
        )
    }

    async fn analysis(
        &self,
        report: &VerificationReport,
        test_output: &str,
        artifacts: &specforge_generation::ArtifactSet,
    ) -> String {
        let tests_failed = report.test_run.as_ref().is_some_and(|run| !run.succeeded());
        if !self.config.analyze_failures || !tests_failed {
            return String::new();
        }
        match analyze_failures(self.gateway.as_ref(), test_output, artifacts).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failure analysis unavailable");
                String::new()
            }
        }
    }

    fn finish(&self, mut summary: RunSummary) -> Result<RunSummary> {
        summary.finished_at = Utc::now();
        summary.write(&self.config.output_dir)?;
        info!(
            outcome = %summary.outcome,
            iterations = summary.iteration_count(),
            "Run finished"
        );
        self.config.progress.emit(
            &ProgressEvent::new(
                Stage::Workflow,
                "run_done",
                format!("Run {}", summary.outcome),
            )
            .with_data(json!({
                "outcome": summary.outcome,
                "iterations": summary.iteration_count(),
            })),
        );
        Ok(summary)
    }
}

/// Files written by the latest iteration of an earlier run in `dir`.
fn previous_run_files(dir: &Path) -> BTreeSet<String> {
    match RunSummary::load(dir) {
        Ok(Some(summary)) => summary
            .iterations
            .iter()
            .rev()
            .find(|record| !record.files.is_empty())
            .map(|record| record.files.iter().cloned().collect())
            .unwrap_or_default(),
        Ok(None) => BTreeSet::new(),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Ignoring unreadable run summary");
            BTreeSet::new()
        }
    }
}

/// Empty `dir` except for the lock this run holds.
fn clean_output_dir(dir: &Path) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_name() == LOCK_FILE_NAME {
            continue;
        }
        let path: PathBuf = entry.path();
        let removed = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
