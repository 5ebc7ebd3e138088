//! Command implementations.
//!
//! Each command prints its own output and returns the exit code to use on
//! failure. Errors are rendered through `SpecforgeError::display_for_user`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use specforge_config::{CliArgs, RunConfig};
use specforge_design::{DESIGN_CACHE_FILE, StructuredDesign};
use specforge_engine::{RunOutcome, RunSummary, WorkflowController, load_design_file};
use specforge_llm::{ProviderGateway, gateway_from_run_config};
use specforge_runner::NativeRunner;
use specforge_utils::{ConfigError, ExitCode, LockError, SpecforgeError};
use specforge_verify::{VerificationReport, Verifier};
use tracing::{info, warn};

use super::args::{GenerateArgs, VerifyArgs};
use super::progress::ConsoleSink;

pub const EXAMPLE_SPEC: &str = include_str!("../../demos/url-shortener.md");

fn fail(err: SpecforgeError) -> ExitCode {
    eprintln!("{}", err.display_for_user());
    err.to_exit_code()
}

fn discover(cli_args: &CliArgs) -> Result<RunConfig, ExitCode> {
    RunConfig::discover(cli_args).map_err(|e| fail(SpecforgeError::Config(e)))
}

pub(crate) async fn generate(
    config_path: Option<PathBuf>,
    args: GenerateArgs,
) -> Result<(), ExitCode> {
    let spec_text = fs::read_to_string(&args.spec).map_err(|e| {
        fail(SpecforgeError::SpecInput {
            path: args.spec.display().to_string(),
            reason: e.to_string(),
        })
    })?;

    let cli_args = CliArgs {
        config_path,
        provider: args.provider,
        model: args.model.clone(),
        api_key_env: args.api_key_env.clone(),
        output_dir: args.output.clone(),
        max_iterations: args.max_iterations,
        clean: args.clean,
        no_docker: args.no_docker,
        no_smoke: args.no_smoke,
    };
    let mut config = discover(&cli_args)?;
    if !args.json {
        config = config.with_progress(Arc::new(ConsoleSink));
    }

    let provider = config.resolved_provider();
    let gateway: Arc<dyn ProviderGateway> = match gateway_from_run_config(&config) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            return Err(fail(SpecforgeError::ProviderUnavailable {
                provider: provider.to_string(),
                reason: e.to_string(),
            }));
        }
    };

    if !args.json {
        println!("Spec:           {}", args.spec.display());
        println!("Output:         {}", config.output_dir.display());
        println!("Provider:       {provider}");
        println!("Model:          {}", config.model);
        println!("Max iterations: {}\n", config.max_iterations);
    }

    let cancel = config.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next batch boundary");
            cancel.cancel();
        }
    });

    let controller = WorkflowController::new(config, Arc::clone(&gateway), Arc::new(NativeRunner::new()));
    let result = controller.run(&spec_text).await;
    gateway.shutdown().await;

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => return Err(fail(run_error(e, &controller.config().output_dir))),
    };

    if args.json {
        print_json(&summary);
    } else {
        print_summary(&summary);
    }

    match summary.outcome {
        RunOutcome::Succeeded => Ok(()),
        _ => Err(summary.exit_code()),
    }
}

fn run_error(err: anyhow::Error, output_dir: &Path) -> SpecforgeError {
    if let Some(LockError::Held { .. }) = err.downcast_ref::<LockError>() {
        return SpecforgeError::OutputLocked {
            path: output_dir.display().to_string(),
        };
    }
    SpecforgeError::Other(format!("{err:#}"))
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}

fn print_summary(summary: &RunSummary) {
    if let Some(report) = summary.final_report() {
        println!("\n{}", report.render_table());
    }
    let iterations = summary.iteration_count();
    match summary.outcome {
        RunOutcome::Succeeded => println!(
            "✓ Project generated in {} after {iterations} iteration(s)",
            summary.output_dir.display()
        ),
        RunOutcome::DesignFailed => println!(
            "✗ Design extraction failed: {}",
            summary.design_error.as_deref().unwrap_or("unknown reason")
        ),
        RunOutcome::Exhausted => {
            println!("✗ Checks still failing after {iterations} iteration(s)");
            if let Some(error) = summary
                .iterations
                .latest()
                .and_then(|r| r.generation_error.as_deref())
            {
                println!("  Last generation error: {error}");
            }
            println!(
                "  The last generated project is kept in {} for inspection",
                summary.output_dir.display()
            );
        }
        RunOutcome::Cancelled => println!("✗ Run cancelled after {iterations} iteration(s)"),
    }
}

pub(crate) fn verify(config_path: Option<PathBuf>, args: VerifyArgs) -> Result<(), ExitCode> {
    if !args.project_dir.is_dir() {
        return Err(fail(SpecforgeError::Config(ConfigError::InvalidValue {
            key: "project_dir".to_string(),
            value: format!("{} is not a directory", args.project_dir.display()),
        })));
    }

    let config = discover(&CliArgs {
        config_path,
        no_docker: args.no_docker,
        ..CliArgs::default()
    })?;
    let design = verification_design(&args.project_dir, args.design.as_deref())?;
    info!(
        project = %args.project_dir.display(),
        endpoints = design.endpoints.len(),
        "Verifying project"
    );

    let mut verifier = Verifier::from_config(&config, Arc::new(NativeRunner::new()));
    if !args.json {
        println!("Verifying project: {}\n", args.project_dir.display());
        verifier = verifier.with_progress(Arc::new(ConsoleSink));
    }
    let report = verifier.run(&args.project_dir, &design);

    if args.json {
        print_json(&report);
    } else {
        print_report(&report);
    }
    if report.passed {
        Ok(())
    } else {
        Err(ExitCode::VERIFICATION_FAILED)
    }
}

/// The explicit design, else the project's cached one, else an empty design.
fn verification_design(
    project_dir: &Path,
    explicit: Option<&Path>,
) -> Result<StructuredDesign, ExitCode> {
    let load = |path: &Path| {
        load_design_file(path).map_err(|e| {
            fail(SpecforgeError::Config(ConfigError::InvalidFile(format!("{e:#}"))))
        })
    };
    if let Some(path) = explicit {
        return load(path);
    }
    let cached = project_dir.join(DESIGN_CACHE_FILE);
    if cached.is_file() {
        return load(&cached);
    }
    warn!("No cached design found; endpoint coverage has nothing to check");
    Ok(empty_design(project_dir))
}

fn empty_design(project_dir: &Path) -> StructuredDesign {
    let name = project_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    StructuredDesign {
        project_name: name,
        description: String::new(),
        python_version: "3.12".to_string(),
        dependencies: Vec::new(),
        endpoints: Vec::new(),
        database_models: Vec::new(),
        env_variables: Vec::new(),
        deployment: Default::default(),
        middlewares: Vec::new(),
        additional_notes: String::new(),
    }
}

fn print_report(report: &VerificationReport) {
    println!("\n{}", report.render_table());
    if report.passed {
        println!("✓ All gating checks passed ({})", report.summary_line());
    } else {
        println!("✗ Verification failed ({})", report.summary_line());
    }
}

pub(crate) fn example(copy_to: Option<&Path>) -> Result<(), ExitCode> {
    match copy_to {
        Some(path) => {
            fs::write(path, EXAMPLE_SPEC).map_err(|e| fail(SpecforgeError::Io(e)))?;
            println!("✓ Example spec copied to {}", path.display());
        }
        None => print!("{EXAMPLE_SPEC}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_spec_lists_health_endpoint() {
        assert!(EXAMPLE_SPEC.starts_with("# URL Shortener"));
        assert!(EXAMPLE_SPEC.contains("/health"));
    }

    #[test]
    fn test_missing_cached_design_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let design = verification_design(dir.path(), None).unwrap();
        assert!(design.endpoints.is_empty());
        assert!(design.validate().is_ok());
    }

    #[test]
    fn test_held_lock_maps_to_output_locked() {
        let err = anyhow::Error::new(LockError::Held {
            path: "out".into(),
            pid: 1,
            since: "now".into(),
        });
        let mapped = run_error(err, Path::new("out"));
        assert!(matches!(mapped, SpecforgeError::OutputLocked { .. }));
    }
}
