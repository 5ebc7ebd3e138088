//! CLI argument definitions (clap).

use clap::{Args, Parser, Subcommand};
use specforge_config::ProviderKind;
use std::path::PathBuf;

/// specforge - generate tested, container-ready services from Markdown specs
#[derive(Parser, Debug)]
#[command(name = "specforge")]
#[command(about = "Generate tested, container-ready FastAPI services from Markdown specs")]
#[command(long_about = r#"
specforge reads a Markdown product spec, extracts a structured design, generates
the project batch by batch and verifies it (tests, startup, container build,
endpoint coverage, structure). Failures are digested and fed into the next
iteration until the checks pass or the iteration budget runs out.

EXAMPLES:
  # Print the built-in example spec
  specforge example

  # Generate a project from it
  specforge example --copy-to shortener.md
  specforge generate shortener.md -o ./output

  # Use a local subprocess provider instead of an API key
  specforge generate shortener.md -p claude-cli

  # Re-run the verification battery on an existing project
  specforge verify ./output --no-docker

CONFIGURATION:
  Precedence: CLI flags > config file > defaults
  The config file is discovered by searching upward from CWD for .specforge/config.toml
  Use --config to give an explicit path

EXIT CODES:
  0 success, 2 bad arguments or config, 3 design extraction failed,
  4 iterations exhausted, 5 verification failed, 6 provider unavailable,
  130 cancelled
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a service from a Markdown spec
    Generate(GenerateArgs),

    /// Run the verification battery on an existing project
    Verify(VerifyArgs),

    /// Show or copy the built-in example spec (URL shortener)
    Example {
        /// Write the example spec to this path instead of printing it
        #[arg(short, long)]
        copy_to: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Path to the Markdown spec file
    pub spec: PathBuf,

    /// Output directory for the generated project
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum number of generate/verify iterations
    #[arg(short = 'm', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_iterations: Option<u32>,

    /// Model to request from the provider
    #[arg(long)]
    pub model: Option<String>,

    /// Provider: api, anthropic, openai, openrouter, moonshot, deepseek, claude-cli, pi
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Environment variable holding the API key
    #[arg(long)]
    pub api_key_env: Option<String>,

    /// Empty the output directory before generating
    #[arg(long)]
    pub clean: bool,

    /// Skip the container build check
    #[arg(long)]
    pub no_docker: bool,

    /// Skip the startup smoke check
    #[arg(long)]
    pub no_smoke: bool,

    /// Print the run summary as JSON instead of the report table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Path to a generated project directory
    pub project_dir: PathBuf,

    /// Design JSON to verify against (defaults to the project's cached design)
    #[arg(long)]
    pub design: Option<PathBuf>,

    /// Skip the container build check
    #[arg(long)]
    pub no_docker: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}
