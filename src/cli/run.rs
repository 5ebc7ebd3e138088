//! CLI entry point and dispatch.

use clap::Parser;
use specforge_utils::{ExitCode, init_tracing};

use super::args::{Cli, Commands};
use super::commands;

/// Parse arguments, run the command and report its exit code.
///
/// All output, errors included, is printed here or in the command handlers;
/// `main` only maps the returned code to the process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.log_json) {
        eprintln!("warning: logging unavailable: {e}");
    }

    match cli.command {
        Commands::Example { copy_to } => commands::example(copy_to.as_deref()),
        Commands::Verify(args) => commands::verify(cli.config, args),
        Commands::Generate(args) => {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("✗ Failed to create async runtime: {e}");
                    return Err(ExitCode::INTERNAL);
                }
            };
            rt.block_on(commands::generate(cli.config, args))
        }
    }
}
