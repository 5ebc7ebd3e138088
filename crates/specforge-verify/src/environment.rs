//! Per-project Python environment.
//!
//! Dependencies are installed into `<project>/.venv` with the venv's own
//! interpreter. Nothing is installed into a shared interpreter.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use specforge_config::{TargetProfile, Timeouts};
use specforge_runner::{CommandSpec, ProcessRunner};
use tracing::{debug, warn};

pub const VENV_DIR: &str = ".venv";

/// Packages the test battery needs on top of the project's manifest.
pub const TEST_PACKAGES: [&str; 3] = ["pytest", "pytest-asyncio", "httpx"];

/// Interpreter to run project commands with, plus what happened while
/// preparing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonEnv {
    pub python: PathBuf,
    pub isolated: bool,
    pub setup_log: String,
}

impl PythonEnv {
    /// Command running `python -m <module>` inside the project.
    #[must_use]
    pub fn module_command(&self, project_dir: &Path, module: &str) -> CommandSpec {
        CommandSpec::new(self.python.as_os_str())
            .arg("-m")
            .arg(module)
            .cwd(project_dir)
            .env("PYTHONPATH", project_dir.as_os_str())
            .env("PYTHONDONTWRITEBYTECODE", "1")
    }
}

#[must_use]
pub fn venv_python(project_dir: &Path) -> PathBuf {
    let venv = project_dir.join(VENV_DIR);
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// Create the venv and install the manifest plus test packages.
///
/// Never fails: a broken environment shows up as failing checks, and the
/// reason is kept in `setup_log` so it reaches the repair prompt.
pub fn prepare_environment(
    runner: &dyn ProcessRunner,
    project_dir: &Path,
    profile: &TargetProfile,
    timeouts: &Timeouts,
) -> PythonEnv {
    let mut log = String::new();
    let python = venv_python(project_dir);

    if !python.exists() {
        let create = CommandSpec::new(&profile.python)
            .args(["-m", "venv", VENV_DIR])
            .cwd(project_dir);
        match runner.run(&create, timeouts.dependency_install) {
            Ok(out) if out.success() => debug!(dir = %project_dir.display(), "Created venv"),
            Ok(out) => {
                let _ = writeln!(log, "venv creation failed:\n{}", out.combined().trim());
            }
            Err(e) => {
                let _ = writeln!(log, "venv creation failed: {e}");
            }
        }
    }

    if !python.exists() {
        let fallback = system_python(profile);
        warn!(python = %fallback.display(), "Using system interpreter without isolation");
        return PythonEnv {
            python: fallback,
            isolated: false,
            setup_log: log,
        };
    }

    let env = PythonEnv {
        python,
        isolated: true,
        setup_log: String::new(),
    };

    let mut install = env.module_command(project_dir, "pip").args(["install", "-q"]);
    if project_dir.join(&profile.manifest).is_file() {
        install = install.arg("-r").arg(&profile.manifest);
    } else {
        let _ = writeln!(log, "{} not found; installing test packages only", profile.manifest);
    }
    install = install.args(TEST_PACKAGES);

    match runner.run(&install, timeouts.dependency_install) {
        Ok(out) if out.success() => {}
        Ok(out) => {
            let _ = writeln!(
                log,
                "dependency install failed (exit {}):\n{}",
                out.exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                tail(&out.combined(), 30)
            );
        }
        Err(e) => {
            let _ = writeln!(log, "dependency install failed: {e}");
        }
    }

    PythonEnv {
        setup_log: log,
        ..env
    }
}

fn system_python(profile: &TargetProfile) -> PathBuf {
    [profile.python.as_str(), "python3", "python"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
        .unwrap_or_else(|| PathBuf::from(&profile.python))
}

/// Last `n` lines of `text`.
pub(crate) fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
