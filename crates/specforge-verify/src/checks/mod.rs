//! The verification battery, one module per check.

use std::path::{Path, PathBuf};

use specforge_config::{ChecksConfig, TargetProfile, Timeouts};
use specforge_design::StructuredDesign;
use specforge_runner::ProcessRunner;
use walkdir::{DirEntry, WalkDir};

use crate::environment::{PythonEnv, VENV_DIR};
use crate::report::TestRunSummary;

pub(crate) mod container;
pub(crate) mod coverage;
pub(crate) mod meaningful;
pub(crate) mod smoke;
pub(crate) mod structure;

#[cfg(test)]
pub(crate) mod testing;

/// Everything a check may look at. Checks never write into the project.
pub(crate) struct CheckContext<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub project_dir: &'a Path,
    pub design: &'a StructuredDesign,
    pub profile: &'a TargetProfile,
    pub timeouts: &'a Timeouts,
    pub checks: &'a ChecksConfig,
    /// Present when a check that runs project code is enabled
    pub env: Option<&'a PythonEnv>,
    /// Present once the test check has run
    pub test_run: Option<&'a TestRunSummary>,
}

impl CheckContext<'_> {
    pub fn path(&self, relative: &str) -> PathBuf {
        self.project_dir.join(relative)
    }

    pub fn read(&self, relative: &str) -> Option<String> {
        std::fs::read_to_string(self.path(relative)).ok()
    }
}

/// Python sources under `dir`, as project-relative paths with `/`
/// separators, skipping the venv, caches and hidden directories.
pub(crate) fn python_files(project_dir: &Path, dir: &str) -> Vec<String> {
    let start = match dir {
        "" | "." => project_dir.to_path_buf(),
        sub => project_dir.join(sub),
    };
    let mut found: Vec<String> = WalkDir::new(&start)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".py"))
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(project_dir).ok()?;
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("/"))
        })
        .collect();
    found.sort();
    found
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "__pycache__" || name == VENV_DIR
}
