use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specforge_utils::{ExitCode, write_file_atomic};
use specforge_verify::VerificationReport;

use crate::state::{IterationHistory, RunOutcome};

pub const REPORT_FILE: &str = "_specforge_report.json";

/// Machine-readable record of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// BLAKE3 of the spec text the run started from
    pub spec_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub output_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_error: Option<String>,
    #[serde(default)]
    pub design_from_cache: bool,
    pub iterations: IterationHistory,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        self.outcome.exit_code()
    }

    /// Report of the last iteration that reached verification.
    #[must_use]
    pub fn final_report(&self) -> Option<&VerificationReport> {
        self.iterations.iter().rev().find_map(|r| r.report.as_ref())
    }

    #[must_use]
    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    /// Write the summary as `_specforge_report.json` in `dir`.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        let path = Utf8PathBuf::from_path_buf(dir.join(REPORT_FILE))
            .map_err(|p| anyhow::anyhow!("Report path is not valid UTF-8: {}", p.display()))?;
        write_file_atomic(&path, &json)?;
        Ok(())
    }

    /// Read a summary left by an earlier run, if any.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(REPORT_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let summary = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let summary = RunSummary {
            outcome: RunOutcome::Exhausted,
            spec_hash: "abc".into(),
            project_name: Some("shortener".into()),
            output_dir: dir.path().to_path_buf(),
            design_error: None,
            design_from_cache: false,
            iterations: IterationHistory::default(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        summary.write(dir.path()).unwrap();
        let loaded = RunSummary::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, summary);
        assert_eq!(loaded.exit_code(), ExitCode::EXHAUSTED);
        assert!(loaded.final_report().is_none());
    }

    #[test]
    fn test_missing_summary_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunSummary::load(dir.path()).unwrap().is_none());
    }
}
