//! The design cached next to the generated project.
//!
//! `_system_design.json` is reused only when the previous run's summary was
//! produced from the same spec text.

use std::path::Path;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use specforge_design::{DESIGN_CACHE_FILE, StructuredDesign};
use specforge_utils::write_file_atomic;
use tracing::{debug, warn};

use crate::state::RunOutcome;
use crate::summary::RunSummary;

#[must_use]
pub fn spec_hash(spec_text: &str) -> String {
    blake3::hash(spec_text.as_bytes()).to_hex().to_string()
}

/// Load and validate a design file.
pub fn load_design_file(path: &Path) -> Result<StructuredDesign> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read design {}", path.display()))?;
    let design = StructuredDesign::from_json_str(&text)
        .with_context(|| format!("Failed to parse design {}", path.display()))?;
    design
        .validate()
        .map_err(|problems| anyhow::anyhow!("Design is malformed: {}", problems.join("; ")))?;
    Ok(design)
}

/// Cached design for this spec, if an earlier run left a usable one.
#[must_use]
pub fn cached_design(output_dir: &Path, spec_hash: &str) -> Option<StructuredDesign> {
    let summary = match RunSummary::load(output_dir) {
        Ok(Some(summary)) => summary,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Ignoring unreadable run summary");
            return None;
        }
    };
    if summary.outcome == RunOutcome::DesignFailed {
        return None;
    }
    if summary.spec_hash != spec_hash {
        debug!("Spec changed since the cached design was written");
        return None;
    }
    match load_design_file(&output_dir.join(DESIGN_CACHE_FILE)) {
        Ok(design) => Some(design),
        Err(e) => {
            debug!(error = %format!("{e:#}"), "Cached design unusable");
            None
        }
    }
}

pub fn store_design(output_dir: &Path, design: &StructuredDesign) -> Result<()> {
    let json = design.to_pretty_json().context("Failed to serialize design")?;
    let path = Utf8PathBuf::from_path_buf(output_dir.join(DESIGN_CACHE_FILE))
        .map_err(|p| anyhow::anyhow!("Design path is not valid UTF-8: {}", p.display()))?;
    write_file_atomic(&path, &json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IterationHistory;
    use chrono::Utc;

    fn design() -> StructuredDesign {
        StructuredDesign::from_json_str(
            r#"{"project_name": "shortener", "endpoints": [{"method": "GET", "path": "/health"}]}"#,
        )
        .unwrap()
    }

    fn write_summary(dir: &Path, hash: &str, outcome: RunOutcome) {
        RunSummary {
            outcome,
            spec_hash: hash.into(),
            project_name: None,
            output_dir: dir.to_path_buf(),
            design_error: None,
            design_from_cache: false,
            iterations: IterationHistory::default(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
        .write(dir)
        .unwrap();
    }

    #[test]
    fn test_hash_is_stable_and_content_sensitive() {
        assert_eq!(spec_hash("a"), spec_hash("a"));
        assert_ne!(spec_hash("a"), spec_hash("b"));
        assert_eq!(spec_hash("a").len(), 64);
    }

    #[test]
    fn test_cache_hit_requires_matching_hash() {
        let dir = tempfile::tempdir().unwrap();
        store_design(dir.path(), &design()).unwrap();
        write_summary(dir.path(), &spec_hash("spec v1"), RunOutcome::Exhausted);

        assert_eq!(cached_design(dir.path(), &spec_hash("spec v1")), Some(design()));
        assert_eq!(cached_design(dir.path(), &spec_hash("spec v2")), None);
    }

    #[test]
    fn test_design_failed_run_is_not_a_cache_source() {
        let dir = tempfile::tempdir().unwrap();
        store_design(dir.path(), &design()).unwrap();
        write_summary(dir.path(), &spec_hash("spec"), RunOutcome::DesignFailed);
        assert_eq!(cached_design(dir.path(), &spec_hash("spec")), None);
    }

    #[test]
    fn test_no_summary_no_cache() {
        let dir = tempfile::tempdir().unwrap();
        store_design(dir.path(), &design()).unwrap();
        assert_eq!(cached_design(dir.path(), &spec_hash("x")), None);
    }

    #[test]
    fn test_load_design_file_rejects_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.json");
        std::fs::write(&path, r#"{"project_name": "", "endpoints": [{"method": "GET", "path": "x"}]}"#).unwrap();
        let err = load_design_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("malformed"));
    }
}
