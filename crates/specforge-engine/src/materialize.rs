//! Writing an artifact set to the output directory.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use specforge_generation::ArtifactSet;
use specforge_utils::write_file_atomic;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    pub written: usize,
    pub removed: usize,
}

/// Write `artifacts` under `output_dir`, first deleting files that
/// `previous` produced and this set no longer contains.
///
/// Files the run did not generate are never touched.
pub fn materialize(
    output_dir: &Path,
    artifacts: &ArtifactSet,
    previous: &BTreeSet<String>,
) -> Result<MaterializeStats> {
    let root = Utf8PathBuf::from_path_buf(output_dir.to_path_buf())
        .map_err(|p| anyhow::anyhow!("Output directory is not valid UTF-8: {}", p.display()))?;

    let mut stats = MaterializeStats::default();
    for stale in previous.iter().filter(|p| !artifacts.contains(p)) {
        let path = root.join(stale);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %stale, "Removed stale file");
                stats.removed += 1;
                prune_empty_parents(&root, &path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to remove stale file {path}")),
        }
    }

    for (relative, content) in artifacts.iter() {
        write_file_atomic(&root.join(relative), content)
            .with_context(|| format!("Failed to write {relative}"))?;
        stats.written += 1;
    }
    Ok(stats)
}

fn prune_empty_parents(root: &Utf8Path, file: &Utf8Path) {
    let mut dir = file.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        if std::fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}
