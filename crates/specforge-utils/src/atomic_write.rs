//! Atomic file writes: temp file in the target directory, fsync, rename.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Result of an atomic write operation
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteResult {
    /// Bytes written after line-ending normalization
    pub bytes_written: usize,
    /// Whether the target existed before the write
    pub replaced_existing: bool,
}

/// Atomically write `content` to `path`.
///
/// Line endings are normalized to LF and missing parent directories are
/// created. Readers never observe a partially written file.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let normalized = normalize_line_endings(content);
    let replaced_existing = path.exists();

    let temp_dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(temp_dir)
        .with_context(|| format!("Failed to create parent directory: {temp_dir}"))?;

    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(normalized.as_bytes())
        .with_context(|| "Failed to write content to temporary file")?;

    temp_file
        .as_file()
        .sync_all()
        .with_context(|| "Failed to fsync temporary file")?;

    temp_file
        .persist(path.as_std_path())
        .map_err(|e| anyhow::anyhow!(e.error))
        .with_context(|| format!("Failed to atomically write file: {path}"))?;

    Ok(AtomicWriteResult {
        bytes_written: normalized.len(),
        replaced_existing,
    })
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let target = utf8(&dir).join("app/routers/users.py");

        let result = write_file_atomic(&target, "print('hi')\n").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "print('hi')\n");
        assert_eq!(result.bytes_written, 12);
        assert!(!result.replaced_existing);
    }

    #[test]
    fn test_write_replaces_and_normalizes() {
        let dir = TempDir::new().unwrap();
        let target = utf8(&dir).join("README.md");
        fs::write(&target, "old").unwrap();

        let result = write_file_atomic(&target, "a\r\nb\rc").unwrap();

        assert!(result.replaced_existing);
        assert_eq!(fs::read_to_string(&target).unwrap(), "a\nb\nc");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let target = utf8(&dir).join("x.txt");
        write_file_atomic(&target, "x").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
