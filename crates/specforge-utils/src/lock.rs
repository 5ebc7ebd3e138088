//! Output directory lock.
//!
//! A run claims its output directory by creating `.specforge.lock` with
//! `create_new`, so two runs pointed at the same directory cannot interleave
//! writes. The lock file is removed on drop.
//!
//! A lock left behind by a killed run is taken over when its holder is no
//! longer running or the lock is older than [`STALE_AFTER_SECS`].

use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

pub const LOCK_FILE_NAME: &str = ".specforge.lock";

/// Age after which a lock is stale even if its pid is alive (pids get reused).
pub const STALE_AFTER_SECS: i64 = 6 * 60 * 60;

/// An unreadable lock younger than this may still be being written.
const UNREADABLE_GRACE: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Output directory {path} is locked (pid {pid}, since {since})")]
    Held {
        path: String,
        pid: u32,
        since: String,
    },

    #[error("Failed to acquire lock on {path}: {reason}")]
    AcquisitionFailed { path: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub created_at: DateTime<Utc>,
}

impl LockInfo {
    /// Whether the run that wrote this lock can no longer be holding it.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() > STALE_AFTER_SECS || !is_process_running(self.pid)
    }
}

/// Held lock on an output directory.
#[derive(Debug)]
pub struct OutputLock {
    lock_path: PathBuf,
    info: LockInfo,
}

impl OutputLock {
    /// Acquire the lock for `dir`, creating the directory if needed.
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        let failed = |reason: String| LockError::AcquisitionFailed {
            path: dir.display().to_string(),
            reason,
        };

        fs::create_dir_all(dir).map_err(|e| failed(e.to_string()))?;
        let lock_path = dir.join(LOCK_FILE_NAME);

        let mut took_over = false;
        let file = loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(file) => break file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let existing = read_info(&lock_path);
                    if !took_over && is_stale_lock(&lock_path, existing.as_ref()) {
                        tracing::warn!(
                            path = %lock_path.display(),
                            pid = existing.as_ref().map(|i| i.pid),
                            "Taking over stale lock"
                        );
                        remove_stale_lock(&lock_path).map_err(|e| failed(e.to_string()))?;
                        took_over = true;
                        continue;
                    }
                    return Err(LockError::Held {
                        path: dir.display().to_string(),
                        pid: existing.as_ref().map_or(0, |i| i.pid),
                        since: existing
                            .map_or_else(|| "unknown".to_string(), |i| i.created_at.to_rfc3339()),
                    });
                }
                Err(e) => return Err(failed(e.to_string())),
            }
        };

        let info = LockInfo {
            pid: std::process::id(),
            created_at: Utc::now(),
        };
        let written = write_info(file, &info);
        discard_on_error(&lock_path, written).map_err(|e| failed(e.to_string()))?;

        Ok(Self { lock_path, info })
    }

    #[must_use]
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_info(file: fs::File, info: &LockInfo) -> io::Result<()> {
    let json = serde_json::to_string_pretty(info).map_err(io::Error::other)?;
    let mut rw_lock = RwLock::new(file);
    let guard = rw_lock.try_write()?;
    let mut file_ref = &*guard;
    file_ref.write_all(json.as_bytes())?;
    file_ref.sync_all()
}

/// Remove a freshly created lock file whose contents could not be written.
fn discard_on_error<T>(lock_path: &Path, result: io::Result<T>) -> io::Result<T> {
    if result.is_err()
        && let Err(e) = fs::remove_file(lock_path)
    {
        tracing::warn!(path = %lock_path.display(), error = %e, "Failed to remove partial lock file");
    }
    result
}

fn is_stale_lock(lock_path: &Path, info: Option<&LockInfo>) -> bool {
    match info {
        Some(info) => info.is_stale(Utc::now()),
        None => fs::metadata(lock_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > UNREADABLE_GRACE),
    }
}

/// Rename the lock aside before deleting it, so a concurrent taker sees it gone
/// in one step.
fn remove_stale_lock(lock_path: &Path) -> io::Result<()> {
    let stale_path = lock_path.with_extension(format!(
        "stale.{}.{}",
        Utc::now().timestamp_millis(),
        std::process::id()
    ));
    match fs::rename(lock_path, &stale_path) {
        Ok(()) => {
            let _ = fs::remove_file(&stale_path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_process_running(pid: u32) -> bool {
    pid != 0
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.lock_path.display(), error = %e, "Failed to remove lock file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_rejected() {
        let dir = TempDir::new().unwrap();
        let first = OutputLock::acquire(dir.path()).unwrap();
        assert_eq!(first.info().pid, std::process::id());

        match OutputLock::acquire(dir.path()) {
            Err(LockError::Held { pid, .. }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected Held, got {other:?}"),
        }
    }

    #[test]
    fn test_drop_releases() {
        let dir = TempDir::new().unwrap();
        {
            let _lock = OutputLock::acquire(dir.path()).unwrap();
            assert!(dir.path().join(LOCK_FILE_NAME).exists());
        }
        assert!(!dir.path().join(LOCK_FILE_NAME).exists());
        assert!(OutputLock::acquire(dir.path()).is_ok());
    }

    fn write_lock(dir: &Path, pid: u32, created_at: &str) {
        let json = format!(r#"{{"pid": {pid}, "created_at": "{created_at}"}}"#);
        fs::write(dir.join(LOCK_FILE_NAME), json).unwrap();
    }

    #[cfg(unix)]
    fn exited_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_of_exited_process_is_taken_over() {
        let dir = TempDir::new().unwrap();
        write_lock(dir.path(), exited_pid(), &Utc::now().to_rfc3339());

        let lock = OutputLock::acquire(dir.path()).unwrap();
        assert_eq!(lock.info().pid, std::process::id());
        let stored = read_info(&dir.path().join(LOCK_FILE_NAME)).unwrap();
        assert_eq!(stored.pid, std::process::id());
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_old_lock_is_taken_over_even_if_pid_is_alive() {
        let dir = TempDir::new().unwrap();
        write_lock(dir.path(), std::process::id(), "2020-01-01T00:00:00Z");
        assert!(OutputLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_recent_lock_of_live_process_is_held() {
        let dir = TempDir::new().unwrap();
        write_lock(dir.path(), std::process::id(), &Utc::now().to_rfc3339());
        assert!(matches!(
            OutputLock::acquire(dir.path()),
            Err(LockError::Held { .. })
        ));
    }

    #[test]
    fn test_fresh_unreadable_lock_is_held() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LOCK_FILE_NAME), "").unwrap();
        match OutputLock::acquire(dir.path()) {
            Err(LockError::Held { pid, since, .. }) => {
                assert_eq!(pid, 0);
                assert_eq!(since, "unknown");
            }
            other => panic!("expected Held, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_write_removes_lock_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        fs::write(&path, "").unwrap();

        let result: io::Result<()> = discard_on_error(&path, Err(io::Error::other("disk full")));
        assert!(result.is_err());
        assert!(!path.exists());
        assert!(OutputLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("out/project");
        let _lock = OutputLock::acquire(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
