use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// Generated files of one iteration, keyed by project-relative path.
///
/// Built from scratch every iteration. Paths are validated on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet {
    files: BTreeMap<String, String>,
}

impl ArtifactSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, replacing any earlier content at the same path.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), UnsafePath> {
        let path = path.into();
        validate_artifact_path(&path)?;
        self.files.insert(path, content.into());
        Ok(())
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub(crate) fn get_mut(&mut self, path: &str) -> Option<&mut String> {
        self.files.get_mut(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total content size in bytes.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(String::len).sum()
    }
}

/// Why a generated path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnsafePath {
    #[error("empty path")]
    Empty,
    #[error("absolute path not allowed: {0}")]
    Absolute(String),
    #[error("parent directory component not allowed: {0}")]
    ParentTraversal(String),
    #[error("backslash not allowed: {0}")]
    Backslash(String),
}

/// A path is safe when it is relative, uses `/` separators and stays inside
/// the project root.
pub fn validate_artifact_path(path: &str) -> Result<(), UnsafePath> {
    if path.trim().is_empty() {
        return Err(UnsafePath::Empty);
    }
    if path.contains('\\') {
        return Err(UnsafePath::Backslash(path.to_string()));
    }
    // `C:` style prefixes are not caught by `Path::is_absolute` on unix.
    if path.starts_with('/') || path.contains(':') || Path::new(path).is_absolute() {
        return Err(UnsafePath::Absolute(path.to_string()));
    }
    if Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(UnsafePath::ParentTraversal(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsafe_paths() {
        assert_eq!(validate_artifact_path(""), Err(UnsafePath::Empty));
        assert!(matches!(
            validate_artifact_path("/etc/passwd"),
            Err(UnsafePath::Absolute(_))
        ));
        assert!(matches!(
            validate_artifact_path("C:/x.py"),
            Err(UnsafePath::Absolute(_))
        ));
        assert!(matches!(
            validate_artifact_path("app/../../x.py"),
            Err(UnsafePath::ParentTraversal(_))
        ));
        assert!(matches!(
            validate_artifact_path("app\\main.py"),
            Err(UnsafePath::Backslash(_))
        ));
    }

    #[test]
    fn test_accepts_project_paths() {
        for path in ["app/main.py", ".env.example", "Dockerfile", "tests/test_x.py"] {
            assert!(validate_artifact_path(path).is_ok(), "{path}");
        }
    }

    #[test]
    fn test_insert_replaces() {
        let mut set = ArtifactSet::new();
        set.insert("app/main.py", "a").unwrap();
        set.insert("app/main.py", "b").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("app/main.py"), Some("b"));
        assert!(set.insert("../x", "c").is_err());
        assert_eq!(set.total_bytes(), 1);
    }
}
