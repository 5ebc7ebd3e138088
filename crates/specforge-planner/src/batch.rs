use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Role of a batch in the generated project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchKind {
    /// Shared configuration, persistence, models, schemas and the entry point
    Core,
    /// Routes of one endpoint group
    Surface,
    /// Test module of one endpoint group, or the health check tests
    Tests,
    /// Manifest, container files, env template and README
    Infra,
}

/// One file to produce, with what it must contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactTarget {
    pub path: String,
    pub instructions: String,
}

impl ArtifactTarget {
    pub fn new(path: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            instructions: instructions.into(),
        }
    }
}

/// A named, ordered set of targets generated by one provider request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationBatch {
    /// Stable name such as `core`, `surface:users` or `tests:healthcheck`
    pub name: String,
    pub kind: BatchKind,
    /// Endpoint group for surface and per-group test batches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub targets: Vec<ArtifactTarget>,
}

impl GenerationBatch {
    pub(crate) fn new(kind: BatchKind, group: Option<&str>, targets: Vec<ArtifactTarget>) -> Self {
        let name = match group {
            Some(g) => format!("{kind}:{g}"),
            None => kind.to_string(),
        };
        Self {
            name,
            kind,
            group: group.map(str::to_string),
            targets,
        }
    }

    /// Target paths in generation order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.path.as_str())
    }

    #[must_use]
    pub fn contains_path(&self, path: &str) -> bool {
        self.targets.iter().any(|t| t.path == path)
    }
}
