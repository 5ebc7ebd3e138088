//! Stable grouping keys for endpoints.
//!
//! A key is an identifier-safe lowercase name (it becomes a module and file
//! name in the generated project). Priority: first usable tag, then the first
//! meaningful path segment.

use crate::model::EndpointSpec;

/// Group for endpoints with neither a usable tag nor a usable path segment.
pub const DEFAULT_GROUP: &str = "root";

/// Path segments that never name a group.
const NEUTRAL_SEGMENTS: &[&str] = &["api"];

/// Normalize free text into a grouping key.
///
/// Lowercases, maps every run of non-alphanumeric characters to `_` and trims
/// underscores. A key that would start with a digit gets a `g_` prefix.
/// Returns `None` when nothing usable remains.
#[must_use]
pub fn normalize_group_key(raw: &str) -> Option<String> {
    let mut key = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !key.is_empty() {
                key.push('_');
            }
            pending_sep = false;
            key.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if key.is_empty() {
        return None;
    }
    if key.starts_with(|c: char| c.is_ascii_digit()) {
        key.insert_str(0, "g_");
    }
    Some(key)
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with(['v', 'V'])
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

fn is_parameter_segment(segment: &str) -> bool {
    (segment.starts_with('{') && segment.ends_with('}')) || segment.starts_with(':')
}

/// Group key from the first meaningful path segment.
///
/// `/api/v1/users/{id}` gives `users`; `/{code}` gives `None`.
#[must_use]
pub fn group_key_from_path(path: &str) -> Option<String> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| !NEUTRAL_SEGMENTS.contains(&s.to_ascii_lowercase().as_str()))
        .filter(|s| !is_version_segment(s))
        .find(|s| !is_parameter_segment(s))
        .and_then(normalize_group_key)
}

impl EndpointSpec {
    /// The endpoint's derived group, if one can be derived.
    #[must_use]
    pub fn group_key(&self) -> Option<String> {
        self.tags
            .iter()
            .find_map(|tag| normalize_group_key(tag))
            .or_else(|| group_key_from_path(&self.path))
    }

    /// The endpoint's group, falling back to [`DEFAULT_GROUP`].
    #[must_use]
    pub fn group_or_default(&self) -> String {
        self.group_key().unwrap_or_else(|| DEFAULT_GROUP.to_string())
    }
}
