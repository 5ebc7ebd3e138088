//! Deterministic corrections applied to generated files before they are
//! accepted.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use specforge_design::base_requirement_name;

use crate::artifact::ArtifactSet;

/// passlib breaks against bcrypt 4.1+ (`__about__` was removed).
pub const BCRYPT_PIN: &str = "bcrypt==4.0.1";

static REQUIREMENT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)").expect("valid regex"));

fn requirement_name(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
        return None;
    }
    REQUIREMENT_NAME
        .captures(line)
        .map(|caps| base_requirement_name(&caps[1]))
}

/// Pin bcrypt when the manifest uses passlib.
///
/// An existing bcrypt line is replaced unless it already pins a 4.0.x
/// release. Returns `None` when no change is needed.
#[must_use]
pub fn pin_bcrypt_for_passlib(manifest: &str) -> Option<String> {
    let uses_passlib = manifest
        .lines()
        .any(|l| requirement_name(l).as_deref() == Some("passlib"));
    if !uses_passlib {
        return None;
    }

    let mut lines: Vec<String> = manifest.lines().map(str::to_string).collect();
    let bcrypt_line = lines
        .iter()
        .position(|l| requirement_name(l).as_deref() == Some("bcrypt"));

    match bcrypt_line {
        Some(i) if lines[i].trim().starts_with("bcrypt==4.0.") => return None,
        Some(i) => lines[i] = BCRYPT_PIN.to_string(),
        None => lines.push(BCRYPT_PIN.to_string()),
    }

    let mut fixed = lines.join("\n");
    fixed.push('\n');
    Some(fixed)
}

/// Apply every fixup to the artifact set. Returns a note per change made.
pub fn apply_fixups(files: &mut ArtifactSet, manifest_path: &str) -> Vec<String> {
    let mut applied = Vec::new();
    if let Some(manifest) = files.get_mut(manifest_path)
        && let Some(fixed) = pin_bcrypt_for_passlib(manifest)
    {
        *manifest = fixed;
        info!(manifest = manifest_path, pin = BCRYPT_PIN, "Pinned bcrypt for passlib");
        applied.push(format!("{manifest_path}: pinned {BCRYPT_PIN} for passlib"));
    }
    applied
}
