use std::collections::BTreeMap;
use std::fmt::Write as _;

use specforge_design::StructuredDesign;

use crate::digest::truncate_chars;

/// Maximum condensed design length in characters.
pub const DEFAULT_CONDENSE_CEILING: usize = 3000;

const DESCRIPTION_CHARS: usize = 300;
const COMPACT_FIELDS: usize = 6;
const TRUNCATION_MARKER: &str = "\n[design truncated]";

/// Reduced projection of a design for repair prompts.
///
/// Keeps identity, `METHOD path` pairs, model field names and dependency
/// names. Env variables, deployment, types and constraints are dropped.
#[must_use]
pub fn condense_design(design: &StructuredDesign) -> String {
    condense_design_within(design, DEFAULT_CONDENSE_CEILING)
}

/// [`condense_design`] with an explicit ceiling.
#[must_use]
pub fn condense_design_within(design: &StructuredDesign, ceiling: usize) -> String {
    let full = render(design, false);
    if full.chars().count() <= ceiling {
        return full;
    }

    let compact = render(design, true);
    if compact.chars().count() <= ceiling {
        return compact;
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if ceiling <= marker_len {
        return truncate_chars(&compact, ceiling);
    }
    let mut cut: String = compact.chars().take(ceiling - marker_len).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

fn render(design: &StructuredDesign, compact: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Project: {}", design.project_name);
    if !design.description.trim().is_empty() {
        let _ = writeln!(
            out,
            "Description: {}",
            truncate_chars(design.description.trim(), DESCRIPTION_CHARS)
        );
    }

    let deps: Vec<&str> = design.dependencies.iter().map(|d| d.name.as_str()).collect();
    let _ = writeln!(out, "Dependencies: {}", deps.join(", "));

    out.push_str("Endpoints:\n");
    if compact {
        // One line per path, methods merged.
        let mut by_path: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for e in &design.endpoints {
            by_path.entry(e.path.as_str()).or_default().push(e.method.as_str());
        }
        for (path, methods) in by_path {
            let _ = writeln!(out, "  {path} [{}]", methods.join(","));
        }
    } else {
        for e in &design.endpoints {
            let _ = writeln!(out, "  {} {}", e.method, e.path);
        }
    }

    out.push_str("Models:\n");
    for model in &design.database_models {
        let names: Vec<&str> = model.fields.iter().map(|f| f.name.as_str()).collect();
        let fields = if compact && names.len() > COMPACT_FIELDS {
            format!(
                "{}, +{}",
                names[..COMPACT_FIELDS].join(", "),
                names.len() - COMPACT_FIELDS
            )
        } else {
            names.join(", ")
        };
        let _ = writeln!(out, "  {}({fields})", model.name);
    }

    out.truncate(out.trim_end().len());
    out
}
