//! Parsing of provider replies into `path -> content` maps.
//!
//! Three stages are tried in order:
//! 1. strict: the whole reply is a JSON object of strings
//! 2. lenient: a fenced JSON block, then the span from the first `{` to the
//!    last `}`
//! 3. delimited: `--- path ---` or `File: path` headers followed by fenced or
//!    raw bodies

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(\{.*?\})[ \t]*\r?\n```").expect("valid regex")
});
static DASH_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-{3,}\s*`?([^\s`]+?)`?\s*-{3,}$").expect("valid regex"));
static FILE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:#{1,6}\s*)?(?:\*\*)?(?i:file)(?:\*\*)?:\s*(?:\*\*)?`?([^\s`*]+)`?(?:\*\*)?$")
        .expect("valid regex")
});

/// Which parsing stage produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Strict,
    Lenient,
    Delimited,
}

/// Files recovered from one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFiles {
    pub files: BTreeMap<String, String>,
    pub stage: ParseStage,
}

/// Parse a reply, trying each stage in turn.
pub fn parse_files_response(response: &str) -> Result<ParsedFiles, String> {
    let text = response.trim();
    if text.is_empty() {
        return Err("empty response".to_string());
    }

    if let Some(files) = parse_json_object(text) {
        return Ok(ParsedFiles {
            files,
            stage: ParseStage::Strict,
        });
    }

    if let Some(files) = parse_lenient(text) {
        return Ok(ParsedFiles {
            files,
            stage: ParseStage::Lenient,
        });
    }

    if let Some(files) = parse_delimited(text) {
        return Ok(ParsedFiles {
            files,
            stage: ParseStage::Delimited,
        });
    }

    Err("no JSON object or delimited file segments found".to_string())
}

fn parse_json_object(text: &str) -> Option<BTreeMap<String, String>> {
    serde_json::from_str::<BTreeMap<String, String>>(text)
        .ok()
        .filter(|files| !files.is_empty())
}

fn parse_lenient(text: &str) -> Option<BTreeMap<String, String>> {
    if let Some(files) = FENCED_JSON
        .captures(text)
        .and_then(|caps| parse_json_object(&caps[1]))
    {
        return Some(files);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_json_object(&text[start..=end])
}

fn header_path(line: &str) -> Option<String> {
    let line = line.trim();
    DASH_HEADER
        .captures(line)
        .or_else(|| FILE_HEADER.captures(line))
        .map(|caps| caps[1].to_string())
        .filter(|path| path.contains(['.', '/']) || path == "Dockerfile")
}

fn parse_delimited(text: &str) -> Option<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    let mut in_fence = false;

    for line in text.lines() {
        if !in_fence && let Some(path) = header_path(line) {
            if let Some((path, body)) = current.take() {
                files.insert(path, segment_body(&body));
            }
            current = Some((path, Vec::new()));
            continue;
        }
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((path, body)) = current.take() {
        files.insert(path, segment_body(&body));
    }

    files.retain(|_, content| !content.trim().is_empty());
    (!files.is_empty()).then_some(files)
}

/// Body of a delimited segment: the inside of its first fence if it has one,
/// otherwise the raw lines.
fn segment_body(lines: &[&str]) -> String {
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let Some(first) = first else {
        return String::new();
    };

    if lines[first].trim_start().starts_with("```") {
        let inner: Vec<&str> = lines[first + 1..]
            .iter()
            .take_while(|l| !l.trim_start().starts_with("```"))
            .copied()
            .collect();
        return with_trailing_newline(inner.join("\n"));
    }

    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    with_trailing_newline(lines[first..=last].join("\n"))
}

fn with_trailing_newline(mut content: String) -> String {
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content
}
