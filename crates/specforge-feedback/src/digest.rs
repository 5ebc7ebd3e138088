//! Failure digest: raw failure text in, a short deduplicated summary out.
//!
//! Messages are grouped after masking volatile substrings (addresses, ids,
//! timestamps, long numbers), ranked by occurrence count and rendered one per
//! line as `(×N) message`. The rendered digest never exceeds the configured
//! character ceiling.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// Maximum number of distinct message groups in a digest.
pub const DEFAULT_TOP_N: usize = 15;

/// Maximum digest length in characters.
pub const DEFAULT_DIGEST_CEILING: usize = 2000;

/// Longest single message kept before grouping.
const MAX_MESSAGE_CHARS: usize = 300;

static HEX_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"0x[0-9a-fA-F]+").expect("valid regex"));
static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("valid regex")
});
static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?")
        .expect("valid regex")
});
static LONG_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{5,}\b").expect("valid regex"));
static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(\.\d+)?s\b").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// pytest short summary line: `FAILED tests/test_x.py::test_y - AssertionError: ...`
static SUMMARY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:FAILED|ERROR)\s+(\S+)(?:\s+-\s+(.+))?$").expect("valid regex")
});
/// Exception line as printed by `--tb=short`: `E   ValueError: ...`
static E_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^E\s{2,}(.+)$").expect("valid regex"));
/// Bare exception line: `ModuleNotFoundError: No module named 'x'`
static EXCEPTION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][\w.]*(?:Error|Exception|Exit)):\s*(.*)$").expect("valid regex")
});
static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*+]|\d+[.)])\s+").expect("valid regex"));

/// Replace volatile substrings so equal failures group together.
#[must_use]
pub fn normalize_message(message: &str) -> String {
    let text = UUID.replace_all(message, "<uuid>");
    let text = TIMESTAMP.replace_all(&text, "<timestamp>");
    let text = HEX_ADDRESS.replace_all(&text, "0x?");
    let text = LONG_NUMBER.replace_all(&text, "<n>");
    let text = DURATION.replace_all(&text, "<t>s");
    let text = WHITESPACE.replace_all(text.trim(), " ");
    truncate_chars(&text, MAX_MESSAGE_CHARS)
}

/// Pull individual failure messages out of test-framework output.
///
/// Short summary lines win; without them `E` lines are used; without those,
/// bare exception lines.
#[must_use]
pub fn extract_test_failures(output: &str) -> Vec<String> {
    let lines: Vec<&str> = output.lines().map(str::trim_end).collect();

    let summary: Vec<String> = lines
        .iter()
        .filter_map(|line| SUMMARY_LINE.captures(line.trim_start()))
        .map(|caps| match caps.get(2) {
            Some(msg) => msg.as_str().to_string(),
            None => format!("failure in {}", &caps[1]),
        })
        .collect();
    if !summary.is_empty() {
        return summary;
    }

    let e_lines: Vec<String> = lines
        .iter()
        .filter_map(|line| E_LINE.captures(line))
        .map(|caps| caps[1].to_string())
        .filter(|msg| EXCEPTION_LINE.is_match(msg))
        .collect();
    if !e_lines.is_empty() {
        return e_lines;
    }

    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| EXCEPTION_LINE.is_match(line))
        .map(str::to_string)
        .collect()
}

/// Split free-form analysis text into messages: one per non-heading line,
/// list markers removed.
#[must_use]
pub fn extract_analysis_points(analysis: &str) -> Vec<String> {
    analysis
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("```"))
        .map(|line| BULLET.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// One distinct message and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub message: String,
    pub count: usize,
}

impl DigestEntry {
    fn render(&self) -> String {
        format!("(×{}) {}", self.count, self.message)
    }
}

/// A rendered failure digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digest {
    entries: Vec<DigestEntry>,
    text: String,
}

impl Digest {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn entries(&self) -> &[DigestEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.text
    }
}

/// Sources of failure signal for one iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestInput<'a> {
    /// Raw test-framework output
    pub test_output: &'a str,
    /// Free-form failure analysis text
    pub analysis: &'a str,
    /// Details of failing verification checks, one message each
    pub check_failures: &'a [String],
}

/// Builds digests with a fixed group limit and character ceiling.
#[derive(Debug, Clone, Copy)]
pub struct FailureDigester {
    top_n: usize,
    ceiling: usize,
}

impl Default for FailureDigester {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            ceiling: DEFAULT_DIGEST_CEILING,
        }
    }
}

impl FailureDigester {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    #[must_use]
    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn digest(&self, input: &DigestInput<'_>) -> Digest {
        let messages = extract_test_failures(input.test_output)
            .into_iter()
            .chain(input.check_failures.iter().cloned())
            .chain(extract_analysis_points(input.analysis));
        self.digest_messages(messages)
    }

    /// Group already-extracted messages.
    pub fn digest_messages(&self, messages: impl IntoIterator<Item = String>) -> Digest {
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for raw in messages {
            let key = normalize_message(&raw);
            if key.is_empty() {
                continue;
            }
            let count = counts.entry(key.clone()).or_insert(0);
            if *count == 0 {
                order.push(key);
            }
            *count += 1;
        }

        let mut entries: Vec<DigestEntry> = order
            .into_iter()
            .map(|message| {
                let count = counts.get(&message).copied().unwrap_or(0);
                DigestEntry { message, count }
            })
            .collect();
        // Stable: ties keep first-seen order.
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        let distinct = entries.len();
        entries.truncate(self.top_n);

        let (entries, text) = self.fit(entries);
        debug!(
            distinct,
            kept = entries.len(),
            chars = text.chars().count(),
            "Built failure digest"
        );
        Digest { entries, text }
    }

    /// Drop lowest-count entries until the rendering fits the ceiling.
    fn fit(&self, mut entries: Vec<DigestEntry>) -> (Vec<DigestEntry>, String) {
        loop {
            let text = entries
                .iter()
                .map(DigestEntry::render)
                .collect::<Vec<_>>()
                .join("\n");
            if text.chars().count() <= self.ceiling {
                return (entries, text);
            }
            if entries.len() > 1 {
                entries.pop();
                continue;
            }
            // A single oversized entry is cut rather than dropped.
            return (entries, truncate_chars(&text, self.ceiling));
        }
    }
}

/// Digest with the default limits.
#[must_use]
pub fn digest_failures(test_output: &str, analysis: &str) -> String {
    FailureDigester::new()
        .digest(&DigestInput {
            test_output,
            analysis,
            check_failures: &[],
        })
        .into_string()
}

/// Cut to at most `max` characters, marking the cut with `…`.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut cut: String = text.chars().take(max - 1).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pytest_run(repeated: usize) -> String {
        let mut out = String::from("============ short test summary info ============\n");
        for i in 0..repeated {
            out.push_str(&format!(
                "FAILED tests/test_auth.py::test_case_{i} - ValueError: password cannot be loaded\n"
            ));
        }
        out.push_str("FAILED tests/test_links.py::test_create - assert 404 == 201\n");
        out.push_str(&format!("===== {} failed in 3.21s =====\n", repeated + 1));
        out
    }

    #[test]
    fn test_repeated_failure_collapses_to_one_line() {
        let digest = digest_failures(&pytest_run(78), "");
        let lines: Vec<&str> = digest.lines().collect();
        assert_eq!(
            lines,
            [
                "(×78) ValueError: password cannot be loaded",
                "(×1) assert 404 == 201"
            ]
        );
    }

    #[test]
    fn test_empty_input_gives_empty_digest() {
        assert_eq!(digest_failures("", ""), "");
        assert!(FailureDigester::new().digest(&DigestInput::default()).is_empty());
    }

    #[test]
    fn test_volatile_substrings_are_masked() {
        let a = normalize_message("Error <obj at 0x7f3a2b1c> on 2024-05-01T10:00:00Z id 1234567");
        let b = normalize_message("Error <obj at 0x7f99ffff> on 2025-01-09T23:59:59Z id 7654321");
        assert_eq!(a, b);
        assert_eq!(a, "Error <obj at 0x?> on <timestamp> id <n>");
    }

    #[test]
    fn test_e_lines_used_without_summary() {
        let out = "tests/test_x.py:12: in test_x\n    raise ValueError('boom')\nE   ValueError: boom\n";
        assert_eq!(extract_test_failures(out), ["ValueError: boom"]);
    }

    #[test]
    fn test_collection_error_is_extracted() {
        let out = "ImportError while loading conftest\nModuleNotFoundError: No module named 'jose'\n";
        assert_eq!(
            extract_test_failures(out),
            ["ModuleNotFoundError: No module named 'jose'"]
        );
    }

    #[test]
    fn test_analysis_points_and_check_failures_are_merged() {
        let failures = vec!["Spec coverage: missing GET /links".to_string()];
        let digest = FailureDigester::new().digest(&DigestInput {
            test_output: "",
            analysis: "## Summary\n- Add bcrypt pin\n- Add bcrypt pin\n1. Fix import in app/main.py\n",
            check_failures: &failures,
        });
        assert_eq!(
            digest.as_str(),
            "(×2) Add bcrypt pin\n(×1) Spec coverage: missing GET /links\n(×1) Fix import in app/main.py"
        );
    }

    #[test]
    fn test_top_n_keeps_most_frequent() {
        let messages = (0..30).flat_map(|i| std::iter::repeat_n(format!("Error{i}: x"), i + 1));
        let digest = FailureDigester::new().digest_messages(messages);
        assert_eq!(digest.entries().len(), DEFAULT_TOP_N);
        assert_eq!(digest.entries()[0].count, 30);
        assert_eq!(digest.entries()[DEFAULT_TOP_N - 1].count, 16);
    }

    #[test]
    fn test_lowest_counts_dropped_to_fit() {
        let messages = vec!["A: ".repeat(50); 3]
            .into_iter()
            .chain(vec!["B: ".repeat(50); 2])
            .chain(vec!["C: ".repeat(50); 1]);
        let digest = FailureDigester::new().with_ceiling(250).digest_messages(messages);
        let counts: Vec<usize> = digest.entries().iter().map(|e| e.count).collect();
        assert_eq!(counts, [3]);
        assert!(digest.as_str().chars().count() <= 250);
    }

    proptest! {
        #[test]
        fn prop_digest_never_exceeds_ceiling(
            lines in prop::collection::vec("[A-Za-z]{1,12}Error: [ -~]{0,400}", 0..200),
            ceiling in 0usize..3000,
        ) {
            let output = lines
                .iter()
                .map(|l| format!("FAILED tests/test_p.py::t - {l}"))
                .collect::<Vec<_>>()
                .join("\n");
            let digest = FailureDigester::new().with_ceiling(ceiling).digest(&DigestInput {
                test_output: &output,
                analysis: &output,
                check_failures: &[],
            });
            prop_assert!(digest.as_str().chars().count() <= ceiling);
        }
    }
}
