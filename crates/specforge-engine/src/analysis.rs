//! Provider-backed explanation of failing test output.

use std::fmt::Write as _;

use specforge_generation::ArtifactSet;
use specforge_llm::{LlmError, ProviderGateway};

const ANALYST_SYSTEM_PROMPT: &str = "You are an expert Python test analyst.";

/// Test output beyond this is cut from the front; the summary is at the end.
const MAX_OUTPUT_CHARS: usize = 12_000;

#[must_use]
pub fn analysis_prompt(test_output: &str, artifacts: &ArtifactSet) -> String {
    let mut files = String::new();
    for path in artifacts.paths() {
        let _ = writeln!(files, "- {path}");
    }
    format!(
        "Analyze the following pytest output and provide concise, actionable feedback \
         for a developer to fix the failing tests.\n\n\
         ## Pytest Output\n\n{}\n\n\
         ## Generated Files\n\n{files}\n---\n\n\
         Provide:\n\
         1. A summary of what went wrong (which tests failed and why)\n\
         2. Root cause analysis for each failure\n\
         3. Specific code changes needed to fix each issue\n\
         4. Any missing imports, incorrect assertions, or logic errors you spot\n\n\
         Be concise. Focus on actionable fixes, not general advice.\n",
        keep_tail(test_output, MAX_OUTPUT_CHARS)
    )
}

pub async fn analyze_failures(
    gateway: &dyn ProviderGateway,
    test_output: &str,
    artifacts: &ArtifactSet,
) -> Result<String, LlmError> {
    gateway
        .complete(ANALYST_SYSTEM_PROMPT, &analysis_prompt(test_output, artifacts))
        .await
}

fn keep_tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let start = text.char_indices().nth(skip).map_or(0, |(i, _)| i);
    &text[start..]
}
