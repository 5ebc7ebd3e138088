use specforge_llm::LlmError;

/// Why a spec could not be turned into a usable design.
///
/// Always terminal for the run: a malformed spec is an input problem.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("spec is empty")]
    EmptySpec,

    #[error("provider failed during design extraction: {0}")]
    Provider(#[source] LlmError),

    #[error("design response is not a parseable design record: {reason}")]
    Unparseable { reason: String, preview: String },

    #[error("design is malformed: {}", problems.join("; "))]
    Malformed { problems: Vec<String> },
}

impl ExtractionFailure {
    /// One-line reason for reports.
    #[must_use]
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_lists_every_problem() {
        let err = ExtractionFailure::Malformed {
            problems: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.reason(), "design is malformed: a; b");
    }

    #[test]
    fn test_provider_cause_is_source() {
        use std::error::Error;
        let err = ExtractionFailure::Provider(LlmError::EmptyResponse);
        assert!(err.source().is_some());
    }
}
