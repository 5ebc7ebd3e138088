use specforge_llm::LlmError;

/// Why a single attempt at a batch failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptFailure {
    #[error("provider failed: {0}")]
    Provider(#[source] LlmError),

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("response could not be parsed: {0}")]
    Unparseable(String),

    #[error("response contained none of the expected files ({expected})")]
    NoExpectedFiles { expected: String },
}

impl From<LlmError> for AttemptFailure {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::EmptyResponse => Self::EmptyResponse,
            other => Self::Provider(other),
        }
    }
}

/// A generation pass that produced no usable artifact set.
///
/// No partial output accompanies it: one failed batch voids the iteration.
#[derive(Debug, thiserror::Error)]
pub enum GenerationFailure {
    #[error("batch '{batch}' failed after {attempts} attempts: {cause}")]
    BatchFailed {
        batch: String,
        attempts: u32,
        #[source]
        cause: AttemptFailure,
    },

    #[error("generation cancelled before batch '{batch}'")]
    Cancelled { batch: String },
}

impl GenerationFailure {
    /// Name of the batch the failure belongs to.
    #[must_use]
    pub fn batch(&self) -> &str {
        match self {
            Self::BatchFailed { batch, .. } | Self::Cancelled { batch } => batch,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_llm_response_maps_to_empty() {
        assert!(matches!(
            AttemptFailure::from(LlmError::EmptyResponse),
            AttemptFailure::EmptyResponse
        ));
        assert!(matches!(
            AttemptFailure::from(LlmError::Transport("reset".into())),
            AttemptFailure::Provider(_)
        ));
    }

    #[test]
    fn test_failure_message_names_batch() {
        let failure = GenerationFailure::BatchFailed {
            batch: "surface:users".into(),
            attempts: 3,
            cause: AttemptFailure::EmptyResponse,
        };
        assert_eq!(failure.batch(), "surface:users");
        assert_eq!(
            failure.to_string(),
            "batch 'surface:users' failed after 3 attempts: provider returned an empty response"
        );
    }
}
