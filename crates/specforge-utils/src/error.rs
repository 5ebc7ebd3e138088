use std::fmt;
use std::io;
use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Top-level error type surfaced at the CLI boundary.
///
/// Component failures inside a run are data (`RunOutcome`, `CheckResult`,
/// `GenerationFailure`), not errors. `SpecforgeError` covers what stops the
/// program before or around a run: bad arguments, unreadable input, a provider
/// that cannot be constructed, a locked output directory.
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration/CLI argument errors, unreadable spec |
/// | 3 | Design extraction failed |
/// | 4 | Iteration ceiling exhausted |
/// | 5 | Standalone verification failed |
/// | 6 | Provider unavailable |
/// | 130 | Cancelled |
/// | 1 | Other errors |
///
/// # Example
///
/// ```rust
/// use specforge_utils::{ExitCode, SpecforgeError};
///
/// let err = SpecforgeError::ProviderUnavailable {
///     provider: "openai".to_string(),
///     reason: "OPENAI_API_KEY is not set".to_string(),
/// };
/// assert_eq!(err.to_exit_code(), ExitCode::PROVIDER_UNAVAILABLE);
/// assert!(err.display_for_user().contains("Suggestions:"));
/// ```
#[derive(Error, Debug)]
pub enum SpecforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot read spec {path}: {reason}")]
    SpecInput { path: String, reason: String },

    #[error("Provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("Design extraction failed: {reason}")]
    ExtractionFailed { reason: String },

    #[error("Verification did not pass after {iterations} iteration(s)")]
    Exhausted { iterations: u32 },

    #[error("Verification failed: {failed} check(s) failing")]
    VerificationFailed { failed: usize },

    #[error("Output directory {path} is locked by another run")]
    OutputLocked { path: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl SpecforgeError {
    /// Get a user-friendly error message with context and actionable suggestions.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error: {}\n", self.user_message()));

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {}\n", ctx));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {}\n", suggestion));
            }
        }

        output
    }

    /// Map this error to the appropriate CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::SpecInput { .. } => ExitCode::CLI_ARGS,
            Self::ProviderUnavailable { .. } => ExitCode::PROVIDER_UNAVAILABLE,
            Self::ExtractionFailed { .. } => ExitCode::EXTRACTION_FAILED,
            Self::Exhausted { .. } => ExitCode::EXHAUSTED,
            Self::VerificationFailed { .. } => ExitCode::VERIFICATION_FAILED,
            Self::Cancelled => ExitCode::CANCELLED,
            Self::Io(_) | Self::OutputLocked { .. } | Self::Other(_) => ExitCode::INTERNAL,
        }
    }
}

/// Trait for errors that can render themselves for an end user.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Provider,
    Design,
    Verification,
    FileSystem,
    Concurrency,
    Interrupted,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Input => write!(f, "Input"),
            Self::Provider => write!(f, "Provider"),
            Self::Design => write!(f, "Design"),
            Self::Verification => write!(f, "Verification"),
            Self::FileSystem => write!(f, "File System"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration validation failed: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::ValidationFailed { errors } => format!(
                "Configuration validation failed with {} error(s): {}",
                errors.len(),
                errors.join(", ")
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files are TOML with optional [run], [provider], [timeouts], [checks] and [profile] sections."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => {
                Some(format!("The '{key}' option has specific format requirements."))
            }
            Self::NotFound { .. } => Some(
                "specforge searches for .specforge/config.toml from the current directory upward."
                    .to_string(),
            ),
            Self::ValidationFailed { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the file for TOML syntax errors".to_string(),
                "Remove unknown keys; every section rejects unknown fields".to_string(),
            ],
            Self::InvalidValue { key, .. } => vec![format!("Fix or remove the '{key}' setting")],
            Self::NotFound { .. } => vec![
                "Pass an existing file with --config".to_string(),
                "Omit --config to use discovery and built-in defaults".to_string(),
            ],
            Self::ValidationFailed { .. } => {
                vec!["Adjust the listed values and run again".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

impl UserFriendlyError for SpecforgeError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Io(e) => format!("File system operation failed: {e}"),
            Self::SpecInput { path, reason } => format!("Cannot use spec '{path}': {reason}"),
            Self::ProviderUnavailable { provider, reason } => {
                format!("Provider '{provider}' is not usable: {reason}")
            }
            Self::ExtractionFailed { reason } => {
                format!("Could not derive a design from the spec: {reason}")
            }
            Self::Exhausted { iterations } => format!(
                "Generated project still fails verification after {iterations} iteration(s)"
            ),
            Self::VerificationFailed { failed } => {
                format!("{failed} verification check(s) failed")
            }
            Self::OutputLocked { path } => {
                format!("Another specforge run is using {path}")
            }
            Self::Cancelled => "Run cancelled before completion".to_string(),
            Self::Other(msg) => msg.clone(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::ExtractionFailed { .. } => Some(
                "A failed extraction is treated as an input problem and is never retried."
                    .to_string(),
            ),
            Self::Exhausted { .. } => Some(
                "The last generated files were kept in the output directory for inspection."
                    .to_string(),
            ),
            Self::OutputLocked { .. } => Some(
                "Each run owns its output directory; a .specforge.lock file marks it in use."
                    .to_string(),
            ),
            Self::Cancelled => Some(
                "Cancellation is honoured between batches and iterations.".to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::SpecInput { .. } => vec![
                "Check the spec path".to_string(),
                "Run `specforge example` for a sample spec".to_string(),
            ],
            Self::ProviderUnavailable { .. } => vec![
                "Set the provider's API key environment variable or pass --api-key-env".to_string(),
                "Choose another provider with --provider".to_string(),
            ],
            Self::ExtractionFailed { .. } => vec![
                "Describe endpoints, data models and dependencies explicitly in the spec"
                    .to_string(),
                "Try a more capable model with --model".to_string(),
            ],
            Self::Exhausted { .. } => vec![
                "Inspect _specforge_report.json in the output directory".to_string(),
                "Raise the iteration ceiling with --max-iterations".to_string(),
            ],
            Self::VerificationFailed { .. } => {
                vec!["Re-run with --json to see per-check evidence".to_string()]
            }
            Self::OutputLocked { path } => vec![
                "Wait for the other run to finish".to_string(),
                format!("Remove {path}/.specforge.lock if no run is active"),
            ],
            Self::Io(_) => vec!["Check permissions on the output directory".to_string()],
            Self::Cancelled | Self::Other(_) => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::FileSystem,
            Self::SpecInput { .. } => ErrorCategory::Input,
            Self::ProviderUnavailable { .. } => ErrorCategory::Provider,
            Self::ExtractionFailed { .. } => ErrorCategory::Design,
            Self::Exhausted { .. } | Self::VerificationFailed { .. } => {
                ErrorCategory::Verification
            }
            Self::OutputLocked { .. } => ErrorCategory::Concurrency,
            Self::Cancelled => ErrorCategory::Interrupted,
            Self::Other(_) => ErrorCategory::Input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_mapping() {
        let err = SpecforgeError::Config(ConfigError::InvalidFile("bad".to_string()));
        assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_extraction_failed_mapping() {
        let err = SpecforgeError::ExtractionFailed {
            reason: "empty spec".to_string(),
        };
        assert_eq!(err.to_exit_code(), ExitCode::EXTRACTION_FAILED);
    }

    #[test]
    fn test_exhausted_mapping() {
        let err = SpecforgeError::Exhausted { iterations: 4 };
        assert_eq!(err.to_exit_code(), ExitCode::EXHAUSTED);
        assert!(err.user_message().contains("4 iteration"));
    }

    #[test]
    fn test_cancelled_mapping() {
        assert_eq!(SpecforgeError::Cancelled.to_exit_code(), ExitCode::CANCELLED);
    }

    #[test]
    fn test_provider_unavailable_mapping() {
        let err = SpecforgeError::ProviderUnavailable {
            provider: "anthropic".to_string(),
            reason: "missing key".to_string(),
        };
        assert_eq!(err.to_exit_code(), ExitCode::PROVIDER_UNAVAILABLE);
    }

    #[test]
    fn test_display_for_user_sections() {
        let err = SpecforgeError::Exhausted { iterations: 2 };
        let text = err.display_for_user();
        assert!(text.starts_with("Error: "));
        assert!(text.contains("\nContext: "));
        assert!(text.contains("\nSuggestions:\n  • "));
    }

    #[test]
    fn test_display_without_suggestions() {
        let text = SpecforgeError::Other("boom".to_string()).display_for_user();
        assert_eq!(text, "Error: boom\n");
    }

    #[test]
    fn test_validation_failed_lists_all_errors() {
        let err = ConfigError::ValidationFailed {
            errors: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("a; b"));
        assert!(err.user_message().contains("2 error(s)"));
    }
}
