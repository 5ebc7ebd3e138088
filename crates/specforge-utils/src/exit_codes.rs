//! Exit code constants for the specforge CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Run succeeded / verification passed |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `EXTRACTION_FAILED` | Design extraction failed (run ended in `design_failed`) |
//! | 4 | `EXHAUSTED` | Iteration ceiling reached without passing verification |
//! | 5 | `VERIFICATION_FAILED` | Standalone `verify` found failing checks |
//! | 6 | `PROVIDER_UNAVAILABLE` | Provider backend could not be constructed |
//! | 130 | `CANCELLED` | Run cancelled by the user |

/// Exit codes matching the documented exit code table.
///
/// Use the named constants, or [`as_i32()`](Self::as_i32) to get the numeric
/// value for `std::process::exit()`.
///
/// # Example
///
/// ```rust
/// use specforge_utils::ExitCode;
///
/// assert_eq!(ExitCode::EXHAUSTED.as_i32(), 4);
/// assert_eq!(ExitCode::SUCCESS, ExitCode::from_i32(0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - run succeeded or verification passed
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments, unreadable spec or bad config file
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// The design extractor could not produce a usable design
    pub const EXTRACTION_FAILED: ExitCode = ExitCode(3);

    /// The iteration ceiling was reached without a passing verification
    pub const EXHAUSTED: ExitCode = ExitCode(4);

    /// Standalone verification reported at least one failing check
    pub const VERIFICATION_FAILED: ExitCode = ExitCode(5);

    /// The selected provider backend could not be constructed
    pub const PROVIDER_UNAVAILABLE: ExitCode = ExitCode(6);

    /// Cancelled by the user (SIGINT convention)
    pub const CANCELLED: ExitCode = ExitCode(130);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    ///
    /// Prefer using the named constants when possible.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
