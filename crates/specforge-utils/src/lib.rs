//! Foundation utilities shared by every specforge crate.
//!
//! Nothing in here knows about designs, batches or checks. It holds the error
//! taxonomy and exit codes used at the CLI boundary, tracing setup, atomic file
//! writes, the output directory lock, per-run progress events and the
//! cooperative cancellation flag.

pub mod atomic_write;
pub mod cancel;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod lock;
pub mod logging;

pub use atomic_write::{AtomicWriteResult, write_file_atomic};
pub use cancel::CancelFlag;
pub use error::{ConfigError, ErrorCategory, SpecforgeError, UserFriendlyError};
pub use events::{CollectingSink, NullSink, ProgressEvent, ProgressSink, Stage};
pub use exit_codes::ExitCode;
pub use lock::{LockError, OutputLock};
pub use logging::init_tracing;
