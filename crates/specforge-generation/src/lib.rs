//! Artifact generation for specforge.
//!
//! One provider request per planned batch, replies parsed into files through
//! three increasingly lenient stages, bounded retries per batch, and
//! fail-fast on the first batch that cannot be generated.

mod artifact;
mod coordinator;
mod error;
mod fixups;
mod parse;
mod prompts;

pub use artifact::{ArtifactSet, UnsafePath, validate_artifact_path};
pub use coordinator::{DEFAULT_MAX_ATTEMPTS, DesignView, GenerationCoordinator, GenerationRequest};
pub use error::{AttemptFailure, GenerationFailure};
pub use fixups::{BCRYPT_PIN, apply_fixups, pin_bcrypt_for_passlib};
pub use parse::{ParseStage, ParsedFiles, parse_files_response};
pub use prompts::{BatchPrompt, EXCERPT_CHARS, EXCERPT_LINES, batch_system_prompt, existing_files_excerpt};
