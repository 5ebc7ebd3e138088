//! Bounded feedback for repair iterations.
//!
//! Two size-capped projections feed the prompt of the next generation pass:
//! the failure digest (what went wrong, deduplicated and ranked) and the
//! condensed design (what to build, without the detail of the full record).

mod condense;
mod digest;

pub use condense::{DEFAULT_CONDENSE_CEILING, condense_design, condense_design_within};
pub use digest::{
    DEFAULT_DIGEST_CEILING, DEFAULT_TOP_N, Digest, DigestEntry, DigestInput, FailureDigester,
    digest_failures, extract_analysis_points, extract_test_failures, normalize_message,
};
