//! Structured design of the service to generate, and how it is obtained
//! from a spec document.

mod error;
mod extractor;
mod grouping;
mod model;
mod prompts;
mod validation;

pub use error::ExtractionFailure;
pub use extractor::{DesignExtractor, LlmDesignExtractor, parse_design_response};
pub use grouping::{DEFAULT_GROUP, group_key_from_path, normalize_group_key};
pub use model::{
    AuthRequirement, DependencySpec, DeploymentSpec, EndpointSpec, EnvVariableSpec, FieldSpec,
    HttpMethod, MiddlewareSpec, ModelSpec, ShapeField, ShapeSpec, StructuredDesign,
    base_requirement_name,
};

/// File name of the cached design inside the output directory.
pub const DESIGN_CACHE_FILE: &str = "_system_design.json";
