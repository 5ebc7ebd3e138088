//! The structured design record produced from a spec.
//!
//! Deserialization is deliberately forgiving (defaults everywhere, aliases for
//! common spellings); [`StructuredDesign::validate`](crate::StructuredDesign::validate)
//! is where malformation is detected.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

/// HTTP method of an endpoint. Unknown spellings are kept so validation can
/// report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Other(String),
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Other(raw) => raw,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for HttpMethod {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            _ => Self::Other(raw),
        }
    }
}

impl From<HttpMethod> for String {
    fn from(method: HttpMethod) -> Self {
        method.as_str().to_string()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization an endpoint demands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthRequirement {
    #[default]
    None,
    Jwt,
    ApiKey,
    JwtOrApiKey,
    /// Any other scheme; treated as requiring authorization
    #[serde(other)]
    Other,
}

impl AuthRequirement {
    #[must_use]
    pub const fn requires_auth(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// A field of a request or response shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeField {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default = "default_true")]
    pub is_required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

/// Request or response body shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeSpec {
    #[serde(default)]
    pub fields: Vec<ShapeField>,
    #[serde(default)]
    pub is_list: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auth: AuthRequirement,
    #[serde(default)]
    pub rate_limited: bool,
    #[serde(default, alias = "request", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<ShapeSpec>,
    #[serde(default)]
    pub response: ShapeSpec,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EndpointSpec {
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.auth.requires_auth()
    }
}

/// A column of a persisted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub relationships: Vec<String>,
}

/// A library the generated service depends on.
///
/// Accepts either a bare requirement string or `{name, purpose}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DependencyRepr")]
pub struct DependencySpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DependencyRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        purpose: Option<String>,
    },
}

impl From<DependencyRepr> for DependencySpec {
    fn from(repr: DependencyRepr) -> Self {
        let (name, purpose) = match repr {
            DependencyRepr::Name(name) => (name, None),
            DependencyRepr::Full { name, purpose } => (name, purpose),
        };
        let purpose = purpose.or_else(|| infer_purpose(&name).map(str::to_string));
        Self { name, purpose }
    }
}

impl DependencySpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        DependencyRepr::Name(name.into()).into()
    }

    /// Distribution name without extras or version specifiers, lowercased.
    ///
    /// `"uvicorn[standard]>=0.29"` becomes `"uvicorn"`.
    #[must_use]
    pub fn base_name(&self) -> String {
        base_requirement_name(&self.name)
    }
}

/// Distribution name of a requirement line.
#[must_use]
pub fn base_requirement_name(requirement: &str) -> String {
    let end = requirement
        .find(|c: char| matches!(c, '[' | '<' | '>' | '=' | '!' | '~' | ';' | ' ' | '@'))
        .unwrap_or(requirement.len());
    requirement[..end].trim().to_ascii_lowercase().replace('_', "-")
}

fn infer_purpose(requirement: &str) -> Option<&'static str> {
    let purpose = match base_requirement_name(requirement).as_str() {
        "fastapi" | "flask" | "starlette" => "web-framework",
        "uvicorn" | "gunicorn" | "hypercorn" => "server",
        "sqlmodel" | "sqlalchemy" | "tortoise-orm" => "orm",
        "aiosqlite" | "asyncpg" | "psycopg2-binary" | "psycopg" => "database-driver",
        "python-jose" | "pyjwt" | "authlib" => "auth",
        "passlib" | "bcrypt" | "argon2-cffi" => "password-hashing",
        "pydantic" | "pydantic-settings" | "python-dotenv" => "settings",
        "pytest" | "pytest-asyncio" => "testing",
        "httpx" | "requests" => "http-client",
        _ => return None,
    };
    Some(purpose)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVariableSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "default")]
    pub default_value: String,
    #[serde(default = "default_true")]
    pub is_mandatory: bool,
    #[serde(default)]
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    #[serde(default = "default_base_image")]
    pub base_image: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_volumes")]
    pub volumes: Vec<String>,
    #[serde(default = "default_env_files")]
    pub environment_files: Vec<String>,
}

impl Default for DeploymentSpec {
    fn default() -> Self {
        Self {
            base_image: default_base_image(),
            port: default_port(),
            volumes: default_volumes(),
            environment_files: default_env_files(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Machine-usable description of the target service.
///
/// Created once per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredDesign {
    pub project_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_python_version")]
    pub python_version: String,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
    #[serde(default, alias = "models")]
    pub database_models: Vec<ModelSpec>,
    #[serde(default)]
    pub env_variables: Vec<EnvVariableSpec>,
    #[serde(default, alias = "docker")]
    pub deployment: DeploymentSpec,
    #[serde(default)]
    pub middlewares: Vec<MiddlewareSpec>,
    #[serde(default)]
    pub additional_notes: String,
}

impl StructuredDesign {
    /// Whether any dependency has the given distribution name.
    #[must_use]
    pub fn has_dependency(&self, name: &str) -> bool {
        let wanted = base_requirement_name(name);
        self.dependencies.iter().any(|d| d.base_name() == wanted)
    }

    #[must_use]
    pub fn any_endpoint_requires_auth(&self) -> bool {
        self.endpoints.iter().any(EndpointSpec::requires_auth)
    }

    /// Parse a design from JSON without validating it.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Pretty JSON, as cached next to the generated project.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn default_true() -> bool {
    true
}

fn default_field_type() -> String {
    "string".to_string()
}

fn default_python_version() -> String {
    "3.12".to_string()
}

fn default_base_image() -> String {
    "python:3.12-slim".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_volumes() -> Vec<String> {
    vec!["./data:/app/data".to_string()]
}

fn default_env_files() -> Vec<String> {
    vec![".env".to_string()]
}
