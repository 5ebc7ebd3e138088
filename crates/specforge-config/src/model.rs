use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use specforge_utils::{CancelFlag, NullSink, ProgressSink};

/// Model used when neither the CLI, the config file nor `SPECFORGE_MODEL` names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Total generation attempts per run unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: u32 = 4;

/// How completions are produced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ProviderKind {
    /// HTTP API chosen from the model name
    #[default]
    Api,
    Anthropic,
    #[strum(serialize = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
    #[strum(serialize = "openrouter")]
    #[serde(rename = "openrouter")]
    OpenRouter,
    Moonshot,
    #[strum(serialize = "deepseek")]
    #[serde(rename = "deepseek")]
    DeepSeek,
    /// One-shot `claude -p` subprocess
    ClaudeCli,
    /// `pi --mode rpc` subprocess
    Pi,
}

impl ProviderKind {
    /// Resolve `Api` to a concrete HTTP provider from the model name.
    ///
    /// `claude*` without a slash is Anthropic, `org/model` goes through
    /// OpenRouter, `kimi*`/`moonshot*` is Moonshot, `deepseek*` is DeepSeek and
    /// everything else is OpenAI. Explicit selections are returned unchanged.
    #[must_use]
    pub fn resolve(self, model: &str) -> ProviderKind {
        if self != ProviderKind::Api {
            return self;
        }
        let lower = model.to_ascii_lowercase();
        if lower.starts_with("claude") && !lower.contains('/') {
            ProviderKind::Anthropic
        } else if lower.contains('/') {
            ProviderKind::OpenRouter
        } else if lower.starts_with("kimi") || lower.starts_with("moonshot") {
            ProviderKind::Moonshot
        } else if lower.starts_with("deepseek") {
            ProviderKind::DeepSeek
        } else {
            ProviderKind::OpenAi
        }
    }

    /// Environment variable holding the credential for HTTP providers.
    #[must_use]
    pub const fn api_key_env(self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::Moonshot => Some("MOONSHOT_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::Api | Self::ClaudeCli | Self::Pi => None,
        }
    }

    /// Whether the provider is driven through a local subprocess.
    #[must_use]
    pub const fn is_subprocess(self) -> bool {
        matches!(self, Self::ClaudeCli | Self::Pi)
    }

    /// Accepted spellings, for error messages.
    #[must_use]
    pub fn supported() -> String {
        Self::iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
    }
}

/// The verification battery, in execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckKind {
    Tests,
    Smoke,
    Container,
    Coverage,
    Meaningful,
    Structure,
}

impl CheckKind {
    /// Human-facing check name used in reports.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Tests => "Tests pass",
            Self::Smoke => "App starts",
            Self::Container => "Docker builds",
            Self::Coverage => "Spec coverage",
            Self::Meaningful => "Tests meaningful",
            Self::Structure => "Project structure",
        }
    }

    /// All checks in battery order.
    pub fn all() -> impl Iterator<Item = CheckKind> {
        Self::iter()
    }
}

/// Per-operation timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub provider_call: Duration,
    pub dependency_install: Duration,
    pub test_run: Duration,
    pub smoke: Duration,
    pub container_build: Duration,
    pub container_probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            provider_call: Duration::from_secs(300),
            dependency_install: Duration::from_secs(300),
            test_run: Duration::from_secs(120),
            smoke: Duration::from_secs(30),
            container_build: Duration::from_secs(300),
            container_probe: Duration::from_secs(10),
        }
    }
}

/// Which checks run, which of them gate the overall verdict, and the
/// meaningfulness thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ChecksConfig {
    pub disabled: BTreeSet<CheckKind>,
    /// `None` means every enabled check gates.
    pub gating: Option<BTreeSet<CheckKind>>,
    /// Minimum tests per endpoint
    pub min_test_ratio: f64,
    /// Floor for the required number of tests
    pub min_tests: u32,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            disabled: BTreeSet::new(),
            gating: None,
            min_test_ratio: 1.0,
            min_tests: 3,
        }
    }
}

impl ChecksConfig {
    #[must_use]
    pub fn is_enabled(&self, kind: CheckKind) -> bool {
        !self.disabled.contains(&kind)
    }

    #[must_use]
    pub fn is_gating(&self, kind: CheckKind) -> bool {
        self.gating.as_ref().is_none_or(|set| set.contains(&kind))
    }

    pub fn disable(&mut self, kind: CheckKind) {
        self.disabled.insert(kind);
    }
}

/// Conventions of the generated service that the verifier relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProfile {
    pub entry_point: String,
    pub manifest: String,
    /// Dependency that must appear in the manifest
    pub web_framework: String,
    /// `module:attribute` served by the smoke test
    pub asgi_app: String,
    pub health_path: String,
    pub test_dir: String,
    /// Prefix of the container image tag; each build appends its own suffix
    pub image_tag: String,
    /// Interpreter used to create the per-project environment
    pub python: String,
}

impl Default for TargetProfile {
    fn default() -> Self {
        Self {
            entry_point: "app/main.py".to_string(),
            manifest: "requirements.txt".to_string(),
            web_framework: "fastapi".to_string(),
            asgi_app: "app.main:app".to_string(),
            health_path: "/health".to_string(),
            test_dir: "tests".to_string(),
            image_tag: "specforge-verify".to_string(),
            python: "python3".to_string(),
        }
    }
}

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Default,
    Environment(String),
    ConfigFile(PathBuf),
    Cli,
    Programmatic,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Environment(var) => write!(f, "env:{var}"),
            Self::ConfigFile(path) => write!(f, "config:{}", path.display()),
            Self::Cli => write!(f, "cli"),
            Self::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// Everything one run needs, carried explicitly through every component.
///
/// Use [`RunConfig::discover`](crate::RunConfig::discover) for CLI semantics or
/// [`RunConfig::builder`](crate::RunConfig::builder) for programmatic use.
#[derive(Clone)]
pub struct RunConfig {
    pub provider: ProviderKind,
    pub model: String,
    /// Explicit credential; wins over the provider's environment variable
    pub api_key: Option<String>,
    /// Alternative environment variable to read the credential from
    pub api_key_env: Option<String>,
    /// Override for the provider's base URL
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub output_dir: PathBuf,
    pub max_iterations: u32,
    /// Remove everything in the output directory before the run
    pub clean: bool,
    pub timeouts: Timeouts,
    pub checks: ChecksConfig,
    pub profile: TargetProfile,
    /// Hard cap on provider calls for the whole run
    pub max_provider_calls: Option<u32>,
    /// Ask the provider to analyse failing test output before repairing
    pub analyze_failures: bool,
    pub progress: Arc<dyn ProgressSink>,
    pub cancel: CancelFlag,
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Api,
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            max_tokens: 16_384,
            temperature: 0.1,
            output_dir: PathBuf::from("./output"),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            clean: false,
            timeouts: Timeouts::default(),
            checks: ChecksConfig::default(),
            profile: TargetProfile::default(),
            max_provider_calls: None,
            analyze_failures: true,
            progress: Arc::new(NullSink),
            cancel: CancelFlag::new(),
            source_attribution: HashMap::new(),
        }
    }
}

impl RunConfig {
    /// The concrete provider after model-based auto-detection.
    #[must_use]
    pub fn resolved_provider(&self) -> ProviderKind {
        self.provider.resolve(&self.model)
    }

    /// Sampling temperature, adjusted for models that only accept 1.0.
    #[must_use]
    pub fn effective_temperature(&self) -> f32 {
        const FIXED_TEMPERATURE_MODELS: &[&str] = &["kimi-k2.5"];
        if FIXED_TEMPERATURE_MODELS.contains(&self.model.as_str()) {
            1.0
        } else {
            self.temperature
        }
    }

    /// Replace the progress sink (one sink per run).
    #[must_use]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .cloned()
            .unwrap_or(ConfigSource::Default)
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_key_env", &self.api_key_env)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("output_dir", &self.output_dir)
            .field("max_iterations", &self.max_iterations)
            .field("clean", &self.clean)
            .field("timeouts", &self.timeouts)
            .field("checks", &self.checks)
            .field("profile", &self.profile)
            .field("max_provider_calls", &self.max_provider_calls)
            .field("analyze_failures", &self.analyze_failures)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_provider_detection() {
        let api = ProviderKind::Api;
        assert_eq!(api.resolve("claude-sonnet-4-20250514"), ProviderKind::Anthropic);
        assert_eq!(api.resolve("anthropic/claude-3.5"), ProviderKind::OpenRouter);
        assert_eq!(api.resolve("moonshotai/Kimi-K2.5"), ProviderKind::OpenRouter);
        assert_eq!(api.resolve("kimi-k2.5"), ProviderKind::Moonshot);
        assert_eq!(api.resolve("moonshot-v1-32k"), ProviderKind::Moonshot);
        assert_eq!(api.resolve("deepseek-chat"), ProviderKind::DeepSeek);
        assert_eq!(api.resolve("gpt-4o"), ProviderKind::OpenAi);
    }

    #[test]
    fn test_explicit_provider_is_not_redetected() {
        assert_eq!(ProviderKind::Pi.resolve("claude-3"), ProviderKind::Pi);
        assert_eq!(ProviderKind::OpenAi.resolve("claude-3"), ProviderKind::OpenAi);
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(ProviderKind::from_str("claude-cli").unwrap(), ProviderKind::ClaudeCli);
        assert_eq!(ProviderKind::from_str("openai").unwrap(), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from_str("pi").unwrap(), ProviderKind::Pi);
        assert!(ProviderKind::from_str("gemini").is_err());
        assert!(ProviderKind::supported().contains("openrouter"));
    }

    #[test]
    fn test_check_kind_order_and_titles() {
        let order: Vec<_> = CheckKind::all().collect();
        assert_eq!(order.first(), Some(&CheckKind::Tests));
        assert_eq!(order.last(), Some(&CheckKind::Structure));
        assert_eq!(order.len(), 6);
        assert_eq!(CheckKind::Container.title(), "Docker builds");
        assert_eq!(CheckKind::from_str("meaningful").unwrap(), CheckKind::Meaningful);
    }

    #[test]
    fn test_checks_gating_defaults_to_all() {
        let mut checks = ChecksConfig::default();
        assert!(checks.is_gating(CheckKind::Coverage));
        checks.gating = Some([CheckKind::Tests].into_iter().collect());
        assert!(checks.is_gating(CheckKind::Tests));
        assert!(!checks.is_gating(CheckKind::Coverage));
        checks.disable(CheckKind::Container);
        assert!(!checks.is_enabled(CheckKind::Container));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = RunConfig {
            api_key: Some("sk-live-secret".to_string()),
            ..RunConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-live-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_fixed_temperature_models() {
        let mut config = RunConfig::default();
        assert!((config.effective_temperature() - 0.1).abs() < f32::EPSILON);
        config.model = "kimi-k2.5".to_string();
        assert!((config.effective_temperature() - 1.0).abs() < f32::EPSILON);
    }
}
