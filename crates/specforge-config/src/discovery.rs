use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use specforge_utils::ConfigError;

use super::model::{CheckKind, ConfigSource, ProviderKind, RunConfig};

pub const CONFIG_DIR_NAME: &str = ".specforge";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Values taken from the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub max_iterations: Option<u32>,
    pub clean: bool,
    pub no_docker: bool,
    pub no_smoke: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    run: Option<RunSection>,
    provider: Option<ProviderSection>,
    timeouts: Option<TimeoutsSection>,
    checks: Option<ChecksSection>,
    profile: Option<ProfileSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunSection {
    output_dir: Option<PathBuf>,
    max_iterations: Option<u32>,
    clean: Option<bool>,
    analyze_failures: Option<bool>,
    max_provider_calls: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProviderSection {
    kind: Option<ProviderKind>,
    model: Option<String>,
    api_key_env: Option<String>,
    base_url: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimeoutsSection {
    provider_call_secs: Option<u64>,
    dependency_install_secs: Option<u64>,
    test_run_secs: Option<u64>,
    smoke_secs: Option<u64>,
    container_build_secs: Option<u64>,
    container_probe_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChecksSection {
    disable: Option<Vec<CheckKind>>,
    gating: Option<Vec<CheckKind>>,
    min_test_ratio: Option<f64>,
    min_tests: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileSection {
    entry_point: Option<String>,
    manifest: Option<String>,
    web_framework: Option<String>,
    asgi_app: Option<String>,
    health_path: Option<String>,
    test_dir: Option<String>,
    image_tag: Option<String>,
    python: Option<String>,
}

/// Assign `$value` to `$target` and record `$source` under `$key`.
macro_rules! apply {
    ($attr:expr, $source:expr, $key:literal, $target:expr, $value:expr) => {
        if let Some(v) = $value {
            $target = v;
            $attr.insert($key.to_string(), $source.clone());
        }
    };
}

impl RunConfig {
    /// Discover and load configuration with precedence: CLI > file > defaults.
    ///
    /// The file is the explicit `--config` path, else the nearest
    /// `.specforge/config.toml` from the current directory upward, else the
    /// user-level `specforge/config.toml` in the platform config directory.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir().map_err(|e| ConfigError::InvalidValue {
            key: "cwd".to_string(),
            value: e.to_string(),
        })?;
        let mut config = Self::discover_from(&start_dir, cli_args)?;

        if config
            .source_attribution
            .values()
            .all(|s| !matches!(s, ConfigSource::ConfigFile(_)))
            && cli_args.config_path.is_none()
            && let Some(global) = global_config_path().filter(|p| p.exists())
        {
            tracing::debug!(path = %global.display(), "Using user-level config");
            let explicit = CliArgs {
                config_path: Some(global),
                ..cli_args.clone()
            };
            config = Self::discover_from(&start_dir, &explicit)?;
        }

        Ok(config)
    }

    /// Discover configuration starting from a specific directory.
    ///
    /// Path-driven variant used by tests; it never consults the user-level
    /// config file.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = RunConfig::default();
        let mut attr = std::mem::take(&mut config.source_attribution);

        if let Ok(model) = std::env::var("SPECFORGE_MODEL")
            && !model.trim().is_empty()
        {
            config.model = model;
            attr.insert(
                "model".to_string(),
                ConfigSource::Environment("SPECFORGE_MODEL".to_string()),
            );
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    });
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            let file = load_config_file(path)?;
            let src = ConfigSource::ConfigFile(path.clone());

            if let Some(run) = file.run {
                apply!(attr, src, "output_dir", config.output_dir, run.output_dir);
                apply!(attr, src, "max_iterations", config.max_iterations, run.max_iterations);
                apply!(attr, src, "clean", config.clean, run.clean);
                apply!(attr, src, "analyze_failures", config.analyze_failures, run.analyze_failures);
                apply!(
                    attr,
                    src,
                    "max_provider_calls",
                    config.max_provider_calls,
                    run.max_provider_calls.map(Some)
                );
            }

            if let Some(provider) = file.provider {
                apply!(attr, src, "provider", config.provider, provider.kind);
                apply!(attr, src, "model", config.model, provider.model);
                apply!(attr, src, "api_key_env", config.api_key_env, provider.api_key_env.map(Some));
                apply!(attr, src, "base_url", config.base_url, provider.base_url.map(Some));
                apply!(attr, src, "max_tokens", config.max_tokens, provider.max_tokens);
                apply!(attr, src, "temperature", config.temperature, provider.temperature);
            }

            if let Some(t) = file.timeouts {
                let secs = |v: Option<u64>| v.map(Duration::from_secs);
                let timeouts = &mut config.timeouts;
                apply!(attr, src, "timeouts.provider_call", timeouts.provider_call, secs(t.provider_call_secs));
                apply!(attr, src, "timeouts.dependency_install", timeouts.dependency_install, secs(t.dependency_install_secs));
                apply!(attr, src, "timeouts.test_run", timeouts.test_run, secs(t.test_run_secs));
                apply!(attr, src, "timeouts.smoke", timeouts.smoke, secs(t.smoke_secs));
                apply!(attr, src, "timeouts.container_build", timeouts.container_build, secs(t.container_build_secs));
                apply!(attr, src, "timeouts.container_probe", timeouts.container_probe, secs(t.container_probe_secs));
            }

            if let Some(checks) = file.checks {
                let set = |v: Option<Vec<CheckKind>>| v.map(|v| v.into_iter().collect::<BTreeSet<_>>());
                apply!(attr, src, "checks.disable", config.checks.disabled, set(checks.disable));
                apply!(attr, src, "checks.gating", config.checks.gating, set(checks.gating).map(Some));
                apply!(attr, src, "checks.min_test_ratio", config.checks.min_test_ratio, checks.min_test_ratio);
                apply!(attr, src, "checks.min_tests", config.checks.min_tests, checks.min_tests);
            }

            if let Some(p) = file.profile {
                let profile = &mut config.profile;
                apply!(attr, src, "profile.entry_point", profile.entry_point, p.entry_point);
                apply!(attr, src, "profile.manifest", profile.manifest, p.manifest);
                apply!(attr, src, "profile.web_framework", profile.web_framework, p.web_framework);
                apply!(attr, src, "profile.asgi_app", profile.asgi_app, p.asgi_app);
                apply!(attr, src, "profile.health_path", profile.health_path, p.health_path);
                apply!(attr, src, "profile.test_dir", profile.test_dir, p.test_dir);
                apply!(attr, src, "profile.image_tag", profile.image_tag, p.image_tag);
                apply!(attr, src, "profile.python", profile.python, p.python);
            }
        }

        let cli = ConfigSource::Cli;
        apply!(attr, cli, "provider", config.provider, cli_args.provider);
        apply!(attr, cli, "model", config.model, cli_args.model.clone());
        apply!(attr, cli, "api_key_env", config.api_key_env, cli_args.api_key_env.clone().map(Some));
        apply!(attr, cli, "output_dir", config.output_dir, cli_args.output_dir.clone());
        apply!(attr, cli, "max_iterations", config.max_iterations, cli_args.max_iterations);
        if cli_args.clean {
            config.clean = true;
            attr.insert("clean".to_string(), cli.clone());
        }
        if cli_args.no_docker {
            config.checks.disable(CheckKind::Container);
            attr.insert("checks.disable".to_string(), cli.clone());
        }
        if cli_args.no_smoke {
            config.checks.disable(CheckKind::Smoke);
            attr.insert("checks.disable".to_string(), cli.clone());
        }

        config.source_attribution = attr;
        config.validate()?;
        Ok(config)
    }

    /// Walk upward from `start_dir` looking for `.specforge/config.toml`,
    /// stopping at a repository root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                return None;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => return None,
            }
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("specforge").join(CONFIG_FILE_NAME))
}

fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
        Err(e) => Err(ConfigError::InvalidFile(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))),
    }
}
