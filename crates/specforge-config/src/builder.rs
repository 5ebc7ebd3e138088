use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use specforge_utils::{CancelFlag, ConfigError, ProgressSink};

use super::model::{CheckKind, ConfigSource, ProviderKind, RunConfig, TargetProfile};

impl RunConfig {
    /// Create a builder for programmatic configuration.
    ///
    /// The builder never reads configuration files or `SPECFORGE_MODEL`, which
    /// makes it the right entry point for embedding and tests.
    ///
    /// # Example
    ///
    /// ```rust
    /// use specforge_config::{ProviderKind, RunConfig};
    ///
    /// let config = RunConfig::builder()
    ///     .provider(ProviderKind::Anthropic)
    ///     .model("claude-sonnet-4-20250514")
    ///     .output_dir("/tmp/out")
    ///     .max_iterations(2)
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.max_iterations, 2);
    /// ```
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::new()
    }
}

/// Fluent builder for [`RunConfig`].
///
/// Every value set here is attributed to `ConfigSource::Programmatic`.
#[derive(Default)]
pub struct RunConfigBuilder {
    config: RunConfig,
    touched: Vec<&'static str>,
}

impl RunConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(mut self, key: &'static str) -> Self {
        self.touched.push(key);
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.config.provider = provider;
        self.touch("provider")
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self.touch("model")
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self.touch("api_key")
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self.touch("base_url")
    }

    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self.touch("output_dir")
    }

    #[must_use]
    pub fn max_iterations(mut self, n: u32) -> Self {
        self.config.max_iterations = n;
        self.touch("max_iterations")
    }

    #[must_use]
    pub fn clean(mut self, clean: bool) -> Self {
        self.config.clean = clean;
        self.touch("clean")
    }

    #[must_use]
    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.provider_call = timeout;
        self.touch("timeouts.provider_call")
    }

    #[must_use]
    pub fn install_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.dependency_install = timeout;
        self.touch("timeouts.dependency_install")
    }

    #[must_use]
    pub fn test_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.test_run = timeout;
        self.touch("timeouts.test_run")
    }

    #[must_use]
    pub fn disable_check(mut self, kind: CheckKind) -> Self {
        self.config.checks.disable(kind);
        self.touch("checks.disable")
    }

    #[must_use]
    pub fn gating_checks(mut self, kinds: impl IntoIterator<Item = CheckKind>) -> Self {
        self.config.checks.gating = Some(kinds.into_iter().collect());
        self.touch("checks.gating")
    }

    #[must_use]
    pub fn min_tests(mut self, n: u32) -> Self {
        self.config.checks.min_tests = n;
        self.touch("checks.min_tests")
    }

    #[must_use]
    pub fn profile(mut self, profile: TargetProfile) -> Self {
        self.config.profile = profile;
        self.touch("profile")
    }

    #[must_use]
    pub fn max_provider_calls(mut self, n: u32) -> Self {
        self.config.max_provider_calls = Some(n);
        self.touch("max_provider_calls")
    }

    #[must_use]
    pub fn analyze_failures(mut self, enabled: bool) -> Self {
        self.config.analyze_failures = enabled;
        self.touch("analyze_failures")
    }

    #[must_use]
    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.config.progress = sink;
        self
    }

    #[must_use]
    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = flag;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<RunConfig, ConfigError> {
        let mut config = self.config;
        for key in self.touched {
            config
                .source_attribution
                .insert(key.to_string(), ConfigSource::Programmatic);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specforge_utils::CollectingSink;

    #[test]
    fn test_builder_attributes_programmatic_source() {
        let config = RunConfig::builder()
            .model("claude-3-haiku")
            .disable_check(CheckKind::Container)
            .build()
            .unwrap();

        assert_eq!(config.source_of("model"), ConfigSource::Programmatic);
        assert_eq!(config.source_of("clean"), ConfigSource::Default);
        assert_eq!(config.resolved_provider(), ProviderKind::Anthropic);
        assert!(!config.checks.is_enabled(CheckKind::Container));
    }

    #[test]
    fn test_builder_validates() {
        assert!(RunConfig::builder().max_iterations(0).build().is_err());
    }

    #[test]
    fn test_runs_get_independent_sinks_and_flags() {
        let a = RunConfig::builder()
            .progress(Arc::new(CollectingSink::new()))
            .build()
            .unwrap();
        let b = RunConfig::builder().build().unwrap();

        a.cancel.cancel();
        assert!(a.cancel.is_cancelled());
        assert!(!b.cancel.is_cancelled());
    }
}
