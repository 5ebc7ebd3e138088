use specforge_utils::ConfigError;

use super::model::RunConfig;

/// Largest accepted iteration ceiling.
pub const MAX_ITERATIONS_LIMIT: u32 = 10;

impl RunConfig {
    /// Check value ranges. All problems are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.max_iterations == 0 || self.max_iterations > MAX_ITERATIONS_LIMIT {
            errors.push(format!(
                "max_iterations must be between 1 and {MAX_ITERATIONS_LIMIT}, got {}",
                self.max_iterations
            ));
        }

        if self.model.trim().is_empty() {
            errors.push("model must not be empty".to_string());
        }

        if !self.checks.min_test_ratio.is_finite() || self.checks.min_test_ratio < 0.0 {
            errors.push(format!(
                "checks.min_test_ratio must be a non-negative number, got {}",
                self.checks.min_test_ratio
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            errors.push(format!(
                "provider.temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            ));
        }

        if self.max_tokens == 0 {
            errors.push("provider.max_tokens must be greater than 0".to_string());
        }

        if self.max_provider_calls == Some(0) {
            errors.push("run.max_provider_calls must be greater than 0 when set".to_string());
        }

        let t = &self.timeouts;
        for (name, value) in [
            ("provider_call", t.provider_call),
            ("dependency_install", t.dependency_install),
            ("test_run", t.test_run),
            ("smoke", t.smoke),
            ("container_build", t.container_build),
            ("container_probe", t.container_probe),
        ] {
            if value.is_zero() {
                errors.push(format!("timeouts.{name}_secs must be greater than 0"));
            }
        }

        if !self.profile.health_path.starts_with('/') {
            errors.push(format!(
                "profile.health_path must start with '/', got '{}'",
                self.profile.health_path
            ));
        }

        if !self.profile.asgi_app.contains(':') {
            errors.push(format!(
                "profile.asgi_app must look like 'module:attribute', got '{}'",
                self.profile.asgi_app
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_all_errors_reported_together() {
        let mut config = RunConfig {
            max_iterations: 0,
            model: " ".to_string(),
            ..RunConfig::default()
        };
        config.timeouts.smoke = Duration::ZERO;
        config.profile.health_path = "health".to_string();

        match config.validate() {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert_eq!(errors.len(), 4);
                assert!(errors.iter().any(|e| e.contains("timeouts.smoke_secs")));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_iteration_ceiling_upper_bound() {
        let config = RunConfig {
            max_iterations: 11,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
