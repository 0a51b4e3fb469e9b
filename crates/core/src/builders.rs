//! Configuration Builder
//!
//! Builder for `AnalysisConfig`:
//! 1. Create with `::new()` (defaults) or `::from_config()` (loaded file)
//! 2. Chain `.field(value)` calls
//! 3. Call `.build()` which validates and returns `CoreResult<AnalysisConfig>`
//!
//! Validation happens at build time, catching configuration errors
//! before they surface as a half-finished analysis.

use std::path::PathBuf;

use crate::config::{AnalysisConfig, CustomRule, QualityWeights, RetryConfig};
use crate::error::CoreResult;
use crate::proxy::ProxyConfig;

/// Builder for `AnalysisConfig`.
///
/// # Example
/// ```ignore
/// let config = AnalysisConfigBuilder::new()
///     .jenkins_url("https://ci.example.com")
///     .jenkins_credentials("bot", token)
///     .clone_timeout_secs(120)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one loaded from disk.
    pub fn from_config(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn jenkins_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.config.jenkins.base_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn jenkins_credentials(mut self, username: impl Into<String>, api_token: impl Into<String>) -> Self {
        self.config.jenkins.username = Some(username.into());
        self.config.jenkins.api_token = Some(api_token.into());
        self
    }

    pub fn console_timeout_secs(mut self, secs: u64) -> Self {
        self.config.jenkins.console_timeout_secs = secs;
        self
    }

    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.config.environment.health_path = Some(path.into());
        self
    }

    pub fn environment_timeout_secs(mut self, secs: u64) -> Self {
        self.config.environment.timeout_secs = secs;
        self
    }

    pub fn probe_features(mut self, enabled: bool) -> Self {
        self.config.environment.probe_features = enabled;
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.environment.accept_invalid_certs = accept;
        self
    }

    pub fn clone_timeout_secs(mut self, secs: u64) -> Self {
        self.config.repository.clone_timeout_secs = secs;
        self
    }

    pub fn workspace_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.repository.workspace_root = Some(path.into());
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn freshness_secs(mut self, secs: u64) -> Self {
        self.config.validation.freshness_secs = secs;
        self
    }

    pub fn allow_claim_removal(mut self, allow: bool) -> Self {
        self.config.validation.allow_claim_removal = allow;
        self
    }

    pub fn allow_auto_correction(mut self, allow: bool) -> Self {
        self.config.validation.allow_auto_correction = allow;
        self
    }

    pub fn quality_weights(mut self, weights: QualityWeights) -> Self {
        self.config.quality_weights = weights;
        self
    }

    /// Append a console-log rule after the built-in table.
    pub fn custom_rule(mut self, rule: CustomRule) -> Self {
        self.config.extractor.custom_rules.push(rule);
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> CoreResult<AnalysisConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{SignatureCategory, Severity};

    #[test]
    fn test_builder_defaults() {
        let config = AnalysisConfigBuilder::new().build().unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let config = AnalysisConfigBuilder::new()
            .jenkins_url("https://ci.example.com/")
            .jenkins_credentials("bot", "token")
            .build()
            .unwrap();
        assert_eq!(config.jenkins.base_url.as_deref(), Some("https://ci.example.com"));
        assert_eq!(config.jenkins.username.as_deref(), Some("bot"));
    }

    #[test]
    fn test_builder_validates() {
        assert!(AnalysisConfigBuilder::new().clone_timeout_secs(0).build().is_err());
        assert!(AnalysisConfigBuilder::new()
            .retry(RetryConfig {
                max_attempts: 0,
                ..RetryConfig::default()
            })
            .build()
            .is_err());
    }

    #[test]
    fn test_duplicate_custom_rules_rejected() {
        let rule = CustomRule {
            id: "quota".into(),
            pattern: "quota exceeded".into(),
            category: SignatureCategory::Infrastructure,
            severity: Severity::High,
            subject_group: None,
        };
        let result = AnalysisConfigBuilder::new()
            .custom_rule(rule.clone())
            .custom_rule(rule)
            .build();
        assert!(result.is_err());
    }
}
