//! Analysis Configuration
//!
//! Every tunable of one analysis run: CI server access, per-call timeouts,
//! retry policy, validation policy and evidence weighting. All sections have
//! working defaults so an empty JSON object is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::evidence::EvidenceKind;
use crate::proxy::ProxyConfig;
use crate::signature::{SignatureCategory, Severity};

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct JenkinsConfig {
    /// Base URL of the Jenkins server. May be omitted when every build
    /// reference is given as a full URL.
    pub base_url: Option<String>,
    pub username: Option<String>,
    /// API token; never written back when a config is serialized.
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub metadata_timeout_secs: u64,
    pub console_timeout_secs: u64,
    pub artifacts_timeout_secs: u64,
    /// Console logs longer than this keep only their tail.
    pub max_console_bytes: usize,
}

impl Default for JenkinsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            username: None,
            api_token: None,
            metadata_timeout_secs: 30,
            console_timeout_secs: 60,
            artifacts_timeout_secs: 30,
            max_console_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentConfig {
    /// Appended to the declared endpoint for the health check.
    pub health_path: Option<String>,
    pub timeout_secs: u64,
    pub probe_features: bool,
    pub max_feature_probes: usize,
    /// Test clusters frequently run with self-signed certificates.
    pub accept_invalid_certs: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            health_path: None,
            timeout_secs: 10,
            probe_features: true,
            max_feature_probes: 3,
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RepositoryConfig {
    pub clone_timeout_secs: u64,
    /// Parent directory for disposable checkouts; the system temp dir when unset.
    pub workspace_root: Option<PathBuf>,
    /// Largest file `inspect` will read while searching for selectors.
    pub max_scan_file_bytes: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            clone_timeout_secs: 300,
            workspace_root: None,
            max_scan_file_bytes: 512 * 1024,
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 500,
            multiplier: 2.0,
            max_interval_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts. Used by tests and fakes.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval_ms: 0,
            multiplier: 1.0,
            max_interval_ms: 0,
        }
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms.max(self.initial_interval_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    /// Environment citations older than this are re-probed.
    pub freshness_secs: u64,
    pub allow_claim_removal: bool,
    pub allow_auto_correction: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            freshness_secs: 600,
            allow_claim_removal: true,
            allow_auto_correction: true,
        }
    }
}

/// Per-source reliability weights for `evidence_quality`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityWeights {
    pub jenkins: f64,
    pub environment: f64,
    pub repository: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            jenkins: 0.3,
            environment: 0.3,
            repository: 0.4,
        }
    }
}

impl QualityWeights {
    pub fn weight(&self, kind: EvidenceKind) -> f64 {
        match kind {
            EvidenceKind::Jenkins => self.jenkins,
            EvidenceKind::Environment => self.environment,
            EvidenceKind::Repository => self.repository,
        }
    }

    pub fn total(&self) -> f64 {
        self.jenkins + self.environment + self.repository
    }
}

/// A user-supplied console-log rule, appended after the built-in table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomRule {
    pub id: String,
    pub pattern: String,
    pub category: SignatureCategory,
    pub severity: Severity,
    /// Capture group holding the rule subject.
    #[serde(default)]
    pub subject_group: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractorConfig {
    pub custom_rules: Vec<CustomRule>,
    /// How many log lines after a signature may still contribute stack frames.
    pub stack_window: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            custom_rules: Vec::new(),
            stack_window: 25,
        }
    }
}

// ============================================================================
// AnalysisConfig
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    pub jenkins: JenkinsConfig,
    pub environment: EnvironmentConfig,
    pub repository: RepositoryConfig,
    pub retry: RetryConfig,
    pub validation: ValidationConfig,
    pub quality_weights: QualityWeights,
    pub extractor: ExtractorConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

impl AnalysisConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(url) = &self.jenkins.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CoreError::validation(format!(
                    "jenkins.baseUrl must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }
        if self.jenkins.api_token.is_some() && self.jenkins.username.is_none() {
            return Err(CoreError::validation(
                "jenkins.apiToken requires jenkins.username",
            ));
        }

        let timeouts = [
            ("jenkins.metadataTimeoutSecs", self.jenkins.metadata_timeout_secs),
            ("jenkins.consoleTimeoutSecs", self.jenkins.console_timeout_secs),
            ("jenkins.artifactsTimeoutSecs", self.jenkins.artifacts_timeout_secs),
            ("environment.timeoutSecs", self.environment.timeout_secs),
            ("repository.cloneTimeoutSecs", self.repository.clone_timeout_secs),
            ("validation.freshnessSecs", self.validation.freshness_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(CoreError::validation(format!("{} must be > 0", name)));
            }
        }

        if self.retry.max_attempts == 0 || self.retry.max_attempts > 10 {
            return Err(CoreError::validation(
                "retry.maxAttempts must be between 1 and 10",
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(CoreError::validation("retry.multiplier must be >= 1.0"));
        }

        let w = &self.quality_weights;
        let weights = [w.jenkins, w.environment, w.repository];
        if weights.iter().any(|x| !x.is_finite() || *x < 0.0) || w.total() <= 0.0 {
            return Err(CoreError::validation(
                "qualityWeights must be non-negative and not all zero",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for rule in &self.extractor.custom_rules {
            if rule.id.trim().is_empty() || rule.pattern.is_empty() {
                return Err(CoreError::validation(
                    "extractor.customRules entries need an id and a pattern",
                ));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(CoreError::validation(format!(
                    "Duplicate custom rule id: '{}'",
                    rule.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.validation.freshness_secs, 600);
        assert!((config.quality_weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: AnalysisConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn test_partial_json_section() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{"jenkins": {"baseUrl": "https://ci.example.com"}, "retry": {"maxAttempts": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.jenkins.base_url.as_deref(), Some("https://ci.example.com"));
        assert_eq!(config.jenkins.console_timeout_secs, 60);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_interval_ms, 500);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AnalysisConfig::default();
        config.jenkins.base_url = Some("ci.example.com".into());
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.quality_weights = QualityWeights {
            jenkins: 0.0,
            environment: 0.0,
            repository: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_token_not_serialized() {
        let mut config = AnalysisConfig::default();
        config.jenkins.username = Some("bot".into());
        config.jenkins.api_token = Some("t0ken".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("t0ken"));
        assert!(json.contains("\"username\":\"bot\""));
    }
}
