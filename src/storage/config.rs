//! JSON Configuration Management
//!
//! Loads `AnalysisConfig` from an explicit path or the platform config
//! directory, then applies environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use ci_triage_core::AnalysisConfig;

use crate::utils::error::{AnalysisError, TriageResult};
use crate::utils::paths::config_path;

pub const ENV_JENKINS_URL: &str = "CI_TRIAGE_JENKINS_URL";
pub const ENV_JENKINS_USER: &str = "CI_TRIAGE_JENKINS_USER";
pub const ENV_JENKINS_TOKEN: &str = "CI_TRIAGE_JENKINS_TOKEN";
pub const ENV_WORKSPACE: &str = "CI_TRIAGE_WORKSPACE";

/// Configuration service for loading analysis settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: Option<PathBuf>,
    config: AnalysisConfig,
}

impl ConfigService {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used when present and defaults otherwise. Environment overrides are
    /// applied last, then the result is validated.
    pub fn load(explicit: Option<&Path>) -> TriageResult<Self> {
        let (config_path, mut config) = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(AnalysisError::config(format!(
                        "Config file {} does not exist",
                        path.display()
                    )));
                }
                (Some(path.to_path_buf()), Self::load_from_file(path)?)
            }
            None => match config_path() {
                Ok(path) if path.exists() => {
                    let config = Self::load_from_file(&path)?;
                    (Some(path), config)
                }
                Ok(path) => (Some(path), AnalysisConfig::default()),
                Err(_) => (None, AnalysisConfig::default()),
            },
        };

        apply_overrides(&mut config, |key| std::env::var(key).ok());
        config.validate()?;
        tracing::debug!(
            "loaded configuration from {}",
            config_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "defaults".to_string())
        );

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> TriageResult<AnalysisConfig> {
        let content = fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, config: &AnalysisConfig) -> TriageResult<()> {
        config.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Write the current configuration back to where it was loaded from.
    ///
    /// The API token is never written.
    pub fn save(&self) -> TriageResult<()> {
        let path = self
            .config_path
            .as_deref()
            .ok_or_else(|| AnalysisError::config("No configuration path to save to"))?;
        Self::save_to_file(path, &self.config)
    }

    /// Get the current configuration
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn into_config(self) -> AnalysisConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// Apply `CI_TRIAGE_*` overrides read through `lookup`.
pub fn apply_overrides(config: &mut AnalysisConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    if let Some(url) = get(ENV_JENKINS_URL) {
        config.jenkins.base_url = Some(url.trim_end_matches('/').to_string());
    }
    if let Some(user) = get(ENV_JENKINS_USER) {
        config.jenkins.username = Some(user);
    }
    if let Some(token) = get(ENV_JENKINS_TOKEN) {
        config.jenkins.api_token = Some(token);
    }
    if let Some(workspace) = get(ENV_WORKSPACE) {
        config.repository.workspace_root = Some(PathBuf::from(workspace));
    }
}
