//! Cross-Platform Path Utilities
//!
//! Locations of the configuration file across platforms.

use std::path::PathBuf;

use crate::utils::error::{AnalysisError, TriageResult};

/// Directory name under the platform config directory.
pub const APP_DIR: &str = "ci-triage";

/// Get the configuration directory (e.g. `~/.config/ci-triage/`)
pub fn app_config_dir() -> TriageResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| AnalysisError::config("Could not determine the configuration directory"))
}

/// Get the default config file path (`<config dir>/ci-triage/config.json`)
pub fn config_path() -> TriageResult<PathBuf> {
    Ok(app_config_dir()?.join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path() {
        if let Ok(path) = config_path() {
            let rendered = path.to_string_lossy();
            assert!(rendered.contains(APP_DIR));
            assert!(rendered.ends_with("config.json"));
        }
    }
}
