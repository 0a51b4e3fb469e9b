//! Build Records
//!
//! Normalized view of one CI build: identifiers, result, parameters, SCM
//! revision, console log and artifact manifest. A `BuildRecord` is created
//! once per analysis and never mutated afterwards.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// BuildRef
// ============================================================================

/// Identifies a single build on the CI server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRef {
    /// Full job name; folders are separated by `/`.
    pub job: String,
    /// Build number.
    pub number: u64,
    /// Original build URL when the reference was given as a URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl BuildRef {
    pub fn new(job: impl Into<String>, number: u64) -> Self {
        Self {
            job: job.into(),
            number,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl std::fmt::Display for BuildRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.job, self.number)
    }
}

// ============================================================================
// BuildResult
// ============================================================================

/// Final status reported by the CI server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    Aborted,
    NotBuilt,
    /// Still running, or the server reported nothing we recognize.
    Unknown,
}

impl BuildResult {
    /// Map the raw `result` field of the Jenkins JSON API.
    pub fn from_jenkins(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("SUCCESS") => Self::Success,
            Some("UNSTABLE") => Self::Unstable,
            Some("FAILURE") => Self::Failure,
            Some("ABORTED") => Self::Aborted,
            Some("NOT_BUILT") => Self::NotBuilt,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Unstable => "UNSTABLE",
            Self::Failure => "FAILURE",
            Self::Aborted => "ABORTED",
            Self::NotBuilt => "NOT_BUILT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether the build ended in a state worth triaging.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Unstable | Self::Failure)
    }
}

impl std::fmt::Display for BuildResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Supporting types
// ============================================================================

/// One archived artifact of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub file_name: String,
    pub relative_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_path: Option<String>,
}

/// SCM revision data recorded by the build itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRevision {
    pub branch: Option<String>,
    pub commit: Option<String>,
    #[serde(default)]
    pub remote_urls: Vec<String>,
}

/// Parts of a build record that can be individually unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildField {
    ConsoleLog,
    Artifacts,
    Parameters,
}

impl std::fmt::Display for BuildField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildField::ConsoleLog => write!(f, "console_log"),
            BuildField::Artifacts => write!(f, "artifacts"),
            BuildField::Parameters => write!(f, "parameters"),
        }
    }
}

/// Number of independently fetchable fields, used for coverage.
const FETCHABLE_FIELDS: f64 = 3.0;

// ============================================================================
// BuildRecord
// ============================================================================

/// Everything the CI server told us about one build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub job: String,
    pub number: u64,
    pub url: String,
    pub result: BuildResult,
    /// Start time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub duration_ms: u64,
    pub building: bool,
    pub parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<GitRevision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,
    /// Fields that could not be fetched after retries.
    pub missing_fields: Vec<BuildField>,
}

impl BuildRecord {
    pub fn build_ref(&self) -> BuildRef {
        BuildRef::new(self.job.clone(), self.number).with_url(self.url.clone())
    }

    /// Look up the first present parameter among `names`, case-insensitively.
    ///
    /// Empty values are treated as absent.
    pub fn parameter(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| {
            self.parameters
                .iter()
                .find(|(k, v)| k.eq_ignore_ascii_case(name) && !v.trim().is_empty())
                .map(|(_, v)| v.trim())
        })
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_ms)
            .single()
            .unwrap_or_default()
    }

    pub fn is_missing(&self, field: BuildField) -> bool {
        self.missing_fields.contains(&field)
    }

    /// Fraction of fetchable fields that were obtained.
    pub fn coverage(&self) -> f64 {
        let missing = self.missing_fields.len() as f64;
        ((FETCHABLE_FIELDS - missing) / FETCHABLE_FIELDS).clamp(0.0, 1.0)
    }
}

// ============================================================================
// ClusterType
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterConnectivity {
    Connected,
    Disconnected,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterTopology {
    SingleNode,
    MultiNode,
    Unknown,
}

/// Heuristic description of the environment a build ran against.
///
/// Used as context for evidence, never as the verdict itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterType {
    pub connectivity: ClusterConnectivity,
    pub topology: ClusterTopology,
    /// Environment endpoint declared by the build parameters.
    pub endpoint: Option<String>,
}

impl Default for ClusterType {
    fn default() -> Self {
        Self {
            connectivity: ClusterConnectivity::Unknown,
            topology: ClusterTopology::Unknown,
            endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BuildRecord {
        let mut parameters = BTreeMap::new();
        parameters.insert("Git_Branch".to_string(), " main ".to_string());
        parameters.insert("CLUSTER_URL".to_string(), "".to_string());
        BuildRecord {
            job: "e2e/login".to_string(),
            number: 7,
            url: "https://ci.example.com/job/e2e/job/login/7/".to_string(),
            result: BuildResult::Failure,
            timestamp_ms: 1_700_000_000_000,
            duration_ms: 1000,
            building: false,
            parameters,
            git: None,
            console_log: None,
            artifacts: None,
            missing_fields: vec![BuildField::ConsoleLog],
        }
    }

    #[test]
    fn test_build_result_mapping() {
        assert_eq!(BuildResult::from_jenkins(Some("unstable")), BuildResult::Unstable);
        assert_eq!(BuildResult::from_jenkins(None), BuildResult::Unknown);
        assert!(BuildResult::Failure.is_failure());
        assert!(!BuildResult::Aborted.is_failure());
    }

    #[test]
    fn test_parameter_lookup_is_case_insensitive_and_skips_empty() {
        let r = record();
        assert_eq!(r.parameter(&["GIT_BRANCH"]), Some("main"));
        assert_eq!(r.parameter(&["CLUSTER_URL"]), None);
    }

    #[test]
    fn test_coverage_counts_missing_fields() {
        let r = record();
        assert!((r.coverage() - 2.0 / 3.0).abs() < 1e-9);
        assert!(r.is_missing(BuildField::ConsoleLog));
        assert_eq!(r.build_ref().to_string(), "e2e/login#7");
    }
}
