//! Environment Probe Results
//!
//! Structured outcomes of health and feature checks against the system
//! under test. An unreachable endpoint is a result, not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse health derived from the HTTP status of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointHealth {
    /// 2xx/3xx
    Healthy,
    /// 4xx: reachable, but the request was rejected
    Degraded,
    /// 5xx on every attempt
    Failing,
    /// No HTTP response at all
    Unreachable,
}

impl EndpointHealth {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=399 => Self::Healthy,
            400..=499 => Self::Degraded,
            _ => Self::Failing,
        }
    }

    /// Confidence of the observation when turned into evidence.
    pub fn evidence_confidence(&self) -> f64 {
        match self {
            Self::Healthy => 0.95,
            Self::Failing => 0.9,
            Self::Degraded => 0.6,
            Self::Unreachable => 0.0,
        }
    }
}

impl std::fmt::Display for EndpointHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointHealth::Healthy => write!(f, "healthy"),
            EndpointHealth::Degraded => write!(f, "degraded"),
            EndpointHealth::Failing => write!(f, "failing"),
            EndpointHealth::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Outcome of a direct health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityResult {
    pub endpoint: String,
    pub status_code: Option<u16>,
    pub latency_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub health: EndpointHealth,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectivityResult {
    pub fn reachable(endpoint: impl Into<String>, status: u16, latency_ms: u64, attempts: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            status_code: Some(status),
            latency_ms: Some(latency_ms),
            timestamp: Utc::now(),
            health: EndpointHealth::from_status(status),
            attempts,
            error: None,
        }
    }

    pub fn unreachable(endpoint: impl Into<String>, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            status_code: None,
            latency_ms: None,
            timestamp: Utc::now(),
            health: EndpointHealth::Unreachable,
            attempts,
            error: Some(error.into()),
        }
    }

    /// Render the status part of an environment citation.
    pub fn status_label(&self) -> String {
        match self.status_code {
            Some(code) => code.to_string(),
            None => "unreachable".to_string(),
        }
    }
}

/// A deeper functional check suggested by a failure signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    /// Path relative to the environment endpoint.
    pub path: String,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Outcome of a feature probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureResult {
    pub feature: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
}

/// Evidence confidence assigned to feature probe outcomes.
pub const FEATURE_RESULT_CONFIDENCE: f64 = 0.85;
