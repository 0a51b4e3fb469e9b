//! Environment Probe
//!
//! Direct HTTP checks against the system under test, independent of the
//! automation that failed. An unreachable environment is reported as a
//! result, never as an error.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use ci_triage_core::{
    ConnectivityResult, EnvironmentConfig, FeatureResult, FeatureSpec, ProxyConfig, RetryConfig,
};

use crate::error::{SourceError, SourceResult};
use crate::http_client::{build_http_client, HttpClientOptions};
use crate::retry::retry_counted;

#[async_trait]
pub trait EnvironmentProbe: Send + Sync {
    /// Health check against the declared endpoint.
    async fn validate_connectivity(&self, endpoint: &str) -> ConnectivityResult;

    /// Functional check of one feature path under the endpoint.
    async fn probe_feature(&self, endpoint: &str, feature: &FeatureSpec) -> FeatureResult;
}

pub struct HttpEnvironmentProbe {
    client: reqwest::Client,
    health_path: Option<String>,
    retry: RetryConfig,
}

impl HttpEnvironmentProbe {
    pub fn new(
        config: &EnvironmentConfig,
        retry: RetryConfig,
        proxy: Option<&ProxyConfig>,
    ) -> SourceResult<Self> {
        let options = HttpClientOptions {
            timeout: Duration::from_secs(config.timeout_secs),
            accept_invalid_certs: config.accept_invalid_certs,
        };
        Ok(Self {
            client: build_http_client(proxy, &options)?,
            health_path: config.health_path.clone(),
            retry,
        })
    }

    /// One GET; 5xx is turned into an error so it gets retried.
    async fn status_of(&self, url: &str) -> SourceResult<(u16, Duration)> {
        let started = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let elapsed = started.elapsed();
        if status >= 500 {
            return Err(SourceError::Http {
                status,
                message: format!("{} answered {}", url, status),
            });
        }
        Ok((status, elapsed))
    }
}

#[async_trait]
impl EnvironmentProbe for HttpEnvironmentProbe {
    async fn validate_connectivity(&self, endpoint: &str) -> ConnectivityResult {
        let url = match join_url(endpoint, self.health_path.as_deref().unwrap_or("")) {
            Ok(url) => url,
            Err(e) => return ConnectivityResult::unreachable(endpoint, e.to_string(), 0),
        };

        let outcome = retry_counted(&self.retry, "environment health check", || self.status_of(&url)).await;
        match outcome.result {
            Ok((status, elapsed)) => {
                tracing::info!("environment {} answered {} in {}ms", url, status, elapsed.as_millis());
                ConnectivityResult::reachable(url, status, elapsed.as_millis() as u64, outcome.attempts)
            }
            Err(SourceError::Http { status, .. }) => {
                tracing::warn!(
                    "environment {} answered {} on all {} attempts",
                    url,
                    status,
                    outcome.attempts
                );
                ConnectivityResult {
                    latency_ms: None,
                    ..ConnectivityResult::reachable(url, status, 0, outcome.attempts)
                }
            }
            Err(e) => {
                tracing::warn!("environment {} unreachable: {}", url, e);
                ConnectivityResult::unreachable(url, e.to_string(), outcome.attempts)
            }
        }
    }

    async fn probe_feature(&self, endpoint: &str, feature: &FeatureSpec) -> FeatureResult {
        let url = match join_url(endpoint, &feature.path) {
            Ok(url) => url,
            Err(e) => {
                return FeatureResult {
                    feature: feature.name.clone(),
                    url: endpoint.to_string(),
                    status_code: None,
                    passed: false,
                    timestamp: Utc::now(),
                    detail: e.to_string(),
                }
            }
        };

        let outcome = retry_counted(&self.retry, "feature probe", || self.status_of(&url)).await;
        let (status_code, detail) = match &outcome.result {
            Ok((status, _)) => (Some(*status), format!("{} answered {}", url, status)),
            Err(SourceError::Http { status, .. }) => (
                Some(*status),
                format!("{} answered {} on {} attempts", url, status, outcome.attempts),
            ),
            Err(e) => (None, e.to_string()),
        };
        let passed = matches!(status_code, Some(s) if (200..400).contains(&s));
        tracing::debug!("feature probe {} -> {:?}", feature.name, status_code);

        FeatureResult {
            feature: feature.name.clone(),
            url,
            status_code,
            passed,
            timestamp: Utc::now(),
            detail,
        }
    }
}

/// Append `path` to `endpoint`, keeping exactly one `/` between them.
pub fn join_url(endpoint: &str, path: &str) -> SourceResult<String> {
    let base = url::Url::parse(endpoint.trim())
        .map_err(|e| SourceError::invalid_response(format!("Invalid endpoint '{}': {}", endpoint, e)))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(SourceError::invalid_response(format!(
            "Endpoint '{}' is not http(s)",
            endpoint
        )));
    }
    let trimmed = endpoint.trim().trim_end_matches('/');
    let path = path.trim();
    if path.is_empty() {
        return Ok(trimmed.to_string());
    }
    Ok(format!("{}/{}", trimmed, path.trim_start_matches('/')))
}
