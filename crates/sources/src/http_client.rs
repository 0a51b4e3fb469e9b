//! HTTP Client Factory
//!
//! Single place where `reqwest` clients are built for the Jenkins API and
//! the environment probe.

use std::time::Duration;

use ci_triage_core::proxy::ProxyConfig;

use crate::error::{SourceError, SourceResult};

#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    /// Default per-request timeout; individual requests may override it.
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
        }
    }
}

/// Build a `reqwest::Client` with the resolved proxy configuration.
///
/// - `Some(proxy)` -> configure proxy on the client
/// - `None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
pub fn build_http_client(
    proxy: Option<&ProxyConfig>,
    options: &HttpClientOptions,
) -> SourceResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(options.timeout)
        .user_agent(concat!("ci-triage/", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(options.accept_invalid_certs);

    match proxy {
        Some(cfg) => {
            let mut p = reqwest::Proxy::all(cfg.url())
                .map_err(|e| SourceError::network(format!("Invalid proxy {}: {}", cfg.url(), e)))?;
            if let (Some(u), Some(pw)) = (&cfg.username, &cfg.password) {
                p = p.basic_auth(u, pw);
            }
            builder = builder.proxy(p);
        }
        None => {
            builder = builder.no_proxy();
        }
    }

    builder
        .build()
        .map_err(|e| SourceError::network(format!("Failed to build HTTP client: {}", e)))
}
