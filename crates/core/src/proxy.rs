//! Proxy Configuration Types
//!
//! Outbound proxy settings shared by the Jenkins client and the environment
//! probe. The HTTP client factory that consumes them lives in
//! `ci-triage-sources`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Proxy protocol type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

impl ProxyProtocol {
    /// Return the URL scheme string for this protocol.
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks5 => "socks5",
        }
    }

    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "socks5" | "socks5h" => Some(Self::Socks5),
            _ => None,
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Never written back out when a config is serialized.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Parse `scheme://[user[:password]@]host:port`.
    pub fn from_url(raw: &str) -> CoreResult<Self> {
        let invalid = || CoreError::config(format!("Invalid proxy URL '{}'", raw));

        let (scheme, rest) = raw.trim().split_once("://").ok_or_else(invalid)?;
        let protocol = ProxyProtocol::from_scheme(scheme).ok_or_else(invalid)?;
        let rest = rest.trim_end_matches('/');

        let (credentials, endpoint) = match rest.rsplit_once('@') {
            Some((creds, endpoint)) => (Some(creds), endpoint),
            None => (None, rest),
        };
        let (host, port) = endpoint.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }

        let (username, password) = match credentials {
            Some(c) => match c.split_once(':') {
                Some((u, p)) => (Some(u.to_string()), Some(p.to_string())),
                None => (Some(c.to_string()), None),
            },
            None => (None, None),
        };

        Ok(Self {
            protocol,
            host: host.to_string(),
            port,
            username,
            password,
        })
    }

    /// Build the proxy URL string (without auth).
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }

    /// Build the proxy URL string with embedded credentials (if any).
    pub fn url_with_auth(&self) -> String {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                format!("{}://{}:{}@{}:{}", self.protocol.scheme(), u, p, self.host, self.port)
            }
            (Some(u), None) => {
                format!("{}://{}@{}:{}", self.protocol.scheme(), u, self.host, self.port)
            }
            _ => self.url(),
        }
    }
}
