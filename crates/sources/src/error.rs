//! Source Errors
//!
//! Failures talking to the CI server or the environment under test.

use ci_triage_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

impl SourceError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Network, timeout, authentication and server-side failures may go
    /// away on their own; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout(_) | Self::Authentication { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::NotFound(_) | Self::InvalidResponse(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            parse_http_error(status.as_u16(), &err.to_string(), "http")
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<SourceError> for CoreError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(msg) => CoreError::NotFound(msg),
            SourceError::Timeout(msg) => CoreError::Timeout(msg),
            SourceError::InvalidResponse(msg) => CoreError::Parse(msg),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

/// Map a non-success HTTP status to a `SourceError`.
pub fn parse_http_error(status: u16, body: &str, source: &str) -> SourceError {
    let body = truncate(body, 300);
    match status {
        401 => SourceError::Authentication {
            message: format!("{}: invalid credentials", source),
        },
        403 => SourceError::Authentication {
            message: format!("{}: access denied", source),
        },
        404 => SourceError::NotFound(format!("{}: {}", source, body)),
        _ => SourceError::Http {
            status,
            message: format!("{}: {}", source, body),
        },
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
