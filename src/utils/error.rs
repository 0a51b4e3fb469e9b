//! Error Handling
//!
//! Errors returned to callers of the analyzer. Source-local failures never
//! surface here: they become low-confidence evidence. Verification failures
//! never surface here either: they live in the delivery status.

use ci_triage_core::CoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Analysis-level error type
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The build reference could not be parsed
    #[error("Invalid build reference: {0}")]
    InvalidBuildReference(String),

    /// The CI server does not know the build, or could not be reached
    #[error("Build not found: {0}")]
    BuildNotFound(String),

    /// Branch, commit or repository URL could not be determined
    #[error("Repository reference incomplete: {0}")]
    RepoRefIncomplete(String),

    /// A mandatory evidence source failed after retries
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The caller cancelled the analysis
    #[error("Analysis cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors from the workspace crates
    #[error(transparent)]
    Core(CoreError),
}

/// Result type alias for analysis errors
pub type TriageResult<T> = Result<T, AnalysisError>;

/// Coarse error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad or unresolvable input; fatal and returned immediately
    InputError,
    /// An evidence source was unreachable after retries
    SourceUnavailableError,
    /// A claim could not be re-confirmed; reported through delivery status
    VerificationFailure,
    Cancelled,
    Internal,
}

impl AnalysisError {
    /// Create an invalid build reference error
    pub fn invalid_build_reference(msg: impl Into<String>) -> Self {
        Self::InvalidBuildReference(msg.into())
    }

    /// Create a build not found error
    pub fn build_not_found(msg: impl Into<String>) -> Self {
        Self::BuildNotFound(msg.into())
    }

    /// Create a repository reference error
    pub fn repo_ref_incomplete(msg: impl Into<String>) -> Self {
        Self::RepoRefIncomplete(msg.into())
    }

    /// Create a source unavailable error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Where this error sits in the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBuildReference(_)
            | Self::BuildNotFound(_)
            | Self::RepoRefIncomplete(_)
            | Self::Config(_) => ErrorKind::InputError,
            Self::SourceUnavailable(_) => ErrorKind::SourceUnavailableError,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) | Self::Serialization(_) | Self::Core(_) => ErrorKind::Internal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<CoreError> for AnalysisError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Cancelled(_) => Self::Cancelled,
            CoreError::Config(msg) => Self::Config(msg),
            other => Self::Core(other),
        }
    }
}

impl From<AnalysisError> for String {
    fn from(err: AnalysisError) -> String {
        err.to_string()
    }
}
