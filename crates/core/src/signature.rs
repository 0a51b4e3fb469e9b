//! Error Signatures
//!
//! First-pass failure classes found in a console log.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureCategory {
    Timeout,
    AssertionFailure,
    ElementNotFound,
    ConnectionError,
    HttpError,
    MissingDependency,
    AuthenticationFailure,
    Infrastructure,
    StackTrace,
}

impl std::fmt::Display for SignatureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignatureCategory::Timeout => "timeout",
            SignatureCategory::AssertionFailure => "assertion_failure",
            SignatureCategory::ElementNotFound => "element_not_found",
            SignatureCategory::ConnectionError => "connection_error",
            SignatureCategory::HttpError => "http_error",
            SignatureCategory::MissingDependency => "missing_dependency",
            SignatureCategory::AuthenticationFailure => "authentication_failure",
            SignatureCategory::Infrastructure => "infrastructure",
            SignatureCategory::StackTrace => "stack_trace",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A file/line reported by a stack frame in the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// A matched failure pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSignature {
    /// Identifier of the rule that produced this signature.
    pub rule_id: String,
    pub category: SignatureCategory,
    pub severity: Severity,
    /// The matched log line, trimmed.
    pub message: String,
    /// 1-based line number of the first occurrence.
    pub log_line: usize,
    /// Selector, module name or request path captured by the rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Stack frames that followed the match.
    pub locations: Vec<SourceLocation>,
    pub occurrences: u32,
}

impl ErrorSignature {
    pub fn new(
        rule_id: impl Into<String>,
        category: SignatureCategory,
        severity: Severity,
        message: impl Into<String>,
        log_line: usize,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            category,
            severity,
            message: message.into(),
            log_line,
            subject: None,
            locations: Vec::new(),
            occurrences: 1,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.locations.push(location);
        self
    }
}
