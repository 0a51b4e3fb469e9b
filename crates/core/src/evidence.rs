//! Evidence
//!
//! A typed, append-only unit of observation from one source. Evidence is
//! constructed once by the probe that observed it and then only aggregated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::build::BuildResult;
use crate::error::{CoreError, CoreResult};

// ============================================================================
// LineRange
// ============================================================================

/// Inclusive, 1-based line range inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn single(line: u32) -> Self {
        Self::new(line, line)
    }

    /// Parse `12` or `12-14`.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let parse_line = |s: &str| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| CoreError::parse(format!("Invalid line number '{}'", s)))
        };
        match raw.split_once('-') {
            Some((a, b)) => Ok(Self::new(parse_line(a)?, parse_line(b)?)),
            None => Ok(Self::single(parse_line(raw)?)),
        }
    }

    /// Number of covered lines; 0 for an inverted range.
    pub fn len(&self) -> u32 {
        if self.start > self.end {
            return 0;
        }
        self.end - self.start + 1
    }

    /// Whether the range is ordered, starts at line 1 or later and ends
    /// within `line_count`.
    pub fn fits(&self, line_count: usize) -> bool {
        self.start >= 1 && self.start <= self.end && (self.end as usize) <= line_count
    }

    /// Slice the covered lines out of `content`, joined with `\n`.
    pub fn extract<'a>(&self, content: &'a str) -> Option<String> {
        let lines: Vec<&'a str> = content.lines().collect();
        if !self.fits(lines.len()) {
            return None;
        }
        lines
            .get((self.start - 1) as usize..self.end as usize)
            .map(|covered| covered.join("\n"))
    }
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

// ============================================================================
// Kinds & identifiers
// ============================================================================

/// Which live system an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Jenkins,
    Environment,
    Repository,
}

impl EvidenceKind {
    pub const ALL: [EvidenceKind; 3] = [
        EvidenceKind::Jenkins,
        EvidenceKind::Environment,
        EvidenceKind::Repository,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Jenkins => "jenkins",
            EvidenceKind::Environment => "environment",
            EvidenceKind::Repository => "repository",
        }
    }
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of an evidence item within one analysis: `<kind>-<seq>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(String);

impl EvidenceId {
    pub fn new(kind: EvidenceKind, seq: usize) -> Self {
        Self(format!("{}-{}", kind, seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// EvidenceReference
// ============================================================================

/// Where an observation can be re-checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EvidenceReference {
    /// `job:build:result:timestamp`
    #[serde(rename_all = "camelCase")]
    Build {
        job: String,
        number: u64,
        result: BuildResult,
        timestamp_ms: i64,
    },
    /// `url:status:timestamp`
    #[serde(rename_all = "camelCase")]
    Endpoint {
        url: String,
        status: Option<u16>,
        captured_at: DateTime<Utc>,
    },
    /// `branch:file:lines:commit`
    #[serde(rename_all = "camelCase")]
    Source {
        branch: String,
        file: String,
        lines: LineRange,
        commit: String,
    },
}

impl std::fmt::Display for EvidenceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceReference::Build {
                job,
                number,
                result,
                timestamp_ms,
            } => write!(f, "{}:{}:{}:{}", job, number, result, timestamp_ms),
            EvidenceReference::Endpoint {
                url,
                status,
                captured_at,
            } => {
                let status = status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unreachable".to_string());
                write!(f, "{}:{}:{}", url, status, captured_at.to_rfc3339())
            }
            EvidenceReference::Source {
                branch,
                file,
                lines,
                commit,
            } => write!(f, "{}:{}:{}:{}", branch, file, lines, commit),
        }
    }
}

// ============================================================================
// Evidence
// ============================================================================

/// One observed fact from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    id: EvidenceId,
    kind: EvidenceKind,
    reference: EvidenceReference,
    summary: String,
    payload: serde_json::Value,
    confidence: f64,
    captured_at: DateTime<Utc>,
}

impl Evidence {
    /// Create an evidence item. Confidence is clamped to `[0, 1]`.
    pub fn new(
        id: EvidenceId,
        kind: EvidenceKind,
        reference: EvidenceReference,
        summary: impl Into<String>,
        payload: serde_json::Value,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            id,
            kind,
            reference,
            summary: summary.into(),
            payload,
            confidence,
            captured_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &EvidenceId {
        &self.id
    }

    pub fn kind(&self) -> EvidenceKind {
        self.kind
    }

    pub fn reference(&self) -> &EvidenceReference {
        &self.reference
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Sequential id allocator owned by a single evidence source.
#[derive(Debug)]
pub struct EvidenceLog {
    kind: EvidenceKind,
    items: Vec<Evidence>,
}

impl EvidenceLog {
    pub fn new(kind: EvidenceKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
        }
    }

    /// Append a new observation and return its id.
    pub fn record(
        &mut self,
        reference: EvidenceReference,
        summary: impl Into<String>,
        payload: serde_json::Value,
        confidence: f64,
    ) -> EvidenceId {
        let id = EvidenceId::new(self.kind, self.items.len());
        self.items.push(Evidence::new(
            id.clone(),
            self.kind,
            reference,
            summary,
            payload,
            confidence,
        ));
        id
    }

    pub fn kind(&self) -> EvidenceKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<Evidence> {
        self.items
    }
}
