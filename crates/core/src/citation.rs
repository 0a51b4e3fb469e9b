//! Citations
//!
//! A citation binds one claim sentence to the live source that can confirm
//! it. Verification is a small state machine:
//!
//! ```text
//!   UNVERIFIED ──verify──▶ VERIFIED
//!        │
//!        └─────verify──▶ FAILED ──(auto-correct)──▶ VERIFIED (corrected_from set)
//!                           │
//!                           └──(remove claim)──▶ FAILED + removed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::build::BuildResult;
use crate::evidence::{EvidenceId, EvidenceKind, LineRange};

/// Creation-order identifier. Verification aggregates citations in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CitationId(pub u32);

impl std::fmt::Display for CitationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationType {
    Jenkins,
    Environment,
    Repository,
    Fix,
}

impl From<EvidenceKind> for CitationType {
    fn from(kind: EvidenceKind) -> Self {
        match kind {
            EvidenceKind::Jenkins => CitationType::Jenkins,
            EvidenceKind::Environment => CitationType::Environment,
            EvidenceKind::Repository => CitationType::Repository,
        }
    }
}

impl std::fmt::Display for CitationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CitationType::Jenkins => write!(f, "jenkins"),
            CitationType::Environment => write!(f, "environment"),
            CitationType::Repository => write!(f, "repository"),
            CitationType::Fix => write!(f, "fix"),
        }
    }
}

/// What a citation points at, in enough detail to re-check it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CitationReference {
    #[serde(rename_all = "camelCase")]
    Build {
        job: String,
        number: u64,
        result: BuildResult,
        timestamp_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    Endpoint {
        url: String,
        status: Option<u16>,
        captured_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Source {
        branch: String,
        file: String,
        lines: LineRange,
        commit: String,
        /// Text that must be present, byte for byte, in `lines`.
        excerpt: String,
    },
    #[serde(rename_all = "camelCase")]
    Fix {
        file: String,
        lines: LineRange,
        original: String,
        replacement: String,
    },
}

impl CitationReference {
    pub fn citation_type(&self) -> CitationType {
        match self {
            CitationReference::Build { .. } => CitationType::Jenkins,
            CitationReference::Endpoint { .. } => CitationType::Environment,
            CitationReference::Source { .. } => CitationType::Repository,
            CitationReference::Fix { .. } => CitationType::Fix,
        }
    }
}

impl std::fmt::Display for CitationReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CitationReference::Build {
                job,
                number,
                result,
                timestamp_ms,
            } => write!(f, "{}:{}:{}:{}", job, number, result, timestamp_ms),
            CitationReference::Endpoint {
                url,
                status,
                captured_at,
            } => {
                let status = status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unreachable".to_string());
                write!(f, "{}:{}:{}", url, status, captured_at.to_rfc3339())
            }
            CitationReference::Source {
                branch,
                file,
                lines,
                commit,
                ..
            } => write!(f, "{}:{}:{}:{}", branch, file, lines, commit),
            CitationReference::Fix { file, lines, .. } => write!(f, "{}:{}", file, lines),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationState {
    Unverified,
    Verified,
    Failed,
}

/// How much the verdict depends on a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// The classification rests on this claim; failure blocks unless corrected or removed.
    ClassificationDetermining,
    /// Illustrative detail; failure only degrades delivery.
    Supporting,
}

/// A claim-to-evidence binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub id: CitationId,
    pub claim_text: String,
    pub citation_type: CitationType,
    pub reference: CitationReference,
    pub criticality: Criticality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_id: Option<EvidenceId>,
    pub verification_state: VerificationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_from: Option<CitationReference>,
    #[serde(default)]
    pub removed: bool,
}

impl Citation {
    pub fn new(
        id: CitationId,
        claim_text: impl Into<String>,
        reference: CitationReference,
        criticality: Criticality,
    ) -> Self {
        Self {
            id,
            claim_text: claim_text.into(),
            citation_type: reference.citation_type(),
            reference,
            criticality,
            evidence_id: None,
            verification_state: VerificationState::Unverified,
            note: None,
            corrected_from: None,
            removed: false,
        }
    }

    pub fn with_evidence(mut self, evidence_id: EvidenceId) -> Self {
        self.evidence_id = Some(evidence_id);
        self
    }

    pub fn is_critical(&self) -> bool {
        self.criticality == Criticality::ClassificationDetermining
    }

    pub fn is_verified(&self) -> bool {
        self.verification_state == VerificationState::Verified && !self.removed
    }

    /// Copy of this citation marked verified.
    pub fn verified(&self) -> Self {
        let mut next = self.clone();
        next.verification_state = VerificationState::Verified;
        next.note = None;
        next
    }

    /// Copy of this citation marked failed with a reason.
    pub fn failed(&self, reason: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.verification_state = VerificationState::Failed;
        next.note = Some(reason.into());
        next
    }
}

/// One sentence of a report, bound to the citations that support it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub citations: Vec<CitationId>,
}

impl Claim {
    pub fn new(text: impl Into<String>, citations: Vec<CitationId>) -> Self {
        Self {
            text: text.into(),
            citations,
        }
    }
}
