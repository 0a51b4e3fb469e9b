//! Analysis Result Types
//!
//! What one triage run hands back to its caller. Everything here is plain
//! data; the phases that fill it in live under `services`.

use chrono::{DateTime, Utc};
use ci_triage_core::{
    BuildField, BuildRecord, BuildResult, Citation, CitationId, Claim, ClusterType, EvidenceId,
    InvestigationContext, LineRange, RepoRef, SourceReport,
};
use ci_triage_validation::DeliveryStatus;
use serde::{Deserialize, Serialize};

use crate::utils::error::TriageResult;

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// The system under test misbehaved.
    ProductBug,
    /// The automation code is wrong.
    AutomationBug,
    /// The automation lacks something it needs (setup, dependency, coverage).
    AutomationGap,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::ProductBug => write!(f, "PRODUCT_BUG"),
            Verdict::AutomationBug => write!(f, "AUTOMATION_BUG"),
            Verdict::AutomationGap => write!(f, "AUTOMATION_GAP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub verdict: Verdict,
    pub confidence: f64,
    pub supporting: Vec<EvidenceId>,
    pub contradicting: Vec<EvidenceId>,
    pub rationale: Vec<Claim>,
}

// ============================================================================
// Solution
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixTarget {
    pub file: String,
    pub lines: LineRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixAction {
    /// Swap `original` for `replacement` inside the target lines.
    Replace { original: String, replacement: String },
    /// Something a human has to look at; no mechanical edit is proposed.
    Review { guidance: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixProposal {
    pub target: FixTarget,
    pub action: FixAction,
    pub rationale: Claim,
    /// The target file and line are backed by repository evidence.
    pub feasible: bool,
}

/// Hand-off to the people who own the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Escalation {
    pub summary: Claim,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub fixes: Vec<FixProposal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
    /// Statements about the limits of the analysis. Not factual claims.
    pub notes: Vec<String>,
}

impl Solution {
    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.fixes
            .iter()
            .map(|f| &f.rationale)
            .chain(self.escalation.iter().map(|e| &e.summary))
    }
}

// ============================================================================
// Summaries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub job: String,
    pub number: u64,
    pub url: String,
    pub result: BuildResult,
    pub timestamp_ms: i64,
    pub duration_ms: u64,
    pub missing_fields: Vec<BuildField>,
}

impl From<&BuildRecord> for BuildSummary {
    fn from(record: &BuildRecord) -> Self {
        Self {
            job: record.job.clone(),
            number: record.number,
            url: record.url.clone(),
            result: record.result,
            timestamp_ms: record.timestamp_ms,
            duration_ms: record.duration_ms,
            missing_fields: record.missing_fields.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub evidence_quality: f64,
    pub sources: Vec<SourceReport>,
    pub evidence_count: usize,
    pub signature_count: usize,
    pub finding_count: usize,
    pub cluster: ClusterType,
    pub repo_ref: RepoRef,
}

impl From<&InvestigationContext> for ContextSummary {
    fn from(ctx: &InvestigationContext) -> Self {
        Self {
            evidence_quality: ctx.evidence_quality(),
            sources: ctx.source_reports().to_vec(),
            evidence_count: ctx.evidence().len(),
            signature_count: ctx.signatures().len(),
            finding_count: ctx.findings().len(),
            cluster: ctx.cluster().clone(),
            repo_ref: ctx.repo_ref().clone(),
        }
    }
}

/// A claim dropped at delivery because none of its citations held up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedClaim {
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimings {
    pub investigation_ms: u64,
    pub solution_ms: u64,
    pub validation_ms: u64,
}

impl PhaseTimings {
    pub fn total_ms(&self) -> u64 {
        self.investigation_ms + self.solution_ms + self.validation_ms
    }
}

// ============================================================================
// AnalysisResult
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub analysis_id: String,
    pub build: BuildSummary,
    pub context: ContextSummary,
    pub classification: Classification,
    pub solution: Solution,
    /// Every citation issued, with its final verification state.
    pub citations: Vec<Citation>,
    pub removed_claims: Vec<RemovedClaim>,
    pub warnings: Vec<String>,
    pub delivery_status: DeliveryStatus,
    pub timings: PhaseTimings,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn to_json(&self) -> TriageResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every claim still present in the result.
    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.classification
            .rationale
            .iter()
            .chain(self.solution.claims())
    }

    pub fn citation(&self, id: CitationId) -> Option<&Citation> {
        self.citations.iter().find(|c| c.id == id)
    }

    /// Whether `claim` is backed by at least one verified, kept citation.
    pub fn is_backed(&self, claim: &Claim) -> bool {
        claim
            .citations
            .iter()
            .filter_map(|id| self.citation(*id))
            .any(|c| c.is_verified() && !c.removed)
    }
}
