//! Investigation Context
//!
//! The single hand-off object between the two analysis phases.
//!
//! 1. Each evidence source produces one `*Part` (its own evidence list plus
//!    derived summaries) without touching the others.
//! 2. `ContextBuilder` collects the three parts and `freeze` turns them into
//!    an `InvestigationContext`; it refuses to freeze while any part is
//!    missing.
//! 3. `InvestigationContext` has no setters. The solution phase only reads it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::build::{BuildRecord, ClusterType};
use crate::config::QualityWeights;
use crate::error::{CoreError, CoreResult};
use crate::evidence::{Evidence, EvidenceId, EvidenceKind, EvidenceReference};
use crate::findings::{CodeFinding, RepoRef};
use crate::probe::{ConnectivityResult, FeatureResult};
use crate::signature::ErrorSignature;

// ============================================================================
// Source reports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Available,
    /// Answered, but some of what was asked for is missing.
    Partial,
    /// Exhausted its retries or timed out.
    Unavailable,
    /// Nothing to ask: e.g. the build declares no environment endpoint.
    NotApplicable,
}

/// How one evidence source fared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub kind: EvidenceKind,
    pub status: SourceStatus,
    /// Fraction of the planned observations that were made, in `[0, 1]`.
    pub coverage: f64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    /// `Available` at full coverage, `Partial` below it.
    pub fn completed(kind: EvidenceKind, coverage: f64, elapsed: Duration) -> Self {
        let coverage = clamp_unit(coverage);
        let status = if coverage >= 1.0 {
            SourceStatus::Available
        } else {
            SourceStatus::Partial
        };
        Self {
            kind,
            status,
            coverage,
            duration_ms: elapsed.as_millis() as u64,
            error: None,
        }
    }

    pub fn unavailable(kind: EvidenceKind, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            kind,
            status: SourceStatus::Unavailable,
            coverage: 0.0,
            duration_ms: elapsed.as_millis() as u64,
            error: Some(error.into()),
        }
    }

    pub fn not_applicable(kind: EvidenceKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            status: SourceStatus::NotApplicable,
            coverage: 0.0,
            duration_ms: 0,
            error: Some(reason.into()),
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self.status, SourceStatus::Available | SourceStatus::Partial)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ============================================================================
// Per-source parts
// ============================================================================

/// Output of the build extraction task.
#[derive(Debug, Clone)]
pub struct JenkinsPart {
    pub record: BuildRecord,
    pub signatures: Vec<ErrorSignature>,
    pub cluster: ClusterType,
    pub report: SourceReport,
    pub evidence: Vec<Evidence>,
}

/// Output of the environment probe task.
#[derive(Debug, Clone)]
pub struct EnvironmentPart {
    pub connectivity: Option<ConnectivityResult>,
    pub features: Vec<FeatureResult>,
    pub report: SourceReport,
    pub evidence: Vec<Evidence>,
}

/// Output of the repository probe task.
#[derive(Debug, Clone)]
pub struct RepositoryPart {
    pub repo_ref: RepoRef,
    pub findings: Vec<CodeFinding>,
    pub report: SourceReport,
    pub evidence: Vec<Evidence>,
}

// ============================================================================
// ContextBuilder
// ============================================================================

/// Collects the three source parts. The only way to obtain an
/// `InvestigationContext`.
#[derive(Debug)]
pub struct ContextBuilder {
    analysis_id: String,
    jenkins: Option<JenkinsPart>,
    environment: Option<EnvironmentPart>,
    repository: Option<RepositoryPart>,
}

impl ContextBuilder {
    pub fn new(analysis_id: impl Into<String>) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            jenkins: None,
            environment: None,
            repository: None,
        }
    }

    pub fn jenkins(mut self, part: JenkinsPart) -> Self {
        self.jenkins = Some(part);
        self
    }

    pub fn environment(mut self, part: EnvironmentPart) -> Self {
        self.environment = Some(part);
        self
    }

    pub fn repository(mut self, part: RepositoryPart) -> Self {
        self.repository = Some(part);
        self
    }

    /// Merge the parts and compute `evidence_quality`.
    ///
    /// Fails with `CoreError::Internal` if any part has not been delivered.
    pub fn freeze(self, weights: &QualityWeights) -> CoreResult<InvestigationContext> {
        let ContextBuilder {
            analysis_id,
            jenkins,
            environment,
            repository,
        } = self;
        let missing = |name: &str| {
            CoreError::internal(format!(
                "Cannot freeze context {}: {} source has not reported",
                analysis_id, name
            ))
        };
        let jenkins = jenkins.ok_or_else(|| missing("jenkins"))?;
        let environment = environment.ok_or_else(|| missing("environment"))?;
        let repository = repository.ok_or_else(|| missing("repository"))?;

        for (expected, part_kind, evidence) in [
            (EvidenceKind::Jenkins, jenkins.report.kind, &jenkins.evidence),
            (EvidenceKind::Environment, environment.report.kind, &environment.evidence),
            (EvidenceKind::Repository, repository.report.kind, &repository.evidence),
        ] {
            if part_kind != expected || evidence.iter().any(|e| e.kind() != expected) {
                return Err(CoreError::internal(format!(
                    "Evidence of the wrong kind delivered as {} evidence",
                    expected
                )));
            }
        }

        let reports = vec![
            jenkins.report.clone(),
            environment.report.clone(),
            repository.report.clone(),
        ];
        let mut evidence = Vec::with_capacity(
            jenkins.evidence.len() + environment.evidence.len() + repository.evidence.len(),
        );
        evidence.extend(jenkins.evidence);
        evidence.extend(environment.evidence);
        evidence.extend(repository.evidence);

        let evidence_quality = compute_quality(&reports, &evidence, weights);

        Ok(InvestigationContext {
            analysis_id,
            build: jenkins.record,
            evidence,
            reports,
            signatures: jenkins.signatures,
            cluster: jenkins.cluster,
            connectivity: environment.connectivity,
            features: environment.features,
            repo_ref: repository.repo_ref,
            findings: repository.findings,
            evidence_quality,
            frozen_at: Utc::now(),
        })
    }
}

/// `0` when the repository source is unusable, otherwise
/// `Σ w·conf·coverage / Σ w` over the three sources.
fn compute_quality(reports: &[SourceReport], evidence: &[Evidence], weights: &QualityWeights) -> f64 {
    let repository_usable = reports
        .iter()
        .any(|r| r.kind == EvidenceKind::Repository && r.is_usable());
    if !repository_usable || weights.total() <= 0.0 {
        return 0.0;
    }

    let weighted: f64 = reports
        .iter()
        .map(|report| {
            if !report.is_usable() {
                return 0.0;
            }
            let confidences: Vec<f64> = evidence
                .iter()
                .filter(|e| e.kind() == report.kind)
                .map(|e| e.confidence())
                .collect();
            let mean = if confidences.is_empty() {
                0.0
            } else {
                confidences.iter().sum::<f64>() / confidences.len() as f64
            };
            weights.weight(report.kind) * mean * report.coverage
        })
        .sum();

    clamp_unit(weighted / weights.total())
}

// ============================================================================
// InvestigationContext
// ============================================================================

/// Frozen result of the investigation phase.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationContext {
    analysis_id: String,
    build: BuildRecord,
    evidence: Vec<Evidence>,
    reports: Vec<SourceReport>,
    signatures: Vec<ErrorSignature>,
    cluster: ClusterType,
    connectivity: Option<ConnectivityResult>,
    features: Vec<FeatureResult>,
    repo_ref: RepoRef,
    findings: Vec<CodeFinding>,
    evidence_quality: f64,
    frozen_at: DateTime<Utc>,
}

impl InvestigationContext {
    pub fn analysis_id(&self) -> &str {
        &self.analysis_id
    }

    pub fn build(&self) -> &BuildRecord {
        &self.build
    }

    /// All evidence, ordered jenkins → environment → repository.
    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn evidence_of(&self, kind: EvidenceKind) -> impl Iterator<Item = &Evidence> {
        self.evidence.iter().filter(move |e| e.kind() == kind)
    }

    pub fn evidence_by_id(&self, id: &EvidenceId) -> Option<&Evidence> {
        self.evidence.iter().find(|e| e.id() == id)
    }

    pub fn source_reports(&self) -> &[SourceReport] {
        &self.reports
    }

    pub fn source_report(&self, kind: EvidenceKind) -> Option<&SourceReport> {
        self.reports.iter().find(|r| r.kind == kind)
    }

    pub fn is_usable(&self, kind: EvidenceKind) -> bool {
        self.source_report(kind).is_some_and(|r| r.is_usable())
    }

    pub fn signatures(&self) -> &[ErrorSignature] {
        &self.signatures
    }

    pub fn cluster(&self) -> &ClusterType {
        &self.cluster
    }

    pub fn connectivity(&self) -> Option<&ConnectivityResult> {
        self.connectivity.as_ref()
    }

    pub fn feature_results(&self) -> &[FeatureResult] {
        &self.features
    }

    pub fn repo_ref(&self) -> &RepoRef {
        &self.repo_ref
    }

    pub fn findings(&self) -> &[CodeFinding] {
        &self.findings
    }

    pub fn evidence_quality(&self) -> f64 {
        self.evidence_quality
    }

    pub fn frozen_at(&self) -> DateTime<Utc> {
        self.frozen_at
    }

    /// Whether repository evidence places `line` of `file` in the checkout.
    pub fn repository_covers(&self, file: &str, line: u32) -> bool {
        self.evidence_of(EvidenceKind::Repository)
            .any(|e| match e.reference() {
                EvidenceReference::Source { file: f, lines, .. } => {
                    f == file && lines.start <= line && line <= lines.end
                }
                _ => false,
            })
    }

    /// Evidence whose reference renders to `reference`.
    pub fn evidence_for_reference(&self, reference: &EvidenceReference) -> Option<&Evidence> {
        self.evidence.iter().find(|e| e.reference() == reference)
    }
}
