//! Analyzer
//!
//! Drives one triage run through its phases:
//!
//! ```text
//!   Investigating ──▶ Solving ──▶ Validating ──▶ Done
//! ```
//!
//! Investigation gathers and freezes evidence, solving classifies and cites,
//! validation re-checks every citation against the live sources. Claims left
//! without a verified citation are pruned before the result is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ci_triage_core::{
    AnalysisConfig, Citation, CitationId, CitationReference, Claim, CoreError, RepositorySnapshot,
    SourceStatus,
};
use ci_triage_repository::{GitFetcher, GitOps, RepositoryProbe, SourceFetcher};
use ci_triage_sources::{BuildServer, EnvironmentProbe, HttpEnvironmentProbe, JenkinsClient};
use ci_triage_validation::{DeliveryStatus, ValidationEngine, ValidationReport};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::models::{
    AnalysisResult, BuildSummary, ContextSummary, FixProposal, PhaseTimings, RemovedClaim, Solution,
};
use crate::services::extractor::{parse_build_reference, Extractor, RuleTable, SignatureMatcher};
use crate::services::investigation::{Investigation, Investigator};
use crate::services::solution::{
    assess_feasibility, solve, ClassificationStrategy, EvidenceWeightedClassifier, Proposal,
};
use crate::utils::error::{AnalysisError, TriageResult};

/// Below this confidence a result is delivered with a warning.
const LOW_CONFIDENCE: f64 = 0.5;

// ============================================================================
// Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Investigating,
    Solving,
    Validating,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Investigating => write!(f, "investigating"),
            Phase::Solving => write!(f, "solving"),
            Phase::Validating => write!(f, "validating"),
            Phase::Done => write!(f, "done"),
        }
    }
}

impl Phase {
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Investigating => Some(Phase::Solving),
            Phase::Solving => Some(Phase::Validating),
            Phase::Validating => Some(Phase::Done),
            Phase::Done => None,
        }
    }
}

/// Current phase of one run and the time spent in each finished phase.
#[derive(Debug)]
pub struct PhaseTracker {
    phase: Phase,
    entered: Instant,
    timings: PhaseTimings,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phase: Phase::Investigating,
            entered: Instant::now(),
            timings: PhaseTimings::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to `to`, which must be the successor of the current phase.
    pub fn advance(&mut self, to: Phase) -> TriageResult<()> {
        if self.phase.next() != Some(to) {
            return Err(CoreError::internal(format!(
                "illegal phase transition {} -> {}",
                self.phase, to
            ))
            .into());
        }

        let elapsed = millis(self.entered.elapsed());
        match self.phase {
            Phase::Investigating => self.timings.investigation_ms = elapsed,
            Phase::Solving => self.timings.solution_ms = elapsed,
            Phase::Validating => self.timings.validation_ms = elapsed,
            Phase::Done => {}
        }
        tracing::debug!("phase {} -> {} after {}ms", self.phase, to, elapsed);
        self.phase = to;
        self.entered = Instant::now();
        Ok(())
    }

    pub fn timings(&self) -> PhaseTimings {
        self.timings
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Analyzer
// ============================================================================

/// Entry point: one configured analyzer runs any number of analyses.
#[derive(Clone)]
pub struct Analyzer {
    config: AnalysisConfig,
    server: Arc<dyn BuildServer>,
    probe: Arc<dyn EnvironmentProbe>,
    repository: RepositoryProbe,
    matcher: Arc<dyn SignatureMatcher>,
    strategy: Arc<dyn ClassificationStrategy>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("jenkins", &self.server.base_url())
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl Analyzer {
    /// Analyzer backed by the Jenkins REST API, HTTP probes and the git CLI.
    pub fn from_config(config: AnalysisConfig) -> TriageResult<Self> {
        config.validate()?;
        let proxy = config.proxy.as_ref();
        let server = JenkinsClient::new(&config.jenkins, proxy)
            .map_err(|e| AnalysisError::config(format!("jenkins client: {}", e)))?;
        let probe = HttpEnvironmentProbe::new(&config.environment, config.retry.clone(), proxy)
            .map_err(|e| AnalysisError::config(format!("environment probe: {}", e)))?;
        let git = GitOps::new(Duration::from_secs(config.repository.clone_timeout_secs));

        Self::new(
            config,
            Arc::new(server),
            Arc::new(probe),
            Arc::new(GitFetcher::new(git)),
        )
    }

    /// Analyzer over caller-supplied collaborators.
    pub fn new(
        config: AnalysisConfig,
        server: Arc<dyn BuildServer>,
        probe: Arc<dyn EnvironmentProbe>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> TriageResult<Self> {
        config.validate()?;
        let matcher = RuleTable::from_config(&config.extractor)?;
        let repository = RepositoryProbe::with_fetcher(&config.repository, fetcher);
        Ok(Self {
            config,
            server,
            probe,
            repository,
            matcher: Arc::new(matcher),
            strategy: Arc::new(EvidenceWeightedClassifier),
        })
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ClassificationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn SignatureMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn investigator(&self) -> Investigator {
        let extractor = Extractor::new(self.server.clone(), self.config.retry.clone(), self.matcher.clone());
        Investigator::new(
            extractor,
            self.probe.clone(),
            self.repository.clone(),
            self.config.environment.clone(),
            self.config.quality_weights.clone(),
        )
    }

    /// Analyze a build given as a URL or `job#number`.
    pub async fn analyze(&self, build: &str) -> TriageResult<AnalysisResult> {
        self.analyze_with_cancellation(build, CancellationToken::new()).await
    }

    pub async fn analyze_with_cancellation(
        &self,
        build: &str,
        cancel: CancellationToken,
    ) -> TriageResult<AnalysisResult> {
        let build = parse_build_reference(build)?;
        let analysis_id = uuid::Uuid::new_v4().to_string();
        let mut tracker = PhaseTracker::new();
        tracing::info!("analysis {} of {} started", analysis_id, build);

        let Investigation { context, checkout } = self
            .investigator()
            .investigate(&analysis_id, &build, &cancel)
            .await?;
        tracing::info!(
            "analysis {}: context frozen with {} evidence items, quality {:.2}",
            analysis_id,
            context.evidence().len(),
            context.evidence_quality()
        );

        tracker.advance(Phase::Solving)?;
        if cancel.is_cancelled() {
            release(checkout);
            return Err(AnalysisError::Cancelled);
        }
        let mut proposal = solve(&context, self.strategy.as_ref());
        assess_feasibility(
            &mut proposal.solution,
            &proposal.citations,
            checkout.as_deref().map(|c| c as &dyn RepositorySnapshot),
        );

        tracker.advance(Phase::Validating)?;
        let snapshot = checkout.clone().map(|c| c as Arc<dyn RepositorySnapshot>);
        let engine = ValidationEngine::new(
            context.clone(),
            self.server.clone(),
            self.probe.clone(),
            snapshot,
            self.config.validation.clone(),
        );
        let citations = proposal.citations.clone();
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            report = engine.verify_all(citations) => Some(report),
        };
        drop(engine);
        release(checkout);
        let Some(report) = report else {
            tracing::info!("analysis {} cancelled during validation", analysis_id);
            return Err(AnalysisError::Cancelled);
        };
        tracing::info!(
            "analysis {}: {} of {} citations verified, delivery {}",
            analysis_id,
            report.verified_count(),
            report.citations.len(),
            report.delivery_status
        );

        tracker.advance(Phase::Done)?;
        Ok(assemble(analysis_id, &context, proposal, report, tracker.timings()))
    }
}

/// Delete the checkout once nothing reads from it any more.
fn release(checkout: Option<Arc<ci_triage_repository::LocalCheckout>>) {
    let Some(checkout) = checkout else {
        return;
    };
    match Arc::try_unwrap(checkout) {
        Ok(checkout) => {
            if let Err(e) = checkout.release() {
                tracing::warn!("failed to remove checkout: {}", e);
            }
        }
        // the last holder's drop removes the directory
        Err(shared) => drop(shared),
    }
}

// ============================================================================
// Result assembly
// ============================================================================

fn assemble(
    analysis_id: String,
    context: &ci_triage_core::InvestigationContext,
    proposal: Proposal,
    report: ValidationReport,
    timings: PhaseTimings,
) -> AnalysisResult {
    let Proposal {
        classification,
        solution,
        ..
    } = proposal;
    let ratio = report.critical_verified_ratio();
    let ValidationReport {
        citations,
        mut delivery_status,
        mut warnings,
    } = report;

    let mut removed_claims = Vec::new();
    let mut classification = classification;
    classification.rationale = prune(classification.rationale, &citations, &mut removed_claims);
    let solution = prune_solution(solution, &citations, &mut removed_claims);

    classification.confidence = (classification.confidence * ratio).clamp(0.0, 1.0);

    for report in context.source_reports() {
        if report.status == SourceStatus::Unavailable {
            warnings.push(format!("{} evidence unavailable", report.kind.as_str()));
            delivery_status = delivery_status.downgrade(DeliveryStatus::ApprovedWithWarnings);
        }
    }
    if classification.confidence < LOW_CONFIDENCE {
        warnings.push(format!(
            "low confidence ({:.2}) in {}",
            classification.confidence, classification.verdict
        ));
        delivery_status = delivery_status.downgrade(DeliveryStatus::ApprovedWithWarnings);
    }
    if !removed_claims.is_empty() {
        delivery_status = delivery_status.downgrade(DeliveryStatus::ApprovedWithWarnings);
    }

    AnalysisResult {
        analysis_id,
        build: BuildSummary::from(context.build()),
        context: ContextSummary::from(context),
        classification,
        solution,
        citations,
        removed_claims,
        warnings,
        delivery_status,
        timings,
        completed_at: Utc::now(),
    }
}

/// `None` when at least one of the claim's citations verified, otherwise
/// the reason the first one failed.
fn unbacked_reason(claim: &Claim, citations: &[Citation]) -> Option<String> {
    let cited: Vec<&Citation> = claim
        .citations
        .iter()
        .filter_map(|id| find(citations, *id))
        .collect();
    if cited.iter().any(|c| c.is_verified()) {
        return None;
    }
    let reason = cited
        .iter()
        .find_map(|c| c.note.clone())
        .unwrap_or_else(|| "no citation could be verified".to_string());
    Some(reason)
}

/// Reason to drop a fix: its claim is unbacked, or the edit it cites did
/// not verify.
fn unbacked_fix(fix: &FixProposal, citations: &[Citation]) -> Option<String> {
    let failed_edit = fix
        .rationale
        .citations
        .iter()
        .filter_map(|id| find(citations, *id))
        .find(|c| matches!(c.reference, CitationReference::Fix { .. }) && !c.is_verified());
    match failed_edit {
        Some(edit) => Some(
            edit.note
                .clone()
                .unwrap_or_else(|| "the proposed edit could not be verified".to_string()),
        ),
        None => unbacked_reason(&fix.rationale, citations),
    }
}

fn find(citations: &[Citation], id: CitationId) -> Option<&Citation> {
    citations.iter().find(|c| c.id == id)
}

fn prune(claims: Vec<Claim>, citations: &[Citation], removed: &mut Vec<RemovedClaim>) -> Vec<Claim> {
    claims
        .into_iter()
        .filter(|claim| match unbacked_reason(claim, citations) {
            None => true,
            Some(reason) => {
                tracing::debug!("pruning claim '{}': {}", claim.text, reason);
                removed.push(RemovedClaim {
                    text: claim.text.clone(),
                    reason,
                });
                false
            }
        })
        .collect()
}

fn prune_solution(solution: Solution, citations: &[Citation], removed: &mut Vec<RemovedClaim>) -> Solution {
    let Solution {
        fixes,
        escalation,
        notes,
    } = solution;

    let fixes = fixes
        .into_iter()
        .filter(|fix| match unbacked_fix(fix, citations) {
            None => true,
            Some(reason) => {
                removed.push(RemovedClaim {
                    text: fix.rationale.text.clone(),
                    reason,
                });
                false
            }
        })
        .collect();

    let escalation = escalation.and_then(|e| match unbacked_reason(&e.summary, citations) {
        None => Some(e),
        Some(reason) => {
            removed.push(RemovedClaim {
                text: e.summary.text.clone(),
                reason,
            });
            None
        }
    });

    Solution {
        fixes,
        escalation,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use ci_triage_core::{Criticality, LineRange};

    use super::*;
    use crate::models::{FixAction, FixTarget};

    fn citation(id: u32, critical: bool) -> Citation {
        let criticality = if critical {
            Criticality::ClassificationDetermining
        } else {
            Criticality::Supporting
        };
        Citation::new(
            CitationId(id),
            "claim",
            CitationReference::Fix {
                file: "a.js".into(),
                lines: LineRange::single(1),
                original: "a".into(),
                replacement: "b".into(),
            },
            criticality,
        )
    }

    #[test]
    fn test_phase_order_is_enforced() {
        let mut tracker = PhaseTracker::new();
        assert!(tracker.advance(Phase::Validating).is_err());
        tracker.advance(Phase::Solving).unwrap();
        tracker.advance(Phase::Validating).unwrap();
        assert!(tracker.advance(Phase::Solving).is_err());
        tracker.advance(Phase::Done).unwrap();
        assert_eq!(tracker.phase(), Phase::Done);
        assert!(tracker.advance(Phase::Done).is_err());
    }

    #[test]
    fn test_illegal_transition_is_internal() {
        let mut tracker = PhaseTracker::new();
        let err = tracker.advance(Phase::Done).unwrap_err();
        assert_eq!(err.kind(), crate::utils::error::ErrorKind::Internal);
    }

    #[test]
    fn test_prune_keeps_claims_with_one_verified_citation() {
        let citations = vec![
            citation(1, true).verified(),
            citation(2, false).failed("file missing"),
        ];
        let claims = vec![
            Claim::new("kept", vec![CitationId(1), CitationId(2)]),
            Claim::new("dropped", vec![CitationId(2)]),
            Claim::new("dangling", vec![CitationId(9)]),
        ];
        let mut removed = Vec::new();
        let kept = prune(claims, &citations, &mut removed);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "kept");
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].reason, "file missing");
        assert_eq!(removed[1].reason, "no citation could be verified");
    }

    #[test]
    fn test_fix_with_failed_edit_is_dropped() {
        let mut source = citation(1, false);
        source.reference = CitationReference::Source {
            branch: "main".into(),
            file: "a.js".into(),
            lines: LineRange::single(1),
            commit: "a1b2c3d".into(),
            excerpt: "a".into(),
        };
        let citations = vec![
            source.verified(),
            citation(2, false).failed("a.js no longer parses after the fix"),
        ];
        let fix = FixProposal {
            target: FixTarget {
                file: "a.js".into(),
                lines: LineRange::single(1),
            },
            action: FixAction::Replace {
                original: "a".into(),
                replacement: "b".into(),
            },
            rationale: Claim::new("a.js:1 uses a stale selector", vec![CitationId(1), CitationId(2)]),
            feasible: true,
        };
        let solution = Solution {
            fixes: vec![fix],
            escalation: None,
            notes: vec![],
        };

        let mut removed = Vec::new();
        let pruned = prune_solution(solution, &citations, &mut removed);
        assert!(pruned.fixes.is_empty());
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].reason, "a.js no longer parses after the fix");
    }
}
