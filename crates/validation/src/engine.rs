//! Evidence Validation Engine
//!
//! Last gate before delivery. Every citation is re-checked against its live
//! source in parallel; outcomes are then aggregated sequentially in
//! creation order so the resulting delivery status is deterministic.
//!
//! Failed classification-determining citations are auto-corrected when the
//! cited text can be found at a new location, otherwise removed (or, when
//! removal is disabled, the delivery is blocked).

use std::sync::Arc;

use ci_triage_core::{
    Citation, CitationReference, InvestigationContext, RepositorySnapshot, ValidationConfig,
    VerificationState,
};
use ci_triage_sources::{BuildServer, EnvironmentProbe};
use futures_util::future::join_all;

use crate::models::{CheckOutcome, DeliveryStatus, ValidationReport};
use crate::verifiers::{check_build, check_endpoint, check_fix, check_source, locate, sibling_paths};

pub struct ValidationEngine {
    context: Arc<InvestigationContext>,
    build_server: Arc<dyn BuildServer>,
    probe: Arc<dyn EnvironmentProbe>,
    /// `None` when the repository could not be checked out.
    checkout: Option<Arc<dyn RepositorySnapshot>>,
    config: ValidationConfig,
}

impl ValidationEngine {
    pub fn new(
        context: Arc<InvestigationContext>,
        build_server: Arc<dyn BuildServer>,
        probe: Arc<dyn EnvironmentProbe>,
        checkout: Option<Arc<dyn RepositorySnapshot>>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            context,
            build_server,
            probe,
            checkout,
            config,
        }
    }

    fn snapshot(&self) -> Option<&dyn RepositorySnapshot> {
        self.checkout.as_deref()
    }

    /// Re-check one citation. Removed citations are returned unchanged.
    pub async fn verify(&self, citation: &Citation) -> Citation {
        if citation.removed {
            return citation.clone();
        }
        let outcome = self.check(&citation.reference).await;
        match &outcome {
            CheckOutcome::Verified => tracing::debug!("{} verified: {}", citation.id, citation.reference),
            CheckOutcome::Failed(reason) => {
                tracing::info!("{} failed verification: {}", citation.id, reason)
            }
        }
        outcome.apply(citation)
    }

    async fn check(&self, reference: &CitationReference) -> CheckOutcome {
        match reference {
            CitationReference::Build {
                job,
                number,
                result,
                timestamp_ms,
            } => check_build(self.build_server.as_ref(), job, *number, *result, *timestamp_ms).await,
            CitationReference::Endpoint {
                url,
                status,
                captured_at,
            } => {
                let freshness = chrono::Duration::seconds(self.config.freshness_secs as i64);
                check_endpoint(
                    &self.context,
                    self.probe.as_ref(),
                    freshness,
                    url,
                    *status,
                    *captured_at,
                )
                .await
            }
            CitationReference::Source {
                branch,
                file,
                lines,
                commit,
                excerpt,
            } => check_source(self.snapshot(), branch, file, *lines, commit, excerpt),
            CitationReference::Fix {
                file,
                lines,
                original,
                replacement,
            } => check_fix(self.snapshot(), file, *lines, original, replacement),
        }
    }

    /// Verify every citation and decide whether the analysis may be delivered.
    ///
    /// Running this again on its own output with unchanged sources yields
    /// the same citation states.
    pub async fn verify_all(&self, citations: Vec<Citation>) -> ValidationReport {
        let mut ordered = citations;
        ordered.sort_by_key(|c| c.id);

        let checked = join_all(ordered.iter().map(|c| self.verify(c))).await;

        let mut status = DeliveryStatus::Approved;
        let mut warnings = Vec::new();
        let mut finals = Vec::with_capacity(checked.len());

        for citation in checked {
            if citation.removed {
                warnings.push(format!(
                    "Claim removed ({}): {}",
                    citation.id,
                    citation.note.as_deref().unwrap_or("failed verification")
                ));
                status = status.downgrade(DeliveryStatus::ApprovedWithWarnings);
                finals.push(citation);
                continue;
            }

            match citation.verification_state {
                VerificationState::Verified => {
                    if let Some(from) = &citation.corrected_from {
                        warnings.push(format!(
                            "Citation {} corrected from {} to {}",
                            citation.id, from, citation.reference
                        ));
                        status = status.downgrade(DeliveryStatus::ApprovedWithWarnings);
                    }
                    finals.push(citation);
                }
                _ if !citation.is_critical() => {
                    warnings.push(format!(
                        "Supporting citation {} could not be verified: {}",
                        citation.id,
                        citation.note.as_deref().unwrap_or("unknown reason")
                    ));
                    status = status.downgrade(DeliveryStatus::ApprovedWithWarnings);
                    finals.push(citation);
                }
                _ => {
                    let (next, next_status, warning) = self.resolve_critical_failure(citation).await;
                    warnings.push(warning);
                    status = status.downgrade(next_status);
                    finals.push(next);
                }
            }
        }

        let critical: Vec<&Citation> = finals.iter().filter(|c| c.is_critical()).collect();
        if !critical.is_empty() && !critical.iter().any(|c| c.is_verified()) {
            if !status.is_blocked() {
                warnings.push("No classification-determining claim could be verified".to_string());
            }
            status = DeliveryStatus::Blocked;
        }

        tracing::info!(
            "validation of {} citations finished: {} ({} warnings)",
            finals.len(),
            status,
            warnings.len()
        );
        ValidationReport {
            citations: finals,
            delivery_status: status,
            warnings,
        }
    }

    /// Correct, remove or block a failed classification-determining citation.
    async fn resolve_critical_failure(&self, citation: Citation) -> (Citation, DeliveryStatus, String) {
        if self.config.allow_auto_correction {
            if let Some(corrected) = self.auto_correct(&citation).await {
                let warning = format!(
                    "Citation {} corrected from {} to {}",
                    corrected.id,
                    citation.reference,
                    corrected.reference
                );
                return (corrected, DeliveryStatus::ApprovedWithWarnings, warning);
            }
        }

        let reason = citation.note.clone().unwrap_or_else(|| "failed verification".to_string());
        if self.config.allow_claim_removal {
            let mut removed = citation;
            removed.removed = true;
            let warning = format!("Claim removed ({}): {}", removed.id, reason);
            (removed, DeliveryStatus::ApprovedWithWarnings, warning)
        } else {
            let warning = format!(
                "Classification-determining citation {} failed and removal is disabled: {}",
                citation.id, reason
            );
            (citation, DeliveryStatus::Blocked, warning)
        }
    }

    /// Find the cited text at a new line range, or in a file with a sibling
    /// extension, and re-verify there.
    async fn auto_correct(&self, citation: &Citation) -> Option<Citation> {
        let snapshot = self.snapshot()?;
        let (file, lines, needle) = match &citation.reference {
            CitationReference::Source {
                file,
                lines,
                excerpt,
                ..
            } => (file, *lines, excerpt),
            CitationReference::Fix {
                file,
                lines,
                original,
                ..
            } => (file, *lines, original),
            _ => return None,
        };

        let mut candidates = Vec::new();
        for path in std::iter::once(file.clone()).chain(sibling_paths(file)) {
            let Ok(content) = snapshot.read_file(&path) else {
                continue;
            };
            if path != *file {
                candidates.push(relocated(&citation.reference, &path, lines));
            }
            for range in locate(&content, needle) {
                if path != *file || range != lines {
                    candidates.push(relocated(&citation.reference, &path, range));
                }
            }
        }

        for candidate in candidates {
            if self.check(&candidate).await.is_verified() {
                let mut corrected = citation.clone();
                corrected.corrected_from = citation
                    .corrected_from
                    .clone()
                    .or_else(|| Some(citation.reference.clone()));
                corrected.reference = candidate;
                tracing::info!("{} auto-corrected to {}", corrected.id, corrected.reference);
                return Some(corrected.verified());
            }
        }
        None
    }
}

/// Copy of a source or fix reference pointing at a new file and line range.
fn relocated(reference: &CitationReference, file: &str, lines: ci_triage_core::LineRange) -> CitationReference {
    let mut next = reference.clone();
    match &mut next {
        CitationReference::Source {
            file: f, lines: l, ..
        }
        | CitationReference::Fix {
            file: f, lines: l, ..
        } => {
            *f = file.to_string();
            *l = lines;
        }
        _ => {}
    }
    next
}
