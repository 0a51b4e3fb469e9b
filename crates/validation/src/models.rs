//! Validation Models
//!
//! Delivery gating and the report produced by a validation pass.

use ci_triage_core::{Citation, VerificationState};
use serde::{Deserialize, Serialize};

/// Whether an analysis may be delivered.
///
/// Ordered from best to worst so `max` combines outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Approved,
    ApprovedWithWarnings,
    Blocked,
}

impl DeliveryStatus {
    /// Combine with another outcome, keeping the worse of the two.
    pub fn downgrade(self, other: DeliveryStatus) -> Self {
        self.max(other)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, DeliveryStatus::Blocked)
    }
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        DeliveryStatus::Approved
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Approved => write!(f, "approved"),
            DeliveryStatus::ApprovedWithWarnings => write!(f, "approved_with_warnings"),
            DeliveryStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// Result of re-checking one citation against its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Verified,
    Failed(String),
}

impl CheckOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        CheckOutcome::Failed(reason.into())
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, CheckOutcome::Verified)
    }

    /// Apply to a citation, producing its next state.
    pub fn apply(self, citation: &Citation) -> Citation {
        match self {
            CheckOutcome::Verified => citation.verified(),
            CheckOutcome::Failed(reason) => citation.failed(reason),
        }
    }
}

/// Outcome of `verify_all`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Every citation with its final state, in creation order.
    pub citations: Vec<Citation>,
    pub delivery_status: DeliveryStatus,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn verified_count(&self) -> usize {
        self.citations.iter().filter(|c| c.is_verified()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.citations
            .iter()
            .filter(|c| c.verification_state == VerificationState::Failed)
            .count()
    }

    pub fn removed(&self) -> impl Iterator<Item = &Citation> {
        self.citations.iter().filter(|c| c.removed)
    }

    /// Share of classification-determining citations that survived verification.
    pub fn critical_verified_ratio(&self) -> f64 {
        let critical: Vec<&Citation> = self.citations.iter().filter(|c| c.is_critical()).collect();
        if critical.is_empty() {
            return 1.0;
        }
        let verified = critical.iter().filter(|c| c.is_verified()).count();
        verified as f64 / critical.len() as f64
    }
}
