//! Verdict Classification
//!
//! `ClassificationStrategy` turns correlated evidence into a verdict and a
//! confidence. The default `EvidenceWeightedClassifier` scores each verdict
//! independently, then picks the strongest one and caps its confidence by
//! the evidence quality of the context.

use serde::{Deserialize, Serialize};

use super::correlate::{Correlation, EnvironmentSignal};
use crate::models::Verdict;

/// Score of every verdict before one is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictScores {
    pub product: f64,
    pub automation: f64,
    pub gap: f64,
}

impl VerdictScores {
    pub fn get(&self, verdict: Verdict) -> f64 {
        match verdict {
            Verdict::ProductBug => self.product,
            Verdict::AutomationBug => self.automation,
            Verdict::AutomationGap => self.gap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub verdict: Verdict,
    pub confidence: f64,
    pub scores: VerdictScores,
    /// Product and automation evidence were both strong.
    pub contested: bool,
}

pub trait ClassificationStrategy: Send + Sync {
    fn classify(&self, correlation: &Correlation<'_>, evidence_quality: f64) -> Decision;
}

// ============================================================================
// EvidenceWeightedClassifier
// ============================================================================

const CONTEST_THRESHOLD: f64 = 0.6;
const CONTESTED_CONFIDENCE: f64 = 0.45;
const UNREACHABLE_WITH_CONNECTION_ERRORS: f64 = 0.4;
const SUSPECTED_WRONG_ASSERTION: f64 = 0.65;
const MISSING_DEPENDENCY: f64 = 0.8;
const UNEXPLAINED_TIMEOUT: f64 = 0.55;
const NO_SIGNATURES: f64 = 0.45;
const FALLBACK_CONFIDENCE: f64 = 0.3;
const ZERO_QUALITY_CAP: f64 = 0.45;

#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceWeightedClassifier;

impl EvidenceWeightedClassifier {
    pub fn scores(&self, c: &Correlation<'_>) -> VerdictScores {
        let product = match c.environment {
            EnvironmentSignal::Broken => {
                let logic = if c.clean_test_logic {
                    1.0
                } else if !c.defects.is_empty() {
                    0.7
                } else {
                    0.85
                };
                c.environment_confidence * logic
            }
            EnvironmentSignal::Unreachable if c.connection_errors => UNREACHABLE_WITH_CONNECTION_ERRORS,
            _ => 0.0,
        };

        let environment_factor = match c.environment {
            EnvironmentSignal::Healthy => 1.0,
            EnvironmentSignal::NotDeclared => 0.75,
            EnvironmentSignal::Unreachable => 0.6,
            EnvironmentSignal::Broken => 0.7,
        };
        let automation = match c.strongest_defect() {
            Some(defect) => defect.confidence * environment_factor,
            None if !c.assertion_sites.is_empty() && c.environment == EnvironmentSignal::Healthy => {
                SUSPECTED_WRONG_ASSERTION
            }
            None => 0.0,
        };

        let mut gap: f64 = 0.0;
        if !c.missing_dependencies.is_empty() {
            gap = gap.max(MISSING_DEPENDENCY);
        }
        if c.timeout_or_infrastructure && c.environment == EnvironmentSignal::Healthy && c.defects.is_empty() {
            gap = gap.max(UNEXPLAINED_TIMEOUT);
        }
        if !c.has_signatures {
            gap = gap.max(NO_SIGNATURES);
        }

        VerdictScores {
            product,
            automation,
            gap,
        }
    }
}

impl ClassificationStrategy for EvidenceWeightedClassifier {
    fn classify(&self, correlation: &Correlation<'_>, evidence_quality: f64) -> Decision {
        let scores = self.scores(correlation);

        if scores.product >= CONTEST_THRESHOLD && scores.automation >= CONTEST_THRESHOLD {
            let verdict = if scores.product >= scores.automation {
                Verdict::ProductBug
            } else {
                Verdict::AutomationBug
            };
            return Decision {
                verdict,
                confidence: CONTESTED_CONFIDENCE,
                scores,
                contested: true,
            };
        }

        // Ties go to the earlier verdict.
        let mut best = (Verdict::ProductBug, scores.product);
        for verdict in [Verdict::AutomationBug, Verdict::AutomationGap] {
            if scores.get(verdict) > best.1 {
                best = (verdict, scores.get(verdict));
            }
        }

        if best.1 <= 0.0 {
            return Decision {
                verdict: Verdict::AutomationGap,
                confidence: FALLBACK_CONFIDENCE,
                scores,
                contested: false,
            };
        }

        let cap = if evidence_quality <= 0.0 {
            ZERO_QUALITY_CAP
        } else {
            0.5 + 0.5 * evidence_quality.min(1.0)
        };
        Decision {
            verdict: best.0,
            confidence: best.1.min(cap),
            scores,
            contested: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use ci_triage_core::{CodeFinding, CodeFindingKind, LineRange};

    use super::*;

    fn finding(kind: CodeFindingKind, confidence: f64) -> CodeFinding {
        CodeFinding {
            kind,
            file: "cypress/e2e/login.cy.js".into(),
            lines: LineRange::single(12),
            branch: "main".into(),
            commit: "a1b2c3d4e5f6".into(),
            excerpt: "cy.get('#login-btn').click()".into(),
            subject: None,
            detail: String::new(),
            confidence,
        }
    }

    fn correlation(environment: EnvironmentSignal, confidence: f64) -> Correlation<'static> {
        Correlation {
            environment,
            environment_confidence: confidence,
            failing_features: vec![],
            defects: vec![],
            assertion_sites: vec![],
            clean_test_logic: false,
            missing_dependencies: vec![],
            connection_errors: false,
            timeout_or_infrastructure: false,
            has_signatures: true,
        }
    }

    #[test]
    fn test_bad_locator_with_healthy_environment() {
        let defect = finding(CodeFindingKind::BadLocator, 0.9);
        let mut c = correlation(EnvironmentSignal::Healthy, 0.95);
        c.defects = vec![&defect];
        let decision = EvidenceWeightedClassifier.classify(&c, 0.9);
        assert_eq!(decision.verdict, Verdict::AutomationBug);
        assert!((decision.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_broken_environment_with_clean_logic() {
        let mut c = correlation(EnvironmentSignal::Broken, 0.9);
        c.clean_test_logic = true;
        let decision = EvidenceWeightedClassifier.classify(&c, 0.9);
        assert_eq!(decision.verdict, Verdict::ProductBug);
        assert!((decision.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_contested_evidence_lowers_confidence() {
        let defect = finding(CodeFindingKind::BadLocator, 0.9);
        let mut c = correlation(EnvironmentSignal::Broken, 0.9);
        c.defects = vec![&defect];
        // product = 0.9 * 0.7, automation = 0.9 * 0.7
        let decision = EvidenceWeightedClassifier.classify(&c, 1.0);
        assert!(decision.contested);
        assert_eq!(decision.verdict, Verdict::ProductBug);
        assert!((decision.confidence - CONTESTED_CONFIDENCE).abs() < 1e-9);

        let weak = finding(CodeFindingKind::HardcodedWait, 0.5);
        c.defects = vec![&weak];
        assert!(!EvidenceWeightedClassifier.classify(&c, 1.0).contested);
    }

    #[test]
    fn test_unreachable_environment_with_connection_errors() {
        let mut c = correlation(EnvironmentSignal::Unreachable, 0.0);
        c.connection_errors = true;
        let decision = EvidenceWeightedClassifier.classify(&c, 0.5);
        assert_eq!(decision.verdict, Verdict::ProductBug);
        assert!((decision.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_quality_caps_confidence() {
        let dependency = finding(CodeFindingKind::DependencyMissing, 0.85);
        let mut c = correlation(EnvironmentSignal::Healthy, 0.95);
        c.missing_dependencies = vec![&dependency];
        let decision = EvidenceWeightedClassifier.classify(&c, 0.0);
        assert_eq!(decision.verdict, Verdict::AutomationGap);
        assert!((decision.confidence - ZERO_QUALITY_CAP).abs() < 1e-9);

        let decision = EvidenceWeightedClassifier.classify(&c, 0.4);
        assert!((decision.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_no_signatures_and_all_zero() {
        let mut c = correlation(EnvironmentSignal::Healthy, 0.95);
        c.has_signatures = false;
        let decision = EvidenceWeightedClassifier.classify(&c, 0.9);
        assert_eq!(decision.verdict, Verdict::AutomationGap);
        assert!((decision.confidence - NO_SIGNATURES).abs() < 1e-9);

        let c = correlation(EnvironmentSignal::NotDeclared, 0.0);
        let decision = EvidenceWeightedClassifier.classify(&c, 0.9);
        assert_eq!(decision.verdict, Verdict::AutomationGap);
        assert!((decision.confidence - FALLBACK_CONFIDENCE).abs() < 1e-9);
    }
}
