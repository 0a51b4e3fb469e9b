//! Evidence Correlation
//!
//! Reduces the frozen context to the few signals the classifier weighs:
//! what the environment looked like, which code defects were found, whether
//! the failing test logic itself looked clean, and which gap signals exist.

use ci_triage_core::{
    CodeFinding, CodeFindingKind, EndpointHealth, FeatureResult, InvestigationContext,
    SignatureCategory, FEATURE_RESULT_CONFIDENCE,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentSignal {
    Healthy,
    /// Answered, but with server errors on the health check or a feature.
    Broken,
    Unreachable,
    NotDeclared,
}

impl std::fmt::Display for EnvironmentSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentSignal::Healthy => write!(f, "healthy"),
            EnvironmentSignal::Broken => write!(f, "broken"),
            EnvironmentSignal::Unreachable => write!(f, "unreachable"),
            EnvironmentSignal::NotDeclared => write!(f, "not declared"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Correlation<'a> {
    pub environment: EnvironmentSignal,
    /// Confidence of the observation behind `environment`.
    pub environment_confidence: f64,
    /// Feature probes that failed with a server error or no answer.
    pub failing_features: Vec<&'a FeatureResult>,
    /// Defect findings, strongest first.
    pub defects: Vec<&'a CodeFinding>,
    pub assertion_sites: Vec<&'a CodeFinding>,
    /// Failure sites were located and none of them shows a defect.
    pub clean_test_logic: bool,
    pub missing_dependencies: Vec<&'a CodeFinding>,
    pub connection_errors: bool,
    pub timeout_or_infrastructure: bool,
    pub has_signatures: bool,
}

impl Correlation<'_> {
    pub fn strongest_defect(&self) -> Option<&CodeFinding> {
        self.defects.first().copied()
    }
}

pub fn correlate(ctx: &InvestigationContext) -> Correlation<'_> {
    let failing_features: Vec<&FeatureResult> = ctx
        .feature_results()
        .iter()
        .filter(|f| f.status_code.map_or(true, |s| s >= 500))
        .collect();

    let (environment, environment_confidence) = match ctx.connectivity() {
        None => (EnvironmentSignal::NotDeclared, 0.0),
        Some(c) => match c.health {
            EndpointHealth::Unreachable => (EnvironmentSignal::Unreachable, c.health.evidence_confidence()),
            EndpointHealth::Failing => (EnvironmentSignal::Broken, c.health.evidence_confidence()),
            EndpointHealth::Healthy | EndpointHealth::Degraded if !failing_features.is_empty() => {
                (EnvironmentSignal::Broken, FEATURE_RESULT_CONFIDENCE)
            }
            EndpointHealth::Healthy | EndpointHealth::Degraded => {
                (EnvironmentSignal::Healthy, c.health.evidence_confidence())
            }
        },
    };

    let findings = ctx.findings();
    let mut defects: Vec<&CodeFinding> = findings.iter().filter(|f| f.kind.is_defect()).collect();
    defects.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let assertion_sites: Vec<&CodeFinding> = findings
        .iter()
        .filter(|f| f.kind == CodeFindingKind::AssertionSite)
        .collect();
    let located_sites = findings
        .iter()
        .any(|f| matches!(f.kind, CodeFindingKind::AssertionSite | CodeFindingKind::FailureSite));
    let missing_dependencies: Vec<&CodeFinding> = findings
        .iter()
        .filter(|f| f.kind == CodeFindingKind::DependencyMissing)
        .collect();

    let signatures = ctx.signatures();
    let has_category = |cats: &[SignatureCategory]| signatures.iter().any(|s| cats.contains(&s.category));

    Correlation {
        environment,
        environment_confidence,
        failing_features,
        clean_test_logic: located_sites && defects.is_empty(),
        defects,
        assertion_sites,
        missing_dependencies,
        connection_errors: has_category(&[SignatureCategory::ConnectionError]),
        timeout_or_infrastructure: has_category(&[
            SignatureCategory::Timeout,
            SignatureCategory::Infrastructure,
        ]),
        has_signatures: !signatures.is_empty(),
    }
}
