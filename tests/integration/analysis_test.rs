//! End-to-end Analysis Tests
//!
//! Full runs of `Analyzer` against in-process fakes: bad-locator automation
//! bugs and their fixes, a failing environment, a failed clone, a build whose
//! log matches nothing, and builds that cannot be analyzed at all.

use ci_triage::{AnalysisError, DeliveryStatus, ErrorKind, FixAction, Verdict};
use ci_triage_core::{BuildResult, CitationType, LineRange, SourceStatus};
use tempfile::TempDir;

use super::support::*;

fn assert_all_claims_backed(result: &ci_triage::AnalysisResult) {
    for claim in result.claims() {
        assert!(result.is_backed(claim), "unbacked claim: {}", claim.text);
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_bad_locator_is_automation_bug() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE),
        FakeEnvironment::answering(200),
        login_repo(),
    );

    let result = analyzer.analyze(&build_ref()).await.unwrap();

    assert_eq!(result.classification.verdict, Verdict::AutomationBug);
    assert!(
        result.classification.confidence > 0.8,
        "confidence {}",
        result.classification.confidence
    );
    assert_eq!(result.solution.fixes.len(), 1);
    let fix = &result.solution.fixes[0];
    assert_eq!(fix.target.file, "cypress/e2e/login.cy.js");
    assert_eq!(fix.target.lines, LineRange::single(12));
    assert!(fix.feasible);
    match &fix.action {
        FixAction::Replace { original, replacement } => {
            assert_eq!(original, "#login-btn");
            assert_eq!(replacement, "[data-testid=\"login-btn\"]");
        }
        other => panic!("expected a replacement, got {:?}", other),
    }
    assert!(result.solution.escalation.is_none());
    assert_eq!(result.delivery_status, DeliveryStatus::Approved);
    assert!(result.removed_claims.is_empty());
    assert!(result
        .citations
        .iter()
        .any(|c| c.citation_type == CitationType::Fix && c.is_verified()));
    assert_all_claims_backed(&result);
}

#[tokio::test]
async fn test_compound_selector_fix_keeps_file_parseable() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE),
        FakeEnvironment::answering(200),
        login_repo_with(COMPOUND_LOGIN_SPEC),
    );

    let result = analyzer.analyze(&build_ref()).await.unwrap();

    assert_eq!(result.classification.verdict, Verdict::AutomationBug);
    assert_eq!(result.solution.fixes.len(), 1);
    match &result.solution.fixes[0].action {
        FixAction::Replace { original, replacement } => {
            assert_eq!(original, "#login-btn");
            assert_eq!(replacement, "[data-testid='login-btn']");
        }
        other => panic!("expected a replacement, got {:?}", other),
    }
    assert!(result
        .citations
        .iter()
        .filter(|c| c.citation_type == CitationType::Fix)
        .all(|c| c.is_verified()));
    assert_eq!(result.delivery_status, DeliveryStatus::Approved);
}

#[tokio::test]
async fn test_fix_that_breaks_the_file_is_withheld() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE),
        FakeEnvironment::answering(200),
        login_repo_with(COMMENTED_LOGIN_SPEC),
    );

    let result = analyzer.analyze(&build_ref()).await.unwrap();

    let edit = result
        .citations
        .iter()
        .find(|c| c.citation_type == CitationType::Fix)
        .expect("a fix citation");
    assert!(!edit.is_verified());
    assert!(result.solution.fixes.is_empty(), "{:?}", result.solution.fixes);
    assert!(result
        .removed_claims
        .iter()
        .any(|r| r.reason.contains("no longer parses")));
    assert_eq!(result.delivery_status, DeliveryStatus::ApprovedWithWarnings);
    assert_eq!(result.classification.verdict, Verdict::AutomationBug);
    assert_all_claims_backed(&result);
}

#[tokio::test]
async fn test_failing_environment_is_product_bug() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Failure, USERS_CONSOLE),
        FakeEnvironment::answering(500),
        users_repo(),
    );

    let result = analyzer.analyze(&build_ref()).await.unwrap();

    assert_eq!(result.classification.verdict, Verdict::ProductBug);
    assert!(
        result.classification.confidence > 0.8,
        "confidence {}",
        result.classification.confidence
    );
    assert!(result.solution.fixes.is_empty());
    let escalation = result.solution.escalation.as_ref().unwrap();
    assert_eq!(escalation.endpoint.as_deref(), Some(ENDPOINT));
    assert!(!result.delivery_status.is_blocked());
    assert_all_claims_backed(&result);
}

#[tokio::test]
async fn test_failed_clone_lowers_confidence() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE),
        FakeEnvironment::answering(200),
        FakeFetcher::failing(),
    );

    let result = analyzer.analyze(&build_ref()).await.unwrap();

    assert_eq!(result.delivery_status, DeliveryStatus::ApprovedWithWarnings);
    assert!(result.classification.confidence < 0.5);
    assert_eq!(result.context.evidence_quality, 0.0);
    assert!(result
        .solution
        .notes
        .iter()
        .any(|n| n.contains("repository evidence unavailable")));
    let repository = result
        .context
        .sources
        .iter()
        .find(|s| s.kind == ci_triage_core::EvidenceKind::Repository)
        .unwrap();
    assert_eq!(repository.status, SourceStatus::Unavailable);
    assert_all_claims_backed(&result);
}

#[tokio::test]
async fn test_failure_without_signatures_is_low_confidence_gap() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Failure, SILENT_CONSOLE).without_environment(),
        FakeEnvironment::answering(200),
        login_repo(),
    );

    let result = analyzer.analyze(&build_ref()).await.unwrap();

    assert_eq!(result.classification.verdict, Verdict::AutomationGap);
    assert!(result.classification.confidence < 0.5);
    assert!(!result.delivery_status.is_blocked());
    assert_eq!(result.context.signature_count, 0);
    assert!(result
        .solution
        .notes
        .iter()
        .any(|n| n.contains("no error signatures")));
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_invalid_reference_is_input_error() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Failure, SILENT_CONSOLE),
        FakeEnvironment::answering(200),
        login_repo(),
    );

    let err = analyzer.analyze("not a build").await.unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidBuildReference(_)));
    assert_eq!(err.kind(), ErrorKind::InputError);
}

#[tokio::test]
async fn test_unknown_build_is_not_found() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Failure, SILENT_CONSOLE),
        FakeEnvironment::answering(200),
        login_repo(),
    );

    let err = analyzer.analyze("qa/other#3").await.unwrap_err();
    assert!(matches!(err, AnalysisError::BuildNotFound(_)));
}

#[tokio::test]
async fn test_build_without_commit_is_repo_ref_incomplete() {
    for missing in ["GIT_COMMIT", "GIT_BRANCH"] {
        let workspace = TempDir::new().unwrap();
        let analyzer = analyzer(
            workspace.path(),
            FakeJenkins::new(BuildResult::Failure, LOGIN_CONSOLE).without_parameter(missing),
            FakeEnvironment::answering(200),
            login_repo(),
        );

        let err = analyzer.analyze(&build_ref()).await.unwrap_err();
        assert!(
            matches!(err, AnalysisError::RepoRefIncomplete(_)),
            "without {}: {:?}",
            missing,
            err
        );
        assert_eq!(err.kind(), ErrorKind::InputError);
        assert!(checkout_dirs(workspace.path()).is_empty());
    }
}

#[tokio::test]
async fn test_result_serializes() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE),
        FakeEnvironment::answering(200),
        login_repo(),
    );
    let result = analyzer.analyze(&build_ref()).await.unwrap();

    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["classification"]["verdict"], "AUTOMATION_BUG");
    assert_eq!(json["deliveryStatus"], "approved");
}
