//! Evidence Framework Integration Tests
//!
//! Investigation (concurrency, cancellation, quality) and validation
//! (idempotence, repository round-trip) driven through the public API.

use std::sync::Arc;
use std::time::Duration;

use ci_triage::services::solution::{solve, EvidenceWeightedClassifier};
use ci_triage::AnalysisError;
use ci_triage_core::{
    BuildRef, BuildResult, Citation, CitationId, CitationReference, CodeFindingKind, Criticality,
    EvidenceKind, RepositorySnapshot, SourceStatus, ValidationConfig, VerificationState,
};
use ci_triage_validation::ValidationEngine;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::support::*;

// ============================================================================
// Investigation
// ============================================================================

#[tokio::test]
async fn test_cancellation_leaves_no_checkout() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE),
        FakeEnvironment::answering(200),
        FakeFetcher::hanging(),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = analyzer
        .analyze_with_cancellation(&build_ref(), cancel)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, AnalysisError::Cancelled));
    assert!(err.is_cancelled());
    assert!(
        checkout_dirs(workspace.path()).is_empty(),
        "left behind: {:?}",
        checkout_dirs(workspace.path())
    );
}

#[tokio::test]
async fn test_completed_analysis_releases_checkout() {
    let workspace = TempDir::new().unwrap();
    let analyzer = analyzer(
        workspace.path(),
        FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE),
        FakeEnvironment::answering(200),
        login_repo(),
    );
    analyzer.analyze(&build_ref()).await.unwrap();
    assert!(checkout_dirs(workspace.path()).is_empty());
}

#[tokio::test]
async fn test_unreachable_source_lowers_quality() {
    let workspace = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let build = BuildRef::new(JOB, NUMBER);

    let healthy = investigator(
        workspace.path(),
        Arc::new(FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE)),
        Arc::new(FakeEnvironment::answering(200)),
        login_repo(),
    )
    .investigate("healthy", &build, &cancel)
    .await
    .unwrap();

    let degraded = investigator(
        workspace.path(),
        Arc::new(FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE)),
        Arc::new(FakeEnvironment::unreachable()),
        login_repo(),
    )
    .investigate("degraded", &build, &cancel)
    .await
    .unwrap();

    let environment = degraded
        .context
        .source_report(EvidenceKind::Environment)
        .unwrap();
    assert_eq!(environment.status, SourceStatus::Unavailable);
    assert!(degraded.context.connectivity().is_some());
    assert!(
        degraded.context.evidence_quality() < healthy.context.evidence_quality(),
        "{} !< {}",
        degraded.context.evidence_quality(),
        healthy.context.evidence_quality()
    );
}

#[tokio::test]
async fn test_investigation_collects_all_three_sources() {
    let workspace = TempDir::new().unwrap();
    let investigation = investigator(
        workspace.path(),
        Arc::new(FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE)),
        Arc::new(FakeEnvironment::answering(200)),
        login_repo(),
    )
    .investigate("a-1", &BuildRef::new(JOB, NUMBER), &CancellationToken::new())
    .await
    .unwrap();

    let ctx = &investigation.context;
    for kind in [EvidenceKind::Jenkins, EvidenceKind::Environment, EvidenceKind::Repository] {
        assert!(ctx.evidence_of(kind).next().is_some(), "no {} evidence", kind.as_str());
        assert_eq!(ctx.source_report(kind).unwrap().status, SourceStatus::Available);
    }
    assert_eq!(ctx.repo_ref().commit, COMMIT);
    assert!(ctx
        .findings()
        .iter()
        .any(|f| f.kind == CodeFindingKind::BadLocator && f.file == "cypress/e2e/login.cy.js"));
    assert!(investigation.checkout.is_some());
}

// ============================================================================
// Validation
// ============================================================================

struct Validated {
    engine: ValidationEngine,
    citations: Vec<Citation>,
    _workspace: TempDir,
}

async fn validated_login_run() -> Validated {
    let workspace = TempDir::new().unwrap();
    let jenkins = Arc::new(FakeJenkins::new(BuildResult::Unstable, LOGIN_CONSOLE));
    let environment = Arc::new(FakeEnvironment::answering(200));
    let investigation = investigator(workspace.path(), jenkins.clone(), environment.clone(), login_repo())
        .investigate("a-1", &BuildRef::new(JOB, NUMBER), &CancellationToken::new())
        .await
        .unwrap();

    let proposal = solve(&investigation.context, &EvidenceWeightedClassifier);
    let snapshot = investigation
        .checkout
        .clone()
        .map(|c| c as Arc<dyn RepositorySnapshot>);
    let engine = ValidationEngine::new(
        investigation.context.clone(),
        jenkins,
        environment,
        snapshot,
        ValidationConfig::default(),
    );
    Validated {
        engine,
        citations: proposal.citations,
        _workspace: workspace,
    }
}

#[tokio::test]
async fn test_verify_all_is_idempotent() {
    let run = validated_login_run().await;

    let first = run.engine.verify_all(run.citations.clone()).await;
    let second = run.engine.verify_all(first.citations.clone()).await;

    assert_eq!(first.delivery_status, second.delivery_status);
    let states = |r: &ci_triage_validation::ValidationReport| -> Vec<(CitationId, VerificationState, bool)> {
        r.citations
            .iter()
            .map(|c| (c.id, c.verification_state, c.removed))
            .collect()
    };
    assert_eq!(states(&first), states(&second));
    assert!(first.citations.iter().all(|c| c.is_verified()));
}

#[tokio::test]
async fn test_repository_citation_round_trip() {
    let run = validated_login_run().await;
    let source = run
        .citations
        .iter()
        .find(|c| matches!(c.reference, CitationReference::Source { .. }))
        .cloned()
        .unwrap();

    assert!(run.engine.verify(&source).await.is_verified());

    let mutations: Vec<Box<dyn Fn(&mut CitationReference)>> = vec![
        Box::new(|r| {
            if let CitationReference::Source { branch, .. } = r {
                *branch = "release-1.2".into();
            }
        }),
        Box::new(|r| {
            if let CitationReference::Source { file, .. } = r {
                *file = "cypress/e2e/logout.cy.js".into();
            }
        }),
        Box::new(|r| {
            if let CitationReference::Source { lines, .. } = r {
                *lines = ci_triage_core::LineRange::single(3);
            }
        }),
        Box::new(|r| {
            if let CitationReference::Source { commit, .. } = r {
                *commit = "0000000000000000000000000000000000000000".into();
            }
        }),
    ];

    for mutate in mutations {
        let mut broken = source.clone();
        mutate(&mut broken.reference);
        let checked = run.engine.verify(&broken).await;
        assert_eq!(
            checked.verification_state,
            VerificationState::Failed,
            "{} should fail",
            broken.reference
        );
        assert!(checked.note.is_some());

        // only the mutated citation fails
        let mut batch: Vec<Citation> = run.citations.clone();
        for c in batch.iter_mut() {
            if c.id == broken.id {
                *c = Citation {
                    criticality: Criticality::Supporting,
                    ..broken.clone()
                };
            }
        }
        let report = run.engine.verify_all(batch).await;
        for c in &report.citations {
            if c.id == broken.id {
                assert!(!c.is_verified());
            } else {
                assert!(c.is_verified(), "{} unexpectedly failed: {:?}", c.id, c.note);
            }
        }
    }
}
