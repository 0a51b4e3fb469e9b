//! Investigation Phase
//!
//! Collects evidence from the three sources and freezes it into an
//! `InvestigationContext`.
//!
//! 1. Build metadata and repository coordinates are resolved first; both
//!    are fatal when they fail.
//! 2. Three tasks then run concurrently, each owning its evidence list:
//!    build completion + signature extraction, the environment probe, and
//!    the repository checkout + inspection. Signatures reach the other two
//!    through a `watch` channel.
//! 3. All three are joined before the context is frozen.
//!
//! Cancellation aborts every outstanding task. Dropping an aborted
//! checkout task removes its working tree.

use std::sync::Arc;
use std::time::Instant;

use ci_triage_core::{
    BuildRecord, BuildRef, ClusterType, ConnectivityResult, ContextBuilder, CoreError,
    EndpointHealth, EnvironmentConfig, EnvironmentPart, ErrorSignature, EvidenceKind, EvidenceLog,
    EvidenceReference, FeatureResult, FeatureSpec, InvestigationContext, JenkinsPart, LineRange,
    QualityWeights, RepoRef, RepositoryPart, RepositorySnapshot, Severity, SignatureCategory,
    SourceReport, FEATURE_RESULT_CONFIDENCE,
};
use ci_triage_repository::{resolve_source, LocalCheckout, RepositoryProbe};
use ci_triage_sources::{BuildMetadata, EnvironmentProbe};
use futures_util::future::join_all;
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::extractor::{classify_cluster_type, Extractor};
use crate::utils::error::{AnalysisError, TriageResult};

type SignatureFeed = watch::Receiver<Option<Arc<Vec<ErrorSignature>>>>;

/// Output of the investigation phase.
#[derive(Debug)]
pub struct Investigation {
    pub context: Arc<InvestigationContext>,
    /// Kept alive until validation has re-read every repository claim.
    pub checkout: Option<Arc<LocalCheckout>>,
}

#[derive(Clone)]
pub struct Investigator {
    extractor: Extractor,
    probe: Arc<dyn EnvironmentProbe>,
    repository: RepositoryProbe,
    environment: EnvironmentConfig,
    weights: QualityWeights,
}

impl std::fmt::Debug for Investigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Investigator")
            .field("extractor", &self.extractor)
            .field("repository", &self.repository)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl Investigator {
    pub fn new(
        extractor: Extractor,
        probe: Arc<dyn EnvironmentProbe>,
        repository: RepositoryProbe,
        environment: EnvironmentConfig,
        weights: QualityWeights,
    ) -> Self {
        Self {
            extractor,
            probe,
            repository,
            environment,
            weights,
        }
    }

    pub async fn investigate(
        &self,
        analysis_id: &str,
        build: &BuildRef,
        cancel: &CancellationToken,
    ) -> TriageResult<Investigation> {
        let metadata = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            result = self.extractor.resolve(build) => result?,
        };
        let skeleton = metadata.clone().into_record(None, None);
        let repo_ref = resolve_source(&skeleton)
            .map_err(|e| AnalysisError::repo_ref_incomplete(format!("{}: {}", build, e)))?;
        let cluster = classify_cluster_type(&skeleton.parameters);
        tracing::info!(
            "investigating {} at {} (environment {})",
            build,
            repo_ref,
            cluster.endpoint.as_deref().unwrap_or("not declared")
        );

        let (feed_tx, feed_rx) = watch::channel(None);
        let mut jenkins = tokio::spawn(jenkins_task(
            self.extractor.clone(),
            build.clone(),
            metadata,
            cluster.clone(),
            feed_tx,
        ));
        let mut environment = tokio::spawn(environment_task(
            self.probe.clone(),
            cluster.endpoint.clone(),
            self.environment.clone(),
            feed_rx.clone(),
        ));
        let mut repository = tokio::spawn(repository_task(
            self.repository.clone(),
            repo_ref.clone(),
            feed_rx,
        ));

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            out = async { tokio::join!(&mut jenkins, &mut environment, &mut repository) } => Some(out),
        };
        let Some((jenkins_out, environment_out, repository_out)) = joined else {
            jenkins.abort();
            environment.abort();
            repository.abort();
            // Wait for the aborted tasks to drop their state, checkout included.
            let _ = tokio::join!(jenkins, environment, repository);
            tracing::info!("investigation {} cancelled", analysis_id);
            return Err(AnalysisError::Cancelled);
        };

        let jenkins_part = jenkins_out.map_err(|e| {
            CoreError::internal(format!("Build extraction task failed: {}", e))
        })?;
        let environment_part = environment_out.unwrap_or_else(|e| EnvironmentPart {
            connectivity: None,
            features: Vec::new(),
            report: SourceReport::unavailable(
                EvidenceKind::Environment,
                format!("environment task failed: {}", e),
                std::time::Duration::ZERO,
            ),
            evidence: Vec::new(),
        });
        let (repository_part, checkout) = repository_out.unwrap_or_else(|e| {
            (
                RepositoryPart {
                    repo_ref: repo_ref.clone(),
                    findings: Vec::new(),
                    report: SourceReport::unavailable(
                        EvidenceKind::Repository,
                        format!("repository task failed: {}", e),
                        std::time::Duration::ZERO,
                    ),
                    evidence: Vec::new(),
                },
                None,
            )
        });

        let context = ContextBuilder::new(analysis_id)
            .jenkins(jenkins_part)
            .environment(environment_part)
            .repository(repository_part)
            .freeze(&self.weights)?;
        tracing::info!(
            "context {} frozen: {} evidence items, quality {:.2}",
            analysis_id,
            context.evidence().len(),
            context.evidence_quality()
        );

        Ok(Investigation {
            context: Arc::new(context),
            checkout,
        })
    }
}

// ============================================================================
// Source tasks
// ============================================================================

async fn jenkins_task(
    extractor: Extractor,
    build: BuildRef,
    metadata: BuildMetadata,
    cluster: ClusterType,
    feed: watch::Sender<Option<Arc<Vec<ErrorSignature>>>>,
) -> JenkinsPart {
    let started = Instant::now();
    let record = extractor.complete(&build, metadata).await;
    let signatures = extractor.extract_error_signatures(&record);
    feed.send_replace(Some(Arc::new(signatures.clone())));

    let mut log = EvidenceLog::new(EvidenceKind::Jenkins);
    let reference = build_reference(&record);
    log.record(
        reference.clone(),
        format!("{} finished {}", record.build_ref(), record.result.as_str()),
        json!({
            "result": record.result,
            "durationMs": record.duration_ms,
            "parameters": record.parameters,
            "missingFields": record.missing_fields,
        }),
        1.0,
    );
    for signature in &signatures {
        log.record(
            reference.clone(),
            format!(
                "console line {}: {} ({}x)",
                signature.log_line, signature.category, signature.occurrences
            ),
            serde_json::to_value(signature).unwrap_or_default(),
            signature_confidence(signature),
        );
    }

    tracing::info!(
        "build extraction done: {} signatures, coverage {:.2}",
        signatures.len(),
        record.coverage()
    );
    JenkinsPart {
        report: SourceReport::completed(EvidenceKind::Jenkins, record.coverage(), started.elapsed()),
        record,
        signatures,
        cluster,
        evidence: log.into_items(),
    }
}

async fn environment_task(
    probe: Arc<dyn EnvironmentProbe>,
    endpoint: Option<String>,
    config: EnvironmentConfig,
    mut feed: SignatureFeed,
) -> EnvironmentPart {
    let Some(endpoint) = endpoint else {
        tracing::info!("no environment endpoint declared; skipping environment probe");
        return EnvironmentPart {
            connectivity: None,
            features: Vec::new(),
            report: SourceReport::not_applicable(
                EvidenceKind::Environment,
                "no environment endpoint declared in build parameters",
            ),
            evidence: Vec::new(),
        };
    };

    let started = Instant::now();
    let mut log = EvidenceLog::new(EvidenceKind::Environment);
    let connectivity = probe.validate_connectivity(&endpoint).await;
    log.record(
        endpoint_reference(&connectivity),
        format!("{} answered {}", connectivity.endpoint, connectivity.status_label()),
        serde_json::to_value(&connectivity).unwrap_or_default(),
        connectivity.health.evidence_confidence(),
    );

    let mut features: Vec<FeatureResult> = Vec::new();
    if connectivity.status_code.is_some() && config.probe_features && config.max_feature_probes > 0 {
        let signatures = next_signatures(&mut feed).await;
        let specs = feature_specs(&signatures, config.max_feature_probes);
        features = join_all(specs.iter().map(|spec| probe.probe_feature(&endpoint, spec))).await;
        for result in &features {
            log.record(
                EvidenceReference::Endpoint {
                    url: result.url.clone(),
                    status: result.status_code,
                    captured_at: result.timestamp,
                },
                format!("feature {}: {}", result.feature, result.detail),
                serde_json::to_value(result).unwrap_or_default(),
                FEATURE_RESULT_CONFIDENCE,
            );
        }
    }

    let report = if connectivity.health == EndpointHealth::Unreachable {
        SourceReport::unavailable(
            EvidenceKind::Environment,
            format!(
                "{} unreachable: {}",
                connectivity.endpoint,
                connectivity.error.as_deref().unwrap_or("no response")
            ),
            started.elapsed(),
        )
    } else {
        SourceReport::completed(EvidenceKind::Environment, 1.0, started.elapsed())
    };

    EnvironmentPart {
        connectivity: Some(connectivity),
        features,
        report,
        evidence: log.into_items(),
    }
}

async fn repository_task(
    repository: RepositoryProbe,
    repo_ref: RepoRef,
    mut feed: SignatureFeed,
) -> (RepositoryPart, Option<Arc<LocalCheckout>>) {
    let started = Instant::now();
    let checkout = match repository.checkout(&repo_ref).await {
        Ok(checkout) => Arc::new(checkout),
        Err(e) => {
            tracing::warn!("repository {} unavailable: {}", repo_ref, e);
            let part = RepositoryPart {
                repo_ref,
                findings: Vec::new(),
                report: SourceReport::unavailable(EvidenceKind::Repository, e.to_string(), started.elapsed()),
                evidence: Vec::new(),
            };
            return (part, None);
        }
    };

    let head = checkout.repo_ref().clone();
    let mut log = EvidenceLog::new(EvidenceKind::Repository);
    log.record(
        EvidenceReference::Source {
            branch: head.branch.clone(),
            file: ".".to_string(),
            lines: LineRange::single(1),
            commit: head.commit.clone(),
        },
        format!("checked out {}", head),
        json!({ "url": head.url, "branch": head.branch, "commit": head.commit }),
        1.0,
    );

    let signatures = next_signatures(&mut feed).await;
    let (findings, coverage) = match repository.inspect(checkout.clone(), signatures.to_vec()).await {
        Ok(findings) => (findings, 1.0),
        Err(e) => {
            tracing::warn!("inspection of {} failed: {}", head, e);
            (Vec::new(), 0.5)
        }
    };
    for finding in &findings {
        log.record(
            finding.reference(),
            finding.detail.clone(),
            serde_json::to_value(finding).unwrap_or_default(),
            finding.confidence,
        );
    }

    tracing::info!("repository inspection done: {} findings", findings.len());
    let part = RepositoryPart {
        repo_ref: head,
        findings,
        report: SourceReport::completed(EvidenceKind::Repository, coverage, started.elapsed()),
        evidence: log.into_items(),
    };
    (part, Some(checkout))
}

// ============================================================================
// Helpers
// ============================================================================

/// Wait for the extraction task to publish; empty if it never does.
async fn next_signatures(feed: &mut SignatureFeed) -> Arc<Vec<ErrorSignature>> {
    match feed.wait_for(Option::is_some).await {
        Ok(value) => value.clone().unwrap_or_default(),
        Err(_) => Arc::default(),
    }
}

/// One probe per distinct request path named by an `http_error` signature.
pub fn feature_specs(signatures: &[ErrorSignature], limit: usize) -> Vec<FeatureSpec> {
    let mut specs: Vec<FeatureSpec> = Vec::new();
    for signature in signatures {
        if signature.category != SignatureCategory::HttpError {
            continue;
        }
        let Some(path) = signature.subject.as_deref().filter(|s| s.starts_with('/')) else {
            continue;
        };
        if specs.len() >= limit {
            break;
        }
        if !specs.iter().any(|s| s.path == path) {
            specs.push(FeatureSpec::new(path, path));
        }
    }
    specs
}

fn build_reference(record: &BuildRecord) -> EvidenceReference {
    EvidenceReference::Build {
        job: record.job.clone(),
        number: record.number,
        result: record.result,
        timestamp_ms: record.timestamp_ms,
    }
}

fn endpoint_reference(connectivity: &ConnectivityResult) -> EvidenceReference {
    EvidenceReference::Endpoint {
        url: connectivity.endpoint.clone(),
        status: connectivity.status_code,
        captured_at: connectivity.timestamp,
    }
}

fn signature_confidence(signature: &ErrorSignature) -> f64 {
    if signature.category == SignatureCategory::StackTrace {
        return 0.5;
    }
    match signature.severity {
        Severity::Critical => 0.9,
        Severity::High => 0.8,
        Severity::Medium => 0.7,
        Severity::Low => 0.5,
    }
}
