//! Build Intelligence Extractor
//!
//! Fetches one build from the CI server and turns it into structured
//! evidence:
//!
//! - `reference` - parse a build URL or `job#number` pair
//! - `rules` - console log → `ErrorSignature`s (`SignatureMatcher`, `RuleTable`)
//! - `cluster` - build parameters → `ClusterType`
//!
//! `resolve` is the only fatal step. Console log and artifacts are fetched
//! best-effort by `complete`; whatever could not be fetched after retries is
//! recorded in `BuildRecord::missing_fields`.

pub mod cluster;
pub mod reference;
pub mod rules;

use std::sync::Arc;

use ci_triage_core::{BuildRecord, BuildRef, ErrorSignature, RetryConfig};
use ci_triage_sources::{retry, BuildMetadata, BuildServer};

use crate::utils::error::{AnalysisError, TriageResult};

pub use cluster::{classify_cluster_type, ENDPOINT_PARAMS};
pub use reference::parse_build_reference;
pub use rules::{parse_frame, Rule, RuleTable, SignatureMatcher};

/// Reads builds from a `BuildServer` with bounded retries.
#[derive(Clone)]
pub struct Extractor {
    server: Arc<dyn BuildServer>,
    retry: RetryConfig,
    matcher: Arc<dyn SignatureMatcher>,
}

impl Extractor {
    pub fn new(
        server: Arc<dyn BuildServer>,
        retry: RetryConfig,
        matcher: Arc<dyn SignatureMatcher>,
    ) -> Self {
        Self {
            server,
            retry,
            matcher,
        }
    }

    pub fn server(&self) -> Arc<dyn BuildServer> {
        self.server.clone()
    }

    /// Fetch build metadata. Fails with `BuildNotFound` when the server does
    /// not know the build, and with `SourceUnavailable` when it cannot be
    /// reached or refuses the credentials after retries.
    pub async fn resolve(&self, build: &BuildRef) -> TriageResult<BuildMetadata> {
        let metadata = retry(&self.retry, "build metadata", || {
            self.server.fetch_metadata(build)
        })
        .await
        .map_err(|e| match e.status() {
            Some(404) => AnalysisError::build_not_found(format!("{}: {}", build, e)),
            _ => AnalysisError::source_unavailable(format!("jenkins metadata of {}: {}", build, e)),
        })?;

        tracing::info!(
            "resolved {} ({}, started {})",
            build,
            metadata.result.as_str(),
            metadata.timestamp_ms
        );
        if metadata.building {
            tracing::warn!("{} is still running; its result may change", build);
        }
        Ok(metadata)
    }

    /// Add console log and artifacts to resolved metadata. Never fails.
    pub async fn complete(&self, build: &BuildRef, metadata: BuildMetadata) -> BuildRecord {
        let (console, artifacts) = tokio::join!(
            retry(&self.retry, "console log", || self.server.fetch_console(build)),
            retry(&self.retry, "artifact list", || self.server.fetch_artifacts(build)),
        );

        let console = console
            .map_err(|e| tracing::warn!("console log of {} unavailable: {}", build, e))
            .ok();
        let artifacts = artifacts
            .map_err(|e| tracing::warn!("artifacts of {} unavailable: {}", build, e))
            .ok();
        metadata.into_record(console, artifacts)
    }

    /// `resolve` followed by `complete`.
    pub async fn fetch(&self, build: &BuildRef) -> TriageResult<BuildRecord> {
        let metadata = self.resolve(build).await?;
        Ok(self.complete(build, metadata).await)
    }

    pub fn extract_error_signatures(&self, record: &BuildRecord) -> Vec<ErrorSignature> {
        extract_error_signatures(self.matcher.as_ref(), record)
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("base_url", &self.server.base_url())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Signatures of a build's console log; none when the log is missing.
pub fn extract_error_signatures(matcher: &dyn SignatureMatcher, record: &BuildRecord) -> Vec<ErrorSignature> {
    record
        .console_log
        .as_deref()
        .map(|log| matcher.extract(log))
        .unwrap_or_default()
}
