//! Repository Probe
//!
//! Bundles the fetch strategy with the checkout and inspection settings so
//! the investigation can run both steps from one handle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ci_triage_core::{CodeFinding, CoreResult, ErrorSignature, RepoRef, RepositoryConfig};

use crate::checkout::{checkout, GitFetcher, LocalCheckout, SourceFetcher};
use crate::git_ops::GitOps;
use crate::inspect::{inspect, InspectOptions};

#[derive(Clone)]
pub struct RepositoryProbe {
    fetcher: Arc<dyn SourceFetcher>,
    workspace_root: Option<PathBuf>,
    clone_timeout: Duration,
    options: InspectOptions,
}

impl std::fmt::Debug for RepositoryProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryProbe")
            .field("workspace_root", &self.workspace_root)
            .field("clone_timeout", &self.clone_timeout)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RepositoryProbe {
    /// Probe backed by the git CLI.
    pub fn from_config(config: &RepositoryConfig) -> Self {
        let timeout = Duration::from_secs(config.clone_timeout_secs);
        Self::with_fetcher(config, Arc::new(GitFetcher::new(GitOps::new(timeout))))
    }

    pub fn with_fetcher(config: &RepositoryConfig, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            fetcher,
            workspace_root: config.workspace_root.clone(),
            clone_timeout: Duration::from_secs(config.clone_timeout_secs),
            options: InspectOptions {
                max_file_bytes: config.max_scan_file_bytes,
                ..InspectOptions::default()
            },
        }
    }

    pub async fn checkout(&self, repo: &RepoRef) -> CoreResult<LocalCheckout> {
        checkout(
            self.fetcher.as_ref(),
            repo,
            self.workspace_root.as_deref(),
            self.clone_timeout,
        )
        .await
    }

    /// Inspect on a blocking thread; the walk and file reads are synchronous.
    pub async fn inspect(
        &self,
        checkout: Arc<LocalCheckout>,
        signatures: Vec<ErrorSignature>,
    ) -> CoreResult<Vec<CodeFinding>> {
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || inspect(checkout.as_ref(), &signatures, &options))
            .await
            .map_err(|e| ci_triage_core::CoreError::internal(format!("Inspection task failed: {}", e)))
    }
}
