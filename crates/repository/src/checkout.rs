//! Disposable Checkouts
//!
//! A `LocalCheckout` owns a temporary directory holding exactly one
//! revision. The directory is removed when the checkout is released or
//! dropped, which covers completion, errors and cancellation alike.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use ci_triage_core::{same_commit, CoreError, CoreResult, RepoRef, RepositorySnapshot};
use tempfile::TempDir;

use crate::git_ops::GitOps;

/// Prefix of every checkout directory.
pub const CHECKOUT_PREFIX: &str = "ci-triage-";

/// Strategy for materializing a revision on disk.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Populate the empty directory `dest` with `repo` at its commit and
    /// return the SHA actually checked out.
    async fn fetch(&self, repo: &RepoRef, dest: &Path) -> CoreResult<String>;
}

/// Default fetcher: single-branch clone followed by a detached checkout.
#[derive(Debug, Clone, Default)]
pub struct GitFetcher {
    git: GitOps,
}

impl GitFetcher {
    pub fn new(git: GitOps) -> Self {
        Self { git }
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(&self, repo: &RepoRef, dest: &Path) -> CoreResult<String> {
        tracing::info!("cloning {} ({}) into {}", repo.url, repo.branch, dest.display());
        self.git.clone_branch(&repo.url, &repo.branch, dest).await?;
        self.git.checkout_detached(dest, &repo.commit).await?;
        self.git.head_commit(dest).await
    }
}

/// One revision checked out into a private temporary directory.
#[derive(Debug)]
pub struct LocalCheckout {
    dir: TempDir,
    root: PathBuf,
    repo_ref: RepoRef,
}

impl LocalCheckout {
    /// Remove the working tree now instead of on drop.
    pub fn release(self) -> CoreResult<()> {
        let path = self.root.clone();
        self.dir.close()?;
        tracing::debug!("released checkout {}", path.display());
        Ok(())
    }
}

impl RepositorySnapshot for LocalCheckout {
    fn repo_ref(&self) -> &RepoRef {
        &self.repo_ref
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Check out `repo` into a fresh temporary directory.
///
/// The resolved HEAD must name the requested commit. On any failure,
/// including timeout, the directory is removed before returning.
pub async fn checkout(
    fetcher: &dyn SourceFetcher,
    repo: &RepoRef,
    workspace_root: Option<&Path>,
    timeout: Duration,
) -> CoreResult<LocalCheckout> {
    let dir = match workspace_root {
        Some(parent) => {
            tokio::fs::create_dir_all(parent).await?;
            tempfile::Builder::new().prefix(CHECKOUT_PREFIX).tempdir_in(parent)?
        }
        None => tempfile::Builder::new().prefix(CHECKOUT_PREFIX).tempdir()?,
    };
    let root = dir.path().join("src");

    let head = match tokio::time::timeout(timeout, fetcher.fetch(repo, &root)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(CoreError::timeout(format!(
                "checkout of {} after {}s",
                repo.url,
                timeout.as_secs()
            )))
        }
    };

    if !same_commit(&head, &repo.commit) {
        return Err(CoreError::validation(format!(
            "Checked out {} but the build ran {}",
            head, repo.commit
        )));
    }
    if !root.is_dir() {
        return Err(CoreError::internal(format!(
            "Fetcher reported success but {} does not exist",
            root.display()
        )));
    }

    Ok(LocalCheckout {
        dir,
        root,
        repo_ref: RepoRef {
            url: repo.url.clone(),
            branch: repo.branch.clone(),
            commit: head,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WriteFiles {
        head: String,
    }

    #[async_trait]
    impl SourceFetcher for WriteFiles {
        async fn fetch(&self, _repo: &RepoRef, dest: &Path) -> CoreResult<String> {
            std::fs::create_dir_all(dest.join("tests"))?;
            std::fs::write(dest.join("tests/login.cy.js"), "cy.get('#login').click();\n")?;
            Ok(self.head.clone())
        }
    }

    struct Hang;

    #[async_trait]
    impl SourceFetcher for Hang {
        async fn fetch(&self, _repo: &RepoRef, dest: &Path) -> CoreResult<String> {
            std::fs::create_dir_all(dest)?;
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    fn repo() -> RepoRef {
        RepoRef {
            url: "https://git/qe/e2e.git".into(),
            branch: "main".into(),
            commit: "4f2a9c1".into(),
        }
    }

    fn leftovers(root: &Path) -> usize {
        std::fs::read_dir(root)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(CHECKOUT_PREFIX))
            .count()
    }

    #[tokio::test]
    async fn test_checkout_reads_and_releases() {
        let ws = tempfile::tempdir().unwrap();
        let fetcher = WriteFiles {
            head: "4f2a9c1d0e5b".into(),
        };
        let co = checkout(&fetcher, &repo(), Some(ws.path()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(co.repo_ref().commit, "4f2a9c1d0e5b");
        assert!(co.read_file("tests/login.cy.js").unwrap().contains("#login"));
        assert_eq!(leftovers(ws.path()), 1);
        co.release().unwrap();
        assert_eq!(leftovers(ws.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_workspace_root_is_created() {
        let ws = tempfile::tempdir().unwrap();
        let nested = ws.path().join("triage/checkouts");
        let fetcher = WriteFiles {
            head: "4f2a9c1d0e5b".into(),
        };
        let co = checkout(&fetcher, &repo(), Some(&nested), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(co.root().starts_with(&nested));
        assert_eq!(leftovers(&nested), 1);
        drop(co);
        assert_eq!(leftovers(&nested), 0);
    }

    #[tokio::test]
    async fn test_commit_mismatch_cleans_up() {
        let ws = tempfile::tempdir().unwrap();
        let fetcher = WriteFiles {
            head: "9999999aaaa".into(),
        };
        let result = checkout(&fetcher, &repo(), Some(ws.path()), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(leftovers(ws.path()), 0);
    }

    #[tokio::test]
    async fn test_timeout_cleans_up() {
        let ws = tempfile::tempdir().unwrap();
        let result = checkout(&Hang, &repo(), Some(ws.path()), Duration::from_millis(50)).await;
        assert!(matches!(result, Err(CoreError::Timeout(_))));
        assert_eq!(leftovers(ws.path()), 0);
    }

    #[tokio::test]
    async fn test_git_fetcher_against_local_repository() {
        let git = GitOps::new(Duration::from_secs(60));
        if !git.is_available().await {
            return;
        }
        let origin = tempfile::tempdir().unwrap();
        let o = origin.path();
        for args in [
            vec!["init", "--quiet", "--initial-branch=main"],
            vec!["config", "user.email", "ci@example.com"],
            vec!["config", "user.name", "ci"],
        ] {
            git.execute(o, &args).await.unwrap().into_result().unwrap();
        }
        std::fs::write(o.join("spec.cy.js"), "cy.wait(5000);\n").unwrap();
        git.execute(o, &["add", "."]).await.unwrap().into_result().unwrap();
        git.execute(o, &["commit", "--quiet", "-m", "first"])
            .await
            .unwrap()
            .into_result()
            .unwrap();
        let first = git.head_commit(o).await.unwrap();
        std::fs::write(o.join("spec.cy.js"), "cy.get('[data-testid=ok]');\n").unwrap();
        git.execute(o, &["commit", "--quiet", "-am", "second"])
            .await
            .unwrap()
            .into_result()
            .unwrap();

        let repo = RepoRef {
            url: o.to_string_lossy().to_string(),
            branch: "main".into(),
            commit: first[..10].to_string(),
        };
        let ws = tempfile::tempdir().unwrap();
        let co = checkout(&GitFetcher::new(git), &repo, Some(ws.path()), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(co.repo_ref().commit, first);
        assert_eq!(co.read_file("spec.cy.js").unwrap(), "cy.wait(5000);\n");
        drop(co);
        assert_eq!(leftovers(ws.path()), 0);
    }
}
