//! Git Operations
//!
//! Async wrapper around the git CLI. Child processes are killed when the
//! awaiting future is dropped, so cancelling a checkout never leaves a
//! clone running in the background.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use ci_triage_core::{CoreError, CoreResult};
use tokio::process::Command;

/// Result of a git command execution
#[derive(Debug)]
pub struct GitResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl GitResult {
    /// Check if the command was successful and return stdout or error
    pub fn into_result(self) -> CoreResult<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(CoreError::command(format!(
                "Git command failed (exit {}): {}",
                self.exit_code,
                self.stderr.trim()
            )))
        }
    }
}

/// Git CLI wrapper with a per-command deadline.
#[derive(Debug, Clone)]
pub struct GitOps {
    timeout: Duration,
}

impl Default for GitOps {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl GitOps {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Execute a git command in the specified directory
    pub async fn execute(&self, cwd: &Path, args: &[&str]) -> CoreResult<GitResult> {
        let child = Command::new("git")
            .args(args)
            .current_dir(cwd)
            // Never wait for credentials on a terminal nobody is watching.
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GCM_INTERACTIVE", "never")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(CoreError::command(format!("Failed to execute git: {}", e))),
            Err(_) => {
                return Err(CoreError::timeout(format!(
                    "git {} after {}s",
                    args.first().copied().unwrap_or(""),
                    self.timeout.as_secs()
                )))
            }
        };

        Ok(GitResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Whether a usable git binary is on the PATH.
    pub async fn is_available(&self) -> bool {
        let cwd = std::env::temp_dir();
        matches!(self.execute(&cwd, &["--version"]).await, Ok(r) if r.success)
    }

    /// Clone a single branch of `url` into `dest` (which must be empty).
    pub async fn clone_branch(&self, url: &str, branch: &str, dest: &Path) -> CoreResult<()> {
        let parent = dest
            .parent()
            .ok_or_else(|| CoreError::internal("Checkout directory has no parent"))?;
        let dest_str = dest.to_string_lossy();
        self.execute(
            parent,
            &[
                "clone",
                "--branch",
                branch,
                "--single-branch",
                "--no-tags",
                "--quiet",
                "--",
                url,
                &dest_str,
            ],
        )
        .await?
        .into_result()?;
        Ok(())
    }

    /// Detach HEAD at `commit`, fetching it explicitly if the branch history lacks it.
    pub async fn checkout_detached(&self, cwd: &Path, commit: &str) -> CoreResult<()> {
        let first = self
            .execute(cwd, &["checkout", "--quiet", "--detach", commit])
            .await?;
        if first.success {
            return Ok(());
        }
        tracing::debug!("commit {} not on cloned branch, fetching it directly", commit);
        self.execute(cwd, &["fetch", "--quiet", "--no-tags", "origin", commit])
            .await?
            .into_result()?;
        self.execute(cwd, &["checkout", "--quiet", "--detach", "FETCH_HEAD"])
            .await?
            .into_result()?;
        Ok(())
    }

    /// Full SHA of HEAD.
    pub async fn head_commit(&self, cwd: &Path) -> CoreResult<String> {
        self.execute(cwd, &["rev-parse", "HEAD"])
            .await?
            .into_result()
            .map(|s| s.trim().to_string())
    }
}
