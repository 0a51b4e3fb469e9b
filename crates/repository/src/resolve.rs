//! Source Resolution
//!
//! Finds the repository coordinates a build exercised. Declared build
//! parameters win over the SCM data Jenkins recorded; all three
//! coordinates are required.

use ci_triage_core::{BuildRecord, CoreError, CoreResult, RepoRef};

const URL_KEYS: &[&str] = &["GIT_URL", "REPO_URL", "REPOSITORY_URL", "GIT_REPO"];
const BRANCH_KEYS: &[&str] = &["GIT_BRANCH", "BRANCH", "BRANCH_NAME"];
const COMMIT_KEYS: &[&str] = &["GIT_COMMIT", "COMMIT", "COMMIT_SHA"];

const BRANCH_PREFIXES: &[&str] = &["refs/remotes/origin/", "remotes/origin/", "refs/heads/", "origin/"];

/// Resolve `url`, `branch` and `commit` for the build.
///
/// Fails with `CoreError::Validation` naming every coordinate that could
/// not be determined.
pub fn resolve_source(record: &BuildRecord) -> CoreResult<RepoRef> {
    let git = record.git.as_ref();

    let url = record
        .parameter(URL_KEYS)
        .map(str::to_string)
        .or_else(|| git.and_then(|g| g.remote_urls.first().cloned()))
        .filter(|u| !u.trim().is_empty());

    let branch = record
        .parameter(BRANCH_KEYS)
        .map(str::to_string)
        .or_else(|| git.and_then(|g| g.branch.clone()))
        .map(|b| normalize_branch(&b))
        .filter(|b| !b.is_empty());

    let commit = record
        .parameter(COMMIT_KEYS)
        .filter(|c| is_commit_id(c))
        .map(str::to_string)
        .or_else(|| git.and_then(|g| g.commit.clone()).filter(|c| is_commit_id(c)))
        .map(|c| c.to_ascii_lowercase());

    match (url, branch, commit) {
        (Some(url), Some(branch), Some(commit)) => Ok(RepoRef { url, branch, commit }),
        (url, branch, commit) => {
            let missing: Vec<&str> = [
                ("url", url.is_none()),
                ("branch", branch.is_none()),
                ("commit", commit.is_none()),
            ]
            .iter()
            .filter(|(_, absent)| *absent)
            .map(|(name, _)| *name)
            .collect();
            Err(CoreError::validation(format!(
                "Repository reference for {} is incomplete: missing {}",
                record.build_ref(),
                missing.join(", ")
            )))
        }
    }
}

/// Strip remote and ref prefixes: `origin/main`, `refs/heads/main` → `main`.
pub fn normalize_branch(raw: &str) -> String {
    let mut branch = raw.trim();
    for prefix in BRANCH_PREFIXES {
        if let Some(rest) = branch.strip_prefix(prefix) {
            branch = rest;
            break;
        }
    }
    branch.to_string()
}

/// 7 to 40 hex digits.
fn is_commit_id(raw: &str) -> bool {
    let raw = raw.trim();
    (7..=40).contains(&raw.len()) && raw.chars().all(|c| c.is_ascii_hexdigit())
}
