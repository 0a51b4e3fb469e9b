//! Repository Findings
//!
//! Coordinates of the code version a build exercised, static findings read
//! from that exact version, and the read-only view of a checkout that the
//! validation engine re-reads claims from.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::evidence::{EvidenceReference, LineRange};

/// Repository coordinates of a build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub url: String,
    pub branch: String,
    pub commit: String,
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{} ({})", self.url, self.branch, self.commit)
    }
}

/// Whether two commit ids name the same commit (either may be abbreviated).
pub fn same_commit(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim().to_ascii_lowercase(), b.trim().to_ascii_lowercase());
    if a.len() < 7 || b.len() < 7 {
        return a == b;
    }
    a.starts_with(&b) || b.starts_with(&a)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeFindingKind {
    /// The failing selector is written on the implicated line.
    BadLocator,
    /// A fixed sleep on or just above the implicated line.
    HardcodedWait,
    /// The failing assertion was located; no defect was found around it.
    AssertionSite,
    /// Some other implicated line, located but unremarkable.
    FailureSite,
    /// A manifest declares the library a failure blamed.
    DependencyDeclared,
    /// No manifest declares the library a failure blamed.
    DependencyMissing,
}

impl CodeFindingKind {
    /// Findings that point at a defect in the automation code itself.
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::BadLocator | Self::HardcodedWait)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::BadLocator => "stale element locator",
            Self::HardcodedWait => "hard-coded wait",
            Self::AssertionSite => "failing assertion",
            Self::FailureSite => "failure site",
            Self::DependencyDeclared => "declared dependency",
            Self::DependencyMissing => "undeclared dependency",
        }
    }
}

/// A statically observed fact about the checked-out automation code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFinding {
    pub kind: CodeFindingKind,
    /// Path relative to the checkout root, `/`-separated.
    pub file: String,
    pub lines: LineRange,
    pub branch: String,
    pub commit: String,
    /// Literal text of `lines` as read from the checkout.
    pub excerpt: String,
    /// Selector or dependency name the finding is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub detail: String,
    pub confidence: f64,
}

impl CodeFinding {
    pub fn reference(&self) -> EvidenceReference {
        EvidenceReference::Source {
            branch: self.branch.clone(),
            file: self.file.clone(),
            lines: self.lines,
            commit: self.commit.clone(),
        }
    }
}

/// Read-only access to a checked-out revision.
pub trait RepositorySnapshot: Send + Sync {
    /// Coordinates of the revision actually checked out.
    fn repo_ref(&self) -> &RepoRef;

    /// Root directory of the working tree.
    fn root(&self) -> &Path;

    /// Resolve a repository-relative path, refusing anything that escapes the root.
    fn resolve(&self, relative: &str) -> CoreResult<PathBuf> {
        let rel = Path::new(relative);
        let escapes = rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if relative.is_empty() || escapes {
            return Err(CoreError::validation(format!(
                "Path '{}' is not inside the checkout",
                relative
            )));
        }
        Ok(self.root().join(rel))
    }

    /// Read a file from the checkout.
    fn read_file(&self, relative: &str) -> CoreResult<String> {
        let path = self.resolve(relative)?;
        if !path.is_file() {
            return Err(CoreError::not_found(format!("{} not in checkout", relative)));
        }
        Ok(std::fs::read_to_string(path)?)
    }
}
