//! Per-type Verifiers
//!
//! Each verifier re-reads the live source a citation points at and compares
//! it with what the citation asserts. None of them return errors: an
//! unreachable source is a failed check.

use chrono::{DateTime, Utc};
use ci_triage_core::{
    same_commit, BuildRef, BuildResult, FeatureSpec, InvestigationContext, LineRange,
    RepositorySnapshot,
};
use ci_triage_sources::{BuildServer, EnvironmentProbe};

use crate::models::CheckOutcome;
use crate::syntax::check_syntax;

// ============================================================================
// Jenkins
// ============================================================================

/// Re-fetch the build; result and start time must be unchanged.
pub async fn check_build(
    server: &dyn BuildServer,
    job: &str,
    number: u64,
    result: BuildResult,
    timestamp_ms: i64,
) -> CheckOutcome {
    let build = BuildRef::new(job, number);
    match server.fetch_metadata(&build).await {
        Ok(meta) if meta.result != result => CheckOutcome::failed(format!(
            "{} now reports {}, cited {}",
            build, meta.result, result
        )),
        Ok(meta) if meta.timestamp_ms != timestamp_ms => CheckOutcome::failed(format!(
            "{} started at {}, cited {}",
            build, meta.timestamp_ms, timestamp_ms
        )),
        Ok(_) => CheckOutcome::Verified,
        Err(e) => CheckOutcome::failed(format!("could not re-fetch {}: {}", build, e)),
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Compare a cited endpoint status with the captured one, or with a fresh
/// probe when the observation is older than `freshness`.
pub async fn check_endpoint(
    context: &InvestigationContext,
    probe: &dyn EnvironmentProbe,
    freshness: chrono::Duration,
    url: &str,
    status: Option<u16>,
    captured_at: DateTime<Utc>,
) -> CheckOutcome {
    let connectivity = context.connectivity().filter(|c| c.endpoint == url);
    let feature = context.feature_results().iter().find(|f| f.url == url);

    let current = if Utc::now() - captured_at > freshness {
        let Some(declared) = context.cluster().endpoint.as_deref() else {
            return CheckOutcome::failed(format!("no declared endpoint to re-probe {}", url));
        };
        if connectivity.is_some() {
            tracing::debug!("re-probing stale connectivity observation for {}", url);
            probe.validate_connectivity(declared).await.status_code
        } else if let Some(feature) = feature {
            let base = declared.trim_end_matches('/');
            let path = url.strip_prefix(base).unwrap_or(url);
            tracing::debug!("re-probing stale feature observation for {}", url);
            probe
                .probe_feature(declared, &FeatureSpec::new(&feature.feature, path))
                .await
                .status_code
        } else {
            return CheckOutcome::failed(format!("{} was never probed", url));
        }
    } else if let Some(c) = connectivity {
        c.status_code
    } else if let Some(f) = feature {
        f.status_code
    } else {
        return CheckOutcome::failed(format!("{} was never probed", url));
    };

    if current == status {
        CheckOutcome::Verified
    } else {
        CheckOutcome::failed(format!(
            "{} answers {}, cited {}",
            url,
            status_label(current),
            status_label(status)
        ))
    }
}

fn status_label(status: Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unreachable".to_string())
}

// ============================================================================
// Repository
// ============================================================================

/// Branch, commit, file, line range and excerpt must all match the checkout.
pub fn check_source(
    snapshot: Option<&dyn RepositorySnapshot>,
    branch: &str,
    file: &str,
    lines: LineRange,
    commit: &str,
    excerpt: &str,
) -> CheckOutcome {
    let Some(snapshot) = snapshot else {
        return CheckOutcome::failed("repository checkout unavailable");
    };
    let repo = snapshot.repo_ref();
    if branch != repo.branch {
        return CheckOutcome::failed(format!(
            "branch {} does not match checked-out branch {}",
            branch, repo.branch
        ));
    }
    if !same_commit(commit, &repo.commit) {
        return CheckOutcome::failed(format!(
            "commit {} does not match checked-out commit {}",
            commit, repo.commit
        ));
    }
    let content = match snapshot.read_file(file) {
        Ok(content) => content,
        Err(e) => return CheckOutcome::failed(e.to_string()),
    };
    let Some(region) = lines.extract(&content) else {
        return CheckOutcome::failed(format!(
            "{}:{} is out of bounds ({} lines)",
            file,
            lines,
            content.lines().count()
        ));
    };
    if excerpt.is_empty() || !region.contains(excerpt) {
        return CheckOutcome::failed(format!("{}:{} does not contain the cited excerpt", file, lines));
    }
    CheckOutcome::Verified
}

// ============================================================================
// Fix
// ============================================================================

/// The target region must contain `original`, and the file must still parse
/// after the replacement is applied in memory.
pub fn check_fix(
    snapshot: Option<&dyn RepositorySnapshot>,
    file: &str,
    lines: LineRange,
    original: &str,
    replacement: &str,
) -> CheckOutcome {
    let Some(snapshot) = snapshot else {
        return CheckOutcome::failed("repository checkout unavailable");
    };
    let content = match snapshot.read_file(file) {
        Ok(content) => content,
        Err(e) => return CheckOutcome::failed(e.to_string()),
    };
    let Some(patched) = apply_replacement(&content, lines, original, replacement) else {
        return CheckOutcome::failed(format!("{}:{} does not contain the text to replace", file, lines));
    };

    if let Err(before) = check_syntax(file, &content) {
        tracing::debug!("{} does not parse before the fix ({}), skipping re-parse", file, before);
        return CheckOutcome::Verified;
    }
    match check_syntax(file, &patched) {
        Ok(()) => CheckOutcome::Verified,
        Err(e) => CheckOutcome::failed(format!("{} no longer parses after the fix: {}", file, e)),
    }
}

/// Replace the first `original` inside `lines` and return the whole file.
pub fn apply_replacement(content: &str, lines: LineRange, original: &str, replacement: &str) -> Option<String> {
    if original.is_empty() {
        return None;
    }
    let all: Vec<&str> = content.lines().collect();
    if !lines.fits(all.len()) {
        return None;
    }
    let start = (lines.start - 1) as usize;
    let end = lines.end as usize;
    let region = all[start..end].join("\n");
    if !region.contains(original) {
        return None;
    }
    let patched_region = region.replacen(original, replacement, 1);

    let mut out: Vec<&str> = Vec::with_capacity(all.len());
    out.extend_from_slice(&all[..start]);
    out.push(&patched_region);
    out.extend_from_slice(&all[end..]);
    let mut patched = out.join("\n");
    if content.ends_with('\n') {
        patched.push('\n');
    }
    Some(patched)
}

// ============================================================================
// Relocation helpers used by auto-correction
// ============================================================================

const SIBLING_EXTENSIONS: &[&[&str]] = &[
    &["js", "ts", "jsx", "tsx", "mjs", "cjs"],
    &["yml", "yaml"],
    &["java", "kt"],
    &["py", "pyi"],
];

/// Same path with each sibling extension, e.g. `a.cy.js` → `a.cy.ts`.
pub fn sibling_paths(file: &str) -> Vec<String> {
    let Some((stem, ext)) = file.rsplit_once('.') else {
        return Vec::new();
    };
    if stem.is_empty() || ext.contains('/') {
        return Vec::new();
    }
    SIBLING_EXTENSIONS
        .iter()
        .find(|group| group.contains(&ext))
        .map(|group| {
            group
                .iter()
                .filter(|e| **e != ext)
                .map(|e| format!("{}.{}", stem, e))
                .collect()
        })
        .unwrap_or_default()
}

/// Line ranges of `content` that contain `needle`, first match first.
pub fn locate(content: &str, needle: &str) -> Vec<LineRange> {
    if needle.is_empty() {
        return Vec::new();
    }
    let span = needle.matches('\n').count() as u32;
    content
        .match_indices(needle)
        .map(|(idx, _)| {
            let start = content[..idx].matches('\n').count() as u32 + 1;
            LineRange::new(start, start + span)
        })
        .collect()
}
