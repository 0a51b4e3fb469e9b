//! Static Inspection
//!
//! Maps error signatures onto the checked-out automation code and reports
//! what is written at each implicated site. Every finding carries the
//! literal file, line range, excerpt, branch and commit it was read from.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use ci_triage_core::{
    CodeFinding, CodeFindingKind, ErrorSignature, LineRange, RepositorySnapshot, SignatureCategory,
    SourceLocation,
};
use ignore::WalkBuilder;
use regex::Regex;

use crate::manifest::{find_declaration, package_for_import, ManifestKind};

const BAD_LOCATOR_CONFIDENCE: f64 = 0.9;
const HARDCODED_WAIT_CONFIDENCE: f64 = 0.7;
const ASSERTION_SITE_CONFIDENCE: f64 = 0.8;
const FAILURE_SITE_CONFIDENCE: f64 = 0.6;
const DEPENDENCY_DECLARED_CONFIDENCE: f64 = 0.8;
const DEPENDENCY_MISSING_CONFIDENCE: f64 = 0.85;

/// Lines above a site that are still searched for a fixed wait.
const WAIT_LOOKBACK: u32 = 3;

const TEST_SOURCE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "mjs", "cjs", "ts", "tsx", "py", "java", "kt", "go", "rb", "cs", "feature", "robot",
];

#[derive(Debug, Clone)]
pub struct InspectOptions {
    /// Files larger than this are not read.
    pub max_file_bytes: u64,
    /// Upper bound on selector search hits per signature.
    pub max_search_hits: usize,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            max_file_bytes: 512 * 1024,
            max_search_hits: 5,
        }
    }
}

/// Locate the code implicated by `signatures` in the checkout.
pub fn inspect(
    snapshot: &dyn RepositorySnapshot,
    signatures: &[ErrorSignature],
    options: &InspectOptions,
) -> Vec<CodeFinding> {
    let mut inspector = Inspector::new(snapshot, options);
    let mut findings = Vec::new();

    for signature in signatures {
        if signature.category == SignatureCategory::MissingDependency {
            findings.extend(inspector.dependency_findings(signature));
            continue;
        }

        let mut sites: Vec<(String, u32)> = signature
            .locations
            .iter()
            .filter_map(|loc| inspector.resolve_location(loc).map(|file| (file, loc.line)))
            .collect();

        if sites.is_empty() && signature.category == SignatureCategory::ElementNotFound {
            if let Some(selector) = signature.subject.as_deref() {
                sites = inspector.search_selector(selector);
            }
        }

        for (file, line) in sites {
            if let Some(finding) = inspector.classify_site(signature, &file, line) {
                findings.push(finding);
            }
        }
    }

    let mut seen = HashSet::new();
    findings.retain(|f| seen.insert((f.kind, f.file.clone(), f.lines)));
    tracing::info!(
        "inspected {} signatures against {}: {} findings",
        signatures.len(),
        snapshot.repo_ref(),
        findings.len()
    );
    findings
}

// ============================================================================
// Inspector
// ============================================================================

struct Inspector<'a> {
    snapshot: &'a dyn RepositorySnapshot,
    options: &'a InspectOptions,
    /// Repository-relative, `/`-separated, sorted.
    files: Vec<String>,
    contents: HashMap<String, Option<String>>,
}

impl<'a> Inspector<'a> {
    fn new(snapshot: &'a dyn RepositorySnapshot, options: &'a InspectOptions) -> Self {
        Self {
            snapshot,
            options,
            files: list_files(snapshot.root()),
            contents: HashMap::new(),
        }
    }

    fn read(&mut self, file: &str) -> Option<&str> {
        if !self.contents.contains_key(file) {
            let too_big = self
                .snapshot
                .resolve(file)
                .ok()
                .and_then(|p| std::fs::metadata(p).ok())
                .map(|m| m.len() > self.options.max_file_bytes)
                .unwrap_or(true);
            let content = if too_big {
                None
            } else {
                self.snapshot.read_file(file).ok()
            };
            self.contents.insert(file.to_string(), content);
        }
        self.contents.get(file).and_then(|c| c.as_deref())
    }

    /// Map a stack-frame path onto a checkout file: exact path first, then
    /// the longest path suffix that exists.
    fn resolve_location(&self, location: &SourceLocation) -> Option<String> {
        let normalized = normalize_frame_path(&location.file);
        if normalized.is_empty() {
            return None;
        }
        if self.files.binary_search(&normalized).is_ok() {
            return Some(normalized);
        }

        let parts: Vec<&str> = normalized.split('/').collect();
        for skip in 1..parts.len() {
            let suffix = parts[skip..].join("/");
            let tail = format!("/{}", suffix);
            let matches: Vec<&String> = self
                .files
                .iter()
                .filter(|f| **f == suffix || f.ends_with(&tail))
                .collect();
            if let Some(first) = matches.first() {
                if matches.len() > 1 {
                    tracing::debug!(
                        "{} matches {} checkout files, using {}",
                        location.file,
                        matches.len(),
                        first
                    );
                }
                return Some((*first).clone());
            }
        }
        None
    }

    /// Lines in test sources that contain `selector` literally.
    fn search_selector(&mut self, selector: &str) -> Vec<(String, u32)> {
        let candidates: Vec<String> = self
            .files
            .iter()
            .filter(|f| is_test_source(f))
            .cloned()
            .collect();
        let limit = self.options.max_search_hits;
        let mut hits = Vec::new();
        for file in candidates {
            let Some(content) = self.read(&file) else {
                continue;
            };
            for (idx, line) in content.lines().enumerate() {
                if line.contains(selector) {
                    hits.push((file.clone(), idx as u32 + 1));
                    if hits.len() >= limit {
                        return hits;
                    }
                }
            }
        }
        hits
    }

    fn classify_site(&mut self, signature: &ErrorSignature, file: &str, line: u32) -> Option<CodeFinding> {
        let content = self.read(file)?.to_string();
        let lines: Vec<&str> = content.lines().collect();
        if line == 0 || line as usize > lines.len() {
            return None;
        }
        let text = lines[line as usize - 1];

        let selector = match signature.category {
            SignatureCategory::ElementNotFound => signature.subject.as_deref(),
            _ => None,
        };
        if let Some(selector) = selector.filter(|s| text.contains(*s)) {
            return Some(self.finding(
                CodeFindingKind::BadLocator,
                file,
                LineRange::single(line),
                text,
                Some(selector.to_string()),
                format!(
                    "Selector `{}` that the failing step could not find is written at {}:{}",
                    selector, file, line
                ),
                BAD_LOCATOR_CONFIDENCE,
            ));
        }

        let lookback_start = line.saturating_sub(WAIT_LOOKBACK).max(1);
        for wait_line in (lookback_start..=line).rev() {
            let candidate = lines[wait_line as usize - 1];
            if is_hardcoded_wait(candidate) {
                return Some(self.finding(
                    CodeFindingKind::HardcodedWait,
                    file,
                    LineRange::single(wait_line),
                    candidate,
                    None,
                    format!(
                        "Fixed wait at {}:{} precedes the failing step at line {}",
                        file, wait_line, line
                    ),
                    HARDCODED_WAIT_CONFIDENCE,
                ));
            }
        }

        let (kind, confidence, detail) = if signature.category == SignatureCategory::AssertionFailure {
            (
                CodeFindingKind::AssertionSite,
                ASSERTION_SITE_CONFIDENCE,
                format!("Failing assertion is at {}:{}", file, line),
            )
        } else {
            (
                CodeFindingKind::FailureSite,
                FAILURE_SITE_CONFIDENCE,
                format!("{} failure raised at {}:{}", signature.category, file, line),
            )
        };
        Some(self.finding(
            kind,
            file,
            LineRange::single(line),
            text,
            signature.subject.clone(),
            detail,
            confidence,
        ))
    }

    fn dependency_findings(&mut self, signature: &ErrorSignature) -> Vec<CodeFinding> {
        let Some(package) = signature.subject.as_deref().and_then(package_for_import) else {
            return Vec::new();
        };

        let mut manifests: Vec<(String, ManifestKind)> = self
            .files
            .iter()
            .filter_map(|f| ManifestKind::detect(f).map(|k| (f.clone(), k)))
            .collect();
        manifests.sort_by_key(|(f, _)| (f.matches('/').count(), f.clone()));

        let mut findings = Vec::new();
        let mut first_line: Option<(String, String)> = None;
        for (file, kind) in &manifests {
            let Some(content) = self.read(file).map(str::to_string) else {
                continue;
            };
            if first_line.is_none() {
                if let Some(line) = content.lines().next() {
                    first_line = Some((file.clone(), line.to_string()));
                }
            }
            if let Some(decl) = find_declaration(*kind, &content, &package) {
                findings.push(self.finding(
                    CodeFindingKind::DependencyDeclared,
                    file,
                    LineRange::single(decl.line),
                    &decl.text,
                    Some(package.clone()),
                    format!("`{}` is declared in {}:{}", package, file, decl.line),
                    DEPENDENCY_DECLARED_CONFIDENCE,
                ));
            }
        }

        if findings.is_empty() {
            match first_line {
                Some((file, line)) => {
                    let checked: Vec<&str> = manifests.iter().map(|(f, _)| f.as_str()).collect();
                    findings.push(self.finding(
                        CodeFindingKind::DependencyMissing,
                        &file,
                        LineRange::single(1),
                        &line,
                        Some(package.clone()),
                        format!(
                            "`{}` is not declared in any manifest ({})",
                            package,
                            checked.join(", ")
                        ),
                        DEPENDENCY_MISSING_CONFIDENCE,
                    ));
                }
                None => tracing::debug!("no manifest in checkout to check `{}` against", package),
            }
        }
        findings
    }

    #[allow(clippy::too_many_arguments)]
    fn finding(
        &self,
        kind: CodeFindingKind,
        file: &str,
        lines: LineRange,
        excerpt: &str,
        subject: Option<String>,
        detail: String,
        confidence: f64,
    ) -> CodeFinding {
        let repo = self.snapshot.repo_ref();
        CodeFinding {
            kind,
            file: file.to_string(),
            lines,
            branch: repo.branch.clone(),
            commit: repo.commit.clone(),
            excerpt: excerpt.to_string(),
            subject,
            detail,
            confidence,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Every file of the working tree, skipping VCS metadata and vendored modules.
fn list_files(root: &Path) -> Vec<String> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .follow_links(false)
        .git_ignore(true)
        .git_exclude(true)
        .git_global(false)
        .filter_entry(|e| {
            let name = e.file_name();
            name != ".git" && name != "node_modules"
        });

    let mut files = Vec::new();
    for entry in builder.build() {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        files.push(rel.to_string_lossy().replace('\\', "/"));
    }
    files.sort();
    files
}

/// `webpack:///./cypress/e2e/a.cy.js` → `cypress/e2e/a.cy.js`
fn normalize_frame_path(raw: &str) -> String {
    let raw = raw.trim().replace('\\', "/");
    let without_scheme = match raw.find("://") {
        Some(idx) => &raw[idx + 3..],
        None => raw.as_str(),
    };
    let mut path = without_scheme.trim_start_matches('/');
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.to_string()
}

fn is_test_source(file: &str) -> bool {
    Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TEST_SOURCE_EXTENSIONS.contains(&ext))
}

fn wait_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"cy\.wait\(\s*\d+|time\.sleep\(|Thread\.sleep\(|waitForTimeout\(|browser\.pause\(\s*\d+|\bsleep\s+\d+|\bsleep\(\s*\d+",
        )
        .expect("valid wait regex")
    })
}

/// A sleep for a fixed duration rather than a wait for a condition.
pub fn is_hardcoded_wait(line: &str) -> bool {
    let code = line.trim_start();
    !(code.starts_with("//") || code.starts_with('#')) && wait_re().is_match(code)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use ci_triage_core::{RepoRef, Severity};

    struct Dir {
        root: PathBuf,
        repo: RepoRef,
    }

    impl RepositorySnapshot for Dir {
        fn repo_ref(&self) -> &RepoRef {
            &self.repo
        }
        fn root(&self) -> &Path {
            &self.root
        }
    }

    fn fixture(files: &[(&str, &str)]) -> (tempfile::TempDir, Dir) {
        let temp = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = temp.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        let dir = Dir {
            root: temp.path().to_path_buf(),
            repo: RepoRef {
                url: "https://git/qe/e2e.git".into(),
                branch: "main".into(),
                commit: "4f2a9c1d0e".into(),
            },
        };
        (temp, dir)
    }

    const LOGIN_SPEC: &str = "describe('login', () => {\n  it('signs in', () => {\n    cy.visit('/');\n    cy.get('#login-btn').click();\n    cy.contains('Welcome');\n  });\n});\n";

    fn element_not_found(locations: Vec<SourceLocation>) -> ErrorSignature {
        let mut sig = ErrorSignature::new(
            "cypress-element-not-found",
            SignatureCategory::ElementNotFound,
            Severity::High,
            "Expected to find element: `#login-btn`, but never found it.",
            10,
        )
        .with_subject("#login-btn");
        sig.locations = locations;
        sig
    }

    #[test]
    fn test_bad_locator_from_absolute_frame() {
        let (_t, dir) = fixture(&[("cypress/e2e/login.cy.js", LOGIN_SPEC)]);
        let sig = element_not_found(vec![SourceLocation::new(
            "/var/lib/jenkins/workspace/e2e/cypress/e2e/login.cy.js",
            4,
        )]);
        let findings = inspect(&dir, &[sig], &InspectOptions::default());
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.kind, CodeFindingKind::BadLocator);
        assert_eq!(f.file, "cypress/e2e/login.cy.js");
        assert_eq!(f.lines, LineRange::single(4));
        assert_eq!(f.excerpt, "    cy.get('#login-btn').click();");
        assert_eq!(f.commit, "4f2a9c1d0e");
    }

    #[test]
    fn test_selector_search_without_location() {
        let (_t, dir) = fixture(&[
            ("cypress/e2e/login.cy.js", LOGIN_SPEC),
            ("README.md", "use #login-btn"),
        ]);
        let findings = inspect(&dir, &[element_not_found(vec![])], &InspectOptions::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].file, "cypress/e2e/login.cy.js");
        assert_eq!(findings[0].lines.start, 4);
    }

    #[test]
    fn test_hardcoded_wait_above_timeout_site() {
        let spec = "it('loads', () => {\n  cy.wait(5000);\n  cy.get('.table').should('be.visible');\n});\n";
        let (_t, dir) = fixture(&[("cypress/e2e/table.cy.js", spec)]);
        let sig = ErrorSignature::new(
            "timeout",
            SignatureCategory::Timeout,
            Severity::Medium,
            "Timed out retrying after 4000ms",
            3,
        )
        .with_location(SourceLocation::new("cypress/e2e/table.cy.js", 3));
        let findings = inspect(&dir, &[sig], &InspectOptions::default());
        assert_eq!(findings[0].kind, CodeFindingKind::HardcodedWait);
        assert_eq!(findings[0].lines, LineRange::single(2));
        assert_eq!(findings[0].excerpt, "  cy.wait(5000);");
    }

    #[test]
    fn test_assertion_site_and_dedupe() {
        let test = "def test_status(client):\n    resp = client.get('/api/users')\n    assert resp.status_code == 200\n";
        let (_t, dir) = fixture(&[("tests/test_users.py", test)]);
        let sig = ErrorSignature::new(
            "assertion",
            SignatureCategory::AssertionFailure,
            Severity::High,
            "AssertionError: assert 500 == 200",
            40,
        )
        .with_location(SourceLocation::new("tests/test_users.py", 3))
        .with_location(SourceLocation::new("./tests/test_users.py", 3));
        let findings = inspect(&dir, &[sig], &InspectOptions::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, CodeFindingKind::AssertionSite);
    }

    #[test]
    fn test_dependency_declared_and_missing() {
        let (_t, dir) = fixture(&[
            ("package.json", "{\n  \"devDependencies\": {\n    \"cypress\": \"13.0.0\"\n  }\n}\n"),
        ]);
        let declared = ErrorSignature::new(
            "node-missing-module",
            SignatureCategory::MissingDependency,
            Severity::High,
            "Error: Cannot find module 'cypress/types'",
            1,
        )
        .with_subject("cypress/types");
        let missing = ErrorSignature::new(
            "node-missing-module",
            SignatureCategory::MissingDependency,
            Severity::High,
            "Error: Cannot find module 'cypress-real-events'",
            2,
        )
        .with_subject("cypress-real-events");

        let findings = inspect(&dir, &[declared, missing], &InspectOptions::default());
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].kind, CodeFindingKind::DependencyDeclared);
        assert_eq!(findings[0].lines, LineRange::single(3));
        assert_eq!(findings[1].kind, CodeFindingKind::DependencyMissing);
        assert_eq!(findings[1].file, "package.json");
        assert_eq!(findings[1].excerpt, "{");
    }

    #[test]
    fn test_normalize_frame_path() {
        assert_eq!(normalize_frame_path("webpack:///./cypress/e2e/a.cy.js"), "cypress/e2e/a.cy.js");
        assert_eq!(normalize_frame_path("C:\\ws\\tests\\a.py"), "C:/ws/tests/a.py");
    }

    #[test]
    fn test_hardcoded_wait_patterns() {
        assert!(is_hardcoded_wait("    cy.wait(3000)"));
        assert!(is_hardcoded_wait("time.sleep(5)"));
        assert!(is_hardcoded_wait("await page.waitForTimeout(1000);"));
        assert!(!is_hardcoded_wait("cy.wait('@getUsers')"));
        assert!(!is_hardcoded_wait("// cy.wait(3000)"));
    }
}
