//! Dependency Manifests
//!
//! Answers one question: does any manifest in the checkout declare a given
//! library? A failure may only be blamed on a missing library after this
//! check.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// A manifest file the checkout contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    PackageJson,
    Requirements,
    PyProject,
    Cargo,
    GoMod,
    Maven,
    Gradle,
}

impl ManifestKind {
    /// Recognize a manifest by file name.
    pub fn detect(path: &str) -> Option<Self> {
        let name = Path::new(path).file_name()?.to_str()?;
        match name {
            "package.json" => Some(Self::PackageJson),
            "pyproject.toml" => Some(Self::PyProject),
            "Cargo.toml" => Some(Self::Cargo),
            "go.mod" => Some(Self::GoMod),
            "pom.xml" => Some(Self::Maven),
            "build.gradle" | "build.gradle.kts" => Some(Self::Gradle),
            n if n.starts_with("requirements") && n.ends_with(".txt") => Some(Self::Requirements),
            _ => None,
        }
    }
}

/// Where a dependency is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// 1-based line of the declaration.
    pub line: u32,
    pub text: String,
}

/// Canonical package name for comparisons: lowercase, `_` and `.` as `-`.
fn canonical(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace(['_', '.'], "-")
}

/// Top-level package that an import name refers to.
///
/// `@scope/pkg/sub` → `@scope/pkg`, `lodash/fp` → `lodash`, `yaml.nodes` →
/// `pyyaml`. Relative imports yield `None`.
pub fn package_for_import(import: &str) -> Option<String> {
    let import = import.trim().trim_matches(|c| c == '\'' || c == '"' || c == '`');
    if import.is_empty() || import.starts_with('.') || import.starts_with('/') {
        return None;
    }
    if import.starts_with('@') {
        let mut parts = import.splitn(3, '/');
        let scope = parts.next()?;
        let name = parts.next()?;
        return Some(format!("{}/{}", scope, name));
    }
    let top = import
        .split(['/', '.'])
        .next()
        .unwrap_or(import);
    let known = match top {
        "yaml" => "pyyaml",
        "cv2" => "opencv-python",
        "PIL" => "pillow",
        "sklearn" => "scikit-learn",
        "bs4" => "beautifulsoup4",
        "dateutil" => "python-dateutil",
        other => other,
    };
    Some(known.to_string())
}

/// Find the line declaring `package` in a manifest's `content`.
pub fn find_declaration(kind: ManifestKind, content: &str, package: &str) -> Option<Declaration> {
    let wanted = canonical(package);
    let declared = match kind {
        ManifestKind::PackageJson => package_json_declares(content, &wanted),
        ManifestKind::PyProject => pyproject_declares(content, &wanted),
        ManifestKind::Cargo => cargo_declares(content, &wanted),
        ManifestKind::Requirements | ManifestKind::GoMod | ManifestKind::Maven | ManifestKind::Gradle => true,
    };
    if !declared {
        return None;
    }
    content
        .lines()
        .enumerate()
        .find(|(_, line)| line_declares(kind, line, &wanted))
        .map(|(idx, line)| Declaration {
            line: idx as u32 + 1,
            text: line.to_string(),
        })
}

fn package_json_declares(content: &str, wanted: &str) -> bool {
    let Ok(json) = serde_json::from_str::<Value>(content) else {
        return false;
    };
    ["dependencies", "devDependencies", "peerDependencies", "optionalDependencies"]
        .iter()
        .filter_map(|section| json.get(section).and_then(Value::as_object))
        .any(|deps| deps.keys().any(|k| canonical(k) == wanted))
}

fn pyproject_declares(content: &str, wanted: &str) -> bool {
    let Ok(doc) = content.parse::<toml::Table>() else {
        return false;
    };
    let pep621 = doc
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
        .map(|deps| {
            deps.iter()
                .filter_map(|d| d.as_str())
                .any(|d| canonical(requirement_name(d)) == wanted)
        })
        .unwrap_or(false);
    let optional = doc
        .get("project")
        .and_then(|p| p.get("optional-dependencies"))
        .and_then(|d| d.as_table())
        .map(|groups| {
            groups
                .values()
                .filter_map(|g| g.as_array())
                .flatten()
                .filter_map(|d| d.as_str())
                .any(|d| canonical(requirement_name(d)) == wanted)
        })
        .unwrap_or(false);
    let poetry = doc
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .map(|poetry| {
            let direct = ["dependencies", "dev-dependencies"]
                .iter()
                .filter_map(|s| poetry.get(s).and_then(|d| d.as_table()))
                .any(|t| t.keys().any(|k| canonical(k) == wanted));
            let grouped = poetry
                .get("group")
                .and_then(|g| g.as_table())
                .map(|groups| {
                    groups
                        .values()
                        .filter_map(|g| g.get("dependencies").and_then(|d| d.as_table()))
                        .any(|t| t.keys().any(|k| canonical(k) == wanted))
                })
                .unwrap_or(false);
            direct || grouped
        })
        .unwrap_or(false);
    pep621 || optional || poetry
}

fn cargo_declares(content: &str, wanted: &str) -> bool {
    let Ok(doc) = content.parse::<toml::Table>() else {
        return false;
    };
    ["dependencies", "dev-dependencies", "build-dependencies"]
        .iter()
        .filter_map(|s| doc.get(*s).and_then(|d| d.as_table()))
        .any(|t| t.keys().any(|k| canonical(k) == wanted))
}

/// Name part of a PEP 508 requirement string.
fn requirement_name(req: &str) -> &str {
    let end = req
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .unwrap_or(req.len());
    &req[..end]
}

fn gradle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"['"][\w.\-]+:([\w.\-]+)(?::[^'"]*)?['"]"#).expect("valid gradle regex")
    })
}

fn maven_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<artifactId>\s*([\w.\-]+)\s*</artifactId>").expect("valid maven regex"))
}

/// Whether one manifest line names `wanted`.
fn line_declares(kind: ManifestKind, line: &str, wanted: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.starts_with('#') || trimmed.starts_with("//") {
        return false;
    }
    match kind {
        ManifestKind::PackageJson => trimmed
            .strip_prefix('"')
            .and_then(|rest| rest.split_once('"'))
            .is_some_and(|(key, after)| canonical(key) == wanted && after.trim_start().starts_with(':')),
        ManifestKind::Requirements => {
            let spec = trimmed.split('#').next().unwrap_or("").trim();
            !spec.starts_with('-') && !spec.is_empty() && canonical(requirement_name(spec)) == wanted
        }
        ManifestKind::PyProject => {
            let unquoted = trimmed.trim_start_matches(['"', '\'']);
            let key = trimmed.split(['=', ' ']).next().unwrap_or("");
            canonical(requirement_name(unquoted)) == wanted || canonical(key) == wanted
        }
        ManifestKind::Cargo => {
            let key = trimmed.split(['=', ' ', '.']).next().unwrap_or("");
            canonical(key) == wanted
                || trimmed == format!("[dependencies.{}]", wanted)
                || trimmed == format!("[dev-dependencies.{}]", wanted)
        }
        ManifestKind::GoMod => {
            let module = trimmed.trim_start_matches("require").trim();
            let path = module.split_whitespace().next().unwrap_or("");
            !path.is_empty()
                && (canonical(path) == wanted
                    || path
                        .rsplit('/')
                        .next()
                        .is_some_and(|last| canonical(last) == wanted))
        }
        ManifestKind::Maven => maven_re()
            .captures(trimmed)
            .is_some_and(|c| canonical(&c[1]) == wanted),
        ManifestKind::Gradle => gradle_re()
            .captures_iter(trimmed)
            .any(|c| canonical(&c[1]) == wanted),
    }
}
