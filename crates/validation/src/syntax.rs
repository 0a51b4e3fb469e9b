//! Syntax Re-parse
//!
//! A proposed fix is only deliverable if the patched file still parses.
//! Source languages go through tree-sitter, JSON and TOML through their
//! serde parsers, everything else through a delimiter balance check.

use std::path::Path;

/// How a file is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Java,
    Go,
    Rust,
    Json,
    Toml,
    /// Delimiter balance only.
    Other,
}

impl SyntaxKind {
    pub fn for_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "py" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "mts" | "cts" => Self::TypeScript,
            "tsx" => Self::Tsx,
            "java" => Self::Java,
            "go" => Self::Go,
            "rs" => Self::Rust,
            "json" => Self::Json,
            "toml" => Self::Toml,
            _ => Self::Other,
        }
    }

    fn grammar(&self) -> Option<tree_sitter::Language> {
        let lang = match self {
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            // TSX grammar handles plain JS and JSX
            Self::JavaScript | Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Java => tree_sitter_java::LANGUAGE.into(),
            Self::Json | Self::Toml | Self::Other => return None,
        };
        Some(lang)
    }
}

/// Check that `content` parses as the language implied by `path`.
///
/// The error names the first offending line.
pub fn check_syntax(path: &str, content: &str) -> Result<(), String> {
    let kind = SyntaxKind::for_path(path);
    if let Some(lang) = kind.grammar() {
        return tree_sitter_check(&lang, content);
    }
    match kind {
        SyntaxKind::Json => serde_json::from_str::<serde_json::Value>(content)
            .map(|_| ())
            .map_err(|e| format!("invalid JSON at line {}: {}", e.line(), e)),
        SyntaxKind::Toml => content
            .parse::<toml::Table>()
            .map(|_| ())
            .map_err(|e| format!("invalid TOML: {}", e)),
        _ => check_balance(content),
    }
}

fn tree_sitter_check(lang: &tree_sitter::Language, content: &str) -> Result<(), String> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(lang)
        .map_err(|e| format!("grammar unavailable: {}", e))?;
    let tree = parser
        .parse(content, None)
        .ok_or_else(|| "parser produced no tree".to_string())?;

    let root = tree.root_node();
    if !root.has_error() {
        return Ok(());
    }
    let line = first_error(root).map(|n| n.start_position().row + 1).unwrap_or(1);
    Err(format!("syntax error near line {}", line))
}

fn first_error(node: tree_sitter::Node) -> Option<tree_sitter::Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}

/// Brackets must nest; quoted text is skipped, quotes close at end of line.
fn check_balance(content: &str) -> Result<(), String> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for c in line.chars() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '"' | '`' => quote = Some(c),
                '(' | '[' | '{' => stack.push((c, line_no)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        Some((open, at)) => {
                            return Err(format!(
                                "'{}' on line {} closes '{}' from line {}",
                                c, line_no, open, at
                            ))
                        }
                        None => return Err(format!("unmatched '{}' on line {}", c, line_no)),
                    }
                }
                _ => {}
            }
        }
    }
    match stack.pop() {
        Some((open, at)) => Err(format!("'{}' opened on line {} is never closed", open, at)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_path() {
        assert_eq!(SyntaxKind::for_path("cypress/e2e/login.cy.js"), SyntaxKind::JavaScript);
        assert_eq!(SyntaxKind::for_path("src/App.tsx"), SyntaxKind::Tsx);
        assert_eq!(SyntaxKind::for_path("tests/test_api.py"), SyntaxKind::Python);
        assert_eq!(SyntaxKind::for_path("pyproject.toml"), SyntaxKind::Toml);
        assert_eq!(SyntaxKind::for_path("Jenkinsfile"), SyntaxKind::Other);
    }

    #[test]
    fn test_javascript() {
        let ok = "it('signs in', () => {\n  cy.get('[data-testid=\"login-btn\"]').click();\n});\n";
        assert!(check_syntax("a.cy.js", ok).is_ok());
        let broken = "it('signs in', () => {\n  cy.get('[data-testid=\"login-btn\"]'.click();\n});\n";
        assert!(check_syntax("a.cy.js", broken).is_err());
    }

    #[test]
    fn test_python_reports_line() {
        assert!(check_syntax("t.py", "def test_x():\n    assert 1 == 1\n").is_ok());
        let err = check_syntax("t.py", "def test_x():\n    assert (1 == 1\n").unwrap_err();
        assert!(err.contains("line"));
    }

    #[test]
    fn test_go_java_rust() {
        assert!(check_syntax("a_test.go", "package a\n\nfunc TestX() {}\n").is_ok());
        assert!(check_syntax("A.java", "class A { void f() { int x = 1; } }\n").is_ok());
        assert!(check_syntax("lib.rs", "fn main() { let x = ; }\n").is_err());
    }

    #[test]
    fn test_json_and_toml() {
        assert!(check_syntax("package.json", "{\"a\": 1}").is_ok());
        assert!(check_syntax("package.json", "{\"a\": 1,}").is_err());
        assert!(check_syntax("Cargo.toml", "[package]\nname = \"x\"\n").is_ok());
        assert!(check_syntax("Cargo.toml", "[package\n").is_err());
    }

    #[test]
    fn test_balance_fallback() {
        assert!(check_syntax("run.groovy", "stage('x') {\n  sh \"echo }\"\n}\n").is_ok());
        let err = check_syntax("run.groovy", "stage('x') {\n  sh 'a'\n").unwrap_err();
        assert!(err.contains("line 1"));
        assert!(check_syntax("run.groovy", "foo(]").is_err());
    }
}
