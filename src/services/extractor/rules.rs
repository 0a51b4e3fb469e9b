//! Signature Rules
//!
//! Console log matching. `RuleTable` is an ordered table of
//! `pattern → category → severity` rules; the first rule that matches a
//! line wins. Stack frames that follow a match attach source locations to
//! it, and frames with no preceding match start a `stack_trace` signature.

use std::collections::HashMap;
use std::sync::OnceLock;

use ci_triage_core::{
    CoreError, CoreResult, CustomRule, ErrorSignature, ExtractorConfig, Severity,
    SignatureCategory, SourceLocation,
};
use regex::Regex;

/// Strategy for turning a console log into error signatures.
pub trait SignatureMatcher: Send + Sync {
    /// Never fails; a log with no recognizable failure yields nothing.
    fn extract(&self, log: &str) -> Vec<ErrorSignature>;
}

const ORPHAN_FRAME_RULE: &str = "stack-frame";
const MAX_MESSAGE_CHARS: usize = 500;
const MAX_LOCATIONS: usize = 10;

// ============================================================================
// Rule
// ============================================================================

#[derive(Debug, Clone)]
pub struct Rule {
    id: String,
    regex: Regex,
    category: SignatureCategory,
    severity: Severity,
    subject_group: Option<usize>,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        pattern: &str,
        category: SignatureCategory,
        severity: Severity,
        subject_group: Option<usize>,
    ) -> CoreResult<Self> {
        let id = id.into();
        let regex = Regex::new(pattern).map_err(|e| {
            CoreError::validation(format!("Rule '{}' has an invalid pattern: {}", id, e))
        })?;
        if let Some(group) = subject_group {
            if group == 0 || group >= regex.captures_len() {
                return Err(CoreError::validation(format!(
                    "Rule '{}' names capture group {} but the pattern has {}",
                    id,
                    group,
                    regex.captures_len() - 1
                )));
            }
        }
        Ok(Self {
            id,
            regex,
            category,
            severity,
            subject_group,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> SignatureCategory {
        self.category
    }

    fn apply(&self, line: &str, line_no: usize) -> Option<ErrorSignature> {
        let caps = self.regex.captures(line)?;
        let mut signature = ErrorSignature::new(
            self.id.clone(),
            self.category,
            self.severity,
            truncate(line.trim()),
            line_no,
        );
        let subject = self
            .subject_group
            .and_then(|g| caps.get(g))
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty());
        if let Some(subject) = subject {
            signature = signature.with_subject(subject);
        }
        Some(signature)
    }
}

impl TryFrom<&CustomRule> for Rule {
    type Error = CoreError;

    fn try_from(rule: &CustomRule) -> CoreResult<Self> {
        Rule::new(
            rule.id.clone(),
            &rule.pattern,
            rule.category,
            rule.severity,
            rule.subject_group,
        )
    }
}

// ============================================================================
// Built-in rules
// ============================================================================

type RuleSpec = (&'static str, &'static str, SignatureCategory, Severity, Option<usize>);

fn builtin_specs() -> Vec<RuleSpec> {
    use Severity::*;
    use SignatureCategory::*;
    vec![
        (
            "cypress-element-not-found",
            r#"Expected to find element:?\s*[`'"]([^`'"]+)[`'"],? but never found it"#,
            ElementNotFound,
            High,
            Some(1),
        ),
        (
            "selenium-no-such-element",
            r#"Unable to locate element:\s*\{\s*"method"\s*:\s*"[^"]+"\s*,\s*"selector"\s*:\s*"([^"]+)"\s*\}"#,
            ElementNotFound,
            High,
            Some(1),
        ),
        (
            "playwright-locator",
            r#"waiting for (?:locator|selector)\(\s*['"]([^'"]+)['"]\s*\)"#,
            ElementNotFound,
            High,
            Some(1),
        ),
        (
            "no-such-element",
            r"NoSuchElement(?:Exception|Error)",
            ElementNotFound,
            High,
            None,
        ),
        (
            "node-missing-module",
            r"Cannot find module '([^']+)'",
            MissingDependency,
            High,
            Some(1),
        ),
        (
            "python-missing-module",
            r"ModuleNotFoundError: No module named '([^']+)'",
            MissingDependency,
            High,
            Some(1),
        ),
        (
            "python-import-error",
            r"ImportError: No module named '?([\w.]+)'?",
            MissingDependency,
            High,
            Some(1),
        ),
        (
            "go-missing-package",
            r"no required module provides package ([\w./\-]+)",
            MissingDependency,
            High,
            Some(1),
        ),
        (
            "auth-failure",
            r"(?i)\b401\b.*unauthori[sz]ed|\b403\b.*forbidden|authentication failed|invalid credentials|permission denied \(publickey",
            AuthenticationFailure,
            High,
            None,
        ),
        (
            "http-request-error",
            r#"\b(?:GET|POST|PUT|DELETE|PATCH|HEAD)\s+(?:https?://[^/\s]+)?(/[^\s?"'#]*)\S*\s+(?:\S+\s+)?([45]\d\d)\b"#,
            HttpError,
            High,
            Some(1),
        ),
        (
            "python-http-error",
            r"HTTPError: [45]\d\d [^:]*: .*? for url: https?://[^/\s]+(/[^\s?]*)",
            HttpError,
            High,
            Some(1),
        ),
        (
            "http-server-error",
            r"(?i)(?:status code|status:|HTTP/\d(?:\.\d)?)\s*5\d\d\b|^\s*>\s*5\d\d: ",
            HttpError,
            Medium,
            None,
        ),
        (
            "assertion-failure",
            r"AssertionError|AssertionFailedError|ComparisonFailure|\bexpected .+ to (?:deep )?(?:equal|eq|be|have|include|contain|match)\b|^\s*E\s+assert ",
            AssertionFailure,
            High,
            None,
        ),
        (
            "connection-error",
            r"(?i)ECONNREFUSED|ECONNRESET|ENOTFOUND|EHOSTUNREACH|ETIMEDOUT|connection refused|failed to establish a new connection|could not resolve host|getaddrinfo|no route to host|UnknownHostException|ConnectException|socket hang up",
            ConnectionError,
            High,
            None,
        ),
        (
            "timeout",
            r"(?i)timed out|TimeoutError|TimeoutException|timeout of \d+ms exceeded|timeout \d+ms exceeded|exceeded (?:the )?timeout",
            Timeout,
            Medium,
            None,
        ),
        (
            "infrastructure",
            r"(?i)OutOfMemoryError|no space left on device|^\s*Killed\s*$|agent went offline|ChannelClosedException|Cannot contact [\w.\-]+:|FATAL: (?:command execution failed|Remote call on)|docker: Error response from daemon",
            Infrastructure,
            Critical,
            None,
        ),
    ]
}

// ============================================================================
// Stack frames
// ============================================================================

fn frame_patterns() -> &'static [Regex] {
    static FRAMES: OnceLock<Vec<Regex>> = OnceLock::new();
    FRAMES.get_or_init(|| {
        [
            // JavaScript / TypeScript: "at fn (file.js:12:8)" or "at file.js:12"
            r"\bat (?:[^()]*?\()?((?:[A-Za-z]:)?[^\s()]+?\.(?:js|jsx|ts|tsx|mjs|cjs)):(\d+)(?::\d+)?\)?",
            // Python traceback
            r#"File "([^"]+)", line (\d+)"#,
            // JVM
            r"\bat [\w.$<>]+\(([\w$]+\.(?:java|kt|groovy|scala)):(\d+)\)",
            // path:line at the start of a line (pytest summaries, go test, compilers)
            r"^\s*(/?(?:[\w.\-]+/)*[\w.\-]+\.(?:py|go|rb|js|jsx|ts|tsx|java|kt|cs|rs|feature|robot)):(\d+)\b",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ansi regex"))
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid digits regex"))
}

const IGNORED_FRAME_PATHS: &[&str] = &[
    "node_modules/",
    "__cypress/",
    "cypress_runner",
    "node:internal",
    "site-packages/",
    "dist-packages/",
    "<anonymous>",
    "/usr/lib/",
];

/// The source location a stack-frame line points at, if it is one.
pub fn parse_frame(line: &str) -> Option<SourceLocation> {
    frame_patterns().iter().find_map(|re| {
        let caps = re.captures(line)?;
        let file = caps.get(1)?.as_str();
        let line_no: u32 = caps.get(2)?.as_str().parse().ok()?;
        if line_no == 0 || IGNORED_FRAME_PATHS.iter().any(|p| file.contains(p)) {
            return None;
        }
        Some(SourceLocation::new(file, line_no))
    })
}

// ============================================================================
// RuleTable
// ============================================================================

/// Ordered, extensible rule table. The default `SignatureMatcher`.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    stack_window: usize,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleTable {
    pub fn builtin() -> Self {
        let rules = builtin_specs()
            .into_iter()
            .filter_map(|(id, pattern, category, severity, group)| {
                Rule::new(id, pattern, category, severity, group).ok()
            })
            .collect();
        Self {
            rules,
            stack_window: ExtractorConfig::default().stack_window,
        }
    }

    /// Built-in rules followed by the configured custom rules.
    pub fn from_config(config: &ExtractorConfig) -> CoreResult<Self> {
        let mut table = Self::builtin().with_stack_window(config.stack_window);
        for custom in &config.custom_rules {
            table.push(Rule::try_from(custom)?);
        }
        Ok(table)
    }

    pub fn with_stack_window(mut self, lines: usize) -> Self {
        self.stack_window = lines;
        self
    }

    /// Append a rule after every existing one.
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    fn match_line(&self, line: &str, line_no: usize) -> Option<ErrorSignature> {
        self.rules.iter().find_map(|rule| rule.apply(line, line_no))
    }
}

impl SignatureMatcher for RuleTable {
    fn extract(&self, log: &str) -> Vec<ErrorSignature> {
        let mut signatures: Vec<ErrorSignature> = Vec::new();
        let mut folded: HashMap<(String, Option<String>, String), usize> = HashMap::new();
        // (signature index, log line the window is measured from)
        let mut anchor: Option<(usize, usize)> = None;

        for (idx, raw) in log.lines().enumerate() {
            let line_no = idx + 1;
            let line = ansi_re().replace_all(raw, "");
            let frame = parse_frame(&line);

            let matched = self.match_line(&line, line_no).or_else(|| {
                let in_window = anchor.is_some_and(|(_, at)| line_no - at <= self.stack_window);
                match (&frame, in_window) {
                    (Some(_), false) => Some(ErrorSignature::new(
                        ORPHAN_FRAME_RULE,
                        SignatureCategory::StackTrace,
                        Severity::Medium,
                        truncate(line.trim()),
                        line_no,
                    )),
                    _ => None,
                }
            });

            let target = match matched {
                Some(signature) => {
                    let key = (
                        signature.rule_id.clone(),
                        signature.subject.clone(),
                        digits_re().replace_all(&signature.message, "#").into_owned(),
                    );
                    let target = match folded.get(&key) {
                        Some(&existing) => {
                            signatures[existing].occurrences += 1;
                            existing
                        }
                        None => {
                            signatures.push(signature);
                            folded.insert(key, signatures.len() - 1);
                            signatures.len() - 1
                        }
                    };
                    anchor = Some((target, line_no));
                    Some(target)
                }
                None => anchor.map(|(target, _)| target),
            };

            if let (Some(location), Some(target)) = (frame, target) {
                let locations = &mut signatures[target].locations;
                if !locations.contains(&location) && locations.len() < MAX_LOCATIONS {
                    locations.push(location);
                }
            }
        }

        tracing::debug!("matched {} error signatures", signatures.len());
        signatures
    }
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
    cut.push('…');
    cut
}
