//! Fix Generation
//!
//! Turns located code findings into `FixProposal`s. Only a stale locator
//! gets a mechanical edit; everything else becomes review guidance on the
//! implicated lines. Feasibility is settled afterwards against the live
//! checkout by `assess_feasibility`.

use ci_triage_core::{
    Citation, CitationId, CitationReference, Claim, CodeFinding, CodeFindingKind, Criticality,
    RepositorySnapshot,
};

use super::citations::CitationLedger;
use crate::models::{FixAction, FixProposal, FixTarget, Solution};

/// Selector rewritten to a `data-testid` attribute selector.
///
/// The quote style is chosen so the replacement can sit inside the string
/// literal that encloses the selector in `excerpt`. `None` when nothing
/// usable is left after sanitizing.
pub fn testid_selector(selector: &str, excerpt: &str) -> Option<String> {
    let mut id = String::with_capacity(selector.len());
    for ch in selector.trim().trim_start_matches(['#', '.']).chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            id.push(ch.to_ascii_lowercase());
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }
    let id = id.trim_matches('-');
    if id.is_empty() {
        return None;
    }

    let replacement = match enclosing_quote(excerpt, selector) {
        Some('"') => format!("[data-testid='{}']", id),
        _ => format!("[data-testid=\"{}\"]", id),
    };
    (replacement != selector).then_some(replacement)
}

/// Quote character of the string literal open at the first occurrence of
/// `needle` in `line`, honoring backslash escapes.
fn enclosing_quote(line: &str, needle: &str) -> Option<char> {
    let at = line.find(needle)?;
    let mut open: Option<char> = None;
    let mut escaped = false;
    for ch in line[..at].chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (open, ch) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => open = None,
            (None, '"' | '\'' | '`') => open = Some(ch),
            _ => {}
        }
    }
    open
}

/// Proposal for one finding, with its citations written to `ledger`.
///
/// `None` for findings that do not call for a change, or that cannot be
/// cited because no source text was captured.
pub fn propose(ledger: &mut CitationLedger<'_>, finding: &CodeFinding) -> Option<FixProposal> {
    let target = FixTarget {
        file: finding.file.clone(),
        lines: finding.lines,
    };
    let location = format!("{}:{}", finding.file, finding.lines);

    match finding.kind {
        CodeFindingKind::BadLocator => {
            let selector = finding.subject.as_deref()?;
            let text = format!(
                "{} uses the selector {} that the failing run could not find",
                location, selector
            );
            let source = ledger.finding(finding, &text, Criticality::Supporting)?;

            if let Some(replacement) = testid_selector(selector, &finding.excerpt) {
                let edit = format!("Replace {} with {} at {}", selector, replacement, location);
                let fix = ledger.fix(&finding.file, finding.lines, selector, &replacement, &edit);
                return Some(FixProposal {
                    target,
                    action: FixAction::Replace {
                        original: selector.to_string(),
                        replacement,
                    },
                    rationale: Claim::new(text, vec![source, fix]),
                    feasible: false,
                });
            }
            Some(review(
                target,
                format!("Give the element targeted by {} a stable data-testid and select by it", selector),
                text,
                source,
            ))
        }
        CodeFindingKind::HardcodedWait => {
            let text = format!("{} waits a fixed amount of time instead of for a condition", location);
            let source = ledger.finding(finding, &text, Criticality::Supporting)?;
            Some(review(
                target,
                "Replace the fixed wait with an explicit wait on the element or request the test depends on"
                    .to_string(),
                text,
                source,
            ))
        }
        CodeFindingKind::AssertionSite => {
            let text = format!("The failing assertion is at {}", location);
            let source = ledger.finding(finding, &text, Criticality::Supporting)?;
            Some(review(
                target,
                "Check the expected value of this assertion against the current product behavior".to_string(),
                text,
                source,
            ))
        }
        CodeFindingKind::DependencyMissing => {
            let name = finding.subject.as_deref().unwrap_or("the missing module");
            let text = format!("{} does not declare {}", location, name);
            let source = ledger.finding(finding, &text, Criticality::Supporting)?;
            Some(review(
                target,
                format!("Declare {} in this manifest or install it in the job's setup", name),
                text,
                source,
            ))
        }
        CodeFindingKind::FailureSite | CodeFindingKind::DependencyDeclared => None,
    }
}

/// Mark each fix feasible when its target lines exist in the checkout and
/// still hold the text its rationale quotes, and the text to replace.
pub fn assess_feasibility(
    solution: &mut Solution,
    citations: &[Citation],
    snapshot: Option<&dyn RepositorySnapshot>,
) {
    for fix in &mut solution.fixes {
        let feasible = snapshot.is_some_and(|s| target_holds(s, fix, citations));
        fix.feasible = feasible;
    }
}

fn target_holds(snapshot: &dyn RepositorySnapshot, fix: &FixProposal, citations: &[Citation]) -> bool {
    let Ok(content) = snapshot.read_file(&fix.target.file) else {
        return false;
    };
    let Some(region) = fix.target.lines.extract(&content) else {
        return false;
    };
    if let FixAction::Replace { original, .. } = &fix.action {
        if !region.contains(original.as_str()) {
            return false;
        }
    }
    fix.rationale
        .citations
        .iter()
        .filter_map(|id| citations.iter().find(|c| c.id == *id))
        .find_map(|c| match &c.reference {
            CitationReference::Source { file, excerpt, .. } if *file == fix.target.file => Some(excerpt),
            _ => None,
        })
        .is_some_and(|excerpt| region.contains(excerpt.as_str()))
}

fn review(
    target: FixTarget,
    guidance: String,
    text: String,
    source: CitationId,
) -> FixProposal {
    FixProposal {
        target,
        action: FixAction::Review { guidance },
        rationale: Claim::new(text, vec![source]),
        feasible: false,
    }
}
