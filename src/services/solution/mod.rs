//! Solution Phase
//!
//! A pure function of the frozen `InvestigationContext`:
//!
//! - `correlate` - context → the signals the verdict depends on
//! - `classifier` - `ClassificationStrategy` and its default scoring
//! - `fixes` - findings → `FixProposal`s
//! - `citations` - the ledger every claim sentence is cited through
//!
//! Only `fixes::assess_feasibility` reads the checkout. The citations
//! produced here are checked later by the validation engine, which may prune
//! the claims built on them.

pub mod citations;
pub mod classifier;
pub mod correlate;
pub mod fixes;

use std::collections::BTreeSet;

use ci_triage_core::{
    Citation, CitationId, Claim, CodeFinding, CodeFindingKind, Criticality, EvidenceId,
    EvidenceKind, InvestigationContext, SourceStatus,
};

use crate::models::{Classification, Escalation, Solution, Verdict};

pub use citations::CitationLedger;
pub use classifier::{ClassificationStrategy, Decision, EvidenceWeightedClassifier, VerdictScores};
pub use correlate::{correlate, Correlation, EnvironmentSignal};
pub use fixes::{assess_feasibility, propose, testid_selector};

/// How many console signatures are quoted in the rationale.
const QUOTED_SIGNATURES: usize = 3;

/// Everything the solution phase hands to validation.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub decision: Decision,
    pub classification: Classification,
    pub solution: Solution,
    pub citations: Vec<Citation>,
}

/// Which way a rationale claim points relative to the chosen verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stance {
    For,
    Against,
    Neutral,
}

struct Rationale<'a> {
    ledger: CitationLedger<'a>,
    claims: Vec<Claim>,
    supporting: BTreeSet<EvidenceId>,
    contradicting: BTreeSet<EvidenceId>,
}

impl<'a> Rationale<'a> {
    fn new(ctx: &'a InvestigationContext) -> Self {
        Self {
            ledger: CitationLedger::new(ctx),
            claims: Vec::new(),
            supporting: BTreeSet::new(),
            contradicting: BTreeSet::new(),
        }
    }

    fn push(&mut self, text: String, ids: Vec<CitationId>, stance: Stance) {
        if ids.is_empty() {
            return;
        }
        let evidence: Vec<EvidenceId> = ids.iter().filter_map(|id| self.evidence_of(*id)).collect();
        match stance {
            Stance::For => self.supporting.extend(evidence),
            Stance::Against => self.contradicting.extend(evidence),
            Stance::Neutral => {}
        }
        self.claims.push(Claim::new(text, ids));
    }

    fn evidence_of(&self, id: CitationId) -> Option<EvidenceId> {
        self.ledger.get(id).and_then(|c| c.evidence_id.clone())
    }
}

/// Classify the failure, propose fixes or an escalation, and cite every
/// sentence.
pub fn solve(ctx: &InvestigationContext, strategy: &dyn ClassificationStrategy) -> Proposal {
    let correlation = correlate(ctx);
    let decision = strategy.classify(&correlation, ctx.evidence_quality());
    let verdict = decision.verdict;
    tracing::info!(
        "classified {} as {} ({:.2}; product {:.2}, automation {:.2}, gap {:.2})",
        ctx.build().job,
        verdict,
        decision.confidence,
        decision.scores.product,
        decision.scores.automation,
        decision.scores.gap
    );

    let mut r = Rationale::new(ctx);

    // Build result
    let build = ctx.build();
    let text = format!("{}#{} finished with result {}", build.job, build.number, build.result);
    let id = r.ledger.build(&text, Criticality::ClassificationDetermining);
    r.push(text, vec![id], Stance::For);

    // Environment
    let mut environment_ids = Vec::new();
    if let Some(connectivity) = ctx.connectivity() {
        let drives_verdict = verdict == Verdict::ProductBug
            || (verdict == Verdict::AutomationBug && correlation.environment == EnvironmentSignal::Healthy);
        let criticality = if drives_verdict {
            Criticality::ClassificationDetermining
        } else {
            Criticality::Supporting
        };
        let text = format!(
            "The environment at {} answered {} when probed",
            connectivity.endpoint,
            connectivity.status_label()
        );
        let id = r.ledger.connectivity(connectivity, &text, criticality);
        let stance = match (verdict, correlation.environment) {
            (Verdict::ProductBug, _) => Stance::For,
            (_, EnvironmentSignal::Healthy) => Stance::For,
            (_, EnvironmentSignal::Broken) => Stance::Against,
            _ => Stance::Neutral,
        };
        environment_ids.push(id);
        r.push(text, vec![id], stance);
    }
    for feature in &correlation.failing_features {
        let criticality = if verdict == Verdict::ProductBug {
            Criticality::ClassificationDetermining
        } else {
            Criticality::Supporting
        };
        let status = feature
            .status_code
            .map(|s| format!("HTTP {}", s))
            .unwrap_or_else(|| "nothing".to_string());
        let text = format!("Feature {} at {} answered {}", feature.feature, feature.url, status);
        let id = r.ledger.feature(feature, &text, criticality);
        let stance = if verdict == Verdict::ProductBug {
            Stance::For
        } else {
            Stance::Against
        };
        environment_ids.push(id);
        r.push(text, vec![id], stance);
    }

    // Code findings
    let mut defect_ids = Vec::new();
    for finding in cited_findings(&correlation) {
        let (criticality, stance) = finding_weight(finding, verdict);
        let text = finding_sentence(finding);
        if let Some(id) = r.ledger.finding(finding, &text, criticality) {
            if finding.kind.is_defect() {
                defect_ids.push(id);
            }
            r.push(text, vec![id], stance);
        }
    }

    // Console signatures
    for signature in ctx.signatures().iter().take(QUOTED_SIGNATURES) {
        let text = format!(
            "The console log reports a {} error at line {}: {}",
            signature.category, signature.log_line, signature.message
        );
        let id = r.ledger.build(&text, Criticality::Supporting);
        r.push(text, vec![id], Stance::Neutral);
    }

    if decision.contested {
        let text = format!(
            "Both the environment and the automation code show faults, so {} is contested",
            verdict
        );
        let ids: Vec<CitationId> = environment_ids.iter().chain(defect_ids.iter()).copied().collect();
        r.push(text, ids, Stance::Neutral);
    }

    let solution = plan(ctx, &correlation, verdict, &mut r);

    let Rationale {
        ledger,
        claims,
        supporting,
        contradicting,
    } = r;
    let contradicting: Vec<EvidenceId> = contradicting.difference(&supporting).cloned().collect();

    Proposal {
        decision,
        classification: Classification {
            verdict,
            confidence: decision.confidence,
            supporting: supporting.into_iter().collect(),
            contradicting,
            rationale: claims,
        },
        solution,
        citations: ledger.into_citations(),
    }
}

/// Findings worth a rationale sentence: defects, gap signals and located
/// assertions.
fn cited_findings<'a>(correlation: &Correlation<'a>) -> Vec<&'a CodeFinding> {
    correlation
        .defects
        .iter()
        .chain(correlation.missing_dependencies.iter())
        .chain(correlation.assertion_sites.iter())
        .copied()
        .collect()
}

fn finding_weight(finding: &CodeFinding, verdict: Verdict) -> (Criticality, Stance) {
    let determining = match finding.kind {
        k if k.is_defect() => verdict == Verdict::AutomationBug,
        CodeFindingKind::DependencyMissing => verdict == Verdict::AutomationGap,
        _ => false,
    };
    if determining {
        return (Criticality::ClassificationDetermining, Stance::For);
    }
    let stance = if finding.kind.is_defect() && verdict == Verdict::ProductBug {
        Stance::Against
    } else {
        Stance::Neutral
    };
    (Criticality::Supporting, stance)
}

fn finding_sentence(finding: &CodeFinding) -> String {
    let mut text = format!("{}:{} contains a {}", finding.file, finding.lines, finding.kind.describe());
    if let Some(subject) = &finding.subject {
        text.push_str(&format!(" ({})", subject));
    }
    text
}

fn plan(
    ctx: &InvestigationContext,
    correlation: &Correlation<'_>,
    verdict: Verdict,
    r: &mut Rationale<'_>,
) -> Solution {
    let mut solution = Solution {
        notes: limitation_notes(ctx),
        ..Default::default()
    };

    match verdict {
        Verdict::ProductBug => {
            solution.escalation = Some(escalation(ctx, r));
        }
        Verdict::AutomationBug => {
            let targets: Vec<&CodeFinding> = if correlation.defects.is_empty() {
                correlation.assertion_sites.clone()
            } else {
                correlation.defects.clone()
            };
            solution.fixes = targets
                .into_iter()
                .filter_map(|f| propose(&mut r.ledger, f))
                .collect();
        }
        Verdict::AutomationGap => {
            solution.fixes = correlation
                .missing_dependencies
                .iter()
                .chain(correlation.defects.iter())
                .filter_map(|f| propose(&mut r.ledger, f))
                .collect();
        }
    }

    if verdict != Verdict::ProductBug && solution.fixes.is_empty() {
        solution
            .notes
            .push("no repository location was found to attach a code fix to".to_string());
    }
    solution
}

fn escalation(ctx: &InvestigationContext, r: &mut Rationale<'_>) -> Escalation {
    match ctx.connectivity() {
        Some(connectivity) => {
            let text = format!(
                "Escalate to the product team: {} answered {} during the run's triage",
                connectivity.endpoint,
                connectivity.status_label()
            );
            let id = r.ledger.connectivity(connectivity, &text, Criticality::Supporting);
            Escalation {
                summary: Claim::new(text, vec![id]),
                endpoint: Some(connectivity.endpoint.clone()),
            }
        }
        None => {
            let build = ctx.build();
            let text = format!(
                "Escalate to the product team: {}#{} failed on errors raised by the system under test",
                build.job, build.number
            );
            let id = r.ledger.build(&text, Criticality::Supporting);
            Escalation {
                summary: Claim::new(text, vec![id]),
                endpoint: None,
            }
        }
    }
}

/// Statements about what the analysis could not see. They are not factual
/// claims and carry no citations.
fn limitation_notes(ctx: &InvestigationContext) -> Vec<String> {
    let mut notes = Vec::new();
    for report in ctx.source_reports() {
        match report.status {
            SourceStatus::Unavailable => {
                let mut note = format!("{} evidence unavailable", report.kind.as_str());
                if let Some(error) = &report.error {
                    note.push_str(&format!(": {}", error));
                }
                notes.push(note);
            }
            SourceStatus::NotApplicable if report.kind == EvidenceKind::Environment => {
                notes.push("no environment endpoint declared; environment not checked".to_string());
            }
            _ => {}
        }
    }
    if !ctx.build().missing_fields.is_empty() {
        let missing: Vec<String> = ctx.build().missing_fields.iter().map(|f| f.to_string()).collect();
        notes.push(format!("build data incomplete: {} could not be fetched", missing.join(", ")));
    }
    if ctx.signatures().is_empty() {
        notes.push("no error signatures matched the console log".to_string());
    }
    notes
}
