//! Citation Ledger
//!
//! Issues citations in creation order while the solution phase writes its
//! claims. Every reference is built from the frozen context so that the
//! validation engine can re-check it against the same source.

use ci_triage_core::{
    BuildRecord, Citation, CitationId, CitationReference, CodeFinding, ConnectivityResult,
    Criticality, EvidenceReference, FeatureResult, InvestigationContext, LineRange,
};

#[derive(Debug)]
pub struct CitationLedger<'a> {
    ctx: &'a InvestigationContext,
    citations: Vec<Citation>,
}

impl<'a> CitationLedger<'a> {
    pub fn new(ctx: &'a InvestigationContext) -> Self {
        Self {
            ctx,
            citations: Vec::new(),
        }
    }

    fn issue(
        &mut self,
        claim: &str,
        reference: CitationReference,
        criticality: Criticality,
        evidence: Option<EvidenceReference>,
    ) -> CitationId {
        let id = CitationId(self.citations.len() as u32 + 1);
        let mut citation = Citation::new(id, claim, reference, criticality);
        if let Some(evidence) = evidence.and_then(|r| self.ctx.evidence_for_reference(&r)) {
            citation = citation.with_evidence(evidence.id().clone());
        }
        self.citations.push(citation);
        id
    }

    /// Cite the build's recorded result.
    pub fn build(&mut self, claim: &str, criticality: Criticality) -> CitationId {
        let record: &BuildRecord = self.ctx.build();
        let reference = CitationReference::Build {
            job: record.job.clone(),
            number: record.number,
            result: record.result,
            timestamp_ms: record.timestamp_ms,
        };
        let evidence = EvidenceReference::Build {
            job: record.job.clone(),
            number: record.number,
            result: record.result,
            timestamp_ms: record.timestamp_ms,
        };
        self.issue(claim, reference, criticality, Some(evidence))
    }

    pub fn connectivity(
        &mut self,
        connectivity: &ConnectivityResult,
        claim: &str,
        criticality: Criticality,
    ) -> CitationId {
        self.endpoint(
            &connectivity.endpoint,
            connectivity.status_code,
            connectivity.timestamp,
            claim,
            criticality,
        )
    }

    pub fn feature(&mut self, feature: &FeatureResult, claim: &str, criticality: Criticality) -> CitationId {
        self.endpoint(&feature.url, feature.status_code, feature.timestamp, claim, criticality)
    }

    fn endpoint(
        &mut self,
        url: &str,
        status: Option<u16>,
        captured_at: chrono::DateTime<chrono::Utc>,
        claim: &str,
        criticality: Criticality,
    ) -> CitationId {
        let reference = CitationReference::Endpoint {
            url: url.to_string(),
            status,
            captured_at,
        };
        let evidence = EvidenceReference::Endpoint {
            url: url.to_string(),
            status,
            captured_at,
        };
        self.issue(claim, reference, criticality, Some(evidence))
    }

    /// Cite a finding's lines. `None` when the finding has no text to quote.
    pub fn finding(
        &mut self,
        finding: &CodeFinding,
        claim: &str,
        criticality: Criticality,
    ) -> Option<CitationId> {
        let excerpt = finding.excerpt.trim();
        if excerpt.is_empty() {
            return None;
        }
        let reference = CitationReference::Source {
            branch: finding.branch.clone(),
            file: finding.file.clone(),
            lines: finding.lines,
            commit: finding.commit.clone(),
            excerpt: excerpt.to_string(),
        };
        Some(self.issue(claim, reference, criticality, Some(finding.reference())))
    }

    /// Cite a proposed edit. It has no evidence of its own.
    pub fn fix(
        &mut self,
        file: &str,
        lines: LineRange,
        original: &str,
        replacement: &str,
        claim: &str,
    ) -> CitationId {
        let reference = CitationReference::Fix {
            file: file.to_string(),
            lines,
            original: original.to_string(),
            replacement: replacement.to_string(),
        };
        self.issue(claim, reference, Criticality::Supporting, None)
    }

    pub fn get(&self, id: CitationId) -> Option<&Citation> {
        self.citations.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.citations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    pub fn into_citations(self) -> Vec<Citation> {
        self.citations
    }
}
