//! Services
//!
//! The phases of a triage run and the analyzer that sequences them.

pub mod analyzer;
pub mod extractor;
pub mod investigation;
pub mod solution;

pub use analyzer::{Analyzer, Phase, PhaseTracker};
pub use extractor::{parse_build_reference, Extractor, RuleTable, SignatureMatcher};
pub use investigation::{Investigation, Investigator};
pub use solution::{solve, ClassificationStrategy, EvidenceWeightedClassifier, Proposal};
