//! CI Triage - failure analysis for Jenkins builds
//!
//! Classifies a failed build as a product bug, an automation bug or an
//! automation gap, and only reports what it can cite. It includes:
//! - Build intelligence extraction (console signatures, cluster type)
//! - A two-phase evidence framework (investigation, then solution)
//! - Re-verification of every citation before delivery
//! - Configuration loading and data models

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use ci_triage_core::{AnalysisConfig, AnalysisConfigBuilder, BuildRef, Citation, Claim};
pub use ci_triage_validation::DeliveryStatus;
pub use models::{AnalysisResult, Classification, FixAction, FixProposal, Solution, Verdict};
pub use services::{Analyzer, ClassificationStrategy, SignatureMatcher};
pub use storage::ConfigService;
pub use utils::error::{AnalysisError, ErrorKind, TriageResult};
