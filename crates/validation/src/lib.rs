//! CI Triage Validation
//!
//! Evidence Validation Engine: re-verifies every citation against its live
//! source before a triage result is delivered.
//!
//! - `models` - `DeliveryStatus`, `ValidationReport`, `CheckOutcome`
//! - `verifiers` - per-type checks (jenkins, environment, repository, fix)
//! - `syntax` - re-parse of patched files
//! - `engine` - `ValidationEngine::verify` / `verify_all`, auto-correction

pub mod engine;
pub mod models;
pub mod syntax;
pub mod verifiers;

pub use engine::ValidationEngine;
pub use models::{CheckOutcome, DeliveryStatus, ValidationReport};
pub use syntax::{check_syntax, SyntaxKind};
pub use verifiers::{apply_replacement, check_build, check_endpoint, check_fix, check_source};
