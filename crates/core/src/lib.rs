//! CI Triage Core
//!
//! Data model, error types and the investigation context shared by every
//! crate of the CI triage workspace. This crate performs no I/O beyond
//! reading files out of an existing checkout.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `build` - Build references and records fetched from the CI server
//! - `signature` - Error signatures extracted from console logs
//! - `probe` - Environment connectivity and feature probe results
//! - `findings` - Repository coordinates, code findings, checkout access
//! - `evidence` - Typed, append-only observations
//! - `citation` - Claim-to-evidence bindings and their verification state
//! - `context` - `ContextBuilder` and the frozen `InvestigationContext`
//! - `config` / `builders` - `AnalysisConfig` and its builder
//! - `proxy` - Proxy configuration data types

pub mod build;
pub mod builders;
pub mod citation;
pub mod config;
pub mod context;
pub mod error;
pub mod evidence;
pub mod findings;
pub mod probe;
pub mod proxy;
pub mod signature;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Build & Signatures ─────────────────────────────────────────────────
pub use build::{
    Artifact, BuildField, BuildRecord, BuildRef, BuildResult, ClusterConnectivity, ClusterTopology,
    ClusterType, GitRevision,
};
pub use signature::{ErrorSignature, Severity, SignatureCategory, SourceLocation};

// ── Evidence ───────────────────────────────────────────────────────────
pub use evidence::{Evidence, EvidenceId, EvidenceKind, EvidenceLog, EvidenceReference, LineRange};
pub use findings::{same_commit, CodeFinding, CodeFindingKind, RepoRef, RepositorySnapshot};
pub use probe::{
    ConnectivityResult, EndpointHealth, FeatureResult, FeatureSpec, FEATURE_RESULT_CONFIDENCE,
};

// ── Citations ──────────────────────────────────────────────────────────
pub use citation::{
    Citation, CitationId, CitationReference, CitationType, Claim, Criticality, VerificationState,
};

// ── Context ────────────────────────────────────────────────────────────
pub use context::{
    ContextBuilder, EnvironmentPart, InvestigationContext, JenkinsPart, RepositoryPart,
    SourceReport, SourceStatus,
};

// ── Configuration ──────────────────────────────────────────────────────
pub use builders::AnalysisConfigBuilder;
pub use config::{
    AnalysisConfig, CustomRule, EnvironmentConfig, ExtractorConfig, JenkinsConfig, QualityWeights,
    RepositoryConfig, RetryConfig, ValidationConfig,
};

// ── Proxy Types ────────────────────────────────────────────────────────
pub use proxy::{ProxyConfig, ProxyProtocol};
