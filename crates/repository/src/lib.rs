//! CI Triage Repository
//!
//! Everything the repository probe does against the automation code:
//!
//! - `resolve` - repository coordinates from build parameters and SCM data
//! - `git_ops` - async git CLI wrapper
//! - `checkout` - disposable, commit-exact checkouts
//! - `manifest` - dependency manifest lookups
//! - `inspect` - static inspection of signature sites
//! - `probe` - `RepositoryProbe`, the facade used by the investigation

pub mod checkout;
pub mod git_ops;
pub mod inspect;
pub mod manifest;
pub mod probe;
pub mod resolve;

pub use checkout::{checkout, GitFetcher, LocalCheckout, SourceFetcher, CHECKOUT_PREFIX};
pub use git_ops::{GitOps, GitResult};
pub use inspect::{inspect, is_hardcoded_wait, InspectOptions};
pub use manifest::{find_declaration, package_for_import, Declaration, ManifestKind};
pub use probe::RepositoryProbe;
pub use resolve::{normalize_branch, resolve_source};
