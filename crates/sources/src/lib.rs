//! CI Triage Sources
//!
//! HTTP-backed evidence sources:
//! - `BuildServer` / `JenkinsClient`: build metadata, console log, artifacts
//! - `EnvironmentProbe` / `HttpEnvironmentProbe`: health and feature checks
//!
//! Also includes the HTTP client factory and the bounded retry helper used
//! by every caller of these sources.

pub mod environment;
pub mod error;
pub mod http_client;
pub mod jenkins;
pub mod retry;

pub use environment::{EnvironmentProbe, HttpEnvironmentProbe};
pub use error::{parse_http_error, SourceError, SourceResult};
pub use http_client::{build_http_client, HttpClientOptions};
pub use jenkins::{base_from_build_url, job_path, BuildMetadata, BuildServer, JenkinsClient};
pub use retry::{retry, retry_counted, Attempted};
