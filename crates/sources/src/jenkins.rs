//! Jenkins Build Server
//!
//! Read-only access to one build through the Jenkins JSON API:
//!
//! - `{base}/job/<a>/job/<b>/<n>/api/json` (metadata, parameters, git data)
//! - `{base}/job/<a>/job/<b>/<n>/consoleText`
//! - `{base}/job/<a>/job/<b>/<n>/api/json?tree=artifacts[...]`
//!
//! Every call is a single attempt; callers decide how to retry.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use ci_triage_core::{
    Artifact, BuildField, BuildRecord, BuildRef, BuildResult, GitRevision, JenkinsConfig,
    ProxyConfig,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{parse_http_error, SourceError, SourceResult};
use crate::http_client::{build_http_client, HttpClientOptions};

// ============================================================================
// BuildServer trait
// ============================================================================

/// Build metadata without console log and artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildMetadata {
    pub job: String,
    pub number: u64,
    pub url: String,
    pub result: BuildResult,
    pub timestamp_ms: i64,
    pub duration_ms: u64,
    pub building: bool,
    /// `None` when the server returned no actions at all.
    pub parameters: Option<BTreeMap<String, String>>,
    pub git: Option<GitRevision>,
}

impl BuildMetadata {
    /// Combine with whatever console log and artifact list could be fetched.
    pub fn into_record(self, console_log: Option<String>, artifacts: Option<Vec<Artifact>>) -> BuildRecord {
        let mut missing_fields = Vec::new();
        if console_log.is_none() {
            missing_fields.push(BuildField::ConsoleLog);
        }
        if artifacts.is_none() {
            missing_fields.push(BuildField::Artifacts);
        }
        if self.parameters.is_none() {
            missing_fields.push(BuildField::Parameters);
        }
        BuildRecord {
            job: self.job,
            number: self.number,
            url: self.url,
            result: self.result,
            timestamp_ms: self.timestamp_ms,
            duration_ms: self.duration_ms,
            building: self.building,
            parameters: self.parameters.unwrap_or_default(),
            git: self.git,
            console_log,
            artifacts,
            missing_fields,
        }
    }
}

/// The CI server as seen by the extractor and the validation engine.
#[async_trait]
pub trait BuildServer: Send + Sync {
    /// Base URL the server answers on, if known.
    fn base_url(&self) -> Option<&str>;

    async fn fetch_metadata(&self, build: &BuildRef) -> SourceResult<BuildMetadata>;

    async fn fetch_console(&self, build: &BuildRef) -> SourceResult<String>;

    async fn fetch_artifacts(&self, build: &BuildRef) -> SourceResult<Vec<Artifact>>;
}

// ============================================================================
// JenkinsClient
// ============================================================================

pub struct JenkinsClient {
    client: reqwest::Client,
    base_url: Option<String>,
    username: Option<String>,
    api_token: Option<String>,
    metadata_timeout: Duration,
    console_timeout: Duration,
    artifacts_timeout: Duration,
    max_console_bytes: usize,
}

impl JenkinsClient {
    pub fn new(config: &JenkinsConfig, proxy: Option<&ProxyConfig>) -> SourceResult<Self> {
        let options = HttpClientOptions {
            timeout: Duration::from_secs(config.console_timeout_secs.max(config.metadata_timeout_secs)),
            accept_invalid_certs: false,
        };
        Ok(Self {
            client: build_http_client(proxy, &options)?,
            base_url: config
                .base_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            username: config.username.clone(),
            api_token: config.api_token.clone(),
            metadata_timeout: Duration::from_secs(config.metadata_timeout_secs),
            console_timeout: Duration::from_secs(config.console_timeout_secs),
            artifacts_timeout: Duration::from_secs(config.artifacts_timeout_secs),
            max_console_bytes: config.max_console_bytes,
        })
    }

    /// `{base}/job/a/job/b/42/`. A build given by URL supplies its own base
    /// when none is configured.
    fn build_url(&self, build: &BuildRef) -> SourceResult<String> {
        let base = match (&self.base_url, &build.url) {
            (Some(base), _) => base.clone(),
            (None, Some(url)) => base_from_build_url(url).ok_or_else(|| {
                SourceError::invalid_response(format!("Cannot derive server URL from '{}'", url))
            })?,
            (None, None) => {
                return Err(SourceError::NotFound(format!(
                    "No Jenkins base URL configured for {}",
                    build
                )))
            }
        };
        Ok(format!("{}{}{}/", base, job_path(&build.job), build.number))
    }

    async fn get(&self, url: &str, timeout: Duration) -> SourceResult<reqwest::Response> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.api_token.as_ref());
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status, &body, "jenkins"));
        }
        Ok(response)
    }
}

#[async_trait]
impl BuildServer for JenkinsClient {
    fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    async fn fetch_metadata(&self, build: &BuildRef) -> SourceResult<BuildMetadata> {
        let url = format!("{}api/json", self.build_url(build)?);
        tracing::debug!("GET {}", url);
        let body = self.get(&url, self.metadata_timeout).await?.text().await?;
        parse_metadata(&build.job, &body)
    }

    async fn fetch_console(&self, build: &BuildRef) -> SourceResult<String> {
        let url = format!("{}consoleText", self.build_url(build)?);
        tracing::debug!("GET {}", url);
        let text = self.get(&url, self.console_timeout).await?.text().await?;
        Ok(keep_tail(text, self.max_console_bytes))
    }

    async fn fetch_artifacts(&self, build: &BuildRef) -> SourceResult<Vec<Artifact>> {
        let url = format!(
            "{}api/json?tree=artifacts[fileName,relativePath,displayPath]",
            self.build_url(build)?
        );
        tracing::debug!("GET {}", url);
        let body = self.get(&url, self.artifacts_timeout).await?.text().await?;
        parse_artifacts(&body)
    }
}

// ============================================================================
// URL helpers
// ============================================================================

/// `a/b` → `/job/a/job/b/`
pub fn job_path(job: &str) -> String {
    let mut path = String::new();
    for segment in job.split('/').filter(|s| !s.is_empty()) {
        path.push_str("/job/");
        path.push_str(&urlencoding::encode(segment));
    }
    path.push('/');
    path
}

/// Everything before the first `/job/` segment of a build URL.
pub fn base_from_build_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let idx = parsed.path().find("/job/")?;
    let prefix = &parsed.path()[..idx];
    let mut base = format!("{}://{}", parsed.scheme(), parsed.host_str()?);
    if let Some(port) = parsed.port() {
        base.push_str(&format!(":{}", port));
    }
    base.push_str(prefix.trim_end_matches('/'));
    Some(base)
}

fn keep_tail(text: String, max_bytes: usize) -> String {
    if max_bytes == 0 || text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    tracing::debug!("console log truncated to its last {} bytes", text.len() - start);
    text[start..].to_string()
}

// ============================================================================
// JSON mapping
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildJson {
    number: u64,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    building: bool,
    #[serde(default)]
    actions: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ArtifactsJson {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

pub fn parse_metadata(job: &str, body: &str) -> SourceResult<BuildMetadata> {
    let raw: BuildJson = serde_json::from_str(body)
        .map_err(|e| SourceError::invalid_response(format!("build metadata: {}", e)))?;

    let actions = raw.actions.unwrap_or_default();
    let parameters = if actions.is_empty() {
        None
    } else {
        Some(parameters_from_actions(&actions))
    };

    Ok(BuildMetadata {
        job: job.to_string(),
        number: raw.number,
        url: raw.url.unwrap_or_default(),
        result: BuildResult::from_jenkins(raw.result.as_deref()),
        timestamp_ms: raw.timestamp,
        duration_ms: raw.duration,
        building: raw.building,
        parameters,
        git: git_from_actions(&actions),
    })
}

pub fn parse_artifacts(body: &str) -> SourceResult<Vec<Artifact>> {
    let raw: ArtifactsJson = serde_json::from_str(body)
        .map_err(|e| SourceError::invalid_response(format!("artifact list: {}", e)))?;
    Ok(raw.artifacts)
}

fn class_of(action: &Value) -> &str {
    action.get("_class").and_then(Value::as_str).unwrap_or("")
}

fn parameters_from_actions(actions: &[Value]) -> BTreeMap<String, String> {
    let mut parameters = BTreeMap::new();
    let values = actions
        .iter()
        .filter(|a| class_of(a).ends_with("ParametersAction") || a.get("parameters").is_some())
        .filter_map(|a| a.get("parameters").and_then(Value::as_array))
        .flatten();
    for p in values {
        let Some(name) = p.get("name").and_then(Value::as_str) else {
            continue;
        };
        let value = match p.get("value") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => continue,
            Some(other) => other.to_string(),
        };
        parameters.insert(name.to_string(), value);
    }
    parameters
}

fn git_from_actions(actions: &[Value]) -> Option<GitRevision> {
    let data = actions
        .iter()
        .find(|a| class_of(a) == "hudson.plugins.git.util.BuildData" || a.get("lastBuiltRevision").is_some())?;
    let revision = data.get("lastBuiltRevision");

    let commit = revision
        .and_then(|r| r.get("SHA1"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let branch = revision
        .and_then(|r| r.get("branch"))
        .and_then(Value::as_array)
        .and_then(|b| b.first())
        .and_then(|b| b.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let remote_urls = data
        .get("remoteUrls")
        .and_then(Value::as_array)
        .map(|urls| urls.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    Some(GitRevision {
        branch,
        commit,
        remote_urls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"{
        "_class": "org.jenkinsci.plugins.workflow.job.WorkflowRun",
        "number": 42,
        "url": "https://ci.example.com/job/qe/job/e2e/42/",
        "result": "UNSTABLE",
        "timestamp": 1700000000000,
        "duration": 93000,
        "building": false,
        "actions": [
            {"_class": "hudson.model.CauseAction"},
            {},
            {"_class": "hudson.model.ParametersAction", "parameters": [
                {"_class": "hudson.model.StringParameterValue", "name": "CLUSTER_URL", "value": "https://console.env"},
                {"_class": "hudson.model.BooleanParameterValue", "name": "DISCONNECTED", "value": true}
            ]},
            {"_class": "hudson.plugins.git.util.BuildData",
             "lastBuiltRevision": {"SHA1": "4f2a9c1d0e", "branch": [{"SHA1": "4f2a9c1d0e", "name": "refs/remotes/origin/main"}]},
             "remoteUrls": ["https://git.example.com/qe/e2e.git"]}
        ]
    }"#;

    #[test]
    fn test_parse_metadata() {
        let meta = parse_metadata("qe/e2e", METADATA).unwrap();
        assert_eq!(meta.number, 42);
        assert_eq!(meta.result, BuildResult::Unstable);
        let params = meta.parameters.as_ref().unwrap();
        assert_eq!(params.get("CLUSTER_URL").map(String::as_str), Some("https://console.env"));
        assert_eq!(params.get("DISCONNECTED").map(String::as_str), Some("true"));
        let git = meta.git.as_ref().unwrap();
        assert_eq!(git.commit.as_deref(), Some("4f2a9c1d0e"));
        assert_eq!(git.branch.as_deref(), Some("refs/remotes/origin/main"));
        assert_eq!(git.remote_urls, vec!["https://git.example.com/qe/e2e.git"]);
    }

    #[test]
    fn test_into_record_marks_missing_fields() {
        let meta = parse_metadata("qe/e2e", METADATA).unwrap();
        let record = meta.into_record(Some("log".into()), None);
        assert_eq!(record.missing_fields, vec![BuildField::Artifacts]);
        assert_eq!(record.console_log.as_deref(), Some("log"));
    }

    #[test]
    fn test_parse_metadata_rejects_html() {
        assert!(matches!(
            parse_metadata("x", "<html>login</html>"),
            Err(SourceError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_artifacts() {
        let body = r#"{"_class":"x","artifacts":[{"displayPath":"report.xml","fileName":"report.xml","relativePath":"out/report.xml"}]}"#;
        let artifacts = parse_artifacts(body).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].relative_path, "out/report.xml");
    }

    #[test]
    fn test_job_path_and_base() {
        assert_eq!(job_path("qe/e2e tests"), "/job/qe/job/e2e%20tests/");
        assert_eq!(
            base_from_build_url("https://ci.example.com/jenkins/job/qe/job/e2e/42/").as_deref(),
            Some("https://ci.example.com/jenkins")
        );
        assert_eq!(
            base_from_build_url("http://localhost:8080/job/a/1/").as_deref(),
            Some("http://localhost:8080")
        );
        assert!(base_from_build_url("https://ci.example.com/view/all").is_none());
    }

    #[test]
    fn test_build_url_prefers_configured_base() {
        let config = JenkinsConfig {
            base_url: Some("https://ci.example.com/".into()),
            ..JenkinsConfig::default()
        };
        let client = JenkinsClient::new(&config, None).unwrap();
        let build = BuildRef::new("qe/e2e", 42);
        assert_eq!(
            client.build_url(&build).unwrap(),
            "https://ci.example.com/job/qe/job/e2e/42/"
        );
    }

    #[test]
    fn test_keep_tail() {
        assert_eq!(keep_tail("abcdef".into(), 3), "def");
        assert_eq!(keep_tail("abc".into(), 0), "abc");
    }
}
