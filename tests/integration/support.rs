//! In-process fakes for the three evidence sources.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ci_triage::services::extractor::{Extractor, RuleTable};
use ci_triage::services::investigation::Investigator;
use ci_triage::{AnalysisConfig, AnalysisConfigBuilder, Analyzer};
use ci_triage_core::{
    Artifact, BuildRef, BuildResult, ConnectivityResult, CoreError, CoreResult, FeatureResult,
    FeatureSpec, QualityWeights, RepoRef, RetryConfig,
};
use ci_triage_repository::{RepositoryProbe, SourceFetcher, CHECKOUT_PREFIX};
use ci_triage_sources::{BuildMetadata, BuildServer, EnvironmentProbe, SourceError, SourceResult};

pub const JOB: &str = "qa/e2e-login";
pub const NUMBER: u64 = 128;
pub const ENDPOINT: &str = "https://console.qa.example.com";
pub const REPO_URL: &str = "https://git.example.com/qa/e2e.git";
pub const BRANCH: &str = "main";
pub const COMMIT: &str = "3f9c2a7be41d5a60c8e7f1b2d4a6c8e0f1a2b3c4";

pub fn build_ref() -> String {
    format!("{}#{}", JOB, NUMBER)
}

// ============================================================================
// Build server
// ============================================================================

pub struct FakeJenkins {
    pub result: BuildResult,
    pub console: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub metadata_calls: AtomicUsize,
}

impl FakeJenkins {
    pub fn new(result: BuildResult, console: &str) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert("GIT_URL".to_string(), REPO_URL.to_string());
        parameters.insert("GIT_BRANCH".to_string(), format!("origin/{}", BRANCH));
        parameters.insert("GIT_COMMIT".to_string(), COMMIT.to_string());
        parameters.insert("CLUSTER_URL".to_string(), ENDPOINT.to_string());
        Self {
            result,
            console: Some(console.to_string()),
            parameters,
            metadata_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_environment(mut self) -> Self {
        self.parameters.remove("CLUSTER_URL");
        self
    }

    pub fn without_parameter(mut self, name: &str) -> Self {
        self.parameters.remove(name);
        self
    }
}

#[async_trait]
impl BuildServer for FakeJenkins {
    fn base_url(&self) -> Option<&str> {
        Some("https://jenkins.example.com")
    }

    async fn fetch_metadata(&self, build: &BuildRef) -> SourceResult<BuildMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if build.job != JOB || build.number != NUMBER {
            return Err(SourceError::NotFound(build.to_string()));
        }
        Ok(BuildMetadata {
            job: JOB.to_string(),
            number: NUMBER,
            url: format!("https://jenkins.example.com/job/qa/job/e2e-login/{}/", NUMBER),
            result: self.result,
            timestamp_ms: 1_760_000_000_000,
            duration_ms: 421_000,
            building: false,
            parameters: Some(self.parameters.clone()),
            git: None,
        })
    }

    async fn fetch_console(&self, build: &BuildRef) -> SourceResult<String> {
        self.console
            .clone()
            .ok_or_else(|| SourceError::Timeout(format!("{} consoleText", build)))
    }

    async fn fetch_artifacts(&self, _build: &BuildRef) -> SourceResult<Vec<Artifact>> {
        Ok(vec![Artifact {
            file_name: "results.xml".into(),
            relative_path: "reports/results.xml".into(),
            display_path: None,
        }])
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Answers every request with one fixed status, or not at all.
pub struct FakeEnvironment {
    pub status: Option<u16>,
}

impl FakeEnvironment {
    pub fn answering(status: u16) -> Self {
        Self { status: Some(status) }
    }

    pub fn unreachable() -> Self {
        Self { status: None }
    }
}

#[async_trait]
impl EnvironmentProbe for FakeEnvironment {
    async fn validate_connectivity(&self, endpoint: &str) -> ConnectivityResult {
        match self.status {
            Some(status) => ConnectivityResult::reachable(endpoint, status, 40, 3),
            None => ConnectivityResult::unreachable(endpoint, "connection refused", 3),
        }
    }

    async fn probe_feature(&self, endpoint: &str, feature: &FeatureSpec) -> FeatureResult {
        FeatureResult {
            feature: feature.name.clone(),
            url: format!("{}{}", endpoint, feature.path),
            status_code: self.status,
            passed: self.status.is_some_and(|s| s < 400),
            timestamp: Utc::now(),
            detail: String::new(),
        }
    }
}

// ============================================================================
// Repository
// ============================================================================

pub enum FetchBehavior {
    Files(Vec<(&'static str, &'static str)>),
    Fail,
    Hang,
}

pub struct FakeFetcher {
    pub behavior: FetchBehavior,
}

impl FakeFetcher {
    pub fn with_files(files: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            behavior: FetchBehavior::Files(files),
        }
    }

    pub fn failing() -> Self {
        Self {
            behavior: FetchBehavior::Fail,
        }
    }

    pub fn hanging() -> Self {
        Self {
            behavior: FetchBehavior::Hang,
        }
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, repo: &RepoRef, dest: &Path) -> CoreResult<String> {
        match &self.behavior {
            FetchBehavior::Files(files) => {
                for (path, content) in files {
                    let target = dest.join(path);
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(target, content)?;
                }
                Ok(repo.commit.clone())
            }
            FetchBehavior::Fail => Err(CoreError::command(format!(
                "git clone {}: Repository not found",
                repo.url
            ))),
            FetchBehavior::Hang => {
                std::fs::create_dir_all(dest)?;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(repo.commit.clone())
            }
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub fn config(workspace: &Path) -> AnalysisConfig {
    AnalysisConfigBuilder::new()
        .retry(RetryConfig::immediate(2))
        .workspace_root(workspace)
        .build()
        .unwrap()
}

pub fn analyzer(
    workspace: &Path,
    jenkins: FakeJenkins,
    environment: FakeEnvironment,
    fetcher: FakeFetcher,
) -> Analyzer {
    Analyzer::new(
        config(workspace),
        Arc::new(jenkins),
        Arc::new(environment),
        Arc::new(fetcher),
    )
    .unwrap()
}

/// Names of checkout directories still present under `workspace`.
pub fn checkout_dirs(workspace: &Path) -> Vec<String> {
    std::fs::read_dir(workspace)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|name| name.starts_with(CHECKOUT_PREFIX))
                .collect()
        })
        .unwrap_or_default()
}

pub fn investigator(
    workspace: &Path,
    jenkins: Arc<FakeJenkins>,
    environment: Arc<FakeEnvironment>,
    fetcher: FakeFetcher,
) -> Investigator {
    let config = config(workspace);
    let extractor = Extractor::new(jenkins, config.retry.clone(), Arc::new(RuleTable::builtin()));
    Investigator::new(
        extractor,
        environment,
        RepositoryProbe::with_fetcher(&config.repository, Arc::new(fetcher)),
        config.environment.clone(),
        QualityWeights::default(),
    )
}

// ============================================================================
// Fixtures
// ============================================================================

pub const LOGIN_SPEC: &str = "\
describe('Login', () => {
  beforeEach(() => {
    cy.visit('/login');
  });

  it('logs in with valid credentials', () => {
    cy.get('[data-testid=\"username\"]').type('qa-user');
    cy.get('[data-testid=\"password\"]').type('secret');
    cy.intercept('POST', '/api/session').as('login');

    // submit
    cy.get('#login-btn').click();
    cy.wait('@login');
    cy.url().should('include', '/dashboard');
  });
});
";

pub const LOGIN_CONSOLE: &str = "\
Started by timer
[Pipeline] sh
+ npx cypress run --spec cypress/e2e/login.cy.js
  Running:  login.cy.js                                                    (1 of 1)
  Login
    1) logs in with valid credentials
  0 passing (12s)
  1 failing
  1) Login
       logs in with valid credentials:
     AssertionError: Timed out retrying after 4000ms: Expected to find element: `#login-btn`, but never found it.
      at Context.eval (webpack:///./cypress/e2e/login.cy.js:12:8)
Finished: UNSTABLE
";

pub const USERS_SPEC: &str = "\
describe('Users', () => {
  it('lists users', () => {
    cy.request({ url: '/api/users', failOnStatusCode: false }).then((resp) => {
      expect(resp.status).to.eq(200);
    });
  });
});
";

pub const USERS_CONSOLE: &str = "\
+ npx cypress run --spec cypress/e2e/users.cy.js
  1) Users
       lists users:
     AssertionError: expected 500 to equal 200
      at Context.eval (webpack:///./cypress/e2e/users.cy.js:4:32)
GET https://console.qa.example.com/api/users 500 (Internal Server Error)
Finished: FAILURE
";

pub const SILENT_CONSOLE: &str = "\
Started by user qa-bot
+ ./run-suite.sh
exit code 1
Finished: FAILURE
";

/// Login spec whose failing selector is part of a double-quoted compound
/// selector on line 12.
pub const COMPOUND_LOGIN_SPEC: &str = "\
describe('Login', () => {
  beforeEach(() => {
    cy.visit('/login');
  });

  it('logs in with valid credentials', () => {
    cy.get('[data-testid=\"username\"]').type('qa-user');
    cy.get('[data-testid=\"password\"]').type('secret');
    cy.intercept('POST', '/api/session').as('login');

    // submit
    cy.get(\"#login-btn .label\").click();
    cy.wait('@login');
    cy.url().should('include', '/dashboard');
  });
});
";

/// Same as `COMPOUND_LOGIN_SPEC`, but an apostrophe in a block comment
/// precedes the selector on line 12.
pub const COMMENTED_LOGIN_SPEC: &str = "\
describe('Login', () => {
  beforeEach(() => {
    cy.visit('/login');
  });

  it('logs in with valid credentials', () => {
    cy.get('[data-testid=\"username\"]').type('qa-user');
    cy.get('[data-testid=\"password\"]').type('secret');
    cy.intercept('POST', '/api/session').as('login');

    // submit
    /* it's the primary button */ cy.get(\"#login-btn .label\").click();
    cy.wait('@login');
    cy.url().should('include', '/dashboard');
  });
});
";

pub fn login_repo() -> FakeFetcher {
    login_repo_with(LOGIN_SPEC)
}

pub fn login_repo_with(spec: &'static str) -> FakeFetcher {
    FakeFetcher::with_files(vec![
        ("package.json", "{\n  \"name\": \"e2e\",\n  \"devDependencies\": {\n    \"cypress\": \"^13.6.0\"\n  }\n}\n"),
        ("cypress/e2e/login.cy.js", spec),
    ])
}

pub fn users_repo() -> FakeFetcher {
    FakeFetcher::with_files(vec![
        ("package.json", "{\n  \"name\": \"e2e\"\n}\n"),
        ("cypress/e2e/users.cy.js", USERS_SPEC),
    ])
}
