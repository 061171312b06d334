use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use log::{debug, info};

use crate::auth::Token;
use crate::chain::branch::DEFAULT_BRANCH;
use crate::chain::deferred::Deferred;
use crate::chain::log_check::LogCheckResult;
use crate::chain::single_build::{SingleBuildRunCtx, SuiteResults};
use crate::compactor::{InMemoryCompactor, StringCompactor};
use crate::error::Result;
use crate::model::{Build, BuildDetails, BuildRef};
use crate::server::CiServer;

use super::client::TeamCityClient;
use super::log_check::analyze_log;
use super::types::{BuildJson, BuildsJson, ChangesJson, ProblemOccurrencesJson, TestOccurrencesJson};

const BUILDS_PATH: &str = "/app/rest/latest/builds";
const BUILD_QUEUE_PATH: &str = "/app/rest/latest/buildQueue";
const PROBLEMS_PATH: &str = "/app/rest/latest/problemOccurrences";
const TESTS_PATH: &str = "/app/rest/latest/testOccurrences";
const CHANGES_PATH: &str = "/app/rest/latest/changes";
const BUILD_LOG_PATH: &str = "/downloadBuildLog.html";

/// Upper bound of finished builds listed per build type.
const FINISHED_BUILDS_LIMIT: usize = 100;

const BUILD_REF_FIELDS: &str = "build(id,buildTypeId,branchName,href,status,state)";
const TEST_FIELDS: &str =
    "testOccurrence(id,name,status,duration,muted,ignored,currentlyInvestigated,test(id))";

/// TeamCity server reached over its REST API.
pub struct TeamCityProvider {
    server_id: String,
    host: String,
    client: Arc<TeamCityClient>,
    compactor: Arc<InMemoryCompactor>,
}

impl TeamCityProvider {
    /// Creates a provider for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be parsed or the HTTP client
    /// cannot be built.
    pub fn new(
        server_id: impl Into<String>,
        base_url: &str,
        token: Option<Token>,
        max_concurrent_requests: usize,
    ) -> Result<Self> {
        let client = TeamCityClient::new(base_url, token, max_concurrent_requests)?;
        Ok(Self::with_client(server_id, client))
    }

    pub fn with_client(server_id: impl Into<String>, client: TeamCityClient) -> Self {
        Self {
            server_id: server_id.into(),
            host: client.base_url().to_string(),
            client: Arc::new(client),
            compactor: Arc::new(InMemoryCompactor::new()),
        }
    }

    fn branch_locator(branch: &str) -> String {
        if branch == DEFAULT_BRANCH {
            "branch:default:true".to_string()
        } else {
            format!("branch:(name:{})", Self::locator_value(branch))
        }
    }

    /// Locator dimension value; names with locator syntax in them are sent
    /// base64-encoded.
    fn locator_value(value: &str) -> String {
        if value.contains(['(', ')', ',', ':', '$']) {
            format!("$base64:{}", URL_SAFE_NO_PAD.encode(value))
        } else {
            value.to_string()
        }
    }

    fn finished_locator(build_type_id: &str, branch: &str) -> String {
        format!(
            "buildType:{build_type_id},{},state:finished,count:{FINISHED_BUILDS_LIMIT}",
            Self::branch_locator(branch)
        )
    }

    async fn list_builds(&self, path: &str, locator: Option<String>) -> Result<Vec<BuildRef>> {
        let mut query = vec![("fields", BUILD_REF_FIELDS.to_string())];
        if let Some(locator) = locator {
            query.push(("locator", locator));
        }

        let builds: Option<BuildsJson> = self.client.get_json(path, &query).await?;

        Ok(builds.map(BuildsJson::into_refs).unwrap_or_default())
    }
}

#[async_trait]
impl CiServer for TeamCityProvider {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn compactor(&self) -> Arc<dyn StringCompactor> {
        self.compactor.clone()
    }

    async fn get_build(&self, href: &str) -> Result<Build> {
        let build: Option<BuildJson> = self.client.get_json(href, &[]).await?;

        Ok(build.map_or_else(Build::fake_stub, BuildJson::into_model))
    }

    async fn get_finished_builds(&self, build_type_id: &str, branch: &str) -> Result<Vec<BuildRef>> {
        self.list_builds(BUILDS_PATH, Some(Self::finished_locator(build_type_id, branch)))
            .await
    }

    async fn get_finished_builds_include_sn_dep_failed(
        &self,
        build_type_id: &str,
        branch: &str,
    ) -> Result<Vec<BuildRef>> {
        let locator = format!(
            "{},failedToStart:any",
            Self::finished_locator(build_type_id, branch)
        );
        self.list_builds(BUILDS_PATH, Some(locator)).await
    }

    async fn get_running_builds(&self) -> Result<Vec<BuildRef>> {
        self.list_builds(BUILDS_PATH, Some("state:running,branch:default:any".to_string()))
            .await
    }

    async fn get_queued_builds(&self) -> Result<Vec<BuildRef>> {
        self.list_builds(BUILD_QUEUE_PATH, None).await
    }

    async fn load_build_details(&self, build: &Build) -> Result<BuildDetails> {
        let build_locator = format!("build:(id:{})", build.id);

        let problems_query = [("locator", build_locator.clone())];
        let tests_query = [
            ("locator", format!("{build_locator},count:-1")),
            ("fields", TEST_FIELDS.to_string()),
        ];
        let changes_query = [
            ("locator", build_locator.clone()),
            ("fields", "change(id,version,username)".to_string()),
        ];

        let (problems, tests, changes) = tokio::try_join!(
            self.client
                .get_json::<ProblemOccurrencesJson>(PROBLEMS_PATH, &problems_query),
            self.client
                .get_json::<TestOccurrencesJson>(TESTS_PATH, &tests_query),
            self.client.get_json::<ChangesJson>(CHANGES_PATH, &changes_query),
        )?;

        Ok(BuildDetails {
            problems: problems.unwrap_or_default().into_model(),
            tests: tests.unwrap_or_default().into_model(),
            changes: changes.unwrap_or_default().into_model(),
        })
    }

    fn analyze_build_log(
        &self,
        build_id: i64,
        ctx: Arc<SingleBuildRunCtx>,
    ) -> Deferred<LogCheckResult> {
        let client = Arc::clone(&self.client);
        debug!("Scheduling log analysis of build {build_id} ({})", ctx.suite_id());

        Deferred::spawn("build log analysis", async move {
            let log = client
                .get_text(BUILD_LOG_PATH, &[("buildId", build_id.to_string())])
                .await?
                .unwrap_or_default();

            let result = analyze_log(&log);
            info!(
                "Log of build {build_id} ({}) analysed: {} bytes, last started test {:?}",
                ctx.suite_id(),
                log.len(),
                result.last_started_test
            );

            Ok(result)
        })
    }
}
