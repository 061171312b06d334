use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::deferred::Deferred;
use crate::chain::log_check::LogCheckResult;
use crate::chain::single_build::SingleBuildRunCtx;
use crate::compactor::StringCompactor;
use crate::error::Result;
use crate::model::{Build, BuildDetails, BuildRef};

/// Everything the chain engine needs from a CI server.
///
/// Lookups of builds that do not exist return fake stubs instead of errors;
/// an `Err` always means the server could not be asked.
#[async_trait]
pub trait CiServer: Send + Sync {
    /// Stable identity of the server, used to pick per-server settings.
    fn server_id(&self) -> &str;

    /// Web root of the server, ending with `/`.
    fn host(&self) -> &str;

    fn compactor(&self) -> Arc<dyn StringCompactor>;

    async fn get_build(&self, href: &str) -> Result<Build>;

    /// Finished builds of a build type on a branch (the default-branch
    /// sentinel selects the default branch).
    async fn get_finished_builds(&self, build_type_id: &str, branch: &str) -> Result<Vec<BuildRef>>;

    /// Like [`CiServer::get_finished_builds`], also listing builds that
    /// failed because of a snapshot dependency.
    async fn get_finished_builds_include_sn_dep_failed(
        &self,
        build_type_id: &str,
        branch: &str,
    ) -> Result<Vec<BuildRef>>;

    async fn get_running_builds(&self) -> Result<Vec<BuildRef>>;

    async fn get_queued_builds(&self) -> Result<Vec<BuildRef>>;

    /// Problems, tests and changes of a build.
    async fn load_build_details(&self, build: &Build) -> Result<BuildDetails>;

    /// Starts log analysis in the background. Must not block.
    fn analyze_build_log(
        &self,
        build_id: i64,
        ctx: Arc<SingleBuildRunCtx>,
    ) -> Deferred<LogCheckResult>;
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::compactor::InMemoryCompactor;

    pub(crate) fn href(id: i64) -> String {
        format!("/app/rest/latest/builds/id:{id}")
    }

    pub(crate) fn build_ref(id: i64, build_type_id: &str) -> BuildRef {
        BuildRef::new(id, build_type_id, None, href(id))
    }

    pub(crate) fn build(id: i64, build_type_id: &str) -> Build {
        Build {
            id,
            build_type_id: build_type_id.to_string(),
            build_type_name: format!("{build_type_id} Suite"),
            project_id: "Project".to_string(),
            href: href(id),
            ..Build::default()
        }
    }

    /// In-memory server with call counters.
    #[derive(Default)]
    pub(crate) struct FakeCiServer {
        pub compactor: Arc<InMemoryCompactor>,
        pub builds: HashMap<String, Build>,
        pub details: HashMap<i64, BuildDetails>,
        pub finished: HashMap<(String, String), Vec<BuildRef>>,
        pub running: Vec<BuildRef>,
        pub queued: Vec<BuildRef>,
        pub log_result: Option<LogCheckResult>,
        pub get_build_calls: AtomicUsize,
        pub running_calls: AtomicUsize,
        pub queued_calls: AtomicUsize,
        pub analyzed: Mutex<Vec<i64>>,
    }

    impl FakeCiServer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_build(mut self, build: Build) -> Self {
            self.builds.insert(build.href.clone(), build);
            self
        }

        pub fn with_details(mut self, id: i64, details: BuildDetails) -> Self {
            self.details.insert(id, details);
            self
        }

        pub fn with_finished(mut self, build_type_id: &str, branch: &str, ids: &[i64]) -> Self {
            let refs = ids.iter().map(|id| build_ref(*id, build_type_id)).collect();
            self.finished
                .insert((build_type_id.to_string(), branch.to_string()), refs);
            self
        }

        pub fn with_finished_refs(
            mut self,
            build_type_id: &str,
            branch: &str,
            refs: Vec<BuildRef>,
        ) -> Self {
            self.finished
                .insert((build_type_id.to_string(), branch.to_string()), refs);
            self
        }

        pub fn analyzed_builds(&self) -> Vec<i64> {
            let mut ids = self.analyzed.lock().unwrap().clone();
            ids.sort_unstable();
            ids
        }
    }

    #[async_trait]
    impl CiServer for FakeCiServer {
        fn server_id(&self) -> &str {
            "fake"
        }

        fn host(&self) -> &str {
            "https://ci.example.org/"
        }

        fn compactor(&self) -> Arc<dyn StringCompactor> {
            self.compactor.clone()
        }

        async fn get_build(&self, href: &str) -> Result<Build> {
            self.get_build_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.builds.get(href).cloned().unwrap_or_else(Build::fake_stub))
        }

        async fn get_finished_builds(&self, build_type_id: &str, branch: &str) -> Result<Vec<BuildRef>> {
            Ok(self
                .finished
                .get(&(build_type_id.to_string(), branch.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn get_finished_builds_include_sn_dep_failed(
            &self,
            build_type_id: &str,
            branch: &str,
        ) -> Result<Vec<BuildRef>> {
            self.get_finished_builds(build_type_id, branch).await
        }

        async fn get_running_builds(&self) -> Result<Vec<BuildRef>> {
            self.running_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.running.clone())
        }

        async fn get_queued_builds(&self) -> Result<Vec<BuildRef>> {
            self.queued_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.queued.clone())
        }

        async fn load_build_details(&self, build: &Build) -> Result<BuildDetails> {
            Ok(self.details.get(&build.id).cloned().unwrap_or_default())
        }

        fn analyze_build_log(
            &self,
            build_id: i64,
            _ctx: Arc<SingleBuildRunCtx>,
        ) -> Deferred<LogCheckResult> {
            self.analyzed.lock().unwrap().push(build_id);
            Deferred::ready(self.log_result.clone().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{build, build_ref, FakeCiServer};
    use super::*;

    #[test]
    fn test_unknown_href_is_stub() {
        let server = FakeCiServer::new().with_build(build(1, "Suite"));

        let known = tokio_test::block_on(server.get_build(&build_ref(1, "Suite").href)).unwrap();
        let unknown = tokio_test::block_on(server.get_build(&build_ref(2, "Suite").href)).unwrap();

        assert_eq!(known.id, 1);
        assert!(!known.is_fake_stub());
        assert!(unknown.is_fake_stub());
        assert_eq!(
            server
                .get_build_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            2
        );
    }
}
