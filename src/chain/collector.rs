use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, warn};

use crate::contacts::ContactPersons;
use crate::model::{Build, BuildDetails, BuildRef};
use crate::server::CiServer;

use super::branch::normalize_branch;
use super::deferred::Deferred;
use super::fat_build::FatBuildCompacted;
use super::modes::LogsMode;
use super::single_build::{SingleBuildRunCtx, SuiteResults};
use super::suite::{ScheduledBuilds, SuiteRunCtx};

/// Fetches every discovered build and files it under its suite.
pub struct BuildCollector {
    server: Arc<dyn CiServer>,
    logs_mode: LogsMode,
    include_scheduled: bool,
    contacts: Option<Arc<ContactPersons>>,
    suites: DashMap<String, Arc<SuiteRunCtx>>,
}

impl BuildCollector {
    pub fn new(
        server: Arc<dyn CiServer>,
        logs_mode: LogsMode,
        include_scheduled: bool,
        contacts: Option<Arc<ContactPersons>>,
    ) -> Self {
        Self {
            server,
            logs_mode,
            include_scheduled,
            contacts,
            suites: DashMap::new(),
        }
    }

    pub async fn collect_all(&self, references: &[BuildRef]) {
        join_all(references.iter().map(|reference| self.collect(reference))).await;
    }

    /// Loads one build. Builds that vanished or cannot be fetched are skipped.
    pub async fn collect(&self, reference: &BuildRef) {
        let build = match self.server.get_build(&reference.href).await {
            Ok(build) if !build.is_fake_stub() => build,
            Ok(_) => {
                debug!("Build {} no longer exists, skipping", reference.id);
                return;
            }
            Err(e) => {
                warn!("Failed to load build {}: {e}", reference.href);
                return;
            }
        };

        let suite = self.suite_for(&build);

        let details = self
            .server
            .load_build_details(&build)
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to load tests and problems of build {}: {e}", build.id);
                BuildDetails::default()
            });

        let ctx = self.build_context(&build, details);
        suite.add_build(Arc::clone(&ctx));

        if self.should_analyze_log(&ctx) {
            if let Some(build_id) = ctx.build_id() {
                ctx.set_log_check(self.server.analyze_build_log(build_id, Arc::clone(&ctx)));
            }
        }

        if self.include_scheduled {
            self.request_scheduled_builds(&suite, &build);
        }

        if let Some(contacts) = &self.contacts {
            if !suite.has_contact_person() {
                suite.set_contact_person(contacts.lookup(&build.build_type_id));
            }
        }
    }

    /// The one suite context of the build's type, created on first use.
    fn suite_for(&self, build: &Build) -> Arc<SuiteRunCtx> {
        let entry = self
            .suites
            .entry(build.build_type_id.clone())
            .or_insert_with(|| Arc::new(SuiteRunCtx::new(build)));

        Arc::clone(entry.value())
    }

    fn build_context(&self, build: &Build, details: BuildDetails) -> Arc<SingleBuildRunCtx> {
        let compactor = self.server.compactor();
        let fat = FatBuildCompacted::new(build, &details, compactor.as_ref());

        let mut ctx = SingleBuildRunCtx::new(fat, compactor);
        for change in details.changes {
            ctx.add_change(change);
        }

        Arc::new(ctx)
    }

    fn should_analyze_log(&self, ctx: &SingleBuildRunCtx) -> bool {
        match self.logs_mode {
            LogsMode::All => true,
            LogsMode::SuiteNotComplete => ctx.has_suite_incomplete_failure(),
            LogsMode::None => false,
        }
    }

    /// Starts the running/queued count queries unless the suite already
    /// has them. Returns `true` if this call issued the queries.
    pub fn request_scheduled_builds(&self, suite: &SuiteRunCtx, build: &Build) -> bool {
        if !suite.try_claim_scheduled_builds_info() {
            return false;
        }

        let build_type_id = build.build_type_id.clone();
        let branch = normalize_branch(build.branch_name.as_deref()).to_string();

        let running = {
            let server = Arc::clone(&self.server);
            let build_type_id = build_type_id.clone();
            let branch = branch.clone();
            Deferred::spawn("running builds", async move {
                let builds = server.get_running_builds().await?;
                Ok(count_related(&builds, &build_type_id, &branch))
            })
        };

        let queued = {
            let server = Arc::clone(&self.server);
            Deferred::spawn("queued builds", async move {
                let builds = server.get_queued_builds().await?;
                Ok(count_related(&builds, &build_type_id, &branch))
            })
        };

        suite.set_scheduled_builds(ScheduledBuilds { running, queued });
        true
    }

    pub fn into_suites(self) -> Vec<Arc<SuiteRunCtx>> {
        self.suites.into_iter().map(|(_, suite)| suite).collect()
    }
}

fn count_related(builds: &[BuildRef], build_type_id: &str, branch: &str) -> usize {
    builds
        .iter()
        .filter(|b| b.build_type_id == build_type_id)
        .filter(|b| normalize_branch(b.branch_name.as_deref()) == branch)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::log_check::LogCheckResult;
    use crate::chain::single_build::tests::{failed_test, problem};
    use crate::model::{problem_types, Change};
    use crate::server::fake::{build, build_ref, FakeCiServer};
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    fn collector(
        server: FakeCiServer,
        logs_mode: LogsMode,
        scheduled: bool,
    ) -> (Arc<FakeCiServer>, BuildCollector) {
        let server = Arc::new(server);
        let collector = BuildCollector::new(server.clone(), logs_mode, scheduled, None);
        (server, collector)
    }

    fn suite_ids(suites: &[Arc<SuiteRunCtx>]) -> Vec<String> {
        let mut ids: Vec<String> = suites.iter().map(|s| s.suite_id()).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_builds_grouped_into_one_suite_per_type() {
        let server = FakeCiServer::new()
            .with_build(build(1, "A"))
            .with_build(build(2, "A"))
            .with_build(build(3, "B"));
        let (_, collector) = collector(server, LogsMode::None, false);

        collector
            .collect_all(&[build_ref(1, "A"), build_ref(2, "A"), build_ref(3, "B")])
            .await;
        let suites = collector.into_suites();

        assert_eq!(suite_ids(&suites), vec!["A", "B"]);
        let suite_a = suites.iter().find(|s| s.suite_id() == "A").unwrap();
        assert_eq!(suite_a.builds_count(), 2);
        assert_eq!(suite_a.suite_name(), "A Suite");
    }

    #[tokio::test]
    async fn test_vanished_builds_are_skipped() {
        let server = FakeCiServer::new().with_build(build(1, "A"));
        let (_, collector) = collector(server, LogsMode::None, false);

        collector
            .collect_all(&[build_ref(1, "A"), build_ref(2, "Gone")])
            .await;
        let suites = collector.into_suites();

        assert_eq!(suite_ids(&suites), vec!["A"]);
    }

    #[tokio::test]
    async fn test_log_analysis_only_for_incomplete_suites() {
        let server = FakeCiServer::new()
            .with_build(build(1, "A"))
            .with_build(build(2, "B"))
            .with_details(
                1,
                BuildDetails {
                    problems: vec![problem(problem_types::TC_JVM_CRASH)],
                    ..BuildDetails::default()
                },
            )
            .with_details(
                2,
                BuildDetails {
                    problems: vec![problem(problem_types::TC_FAILED_TESTS)],
                    tests: vec![failed_test("b.BTest.test")],
                    ..BuildDetails::default()
                },
            );
        let (server, collector) = collector(server, LogsMode::SuiteNotComplete, false);

        collector
            .collect_all(&[build_ref(1, "A"), build_ref(2, "B")])
            .await;

        assert_eq!(server.analyzed_builds(), vec![1]);
    }

    #[tokio::test]
    async fn test_log_analysis_for_all_builds() {
        let mut server = FakeCiServer::new()
            .with_build(build(1, "A"))
            .with_build(build(2, "B"));
        server.log_result = Some(LogCheckResult {
            last_started_test: Some("a.ATest.hang".to_string()),
            ..LogCheckResult::default()
        });
        let (server, collector) = collector(server, LogsMode::All, false);

        collector
            .collect_all(&[build_ref(1, "A"), build_ref(2, "B")])
            .await;

        assert_eq!(server.analyzed_builds(), vec![1, 2]);
        let suites = collector.into_suites();
        assert!(suites
            .iter()
            .flat_map(|s| s.builds())
            .all(|b| b.log_check_if_finished().is_some()));
    }

    #[tokio::test]
    async fn test_no_log_analysis_when_disabled() {
        let server = FakeCiServer::new().with_build(build(1, "A")).with_details(
            1,
            BuildDetails {
                problems: vec![problem(problem_types::TC_EXECUTION_TIMEOUT)],
                ..BuildDetails::default()
            },
        );
        let (server, collector) = collector(server, LogsMode::None, false);

        collector.collect_all(&[build_ref(1, "A")]).await;

        assert!(server.analyzed_builds().is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_counts_are_requested_once_per_suite() {
        let mut server = FakeCiServer::new()
            .with_build(build(1, "A"))
            .with_build(build(2, "A"))
            .with_build(build(3, "A"));
        server.running = vec![build_ref(10, "A"), build_ref(11, "B")];
        server.queued = vec![
            build_ref(12, "A"),
            build_ref(13, "A"),
            BuildRef::new(14, "A", Some("feature/y".to_string()), "/b/14"),
        ];
        let (server, collector) = collector(server, LogsMode::None, true);

        collector
            .collect_all(&[build_ref(1, "A"), build_ref(2, "A"), build_ref(3, "A")])
            .await;
        let suites = collector.into_suites();
        let suite = &suites[0];

        for _ in 0..500 {
            if suite.running_build_count().is_some() && suite.queued_build_count().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        assert_eq!(suite.running_build_count(), Some(1));
        assert_eq!(suite.queued_build_count(), Some(2));
        assert_eq!(server.running_calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.queued_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_scheduled_requests_issue_one_pair() {
        let b = build(1, "A");
        let (server, collector) = collector(FakeCiServer::new(), LogsMode::None, true);
        let collector = Arc::new(collector);
        let suite = Arc::new(SuiteRunCtx::new(&b));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let collector = Arc::clone(&collector);
                let suite = Arc::clone(&suite);
                let b = b.clone();
                tokio::spawn(async move { collector.request_scheduled_builds(&suite, &b) })
            })
            .collect();
        let mut issued = 0;
        for handle in handles {
            if handle.await.unwrap() {
                issued += 1;
            }
        }

        for _ in 0..500 {
            if suite.running_build_count().is_some() && suite.queued_build_count().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        assert_eq!(issued, 1);
        assert_eq!(server.running_calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.queued_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_contact_person_is_set_from_directory() {
        let server = Arc::new(
            FakeCiServer::new()
                .with_build(build(1, "A"))
                .with_build(build(2, "A"))
                .with_build(build(3, "B")),
        );
        let contacts = ContactPersons::new(HashMap::from([("A".to_string(), "Alice".to_string())]));
        let collector = BuildCollector::new(server, LogsMode::None, false, Some(Arc::new(contacts)));

        collector
            .collect_all(&[build_ref(1, "A"), build_ref(2, "A"), build_ref(3, "B")])
            .await;
        let suites = collector.into_suites();

        let contact = |id: &str| {
            suites
                .iter()
                .find(|s| s.suite_id() == id)
                .and_then(|s| s.contact_person().map(ToString::to_string))
        };
        assert_eq!(contact("A").as_deref(), Some("Alice"));
        assert_eq!(contact("B"), None);
    }

    #[tokio::test]
    async fn test_changes_are_attached() {
        let server = FakeCiServer::new().with_build(build(1, "A")).with_details(
            1,
            BuildDetails {
                changes: vec![Change::new(5, None, Some("dev".to_string())), Change::fake_stub()],
                ..BuildDetails::default()
            },
        );
        let (_, collector) = collector(server, LogsMode::None, false);

        collector.collect_all(&[build_ref(1, "A")]).await;
        let suites = collector.into_suites();

        assert_eq!(suites[0].last_change_users(), vec!["dev"]);
    }

    #[test]
    fn test_count_related_normalizes_branches() {
        let builds = vec![
            BuildRef::new(1, "A", Some("refs/heads/master".to_string()), "/b/1"),
            BuildRef::new(2, "A", None, "/b/2"),
            BuildRef::new(3, "A", Some("feature".to_string()), "/b/3"),
            BuildRef::new(4, "B", None, "/b/4"),
        ];

        assert_eq!(count_related(&builds, "A", "<default>"), 2);
        assert_eq!(count_related(&builds, "A", "feature"), 1);
    }
}
