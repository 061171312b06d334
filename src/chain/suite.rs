use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard};

use indexmap::IndexMap;

use crate::model::{problem_types, Build, TestOccurrence};

use super::deferred::Deferred;
use super::log_check::TestLogCheckResult;
use super::single_build::{SingleBuildRunCtx, SuiteResults};

/// Tests running longer than this are reported as long-running.
const LONG_RUNNING_THRESHOLD_MS: u64 = 60 * 1000;
const TOP_LONG_RUNNING_LIMIT: usize = 3;

/// Background counts of builds of this suite waiting in the queue or running.
#[derive(Debug, Clone)]
pub struct ScheduledBuilds {
    pub running: Deferred<usize>,
    pub queued: Deferred<usize>,
}

/// One failed test name and where it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFailureOccurrences {
    pub name: String,
    pub occurrences: usize,
    pub build_ids: Vec<i64>,
    pub investigated: bool,
}

/// All runs of one build type within a chain.
pub struct SuiteRunCtx {
    suite_id: String,
    suite_name: String,
    branch_name: Option<String>,
    builds: RwLock<Vec<Arc<SingleBuildRunCtx>>>,
    contact_person: OnceLock<Option<String>>,
    scheduled_claimed: AtomicBool,
    scheduled: OnceLock<ScheduledBuilds>,
}

impl SuiteRunCtx {
    /// Suite named after the first build seen for its build type.
    pub fn new(first_build: &Build) -> Self {
        Self {
            suite_id: first_build.build_type_id.clone(),
            suite_name: first_build.build_type_name.clone(),
            branch_name: first_build.branch_name.clone(),
            builds: RwLock::new(Vec::new()),
            contact_person: OnceLock::new(),
            scheduled_claimed: AtomicBool::new(false),
            scheduled: OnceLock::new(),
        }
    }

    fn read_builds(&self) -> RwLockReadGuard<'_, Vec<Arc<SingleBuildRunCtx>>> {
        self.builds.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_build(&self, build: Arc<SingleBuildRunCtx>) {
        self.builds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(build);
    }

    pub fn builds(&self) -> Vec<Arc<SingleBuildRunCtx>> {
        self.read_builds().clone()
    }

    pub fn builds_count(&self) -> usize {
        self.read_builds().len()
    }

    pub fn suite_name(&self) -> &str {
        &self.suite_name
    }

    pub fn branch_name(&self) -> Option<&str> {
        self.branch_name.as_deref()
    }

    /// Id of the first collected build.
    pub fn build_id(&self) -> Option<i64> {
        self.read_builds().first().and_then(|b| b.build_id())
    }

    pub fn contact_person(&self) -> Option<&str> {
        self.contact_person.get().and_then(Option::as_deref)
    }

    pub fn contact_person_or_empty(&self) -> &str {
        self.contact_person().unwrap_or("")
    }

    pub fn has_contact_person(&self) -> bool {
        self.contact_person.get().is_some()
    }

    /// Records the contact lookup result. Later calls are no-ops.
    pub fn set_contact_person(&self, person: Option<String>) -> bool {
        self.contact_person.set(person).is_ok()
    }

    pub fn has_scheduled_builds_info(&self) -> bool {
        self.scheduled_claimed.load(Ordering::Acquire)
    }

    /// Claims the right to issue the scheduled-build queries for this suite.
    /// Exactly one caller ever gets `true`.
    pub fn try_claim_scheduled_builds_info(&self) -> bool {
        self.scheduled_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn set_scheduled_builds(&self, scheduled: ScheduledBuilds) -> bool {
        self.scheduled.set(scheduled).is_ok()
    }

    pub fn running_build_count(&self) -> Option<usize> {
        self.scheduled
            .get()
            .and_then(|s| s.running.peek().copied())
    }

    pub fn queued_build_count(&self) -> Option<usize> {
        self.scheduled
            .get()
            .and_then(|s| s.queued.peek().copied())
    }

    /// Failed, not muted tests grouped by name in first-seen order.
    pub fn failed_test_occurrences(&self) -> Vec<TestFailureOccurrences> {
        let mut grouped: IndexMap<String, TestFailureOccurrences> = IndexMap::new();

        for build in self.read_builds().iter() {
            for test in build.tests().iter().filter(|t| t.is_failed_not_muted()) {
                let entry = grouped
                    .entry(test.name.clone())
                    .or_insert_with(|| TestFailureOccurrences {
                        name: test.name.clone(),
                        occurrences: 0,
                        build_ids: vec![],
                        investigated: false,
                    });
                entry.occurrences += 1;
                entry.investigated |= test.currently_investigated;
                if let Some(id) = build.build_id() {
                    entry.build_ids.push(id);
                }
            }
        }

        grouped.into_values().collect()
    }

    /// Distinct failed test names over all runs.
    pub fn failed_tests(&self) -> usize {
        self.read_builds()
            .iter()
            .flat_map(|b| b.failed_not_muted_test_names())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn top_long_running(&self) -> Vec<TestOccurrence> {
        let mut longest: HashMap<String, TestOccurrence> = HashMap::new();

        for build in self.read_builds().iter() {
            for test in build.tests() {
                let duration = test.duration_ms.unwrap_or(0);
                if duration <= LONG_RUNNING_THRESHOLD_MS {
                    continue;
                }
                let replace = longest
                    .get(&test.name)
                    .map_or(true, |t| t.duration_ms.unwrap_or(0) < duration);
                if replace {
                    longest.insert(test.name.clone(), test.clone());
                }
            }
        }

        let mut tests: Vec<TestOccurrence> = longest.into_values().collect();
        tests.sort_by(|a, b| {
            b.duration_ms
                .cmp(&a.duration_ms)
                .then_with(|| a.name.cmp(&b.name))
        });
        tests.truncate(TOP_LONG_RUNNING_LIMIT);
        tests
    }

    /// Summed duration of runs with known start and finish.
    pub fn build_duration(&self) -> Option<chrono::Duration> {
        self.read_builds()
            .iter()
            .filter_map(|b| b.duration())
            .reduce(|a, b| a + b)
    }

    /// Short description of why the suite failed, empty if it only
    /// has failed tests (or nothing).
    pub fn result(&self) -> String {
        if self.has_jvm_crash_problem() {
            return "JVM CRASH".to_string();
        }
        if self.has_timeout_problem() {
            return "TIMEOUT".to_string();
        }
        if self.has_oome_problem() {
            return "Out Of Memory Error".to_string();
        }
        if self.has_exit_code_problem() {
            return "Exit Code".to_string();
        }

        self.other_problem_types().join(", ")
    }

    fn other_problem_types(&self) -> Vec<String> {
        self.read_builds()
            .iter()
            .flat_map(|b| b.problem_types())
            .filter(|t| {
                t != problem_types::TC_FAILED_TESTS
                    && t != problem_types::SNAPSHOT_DEPENDENCY_ERROR
                    && t != problem_types::SNAPSHOT_DEPENDENCY_ERROR_BUILD_PROCEEDS_TYPE
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_failed(&self) -> bool {
        self.failed_tests() > 0 || !self.result().is_empty()
    }

    pub fn critical_fail_last_started_tests(&self) -> Vec<String> {
        self.read_builds()
            .iter()
            .filter(|b| b.has_critical_problem())
            .filter_map(|b| b.critical_fail_last_started_test().map(ToString::to_string))
            .collect()
    }

    pub fn logs_check_results(&self) -> Vec<HashMap<String, TestLogCheckResult>> {
        self.read_builds()
            .iter()
            .filter_map(|b| b.test_log_check_result().cloned())
            .collect()
    }

    pub fn builds_with_thread_dump(&self) -> Vec<i64> {
        self.read_builds()
            .iter()
            .filter_map(|b| b.build_id_if_has_thread_dump())
            .collect()
    }

    /// Authors of the changes included into the runs.
    pub fn last_change_users(&self) -> Vec<String> {
        self.read_builds()
            .iter()
            .flat_map(|b| {
                b.changes()
                    .iter()
                    .filter_map(|c| c.username.clone())
                    .collect::<Vec<_>>()
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl SuiteResults for SuiteRunCtx {
    fn suite_id(&self) -> String {
        self.suite_id.clone()
    }

    fn has_timeout_problem(&self) -> bool {
        self.read_builds().iter().any(|b| b.has_timeout_problem())
    }

    fn has_jvm_crash_problem(&self) -> bool {
        self.read_builds().iter().any(|b| b.has_jvm_crash_problem())
    }

    fn has_oome_problem(&self) -> bool {
        self.read_builds().iter().any(|b| b.has_oome_problem())
    }

    fn has_exit_code_problem(&self) -> bool {
        self.read_builds().iter().any(|b| b.has_exit_code_problem())
    }
}

impl std::fmt::Debug for SuiteRunCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRunCtx")
            .field("suite_id", &self.suite_id)
            .field("suite_name", &self.suite_name)
            .field("builds", &self.builds_count())
            .field("contact_person", &self.contact_person())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fat_build::FatBuildCompacted;
    use crate::chain::log_check::LogCheckResult;
    use crate::chain::single_build::tests::{failed_test, problem};
    use crate::compactor::{InMemoryCompactor, StringCompactor};
    use crate::model::{BuildDetails, Change};
    use chrono::{TimeZone, Utc};

    fn suite_build(id: i64) -> Build {
        Build {
            id,
            build_type_id: "Ignite_Queries".to_string(),
            build_type_name: "Queries".to_string(),
            ..Build::default()
        }
    }

    fn single(
        compactor: &Arc<dyn StringCompactor>,
        build: &Build,
        details: BuildDetails,
    ) -> Arc<SingleBuildRunCtx> {
        let mut ctx = SingleBuildRunCtx::new(
            FatBuildCompacted::new(build, &details, compactor.as_ref()),
            Arc::clone(compactor),
        );
        for change in details.changes {
            ctx.add_change(change);
        }
        Arc::new(ctx)
    }

    fn compactor() -> Arc<dyn StringCompactor> {
        Arc::new(InMemoryCompactor::new())
    }

    #[test]
    fn test_failed_tests_are_grouped_across_runs() {
        let compactor = compactor();
        let suite = SuiteRunCtx::new(&suite_build(1));
        let details = || BuildDetails {
            tests: vec![failed_test("q.QTest.testA"), failed_test("q.QTest.testB")],
            ..BuildDetails::default()
        };
        suite.add_build(single(&compactor, &suite_build(1), details()));
        suite.add_build(single(&compactor, &suite_build(2), details()));

        let occurrences = suite.failed_test_occurrences();
        assert_eq!(suite.failed_tests(), 2);
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[0].name, "q.QTest.testA");
        assert_eq!(occurrences[0].occurrences, 2);
        assert_eq!(occurrences[0].build_ids, vec![1, 2]);
        assert!(suite.is_failed());
        assert_eq!(suite.build_id(), Some(1));
    }

    #[test]
    fn test_result_prefers_critical_problems() {
        let compactor = compactor();
        let suite = SuiteRunCtx::new(&suite_build(1));
        suite.add_build(single(
            &compactor,
            &suite_build(1),
            BuildDetails {
                problems: vec![
                    problem(problem_types::TC_EXIT_CODE),
                    problem(problem_types::TC_EXECUTION_TIMEOUT),
                ],
                ..BuildDetails::default()
            },
        ));

        assert_eq!(suite.result(), "TIMEOUT");
        assert!(suite.has_suite_incomplete_failure());
    }

    #[test]
    fn test_result_lists_other_problems() {
        let compactor = compactor();
        let suite = SuiteRunCtx::new(&suite_build(1));
        suite.add_build(single(
            &compactor,
            &suite_build(1),
            BuildDetails {
                problems: vec![
                    problem(problem_types::TC_FAILED_TESTS),
                    problem(problem_types::SNAPSHOT_DEPENDENCY_ERROR),
                    problem(problem_types::BUILD_FAILURE_ON_MESSAGE),
                ],
                ..BuildDetails::default()
            },
        ));

        assert_eq!(suite.result(), problem_types::BUILD_FAILURE_ON_MESSAGE);
    }

    #[test]
    fn test_contact_person_set_once() {
        let suite = SuiteRunCtx::new(&suite_build(1));
        assert_eq!(suite.contact_person_or_empty(), "");

        assert!(suite.set_contact_person(Some("Alice".to_string())));
        assert!(!suite.set_contact_person(Some("Bob".to_string())));

        assert_eq!(suite.contact_person(), Some("Alice"));
    }

    #[test]
    fn test_scheduled_info_claimed_once() {
        let suite = SuiteRunCtx::new(&suite_build(1));
        assert!(!suite.has_scheduled_builds_info());

        assert!(suite.try_claim_scheduled_builds_info());
        assert!(!suite.try_claim_scheduled_builds_info());
        assert!(suite.has_scheduled_builds_info());

        suite.set_scheduled_builds(ScheduledBuilds {
            running: Deferred::ready(2),
            queued: Deferred::ready(5),
        });
        assert_eq!(suite.running_build_count(), Some(2));
        assert_eq!(suite.queued_build_count(), Some(5));
    }

    #[test]
    fn test_top_long_running_and_duration() {
        let compactor = compactor();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut build = suite_build(1);
        build.start_date = Some(start);
        build.finish_date = Some(start + chrono::Duration::minutes(30));

        let slow = |name: &str, ms: u64| TestOccurrence {
            name: name.to_string(),
            status: "SUCCESS".to_string(),
            duration_ms: Some(ms),
            ..TestOccurrence::default()
        };
        let suite = SuiteRunCtx::new(&build);
        suite.add_build(single(
            &compactor,
            &build,
            BuildDetails {
                tests: vec![
                    slow("t1", 61_000),
                    slow("t2", 200_000),
                    slow("t3", 5_000),
                    slow("t4", 90_000),
                    slow("t5", 120_000),
                ],
                ..BuildDetails::default()
            },
        ));

        let names: Vec<_> = suite
            .top_long_running()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["t2", "t5", "t4"]);
        assert_eq!(suite.build_duration(), Some(chrono::Duration::minutes(30)));
    }

    #[test]
    fn test_log_findings_and_change_users() {
        let compactor = compactor();
        let suite = SuiteRunCtx::new(&suite_build(1));
        let build = single(
            &compactor,
            &suite_build(1),
            BuildDetails {
                problems: vec![problem(problem_types::TC_JVM_CRASH)],
                changes: vec![
                    Change::new(1, None, Some("bob".to_string())),
                    Change::new(2, None, Some("alice".to_string())),
                    Change::new(3, None, Some("bob".to_string())),
                ],
                ..BuildDetails::default()
            },
        );
        build.set_log_check(Deferred::ready(LogCheckResult {
            last_started_test: Some("q.QTest.testCrash".to_string()),
            last_thread_dump: Some("dump".to_string()),
            ..LogCheckResult::default()
        }));
        suite.add_build(build);

        assert_eq!(
            suite.critical_fail_last_started_tests(),
            vec!["q.QTest.testCrash"]
        );
        assert_eq!(suite.builds_with_thread_dump(), vec![1]);
        assert_eq!(suite.last_change_users(), vec!["alice", "bob"]);
        assert_eq!(suite.logs_check_results().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_build() {
        let compactor = compactor();
        let suite = Arc::new(SuiteRunCtx::new(&suite_build(0)));

        let handles: Vec<_> = (0..32)
            .map(|id| {
                let suite = Arc::clone(&suite);
                let build = single(&compactor, &suite_build(id), BuildDetails::default());
                tokio::spawn(async move {
                    suite.add_build(build);
                    suite.set_contact_person(Some(format!("person-{id}")));
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(suite.builds_count(), 32);
        assert!(suite.contact_person().is_some());
    }
}
