use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::{FailureAnalytics, SuiteInBranch};
use crate::chain::branch::normalize_branch;
use crate::chain::log_check::TestLogCheckResult;
use crate::chain::{FullChainRunCtx, SuiteResults, SuiteRunCtx};
use crate::model::TestOccurrence;

/// Tests whose output exceeds this are reported as log consumers.
const LOG_CONSUMER_THRESHOLD_BYTES: u64 = 1024 * 1024;
const LOG_CONSUMERS_LIMIT: usize = 3;

/// Serializable view of one resolved chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReport {
    pub server_id: String,
    pub suite_id: String,
    pub suite_name: String,
    pub branch_name: String,
    pub build_id: Option<i64>,
    pub web_to_build: String,
    pub web_to_hist: String,
    pub collected_at: DateTime<Utc>,
    pub ranking: String,
    pub total_suites: usize,
    pub failed_tests: usize,
    pub failed_to_finish: usize,
    pub duration_printable: String,
    /// Failed suites in ranking order
    pub failed_suites: Vec<SuiteReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub suite_id: String,
    pub branch_name: String,
    /// Empty unless the suite failed for a reason other than tests
    pub result: String,
    pub web_to_hist: String,
    pub web_to_build: String,
    pub contact_person: Option<String>,
    pub test_failures: Vec<TestFailureReport>,
    pub top_long_running: Vec<TestFailureReport>,
    pub warn_only: Vec<TestFailureReport>,
    pub log_consumers: Vec<TestFailureReport>,
    pub web_url_thread_dump: Option<String>,
    pub running_build_count: Option<usize>,
    pub queued_build_count: Option<usize>,
    pub failures: Option<u32>,
    pub runs: Option<u32>,
    pub failure_rate: Option<String>,
    pub user_commits: String,
    pub failed_tests: usize,
    pub duration_printable: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestFailureReport {
    pub name: String,
    pub occurrences: usize,
    pub investigated: bool,
    pub web_url: Option<String>,
    pub duration_printable: Option<String>,
    pub warnings: Vec<String>,
}

impl TestFailureReport {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Inputs shared by all suites of one report.
pub struct ReportContext<'a> {
    pub server_id: &'a str,
    /// Web root ending with `/`
    pub host: &'a str,
    pub analytics: Option<&'a dyn FailureAnalytics>,
    pub fail_rate_branch: Option<&'a str>,
    pub ranking: &'a str,
}

impl ChainReport {
    pub fn from_context(ctx: &FullChainRunCtx, report: &ReportContext<'_>) -> Self {
        let failed_suites = ctx
            .failed_child_suites()
            .map(|suite| SuiteReport::from_suite(suite, report))
            .collect();

        let branch_name = normalize_branch(ctx.branch_name()).to_string();

        Self {
            server_id: report.server_id.to_string(),
            suite_id: ctx.suite_id().to_string(),
            suite_name: ctx.suite_name().to_string(),
            web_to_build: ctx
                .build_id()
                .map(|id| build_link(report.host, id))
                .unwrap_or_default(),
            web_to_hist: history_link(report.host, ctx.suite_id(), &branch_name),
            branch_name,
            build_id: ctx.build_id(),
            collected_at: Utc::now(),
            ranking: report.ranking.to_string(),
            total_suites: ctx.suites().len(),
            failed_tests: ctx.failed_tests(),
            failed_to_finish: ctx.failed_to_finish(),
            duration_printable: duration_printable(ctx.duration()),
            failed_suites,
        }
    }
}

impl SuiteReport {
    pub fn from_suite(suite: &SuiteRunCtx, report: &ReportContext<'_>) -> Self {
        let suite_id = suite.suite_id();
        let branch_name = normalize_branch(suite.branch_name()).to_string();

        let stat = report.analytics.and_then(|analytics| {
            analytics.build_failure_run_stat(&SuiteInBranch::new(
                suite_id.clone(),
                report.fail_rate_branch,
            ))
        });

        let mut test_failures: Vec<TestFailureReport> = suite
            .failed_test_occurrences()
            .into_iter()
            .map(|occurrence| TestFailureReport {
                web_url: occurrence
                    .build_ids
                    .first()
                    .map(|id| tests_link(report.host, *id)),
                name: occurrence.name,
                occurrences: occurrence.occurrences,
                investigated: occurrence.investigated,
                ..TestFailureReport::default()
            })
            .collect();

        for last_test in suite.critical_fail_last_started_tests() {
            test_failures.push(TestFailureReport::named(format!("{last_test} (last started)")));
        }

        let mut warn_only = Vec::new();
        let mut log_sizes: HashMap<String, u64> = HashMap::new();
        for results in suite.logs_check_results() {
            for (test_name, result) in results {
                if result.has_warns() {
                    add_warnings(&mut test_failures, &mut warn_only, &test_name, &result);
                }
                *log_sizes.entry(test_name).or_default() += result.log_size_bytes;
            }
        }

        let web_url_thread_dump = suite
            .builds_with_thread_dump()
            .last()
            .map(|id| log_link(report.host, *id));

        let users = suite.last_change_users();

        Self {
            name: suite.suite_name().to_string(),
            result: suite.result(),
            web_to_hist: history_link(report.host, &suite_id, &branch_name),
            web_to_build: suite
                .build_id()
                .map(|id| build_link(report.host, id))
                .unwrap_or_default(),
            contact_person: suite.contact_person().map(ToString::to_string),
            test_failures,
            top_long_running: suite
                .top_long_running()
                .iter()
                .map(long_running_report)
                .collect(),
            warn_only,
            log_consumers: log_consumers(log_sizes),
            web_url_thread_dump,
            running_build_count: suite.running_build_count(),
            queued_build_count: suite.queued_build_count(),
            failures: stat.map(|s| s.failures),
            runs: stat.map(|s| s.runs),
            failure_rate: stat.map(|s| s.fail_percent_printable()),
            user_commits: users.join(", "),
            failed_tests: suite.failed_tests(),
            duration_printable: duration_printable(suite.build_duration()),
            suite_id,
            branch_name,
        }
    }
}

/// Attaches log warnings to the matching failure, or to a warning-only
/// entry when the test did not fail.
fn add_warnings(
    test_failures: &mut [TestFailureReport],
    warn_only: &mut Vec<TestFailureReport>,
    test_name: &str,
    result: &TestLogCheckResult,
) {
    if let Some(failure) = test_failures.iter_mut().find(|f| f.name.contains(test_name)) {
        failure.warnings.extend(result.warns.iter().cloned());
        return;
    }

    if let Some(failure) = warn_only.iter_mut().find(|f| f.name.contains(test_name)) {
        failure.warnings.extend(result.warns.iter().cloned());
        return;
    }

    let mut failure = TestFailureReport::named(format!("{test_name} (warning)"));
    failure.warnings = result.warns.clone();
    warn_only.push(failure);
}

fn log_consumers(log_sizes: HashMap<String, u64>) -> Vec<TestFailureReport> {
    let mut sizes: Vec<(String, u64)> = log_sizes.into_iter().collect();
    sizes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    sizes
        .into_iter()
        .take(LOG_CONSUMERS_LIMIT)
        .filter(|(_, size)| *size > LOG_CONSUMER_THRESHOLD_BYTES)
        .map(|(name, size)| {
            TestFailureReport::named(format!("{name} {} Mbytes", size / 1024 / 1024))
        })
        .collect()
}

fn long_running_report(test: &TestOccurrence) -> TestFailureReport {
    TestFailureReport {
        duration_printable: test
            .duration_ms
            .and_then(|ms| i64::try_from(ms).ok())
            .map(|ms| duration_printable(Some(chrono::Duration::milliseconds(ms)))),
        ..TestFailureReport::named(test.name.clone())
    }
}

/// Percent-encodes a query value the way HTML forms do.
pub fn escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub fn build_link(host: &str, build_id: i64) -> String {
    format!("{host}viewLog.html?buildId={build_id}")
}

pub fn history_link(host: &str, suite_id: &str, branch: &str) -> String {
    format!(
        "{host}viewType.html?buildTypeId={suite_id}&branch={}&tab=buildTypeStatusDiv",
        escape(branch)
    )
}

fn tests_link(host: &str, build_id: i64) -> String {
    format!("{host}viewLog.html?buildId={build_id}&tab=buildResultsDiv")
}

fn log_link(host: &str, build_id: i64) -> String {
    format!("{host}downloadBuildLog.html?buildId={build_id}")
}

/// `1h 02m 03s`, `4m 05s` or `7s`; empty when unknown.
pub fn duration_printable(duration: Option<chrono::Duration>) -> String {
    let Some(duration) = duration else {
        return String::new();
    };

    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);

    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
