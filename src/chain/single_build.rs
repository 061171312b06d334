use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::compactor::StringCompactor;
use crate::model::{Change, TestOccurrence};

use super::deferred::Deferred;
use super::fat_build::{FatBuildCompacted, ProblemCompacted};
use super::log_check::{LogCheckResult, TestLogCheckResult};

/// Problem classification shared by single builds and whole suites.
pub trait SuiteResults {
    fn suite_id(&self) -> String;

    fn has_timeout_problem(&self) -> bool;

    fn has_jvm_crash_problem(&self) -> bool;

    fn has_oome_problem(&self) -> bool;

    fn has_exit_code_problem(&self) -> bool;

    /// The build was killed: its test list is unreliable.
    fn has_critical_problem(&self) -> bool {
        self.has_jvm_crash_problem() || self.has_timeout_problem()
    }

    fn has_suite_incomplete_failure(&self) -> bool {
        self.has_jvm_crash_problem()
            || self.has_timeout_problem()
            || self.has_oome_problem()
            || self.has_exit_code_problem()
    }
}

/// Facts about one concrete build run.
pub struct SingleBuildRunCtx {
    build: FatBuildCompacted,
    compactor: Arc<dyn StringCompactor>,
    log_check: OnceLock<Deferred<LogCheckResult>>,
    changes: Vec<Change>,
    tests: OnceLock<Vec<TestOccurrence>>,
}

impl SingleBuildRunCtx {
    pub fn new(build: FatBuildCompacted, compactor: Arc<dyn StringCompactor>) -> Self {
        Self {
            build,
            compactor,
            log_check: OnceLock::new(),
            changes: Vec::new(),
            tests: OnceLock::new(),
        }
    }

    /// Server build id, absent for stub records.
    pub fn build_id(&self) -> Option<i64> {
        (self.build.id() >= 0).then_some(self.build.id())
    }

    pub fn suite_name(&self) -> String {
        self.build.build_type_name(self.compactor.as_ref())
    }

    pub fn project_id(&self) -> String {
        self.build.project_id(self.compactor.as_ref())
    }

    pub fn branch(&self) -> Option<String> {
        self.build
            .branch_name()
            .and_then(|id| self.compactor.string_from_id(id))
    }

    pub fn is_composite(&self) -> bool {
        self.build.is_composite()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.build.duration()
    }

    fn problems(&self) -> impl Iterator<Item = &ProblemCompacted> {
        self.build.problems().iter()
    }

    /// Type codes of all problems, in server order.
    pub fn problem_types(&self) -> Vec<String> {
        self.problems()
            .filter_map(|p| self.compactor.string_from_id(p.type_id))
            .collect()
    }

    pub fn execution_timeout_count(&self) -> usize {
        self.problems()
            .filter(|p| p.is_execution_timeout(self.compactor.as_ref()))
            .count()
    }

    /// Decompacted on first access. Composite builds run no tests.
    pub fn tests(&self) -> &[TestOccurrence] {
        if self.is_composite() {
            return &[];
        }

        self.tests
            .get_or_init(|| self.build.test_occurrences(self.compactor.as_ref()))
    }

    pub fn failed_not_muted_test_names(&self) -> Vec<String> {
        if self.is_composite() {
            return vec![];
        }

        self.build
            .failed_not_muted_test_names(self.compactor.as_ref())
    }

    pub fn all_test_names(&self) -> Vec<String> {
        self.build.all_test_names(self.compactor.as_ref())
    }

    pub fn add_change(&mut self, change: Change) {
        if change.is_fake_stub() {
            return;
        }

        self.changes.push(change);
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Attaches the log analysis handle. Only the first call has an effect.
    pub fn set_log_check(&self, handle: Deferred<LogCheckResult>) -> bool {
        self.log_check.set(handle).is_ok()
    }

    pub fn has_log_check(&self) -> bool {
        self.log_check.get().is_some()
    }

    /// Log analysis result if it already completed successfully.
    pub fn log_check_if_finished(&self) -> Option<&LogCheckResult> {
        self.log_check.get().and_then(Deferred::peek)
    }

    pub fn critical_fail_last_started_test(&self) -> Option<&str> {
        self.log_check_if_finished()
            .and_then(|res| res.last_started_test.as_deref())
    }

    pub fn test_log_check_result(&self) -> Option<&HashMap<String, TestLogCheckResult>> {
        self.log_check_if_finished()
            .map(|res| &res.test_log_check_result)
    }

    pub fn build_id_if_has_thread_dump(&self) -> Option<i64> {
        self.log_check_if_finished()
            .filter(|res| res.has_thread_dump())
            .and_then(|_| self.build_id())
    }
}

impl SuiteResults for SingleBuildRunCtx {
    fn suite_id(&self) -> String {
        self.compactor
            .string_from_id(self.build.build_type_id())
            .unwrap_or_default()
    }

    fn has_timeout_problem(&self) -> bool {
        self.execution_timeout_count() > 0
    }

    fn has_jvm_crash_problem(&self) -> bool {
        self.problems()
            .any(|p| p.is_jvm_crash(self.compactor.as_ref()))
    }

    fn has_oome_problem(&self) -> bool {
        self.problems().any(|p| p.is_oome(self.compactor.as_ref()))
    }

    fn has_exit_code_problem(&self) -> bool {
        self.problems()
            .any(|p| p.is_exit_code(self.compactor.as_ref()))
    }
}

impl std::fmt::Debug for SingleBuildRunCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleBuildRunCtx")
            .field("build_id", &self.build.id())
            .field("composite", &self.build.is_composite())
            .field("log_check", &self.log_check.get())
            .finish_non_exhaustive()
    }
}
