use chrono::{DateTime, Utc};

use crate::compactor::StringCompactor;
use crate::model::{problem_types, Build, BuildDetails, BuildRef, TestOccurrence, STATUS_FAILURE};

/// Build problem with its type code interned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemCompacted {
    pub id: i32,
    pub type_id: i32,
}

impl ProblemCompacted {
    fn is_type(&self, compactor: &dyn StringCompactor, code: &str) -> bool {
        compactor.string_id(code) == Some(self.type_id)
    }

    pub fn is_execution_timeout(&self, compactor: &dyn StringCompactor) -> bool {
        self.is_type(compactor, problem_types::TC_EXECUTION_TIMEOUT)
    }

    pub fn is_jvm_crash(&self, compactor: &dyn StringCompactor) -> bool {
        self.is_type(compactor, problem_types::TC_JVM_CRASH)
    }

    pub fn is_oome(&self, compactor: &dyn StringCompactor) -> bool {
        self.is_type(compactor, problem_types::TC_OOME)
    }

    pub fn is_exit_code(&self, compactor: &dyn StringCompactor) -> bool {
        self.is_type(compactor, problem_types::TC_EXIT_CODE)
    }

    pub fn is_failed_tests(&self, compactor: &dyn StringCompactor) -> bool {
        self.is_type(compactor, problem_types::TC_FAILED_TESTS)
    }

    pub fn is_snapshot_dep_problem(&self, compactor: &dyn StringCompactor) -> bool {
        self.is_type(compactor, problem_types::SNAPSHOT_DEPENDENCY_ERROR)
            || self.is_type(
                compactor,
                problem_types::SNAPSHOT_DEPENDENCY_ERROR_BUILD_PROCEEDS_TYPE,
            )
    }

    pub fn is_java_level_deadlock(&self, compactor: &dyn StringCompactor) -> bool {
        self.is_type(compactor, problem_types::JAVA_LEVEL_DEADLOCK)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestCompacted {
    test_id: Option<i32>,
    name_id: i32,
    status_id: i32,
    duration_ms: Option<u64>,
    muted: bool,
    ignored: bool,
    currently_investigated: bool,
}

/// Immutable, interned snapshot of one build together with its problems
/// and test occurrences.
#[derive(Debug, Clone)]
pub struct FatBuildCompacted {
    id: i64,
    build_type_id: i32,
    build_type_name: i32,
    project_id: i32,
    branch_name: Option<i32>,
    composite: bool,
    problems: Vec<ProblemCompacted>,
    snapshot_dependencies: Vec<BuildRef>,
    tests: Vec<TestCompacted>,
    start_date: Option<DateTime<Utc>>,
    finish_date: Option<DateTime<Utc>>,
}

impl FatBuildCompacted {
    pub fn new(build: &Build, details: &BuildDetails, compactor: &dyn StringCompactor) -> Self {
        let problems = details
            .problems
            .iter()
            .map(|p| ProblemCompacted {
                id: compactor.get_or_create_id(&p.id),
                type_id: compactor.get_or_create_id(&p.problem_type),
            })
            .collect();

        let tests = details
            .tests
            .iter()
            .map(|t| TestCompacted {
                test_id: t.test_id.as_deref().map(|id| compactor.get_or_create_id(id)),
                name_id: compactor.get_or_create_id(&t.name),
                status_id: compactor.get_or_create_id(&t.status),
                duration_ms: t.duration_ms,
                muted: t.muted,
                ignored: t.ignored,
                currently_investigated: t.currently_investigated,
            })
            .collect();

        Self {
            id: build.id,
            build_type_id: compactor.get_or_create_id(&build.build_type_id),
            build_type_name: compactor.get_or_create_id(&build.build_type_name),
            project_id: compactor.get_or_create_id(&build.project_id),
            branch_name: build
                .branch_name
                .as_deref()
                .map(|b| compactor.get_or_create_id(b)),
            composite: build.composite,
            problems,
            snapshot_dependencies: build.snapshot_dependencies.clone(),
            tests,
            start_date: build.start_date,
            finish_date: build.finish_date,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn build_type_id(&self) -> i32 {
        self.build_type_id
    }

    pub fn branch_name(&self) -> Option<i32> {
        self.branch_name
    }

    pub fn is_composite(&self) -> bool {
        self.composite
    }

    pub fn problems(&self) -> &[ProblemCompacted] {
        &self.problems
    }

    pub fn snapshot_dependencies(&self) -> &[BuildRef] {
        &self.snapshot_dependencies
    }

    pub fn build_type_name(&self, compactor: &dyn StringCompactor) -> String {
        compactor
            .string_from_id(self.build_type_name)
            .unwrap_or_default()
    }

    pub fn project_id(&self, compactor: &dyn StringCompactor) -> String {
        compactor.string_from_id(self.project_id).unwrap_or_default()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_date, self.finish_date) {
            (Some(start), Some(finish)) if finish >= start => Some(finish - start),
            _ => None,
        }
    }

    pub fn test_occurrences(&self, compactor: &dyn StringCompactor) -> Vec<TestOccurrence> {
        self.tests
            .iter()
            .map(|t| TestOccurrence {
                test_id: t.test_id.and_then(|id| compactor.string_from_id(id)),
                name: compactor.string_from_id(t.name_id).unwrap_or_default(),
                status: compactor.string_from_id(t.status_id).unwrap_or_default(),
                duration_ms: t.duration_ms,
                muted: t.muted,
                ignored: t.ignored,
                currently_investigated: t.currently_investigated,
            })
            .collect()
    }

    pub fn failed_not_muted_test_names(&self, compactor: &dyn StringCompactor) -> Vec<String> {
        let Some(failure_id) = compactor.string_id(STATUS_FAILURE) else {
            return vec![];
        };

        self.tests
            .iter()
            .filter(|t| t.status_id == failure_id && !t.muted && !t.ignored)
            .filter_map(|t| compactor.string_from_id(t.name_id))
            .collect()
    }

    pub fn all_test_names(&self, compactor: &dyn StringCompactor) -> Vec<String> {
        self.tests
            .iter()
            .filter_map(|t| compactor.string_from_id(t.name_id))
            .collect()
    }
}
