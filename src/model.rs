use chrono::{DateTime, Utc};

/// Problem type codes reported by TeamCity.
///
/// See <http://javadoc.jetbrains.net/teamcity/openapi/8.0/constant-values.html>
pub mod problem_types {
    pub const BUILD_FAILURE_ON_MESSAGE: &str = "BuildFailureOnMessage";
    pub const TC_EXIT_CODE: &str = "TC_EXIT_CODE";
    pub const TC_OOME: &str = "TC_OOME";
    pub const TC_EXECUTION_TIMEOUT: &str = "TC_EXECUTION_TIMEOUT";
    pub const TC_FAILED_TESTS: &str = "TC_FAILED_TESTS";
    pub const TC_JVM_CRASH: &str = "TC_JVM_CRASH";
    pub const OTHER: &str = "OTHER";
    pub const SNAPSHOT_DEPENDENCY_ERROR_BUILD_PROCEEDS_TYPE: &str =
        "SNAPSHOT_DEPENDENCY_ERROR_BUILD_PROCEEDS_TYPE";
    pub const SNAPSHOT_DEPENDENCY_ERROR: &str = "SNAPSHOT_DEPENDENCY_ERROR";
    /// Detected by log processing, never reported by the server itself.
    pub const JAVA_LEVEL_DEADLOCK: &str = "JAVA_LEVEL_DEADLOCK";
}

pub const STATUS_SUCCESS: &str = "SUCCESS";
pub const STATUS_FAILURE: &str = "FAILURE";

/// Lightweight reference to a build, as found in build lists and
/// snapshot-dependency edges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildRef {
    /// Server-assigned, monotonically increasing build id
    pub id: i64,
    /// Build type (suite) identifier
    pub build_type_id: String,
    /// Logical branch name; `None` means the default branch
    pub branch_name: Option<String>,
    /// REST locator of the full build, e.g. `/app/rest/latest/builds/id:123`
    pub href: String,
    pub status: Option<String>,
    pub state: Option<String>,
    pub(crate) fake_stub: bool,
}

impl BuildRef {
    pub fn new(
        id: i64,
        build_type_id: impl Into<String>,
        branch_name: Option<String>,
        href: impl Into<String>,
    ) -> Self {
        Self {
            id,
            build_type_id: build_type_id.into(),
            branch_name,
            href: href.into(),
            status: None,
            state: None,
            fake_stub: false,
        }
    }

    /// Sentinel standing in for "no such build".
    pub fn fake_stub() -> Self {
        Self {
            id: -1,
            fake_stub: true,
            ..Self::default()
        }
    }

    pub fn is_fake_stub(&self) -> bool {
        self.fake_stub
    }

    pub fn suite_id(&self) -> &str {
        &self.build_type_id
    }
}

/// Full build detail as returned by the server for a single build.
#[derive(Debug, Clone, Default)]
pub struct Build {
    pub id: i64,
    pub build_type_id: String,
    pub build_type_name: String,
    pub project_id: String,
    pub branch_name: Option<String>,
    pub number: Option<String>,
    pub status: Option<String>,
    pub state: Option<String>,
    pub href: String,
    pub web_url: Option<String>,
    /// Aggregation node: runs no tests of its own
    pub composite: bool,
    pub snapshot_dependencies: Vec<BuildRef>,
    pub start_date: Option<DateTime<Utc>>,
    pub finish_date: Option<DateTime<Utc>>,
    pub(crate) fake_stub: bool,
}

impl Build {
    pub fn fake_stub() -> Self {
        Self {
            id: -1,
            fake_stub: true,
            ..Self::default()
        }
    }

    pub fn is_fake_stub(&self) -> bool {
        self.fake_stub
    }

    pub fn suite_id(&self) -> &str {
        &self.build_type_id
    }

    pub fn to_ref(&self) -> BuildRef {
        if self.fake_stub {
            return BuildRef::fake_stub();
        }

        BuildRef {
            id: self.id,
            build_type_id: self.build_type_id.clone(),
            branch_name: self.branch_name.clone(),
            href: self.href.clone(),
            status: self.status.clone(),
            state: self.state.clone(),
            fake_stub: false,
        }
    }
}

/// One build problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemOccurrence {
    pub id: String,
    pub identity: String,
    pub problem_type: String,
}

/// One test run inside a build.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestOccurrence {
    pub test_id: Option<String>,
    pub name: String,
    pub status: String,
    pub duration_ms: Option<u64>,
    pub muted: bool,
    pub ignored: bool,
    pub currently_investigated: bool,
}

impl TestOccurrence {
    pub fn is_failed(&self) -> bool {
        self.status == STATUS_FAILURE
    }

    pub fn is_failed_not_muted(&self) -> bool {
        self.is_failed() && !self.muted && !self.ignored
    }
}

/// VCS change included into a build.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Change {
    pub id: i64,
    pub version: Option<String>,
    pub username: Option<String>,
    pub(crate) fake_stub: bool,
}

impl Change {
    pub fn new(id: i64, version: Option<String>, username: Option<String>) -> Self {
        Self {
            id,
            version,
            username,
            fake_stub: false,
        }
    }

    pub fn fake_stub() -> Self {
        Self {
            id: -1,
            fake_stub: true,
            ..Self::default()
        }
    }

    pub fn is_fake_stub(&self) -> bool {
        self.fake_stub
    }
}

/// Per-build facts fetched separately from the build itself.
#[derive(Debug, Clone, Default)]
pub struct BuildDetails {
    pub problems: Vec<ProblemOccurrence>,
    pub tests: Vec<TestOccurrence>,
    pub changes: Vec<Change>,
}
