use std::collections::HashMap;

/// Per-test findings of build log analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestLogCheckResult {
    pub warns: Vec<String>,
    pub log_size_bytes: u64,
}

impl TestLogCheckResult {
    pub fn has_warns(&self) -> bool {
        !self.warns.is_empty()
    }
}

/// Outcome of analysing one build log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogCheckResult {
    /// Test that was running when the build stopped producing output
    pub last_started_test: Option<String>,
    pub last_thread_dump: Option<String>,
    pub test_log_check_result: HashMap<String, TestLogCheckResult>,
}

impl LogCheckResult {
    pub fn has_thread_dump(&self) -> bool {
        self.last_thread_dump
            .as_deref()
            .is_some_and(|dump| !dump.is_empty())
    }
}
