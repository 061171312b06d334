use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::chain::branch::normalize_branch;
use crate::error::Result;

/// Failure statistics of a suite or test.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunStat {
    pub runs: u32,
    pub failures: u32,
    /// Share of runs that failed, `0.0..=1.0`
    pub fail_rate: f32,
    /// Share of runs that crashed or timed out, `0.0..=1.0`
    pub critical_fail_rate: f32,
}

impl RunStat {
    pub fn fail_percent_printable(&self) -> String {
        format!("{:.1}", self.fail_rate * 100.0)
    }
}

/// Suite identity within a (normalized) branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuiteInBranch {
    pub suite_id: String,
    pub branch: String,
}

impl SuiteInBranch {
    pub fn new(suite_id: impl Into<String>, branch: Option<&str>) -> Self {
        Self {
            suite_id: suite_id.into(),
            branch: normalize_branch(branch).to_string(),
        }
    }
}

/// Source of historical failure statistics.
pub trait FailureAnalytics: Send + Sync {
    /// `None` means no data for this suite, not an error.
    fn build_failure_run_stat(&self, key: &SuiteInBranch) -> Option<RunStat>;
}

#[derive(Debug, Deserialize)]
struct RunStatEntry {
    suite: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(flatten)]
    stat: RunStat,
}

#[derive(Debug, Deserialize)]
struct RunStatsFile {
    #[serde(default)]
    suites: Vec<RunStatEntry>,
}

/// Fixed statistics, usually exported from a history database.
#[derive(Debug, Clone, Default)]
pub struct StaticRunStats {
    stats: HashMap<SuiteInBranch, RunStat>,
}

impl StaticRunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: SuiteInBranch, stat: RunStat) {
        self.stats.insert(key, stat);
    }

    /// Reads a TOML or JSON file with a `suites` array of
    /// `{ suite, branch?, runs, failures, fail-rate, critical-fail-rate }`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;

        let file: RunStatsFile = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };

        let mut stats = Self::new();
        for entry in file.suites {
            stats.insert(
                SuiteInBranch::new(entry.suite, entry.branch.as_deref()),
                entry.stat,
            );
        }

        info!("Loaded failure statistics for {} suites", stats.stats.len());

        Ok(stats)
    }
}

impl FailureAnalytics for StaticRunStats {
    fn build_failure_run_stat(&self, key: &SuiteInBranch) -> Option<RunStat> {
        self.stats.get(key).copied()
    }
}
