use std::sync::Arc;

use crate::model::Build;

use super::single_build::SuiteResults;
use super::suite::SuiteRunCtx;

/// Result of resolving one build chain: the root build plus one ranked
/// context per suite.
#[derive(Debug)]
pub struct FullChainRunCtx {
    root: Build,
    suites: Vec<Arc<SuiteRunCtx>>,
}

impl FullChainRunCtx {
    pub fn new(root: Build) -> Self {
        Self {
            root,
            suites: Vec::new(),
        }
    }

    pub fn add_all_suites(&mut self, suites: impl IntoIterator<Item = Arc<SuiteRunCtx>>) {
        self.suites.extend(suites);
    }

    pub fn root(&self) -> &Build {
        &self.root
    }

    pub fn is_fake_stub(&self) -> bool {
        self.root.is_fake_stub()
    }

    pub fn suite_id(&self) -> &str {
        self.root.suite_id()
    }

    pub fn suite_name(&self) -> &str {
        &self.root.build_type_name
    }

    pub fn branch_name(&self) -> Option<&str> {
        self.root.branch_name.as_deref()
    }

    pub fn build_id(&self) -> Option<i64> {
        (!self.root.is_fake_stub()).then_some(self.root.id)
    }

    /// Suites in ranking order.
    pub fn suites(&self) -> &[Arc<SuiteRunCtx>] {
        &self.suites
    }

    pub fn failed_child_suites(&self) -> impl Iterator<Item = &Arc<SuiteRunCtx>> + '_ {
        self.suites.iter().filter(|s| s.is_failed())
    }

    pub fn failed_tests(&self) -> usize {
        self.suites.iter().map(|s| s.failed_tests()).sum()
    }

    /// Number of suites that did not run to completion.
    pub fn failed_to_finish(&self) -> usize {
        self.suites
            .iter()
            .filter(|s| s.has_suite_incomplete_failure())
            .count()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.suites
            .iter()
            .filter_map(|s| s.build_duration())
            .reduce(|a, b| a + b)
    }
}
