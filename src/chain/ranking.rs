use std::cmp::Ordering;
use std::sync::Arc;

use crate::analytics::{FailureAnalytics, SuiteInBranch};

use super::single_build::SuiteResults;
use super::suite::SuiteRunCtx;

/// Weight of the critical fail rate in the analytics score.
#[allow(clippy::approx_constant)]
pub const CRITICAL_FAIL_WEIGHT: f32 = 3.14;

/// Order of suites within a chain result.
#[derive(Clone)]
pub enum RankingStrategy {
    /// Most failure-prone suites first.
    Analytics {
        analytics: Arc<dyn FailureAnalytics>,
        branch: Option<String>,
    },
    /// By contact person, suites without one first.
    ContactPerson,
    /// By suite display name.
    Name,
}

impl RankingStrategy {
    /// Picks a strategy from the optional inputs, analytics first.
    pub fn select(
        analytics: Option<Arc<dyn FailureAnalytics>>,
        fail_rate_branch: Option<String>,
        contacts_supplied: bool,
    ) -> Self {
        match analytics {
            Some(analytics) => RankingStrategy::Analytics {
                analytics,
                branch: fail_rate_branch,
            },
            None if contacts_supplied => RankingStrategy::ContactPerson,
            None => RankingStrategy::Name,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RankingStrategy::Analytics { .. } => "analytics",
            RankingStrategy::ContactPerson => "contact person",
            RankingStrategy::Name => "name",
        }
    }

    /// Analytics score of a suite; 0 when there is no data for it.
    pub fn score(analytics: &dyn FailureAnalytics, branch: Option<&str>, suite: &SuiteRunCtx) -> f32 {
        analytics
            .build_failure_run_stat(&SuiteInBranch::new(suite.suite_id(), branch))
            .map_or(0.0, |stat| {
                stat.critical_fail_rate * CRITICAL_FAIL_WEIGHT + stat.fail_rate
            })
    }

    pub fn sort(&self, suites: &mut [Arc<SuiteRunCtx>]) {
        match self {
            RankingStrategy::Analytics { analytics, branch } => {
                let mut scored: Vec<(f32, Arc<SuiteRunCtx>)> = suites
                    .iter()
                    .map(|s| (Self::score(analytics.as_ref(), branch.as_deref(), s), Arc::clone(s)))
                    .collect();

                scored.sort_by(|(score_a, a), (score_b, b)| {
                    score_b
                        .partial_cmp(score_a)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.suite_id().cmp(&b.suite_id()))
                });

                for (slot, (_, suite)) in suites.iter_mut().zip(scored) {
                    *slot = suite;
                }
            }
            RankingStrategy::ContactPerson => suites.sort_by(|a, b| {
                a.contact_person_or_empty()
                    .cmp(b.contact_person_or_empty())
                    .then_with(|| a.suite_id().cmp(&b.suite_id()))
            }),
            RankingStrategy::Name => suites.sort_by(|a, b| {
                a.suite_name()
                    .cmp(b.suite_name())
                    .then_with(|| a.suite_id().cmp(&b.suite_id()))
            }),
        }
    }
}

impl std::fmt::Debug for RankingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankingStrategy::Analytics { branch, .. } => f
                .debug_struct("Analytics")
                .field("branch", branch)
                .finish_non_exhaustive(),
            RankingStrategy::ContactPerson => f.write_str("ContactPerson"),
            RankingStrategy::Name => f.write_str("Name"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{RunStat, StaticRunStats};
    use crate::model::Build;

    fn suite(id: &str, name: &str) -> Arc<SuiteRunCtx> {
        Arc::new(SuiteRunCtx::new(&Build {
            id: 1,
            build_type_id: id.to_string(),
            build_type_name: name.to_string(),
            ..Build::default()
        }))
    }

    fn ids(suites: &[Arc<SuiteRunCtx>]) -> Vec<String> {
        suites.iter().map(|s| s.suite_id()).collect()
    }

    fn stats() -> Arc<dyn FailureAnalytics> {
        let mut stats = StaticRunStats::new();
        stats.insert(
            SuiteInBranch::new("A", None),
            RunStat {
                runs: 10,
                failures: 2,
                fail_rate: 0.2,
                critical_fail_rate: 1.0,
            },
        );
        stats.insert(
            SuiteInBranch::new("B", None),
            RunStat {
                runs: 10,
                failures: 9,
                fail_rate: 0.9,
                critical_fail_rate: 0.0,
            },
        );
        Arc::new(stats)
    }

    #[test]
    fn test_critical_failures_outrank_raw_fail_rate() {
        let analytics = stats();
        let mut suites = vec![suite("C", "C"), suite("B", "B"), suite("A", "A")];

        let a_score = RankingStrategy::score(analytics.as_ref(), None, &suites[2]);
        assert!((a_score - 3.34).abs() < 1e-5);
        assert!((RankingStrategy::score(analytics.as_ref(), None, &suites[1]) - 0.9).abs() < 1e-5);
        assert_eq!(RankingStrategy::score(analytics.as_ref(), None, &suites[0]), 0.0);

        RankingStrategy::select(Some(analytics), None, true).sort(&mut suites);

        assert_eq!(ids(&suites), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_analytics_branch_is_normalized() {
        let analytics = stats();
        let a = suite("A", "A");

        let score = RankingStrategy::score(analytics.as_ref(), Some("refs/heads/master"), &a);
        assert!(score > 3.0);
        assert_eq!(RankingStrategy::score(analytics.as_ref(), Some("feature"), &a), 0.0);
    }

    #[test]
    fn test_contact_person_ranking() {
        let mut suites = vec![suite("A", "A"), suite("B", "B"), suite("C", "C")];
        suites[0].set_contact_person(Some("Zed".to_string()));
        suites[1].set_contact_person(Some("Anna".to_string()));

        let strategy = RankingStrategy::select(None, None, true);
        strategy.sort(&mut suites);

        assert_eq!(strategy.name(), "contact person");
        assert_eq!(ids(&suites), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_name_ranking_is_the_default() {
        let mut suites = vec![suite("1", "Queries"), suite("2", "Cache"), suite("3", "Basic")];

        let strategy = RankingStrategy::select(None, Some("master".to_string()), false);
        strategy.sort(&mut suites);

        assert!(matches!(strategy, RankingStrategy::Name));
        assert_eq!(ids(&suites), vec!["3", "2", "1"]);
    }
}
