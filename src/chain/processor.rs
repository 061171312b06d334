use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::analytics::FailureAnalytics;
use crate::contacts::ContactPersons;
use crate::error::Result;
use crate::model::{Build, BuildRef};
use crate::server::CiServer;

use super::branch::branch_or_default;
use super::collector::BuildCollector;
use super::discovery::{ChainDiscoverer, DedupSet};
use super::full_chain::FullChainRunCtx;
use super::modes::{LogsMode, RebuildMode};
use super::ranking::RankingStrategy;

/// Per-request knobs of chain resolution.
#[derive(Debug, Clone, Default)]
pub struct ChainOptions {
    pub rebuild_mode: RebuildMode,
    pub logs_mode: LogsMode,
    /// Count running and queued builds of every suite
    pub include_scheduled: bool,
    /// Look up suite contact persons (also selects contact ranking)
    pub show_contacts: bool,
    /// Branch whose failure statistics rank suites; default branch if unset
    pub fail_rate_branch: Option<String>,
}

/// Resolves build chains on one server into ranked suite contexts.
pub struct BuildChainProcessor {
    server: Arc<dyn CiServer>,
    analytics: Option<Arc<dyn FailureAnalytics>>,
    contacts_dir: Option<PathBuf>,
}

impl BuildChainProcessor {
    pub fn new(server: Arc<dyn CiServer>) -> Self {
        Self {
            server,
            analytics: None,
            contacts_dir: None,
        }
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn FailureAnalytics>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn with_contacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.contacts_dir = Some(dir.into());
        self
    }

    pub fn server(&self) -> &Arc<dyn CiServer> {
        &self.server
    }

    pub fn analytics(&self) -> Option<&Arc<dyn FailureAnalytics>> {
        self.analytics.as_ref()
    }

    /// Loads the contact directory when requested, then resolves the chain.
    pub async fn process_build_chains(
        &self,
        entry_points: &[BuildRef],
        options: &ChainOptions,
    ) -> Result<FullChainRunCtx> {
        let contacts = if options.show_contacts {
            Some(Arc::new(self.load_contacts()?))
        } else {
            None
        };

        Ok(self.load_chain_context(entry_points, options, contacts).await)
    }

    /// Resolves the chain of the most recent finished build of a suite.
    /// `None` when the suite has no finished builds on the branch.
    pub async fn load_latest_chain(
        &self,
        suite_id: &str,
        branch: Option<&str>,
        options: &ChainOptions,
    ) -> Result<Option<FullChainRunCtx>> {
        let branch = branch_or_default(branch);
        let builds = self
            .server
            .get_finished_builds_include_sn_dep_failed(suite_id, branch)
            .await?;

        let Some(latest) = builds
            .into_iter()
            .filter(|b| !b.is_fake_stub())
            .max_by_key(|b| b.id)
        else {
            info!("No finished builds of {suite_id} on {branch}");
            return Ok(None);
        };

        debug!("Latest build of {suite_id} on {branch} is {}", latest.id);

        self.process_build_chains(&[latest], options).await.map(Some)
    }

    /// Discovery, collection and ranking over the given entry points.
    /// The first entry point becomes the chain root.
    pub async fn load_chain_context(
        &self,
        entry_points: &[BuildRef],
        options: &ChainOptions,
        contacts: Option<Arc<ContactPersons>>,
    ) -> FullChainRunCtx {
        let Some(first) = entry_points.first() else {
            return FullChainRunCtx::new(Build::fake_stub());
        };

        let root = self.load_root(first).await;

        let unique = DedupSet::new();
        let discovered = ChainDiscoverer::new(self.server.as_ref())
            .discover(entry_points, options.rebuild_mode, &unique)
            .await;

        info!(
            "Collecting {} builds of chain {} ({} rebuild mode)",
            discovered.len(),
            first.suite_id(),
            options.rebuild_mode
        );

        let contacts_supplied = contacts.is_some();
        let collector = BuildCollector::new(
            Arc::clone(&self.server),
            options.logs_mode,
            options.include_scheduled,
            contacts,
        );
        collector.collect_all(&discovered).await;
        let mut suites = collector.into_suites();

        let strategy = RankingStrategy::select(
            self.analytics.clone(),
            options.fail_rate_branch.clone(),
            contacts_supplied,
        );
        debug!("Ranking {} suites by {}", suites.len(), strategy.name());
        strategy.sort(&mut suites);

        let mut ctx = FullChainRunCtx::new(root);
        ctx.add_all_suites(suites);
        ctx
    }

    async fn load_root(&self, reference: &BuildRef) -> Build {
        match self.server.get_build(&reference.href).await {
            Ok(build) => build,
            Err(e) => {
                warn!("Failed to load chain root {}: {e}", reference.href);
                Build::fake_stub()
            }
        }
    }

    fn load_contacts(&self) -> Result<ContactPersons> {
        let dir = match &self.contacts_dir {
            Some(dir) => dir.clone(),
            None => ContactPersons::default_dir()?,
        };

        ContactPersons::load(&dir, self.server.server_id())
    }
}
