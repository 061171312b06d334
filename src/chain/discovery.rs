use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, info, warn};

use crate::model::BuildRef;
use crate::server::CiServer;

use super::branch::branch_or_default;
use super::modes::RebuildMode;

/// How many times snapshot dependencies are expanded from the entry points.
/// Dependencies deeper than this are not discovered.
pub const DEPENDENCY_EXPANSION_DEPTH: usize = 2;

/// Concurrent set of claimed build ids; the first claim of an id wins.
#[derive(Debug, Default)]
pub struct DedupSet {
    claimed: DashMap<i64, BuildRef>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call claimed the build id. Fake stubs are
    /// never claimed.
    pub fn claim(&self, reference: &BuildRef) -> bool {
        if reference.is_fake_stub() {
            return false;
        }

        match self.claimed.entry(reference.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(reference.clone());
                true
            }
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.claimed.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

/// Walks snapshot-dependency edges from the entry points and applies the
/// rebuild mode to every build found.
pub struct ChainDiscoverer<'a> {
    server: &'a dyn CiServer,
}

impl<'a> ChainDiscoverer<'a> {
    pub fn new(server: &'a dyn CiServer) -> Self {
        Self { server }
    }

    /// Deduplicated references of every build that has to be collected.
    pub async fn discover(
        &self,
        entry_points: &[BuildRef],
        rebuild_mode: RebuildMode,
        unique: &DedupSet,
    ) -> Vec<BuildRef> {
        let mut frontier = entry_points.to_vec();

        for _ in 0..DEPENDENCY_EXPANSION_DEPTH {
            let expanded = join_all(
                frontier
                    .into_iter()
                    .map(|reference| self.expand_dependencies(reference)),
            )
            .await;

            frontier = expanded.into_iter().flatten().collect();
        }

        let candidates: Vec<BuildRef> = frontier
            .into_iter()
            .filter(|reference| unique.claim(reference))
            .collect();

        debug!(
            "Discovered {} unique builds from {} entry points",
            candidates.len(),
            entry_points.len()
        );

        let rerun_limit = entry_points.len();
        let with_reruns = join_all(candidates.into_iter().map(|reference| {
            self.apply_rebuild_mode(reference, rebuild_mode, unique, rerun_limit)
        }))
        .await;

        with_reruns.into_iter().flatten().collect()
    }

    /// The build's snapshot dependencies followed by the build itself, or
    /// just the build when it has none.
    async fn expand_dependencies(&self, reference: BuildRef) -> Vec<BuildRef> {
        if reference.is_fake_stub() {
            return vec![reference];
        }

        let build = match self.server.get_build(&reference.href).await {
            Ok(build) => build,
            Err(e) => {
                warn!("Failed to load build {}: {e}", reference.href);
                return vec![reference];
            }
        };

        if build.is_fake_stub() || build.snapshot_dependencies.is_empty() {
            return vec![reference];
        }

        info!(
            "Snapshot deps found: {}->{:?}",
            reference.suite_id(),
            build
                .snapshot_dependencies
                .iter()
                .map(BuildRef::suite_id)
                .collect::<Vec<_>>()
        );

        let mut expanded = build.snapshot_dependencies;
        expanded.push(reference);
        expanded
    }

    async fn apply_rebuild_mode(
        &self,
        reference: BuildRef,
        rebuild_mode: RebuildMode,
        unique: &DedupSet,
        rerun_limit: usize,
    ) -> Vec<BuildRef> {
        if rebuild_mode == RebuildMode::None {
            return vec![reference];
        }

        let branch = branch_or_default(reference.branch_name.as_deref());
        let builds = match self
            .server
            .get_finished_builds(&reference.build_type_id, branch)
            .await
        {
            Ok(builds) => builds,
            Err(e) => {
                warn!(
                    "Failed to list finished builds of {} on {branch}: {e}",
                    reference.build_type_id
                );
                return vec![reference];
            }
        };

        match rebuild_mode {
            RebuildMode::Latest => {
                let latest = builds
                    .into_iter()
                    .filter(|b| !b.is_fake_stub())
                    .max_by_key(|b| b.id);

                match latest {
                    Some(latest) if latest.id != reference.id => {
                        if unique.claim(&latest) {
                            vec![latest]
                        } else {
                            debug!(
                                "Latest build {} of {} already collected",
                                latest.id, reference.build_type_id
                            );
                            Vec::new()
                        }
                    }
                    _ => vec![reference],
                }
            }
            RebuildMode::All => {
                let mut reruns: Vec<BuildRef> = builds
                    .into_iter()
                    .filter(|b| !b.is_fake_stub())
                    .filter(|b| unique.claim(b))
                    .collect();

                reruns.sort_by(|a, b| b.id.cmp(&a.id));
                reruns.truncate(rerun_limit);
                reruns
            }
            RebuildMode::None => vec![reference],
        }
    }
}
