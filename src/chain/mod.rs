//! Build-chain resolution: discovery of every build of a chain, concurrent
//! collection into per-suite contexts and ranking of the result.

pub mod branch;
pub mod collector;
pub mod deferred;
pub mod discovery;
pub mod fat_build;
pub mod full_chain;
pub mod log_check;
pub mod modes;
pub mod processor;
pub mod ranking;
pub mod single_build;
pub mod suite;

pub use branch::{branch_or_default, normalize_branch, DEFAULT_BRANCH};
pub use deferred::Deferred;
pub use full_chain::FullChainRunCtx;
pub use modes::{LogsMode, RebuildMode};
pub use processor::{BuildChainProcessor, ChainOptions};
pub use ranking::RankingStrategy;
pub use single_build::{SingleBuildRunCtx, SuiteResults};
pub use suite::SuiteRunCtx;
