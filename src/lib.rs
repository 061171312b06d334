//! Resolution and aggregation of TeamCity build chains.
//!
//! A chain is a root build together with everything reachable through its
//! snapshot dependencies. [`chain::BuildChainProcessor`] walks the chain on a
//! [`server::CiServer`], groups the builds by suite and ranks the suites so
//! the most relevant failures come first.

pub mod analytics;
pub mod auth;
pub mod chain;
pub mod compactor;
pub mod config;
pub mod contacts;
pub mod error;
pub mod model;
pub mod output;
pub mod providers;
pub mod report;
pub mod server;
