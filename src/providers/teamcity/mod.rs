mod client;
mod log_check;
mod provider;
mod types;

pub use client::{TeamCityClient, DEFAULT_MAX_CONCURRENT_REQUESTS};
pub use log_check::{analyze_log, LogScanner};
pub use provider::TeamCityProvider;
