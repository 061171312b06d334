mod teamcity;

pub use teamcity::{
    analyze_log, LogScanner, TeamCityClient, TeamCityProvider, DEFAULT_MAX_CONCURRENT_REQUESTS,
};
