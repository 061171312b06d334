use std::fmt;
use std::str::FromStr;

use crate::error::ChainLensError;

/// Which reruns of each discovered build type get collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebuildMode {
    /// Collect discovered builds as they are
    None,
    /// Replace each build with the most recent finished run of its suite
    #[default]
    Latest,
    /// Collect recent finished runs, at most one per entry point
    All,
}

impl FromStr for RebuildMode {
    type Err = ChainLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "none" => Ok(Self::None),
            "latest" => Ok(Self::Latest),
            "all" => Ok(Self::All),
            _ => Err(ChainLensError::UnsupportedRebuildMode(s.to_string())),
        }
    }
}

impl fmt::Display for RebuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Latest => "latest",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

/// When build logs are submitted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogsMode {
    None,
    /// Only builds that crashed, timed out or exited abnormally
    #[default]
    SuiteNotComplete,
    All,
}

impl FromStr for LogsMode {
    type Err = ChainLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "none" => Ok(Self::None),
            "suite-not-complete" => Ok(Self::SuiteNotComplete),
            "all" => Ok(Self::All),
            _ => Err(ChainLensError::UnsupportedLogsMode(s.to_string())),
        }
    }
}

impl fmt::Display for LogsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::SuiteNotComplete => "suite-not-complete",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rebuild_mode() {
        assert_eq!("none".parse::<RebuildMode>().unwrap(), RebuildMode::None);
        assert_eq!("LATEST".parse::<RebuildMode>().unwrap(), RebuildMode::Latest);
        assert_eq!(" all ".parse::<RebuildMode>().unwrap(), RebuildMode::All);
    }

    #[test]
    fn test_unknown_rebuild_mode_is_rejected() {
        let err = "newest".parse::<RebuildMode>().unwrap_err();
        assert!(matches!(err, ChainLensError::UnsupportedRebuildMode(ref m) if m == "newest"));
    }

    #[test]
    fn test_parse_logs_mode() {
        assert_eq!(
            "SUITE_NOT_COMPLETE".parse::<LogsMode>().unwrap(),
            LogsMode::SuiteNotComplete
        );
        assert_eq!("all".parse::<LogsMode>().unwrap(), LogsMode::All);
        assert!("sometimes".parse::<LogsMode>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for mode in [RebuildMode::None, RebuildMode::Latest, RebuildMode::All] {
            assert_eq!(mode.to_string().parse::<RebuildMode>().unwrap(), mode);
        }
    }
}
