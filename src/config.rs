use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chain::{ChainOptions, LogsMode, RebuildMode};
use crate::providers::DEFAULT_MAX_CONCURRENT_REQUESTS;

/// Configuration file structure for `ChainLens`.
///
/// Holds the server connection and the chain defaults that would otherwise
/// be repeated on every run. Configuration files are loaded from the current
/// directory or a specified path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub teamcity: TeamCityConfig,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Directory of `<server-id>.contacts.toml` files
    pub contacts_dir: Option<PathBuf>,

    /// Failure statistics file (TOML or JSON) used for ranking
    pub fail_rates: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TeamCityConfig {
    /// Name of the server, selects its contact file
    #[serde(default = "default_server_id")]
    pub server_id: String,

    pub base_url: Option<String>,

    /// Access token; `TEAMCITY_TOKEN` takes precedence
    pub token: Option<String>,

    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// none, latest or all
    #[serde(default = "default_rebuild_mode")]
    pub rebuild_mode: String,

    /// none, suite-not-complete or all
    #[serde(default = "default_logs_mode")]
    pub logs_mode: String,

    #[serde(default)]
    pub include_scheduled: bool,

    #[serde(default)]
    pub show_contacts: bool,

    pub fail_rate_branch: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
}

impl Default for TeamCityConfig {
    fn default() -> Self {
        Self {
            server_id: default_server_id(),
            base_url: None,
            token: None,
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rebuild_mode: default_rebuild_mode(),
            logs_mode: default_logs_mode(),
            include_scheduled: false,
            show_contacts: false,
            fail_rate_branch: None,
        }
    }
}

fn default_server_id() -> String {
    "default".to_string()
}

fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

fn default_rebuild_mode() -> String {
    RebuildMode::default().to_string()
}

fn default_logs_mode() -> String {
    LogsMode::default().to_string()
}

impl ChainConfig {
    /// Parses the textual modes. An unknown mode is a configuration error.
    pub fn to_options(&self) -> Result<ChainOptions> {
        let rebuild_mode: RebuildMode = self
            .rebuild_mode
            .parse()
            .context("Invalid [chain] rebuild-mode")?;
        let logs_mode: LogsMode = self
            .logs_mode
            .parse()
            .context("Invalid [chain] logs-mode")?;

        Ok(ChainOptions {
            rebuild_mode,
            logs_mode,
            include_scheduled: self.include_scheduled,
            show_contacts: self.show_contacts,
            fail_rate_branch: self.fail_rate_branch.clone(),
        })
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./chainlens.toml
    /// 3. ./chainlens.json
    /// 4. ./chainlens.yaml
    /// 5. ./chainlens.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "chainlens.toml",
            "chainlens.json",
            "chainlens.yaml",
            "chainlens.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}
