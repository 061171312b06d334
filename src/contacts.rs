use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;

use crate::error::{ChainLensError, Result};

/// Contact file layout:
///
/// ```toml
/// [contacts]
/// Ignite_Cache = "Alice"
/// Ignite_Queries = "Bob"
/// ```
#[derive(Debug, Default, Deserialize)]
struct ContactsFile {
    #[serde(default)]
    contacts: HashMap<String, String>,
}

/// Directory of people responsible for suites on one server.
#[derive(Debug, Clone, Default)]
pub struct ContactPersons {
    persons: HashMap<String, String>,
}

impl ContactPersons {
    pub fn new(persons: HashMap<String, String>) -> Self {
        Self { persons }
    }

    /// Default location of per-server contact files
    /// (`~/.config/chainlens/contacts` on Linux).
    pub fn default_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("chainlens").join("contacts"))
            .ok_or_else(|| ChainLensError::Config("No config directory found".into()))
    }

    pub fn file_for(dir: &Path, server_id: &str) -> PathBuf {
        dir.join(format!("{server_id}.contacts.toml"))
    }

    /// Loads `<dir>/<server_id>.contacts.toml`. A missing file is an empty
    /// directory, not an error.
    pub fn load(dir: &Path, server_id: &str) -> Result<Self> {
        let path = Self::file_for(dir, server_id);

        if !path.exists() {
            debug!("No contacts file for server {server_id} at {}", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let file: ContactsFile = toml::from_str(&content)?;

        info!(
            "Loaded {} contact persons from {}",
            file.contacts.len(),
            path.display()
        );

        Ok(Self::new(file.contacts))
    }

    pub fn lookup(&self, suite_id: &str) -> Option<String> {
        self.persons.get(suite_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }
}
