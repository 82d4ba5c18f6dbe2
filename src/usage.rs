// Last used account/role combinations per configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

pub const USAGE_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastUsage {
    pub account_id: String,
    pub account_name: String,
    pub role: String,
}

impl LastUsage {
    /// Line shown when choosing among recent combinations
    pub fn label(&self, index: usize) -> String {
        format!(
            "#{} {} {} - {}",
            index, self.account_name, self.account_id, self.role
        )
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsageFile {
    version: u32,
    #[serde(default)]
    last_usage_information: BTreeMap<String, Vec<LastUsage>>,
}

/// Most recently used first, without duplicates
#[derive(Debug, Clone)]
pub struct UsageCache {
    path: PathBuf,
}

impl UsageCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_file(&self) -> UsageFile {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| match serde_yaml::from_str(&raw) {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::warn!("Ignoring invalid usage cache {}: {}", self.path.display(), e);
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Recent combinations for `config_name`, newest first
    pub fn recent(&self, config_name: &str) -> Vec<LastUsage> {
        self.read_file()
            .last_usage_information
            .remove(config_name)
            .unwrap_or_default()
    }

    /// Move `usage` to the front of the list for `config_name`
    pub fn record(&self, config_name: &str, usage: LastUsage) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = self.read_file();
        file.version = USAGE_FILE_VERSION;

        let entries = file
            .last_usage_information
            .entry(config_name.to_string())
            .or_default();
        entries.retain(|existing| existing != &usage);
        entries.insert(0, usage);

        let content = serde_yaml::to_string(&file).context("Failed to serialize usage cache")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}
