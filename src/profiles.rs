// Named SSO configurations and their profiles

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Current layout of the configuration file
pub const CONFIG_FILE_VERSION: u32 = 1;

/// Target profile in the AWS credentials file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub region: String,
}

/// One SSO organization and the credential profiles fed from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsoConfig {
    /// Identifier in `https://{id}.awsapps.com/start`
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default = "default_last_used_accounts_count")]
    pub last_used_accounts_count: usize,
    pub sso_region: String,
}

fn default_last_used_accounts_count() -> usize {
    1
}

impl SsoConfig {
    pub fn new(id: impl Into<String>, sso_region: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            profiles: BTreeMap::new(),
            last_used_accounts_count: default_last_used_accounts_count(),
            sso_region: sso_region.into(),
        }
    }

    pub fn start_url(&self) -> String {
        format!("https://{}.awsapps.com/start", self.id)
    }

    /// Usable once it names an organization, a region and at least one profile
    pub fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.sso_region.is_empty() && !self.profiles.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    version: u32,
    #[serde(default)]
    configs: BTreeMap<String, SsoConfig>,
}

/// YAML file holding all named configurations
#[derive(Debug, Clone)]
pub struct ConfigStore {
    internal_dir: PathBuf,
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(internal_dir: PathBuf, path: PathBuf) -> Self {
        Self { internal_dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All configurations. Fails if the file is missing or invalid.
    pub fn read(&self) -> Result<BTreeMap<String, SsoConfig>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("No configuration found at {}", self.path.display()))?;
        parse_config_file(&raw)
            .with_context(|| format!("Invalid configuration file {}", self.path.display()))
    }

    /// Read, or an empty set when nothing is configured yet
    pub fn read_or_default(&self) -> BTreeMap<String, SsoConfig> {
        self.read().unwrap_or_default()
    }

    /// Persist `configs`. Incomplete entries fall back to what is already
    /// stored under the same name, or are dropped.
    pub fn write(&self, configs: &BTreeMap<String, SsoConfig>) -> Result<()> {
        let existing = self.read_or_default();

        let mut merged = BTreeMap::new();
        for (name, config) in configs {
            if config.is_complete() {
                merged.insert(name.clone(), config.clone());
            } else if let Some(previous) = existing.get(name) {
                tracing::warn!("Configuration '{}' is incomplete, keeping the stored one", name);
                merged.insert(name.clone(), previous.clone());
            } else {
                tracing::warn!("Configuration '{}' is incomplete, not saved", name);
            }
        }

        fs::create_dir_all(&self.internal_dir)
            .with_context(|| format!("Failed to create {}", self.internal_dir.display()))?;

        let content = serde_yaml::to_string(&ConfigFile {
            version: CONFIG_FILE_VERSION,
            configs: merged,
        })
        .context("Failed to serialize configuration")?;

        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// Copy the configuration file to `target` after validating it
    pub fn export(&self, target: &Path) -> Result<()> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("No configuration found at {}", self.path.display()))?;
        parse_config_file(&raw).context("Refusing to export an invalid configuration")?;

        fs::write(target, raw).with_context(|| format!("Failed to write {}", target.display()))
    }

    /// Replace the configuration with the content of `source`
    pub fn import(&self, source: &Path) -> Result<()> {
        let raw = fs::read_to_string(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        let configs = parse_config_file(&raw)
            .with_context(|| format!("Invalid configuration file {}", source.display()))?;

        tracing::info!("Importing {} configuration(s)", configs.len());
        self.write(&configs)
    }

    /// Remove the named configurations. Removing the last one deletes the
    /// whole awsx directory, cached tokens included.
    pub fn remove(&self, names: &[String]) -> Result<()> {
        let mut configs = self.read_or_default();
        for name in names {
            if configs.remove(name).is_none() {
                tracing::debug!("Configuration '{}' does not exist", name);
            }
        }

        if configs.is_empty() {
            if self.internal_dir.exists() {
                fs::remove_dir_all(&self.internal_dir).with_context(|| {
                    format!("Failed to remove {}", self.internal_dir.display())
                })?;
            }
            return Ok(());
        }

        self.write(&configs)
    }
}

fn parse_config_file(raw: &str) -> Result<BTreeMap<String, SsoConfig>> {
    let file: ConfigFile = serde_yaml::from_str(raw)?;
    Ok(file.configs)
}

/// YAML rendering of `configs` for display
pub fn to_yaml(configs: &BTreeMap<String, SsoConfig>) -> Result<String> {
    serde_yaml::to_string(configs).context("Failed to serialize configuration")
}
