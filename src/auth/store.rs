// Token store backed by a versioned YAML file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::ClientInformation;

/// Current layout of the token store file
pub const TOKEN_STORE_VERSION: u32 = 1;

/// Persists one `ClientInformation` per configuration name
pub trait TokenStore: Send + Sync {
    /// Last record saved for `config_name`. Absence, unreadable or
    /// unparseable storage all read as `None`.
    fn load(&self, config_name: &str) -> Option<ClientInformation>;

    /// Replace the record for `config_name`, creating storage if needed
    fn save(&self, config_name: &str, record: &ClientInformation) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenStoreFile {
    version: u32,
    #[serde(default)]
    client_information: BTreeMap<String, ClientInformation>,
}

/// File-backed token store. No locking: the last writer wins.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Option<TokenStoreFile> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Token store {} unreadable: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_yaml::from_str::<TokenStoreFile>(&raw) {
            Ok(file) => {
                if file.version > TOKEN_STORE_VERSION {
                    tracing::debug!(
                        "Token store written by a newer layout (version {}), reading known fields",
                        file.version
                    );
                }
                Some(file)
            }
            Err(e) => {
                tracing::warn!(
                    "Token store {} is not valid, ignoring it: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, config_name: &str) -> Option<ClientInformation> {
        self.read_file()?.client_information.remove(config_name)
    }

    fn save(&self, config_name: &str, record: &ClientInformation) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = self.read_file().unwrap_or_default();
        file.version = TOKEN_STORE_VERSION;
        file.client_information
            .insert(config_name.to_string(), record.clone());

        let content = serde_yaml::to_string(&file).context("Failed to serialize token store")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict {}", self.path.display()))?;
        }

        tracing::debug!("Saved token record for '{}'", config_name);
        Ok(())
    }
}
