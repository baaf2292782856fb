//! Configuration management for l2tpctl

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{ProvisionError, ProvisionResult};
use crate::keychain::trusted::DEFAULT_TRUSTED_APPLICATIONS;
use crate::provisioner::DEFAULT_ACCESS_LABEL;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/l2tpctl/config.toml";

/// Main l2tpctl configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Where the configuration store and keychain live
    #[serde(default)]
    pub store: StoreSettings,
    /// Access policy for keychain entries
    #[serde(default)]
    pub access: AccessSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Committed network configuration
    #[serde(default = "default_preferences_path")]
    pub preferences_path: PathBuf,
    /// Configuration the running system reads after apply
    #[serde(default = "default_applied_path")]
    pub applied_path: PathBuf,
    /// Credential store
    #[serde(default = "default_keychain_path")]
    pub keychain_path: PathBuf,
    /// Block until another client releases the store lock
    #[serde(default = "default_wait_for_lock")]
    pub wait_for_lock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessSettings {
    /// Label of the access policy
    #[serde(default = "default_access_label")]
    pub label: String,
    /// Applications allowed to read stored secrets
    #[serde(default = "default_trusted_applications")]
    pub trusted_applications: Vec<PathBuf>,
}

fn default_preferences_path() -> PathBuf {
    PathBuf::from("/var/lib/l2tpctl/preferences.json")
}

fn default_applied_path() -> PathBuf {
    PathBuf::from("/run/l2tpctl/preferences.json")
}

fn default_keychain_path() -> PathBuf {
    PathBuf::from("/var/lib/l2tpctl/System.keychain.json")
}

fn default_wait_for_lock() -> bool {
    true
}

fn default_access_label() -> String {
    DEFAULT_ACCESS_LABEL.to_string()
}

fn default_trusted_applications() -> Vec<PathBuf> {
    DEFAULT_TRUSTED_APPLICATIONS.iter().map(PathBuf::from).collect()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            preferences_path: default_preferences_path(),
            applied_path: default_applied_path(),
            keychain_path: default_keychain_path(),
            wait_for_lock: default_wait_for_lock(),
        }
    }
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            label: default_access_label(),
            trusted_applications: default_trusted_applications(),
        }
    }
}

impl ProvisionerConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> ProvisionResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ProvisionError::ConfigError(format!("Failed to read config {:?}: {}", path.as_ref(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ProvisionError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load `path` if given, which must then exist. Otherwise load the
    /// default file, falling back to built-in defaults when it is missing.
    pub fn load_or_default(path: Option<&Path>) -> ProvisionResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ProvisionResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProvisionError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| ProvisionError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Ensure the parent directories of every store file exist
    pub fn ensure_directories(&self) -> ProvisionResult<()> {
        let files = [
            &self.store.preferences_path,
            &self.store.applied_path,
            &self.store.keychain_path,
        ];
        for dir in files.iter().filter_map(|file| file.parent()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| ProvisionError::ConfigError(format!("Failed to create directory {:?}: {}", dir, e)))?;
        }
        Ok(())
    }
}
