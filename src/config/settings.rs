use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::keys::{DEFAULT_ENCRYPTION_KEY_NAME, DEFAULT_MAC_KEY_NAME};
use crate::crypto::{KeyNames, DEFAULT_ITERATIONS, MIN_ITERATIONS};
use crate::errors::{Result, SecretsError};

/// Where derived keys are cached for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KeyCacheKind {
    /// The OS keyring (kernel keyring on Linux).
    Keyring,
    /// Process memory only; keys vanish when the command exits.
    Memory,
}

/// Project-level configuration, loaded from `.sealbox.toml`.
///
/// Every field has a default, so no config file is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Store file path, relative to the project directory unless absolute.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default = "default_encryption_key_name")]
    pub encryption_key_name: String,

    #[serde(default = "default_mac_key_name")]
    pub mac_key_name: String,

    /// PBKDF2 iteration count used when keys are derived.
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    #[serde(default = "default_key_cache")]
    pub key_cache: KeyCacheKind,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_store_path() -> PathBuf {
    PathBuf::from(".sealbox").join("secrets.store")
}

fn default_encryption_key_name() -> String {
    DEFAULT_ENCRYPTION_KEY_NAME.to_string()
}

fn default_mac_key_name() -> String {
    DEFAULT_MAC_KEY_NAME.to_string()
}

fn default_kdf_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

fn default_key_cache() -> KeyCacheKind {
    if cfg!(feature = "keyring-store") {
        KeyCacheKind::Keyring
    } else {
        KeyCacheKind::Memory
    }
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            encryption_key_name: default_encryption_key_name(),
            mac_key_name: default_mac_key_name(),
            kdf_iterations: default_kdf_iterations(),
            key_cache: default_key_cache(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    const FILE_NAME: &'static str = ".sealbox.toml";

    /// Load settings from `<project_dir>/.sealbox.toml`.
    ///
    /// A missing file yields defaults; an unparsable one is an error.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            SecretsError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;
        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.kdf_iterations < MIN_ITERATIONS {
            return Err(SecretsError::ConfigError(format!(
                "kdf_iterations must be at least {MIN_ITERATIONS}, got {}",
                self.kdf_iterations
            )));
        }
        if self.encryption_key_name == self.mac_key_name {
            return Err(SecretsError::ConfigError(
                "encryption_key_name and mac_key_name must differ".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the store path against the project directory.
    pub fn store_path(&self, project_dir: &Path) -> PathBuf {
        if self.store_path.is_absolute() {
            self.store_path.clone()
        } else {
            project_dir.join(&self.store_path)
        }
    }

    pub fn key_names(&self) -> KeyNames {
        KeyNames::new(&self.encryption_key_name, &self.mac_key_name)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
