//! OS keyring integration for derived key material.
//!
//! Stores the session's encryption and MAC keys in the operating
//! system's secure credential store:
//! - Linux: kernel keyring (keyutils, `linux-native` backend)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! All operations fail gracefully: keyring errors are returned as
//! `SecretsError::KeyCache` and never abort the process.

use zeroize::Zeroizing;

use crate::crypto::KeyCache;
use crate::errors::{SecretsError, Result};

/// Service name used in the OS keyring.
const SERVICE_NAME: &str = "sealbox";

/// Key cache backed by the `keyring` crate.
#[derive(Debug, Clone)]
pub struct KeyringKeyCache {
    service: String,
}

impl KeyringKeyCache {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a custom service name, e.g. to keep test runs apart.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, name)
            .map_err(|e| SecretsError::KeyCache(format!("failed to create keyring entry: {e}")))
    }
}

impl Default for KeyringKeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCache for KeyringKeyCache {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.entry(name)?
            .set_secret(bytes)
            .map_err(|e| SecretsError::KeyCache(format!("failed to store key in keyring: {e}")))
    }

    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        match self.entry(name)?.get_secret() {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SecretsError::KeyCache(format!(
                "failed to read from keyring: {e}"
            ))),
        }
    }

    fn revoke(&self, name: &str) -> Result<()> {
        match self.entry(name)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SecretsError::KeyCache(format!(
                "failed to delete from keyring: {e}"
            ))),
        }
    }
}
