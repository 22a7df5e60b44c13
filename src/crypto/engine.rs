//! The cryptographic engine handed to the file and entity layers.
//!
//! `CryptoEngine` owns no key bytes.  It knows which key cache to use
//! and under which names the two keys live; every `encrypt`, `decrypt`
//! and `FileMac::reset` fetches the key it needs on demand.

use std::sync::Arc;

use tracing::debug;
use zeroize::Zeroizing;

use crate::errors::{SecretsError, Result};

use super::encryption;
use super::kdf::{derive_keys, DEFAULT_ITERATIONS};
use super::key_cache::KeyCache;
use super::keys::{DerivedKeys, KeyNames, KEY_LEN};
use super::mac::FileMac;

#[derive(Clone)]
pub struct CryptoEngine {
    cache: Arc<dyn KeyCache>,
    names: KeyNames,
    iterations: u32,
}

impl CryptoEngine {
    pub fn new(cache: Arc<dyn KeyCache>, names: KeyNames) -> Self {
        Self {
            cache,
            names,
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Override the PBKDF2 iteration count used by `set_credentials`.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn key_names(&self) -> &KeyNames {
        &self.names
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive both keys from `password` and `salt` and place them in the cache.
    pub fn set_credentials(&self, password: &[u8], salt: &[u8]) -> Result<()> {
        let keys = derive_keys(password, salt, self.iterations)?;
        self.store_keys(&keys)
    }

    /// Place an already derived key pair in the cache.
    pub fn store_keys(&self, keys: &DerivedKeys) -> Result<()> {
        self.cache
            .put(&self.names.encryption, keys.encryption_key())?;
        self.cache.put(&self.names.mac, keys.mac_key())?;
        debug!(
            encryption = %self.names.encryption,
            mac = %self.names.mac,
            "stored derived keys in key cache"
        );
        Ok(())
    }

    /// Copy the cached key pair out so it can be put back with `store_keys`.
    pub fn snapshot_keys(&self) -> Result<DerivedKeys> {
        let encryption = self.cached_key(&self.names.encryption)?;
        let mac = self.cached_key(&self.names.mac)?;
        Ok(DerivedKeys::from_bytes(encryption, mac))
    }

    /// Whether both keys are currently present in the cache.
    pub fn has_keys(&self) -> Result<bool> {
        Ok(self.cache.get(&self.names.encryption)?.is_some()
            && self.cache.get(&self.names.mac)?.is_some())
    }

    /// Remove both keys from the cache.
    pub fn revoke_keys(&self) -> Result<()> {
        self.cache.revoke(&self.names.encryption)?;
        self.cache.revoke(&self.names.mac)?;
        debug!("revoked derived keys from key cache");
        Ok(())
    }

    /// Seal `plaintext`, authenticating `context` alongside it.
    pub fn encrypt(&self, plaintext: &[u8], context: &[u8]) -> Result<Vec<u8>> {
        let key = self.encryption_key()?;
        encryption::encrypt(&key, plaintext, context)
    }

    /// Open a record sealed by `encrypt` under the same `context`.
    pub fn decrypt(&self, sealed: &[u8], context: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let key = self.encryption_key()?;
        encryption::decrypt(&key, sealed, context)
    }

    /// A new, not yet reset, file MAC accumulator.
    pub fn mac(&self) -> FileMac {
        FileMac::new(Arc::clone(&self.cache), self.names.mac.clone())
    }

    fn cached_key(&self, name: &str) -> Result<[u8; KEY_LEN]> {
        let bytes = self
            .cache
            .get(name)?
            .ok_or_else(|| SecretsError::MissingKey(name.to_string()))?;
        <[u8; KEY_LEN]>::try_from(bytes.as_slice())
            .map_err(|_| SecretsError::KeyCache(format!("key '{name}' has the wrong length")))
    }

    fn encryption_key(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.cache
            .get(&self.names.encryption)?
            .ok_or_else(|| SecretsError::MissingKey(self.names.encryption.clone()))
    }
}

impl std::fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("names", &self.names)
            .field("iterations", &self.iterations)
            .finish()
    }
}
