//! Derived key pair and the names it is cached under.
//!
//! From the PBKDF2 master secret we expand, with HKDF-SHA256:
//! - an **encryption key** for sealing entity records, and
//! - a **MAC key** for the file-level integrity check.
//!
//! Distinct `info` strings keep the two keys independent.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::errors::{SecretsError, Result};

/// Length of the PBKDF2 output (256 bits).
pub const MASTER_LEN: usize = 32;

/// Length of each derived key (256 bits).
pub const KEY_LEN: usize = 32;

/// Default key-cache name for the encryption key.
pub const DEFAULT_ENCRYPTION_KEY_NAME: &str = "secrets:encrypting";

/// Default key-cache name for the MAC key.
pub const DEFAULT_MAC_KEY_NAME: &str = "secrets:mac";

const ENCRYPTION_INFO: &[u8] = b"sealbox-encryption-key";
const MAC_INFO: &[u8] = b"sealbox-mac-key";

/// The names both keys are stored under in the key cache.
///
/// Distinct stores on one machine must use distinct names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNames {
    pub encryption: String,
    pub mac: String,
}

impl KeyNames {
    pub fn new(encryption: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            encryption: encryption.into(),
            mac: mac.into(),
        }
    }

    /// These names with `suffix` appended, for keys private to one handle.
    pub fn scoped(&self, suffix: &str) -> Self {
        Self::new(
            format!("{}#{suffix}", self.encryption),
            format!("{}#{suffix}", self.mac),
        )
    }
}

impl Default for KeyNames {
    fn default() -> Self {
        Self::new(DEFAULT_ENCRYPTION_KEY_NAME, DEFAULT_MAC_KEY_NAME)
    }
}

/// Encryption and MAC keys that zero their memory when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct DerivedKeys {
    encryption: [u8; KEY_LEN],
    mac: [u8; KEY_LEN],
}

impl DerivedKeys {
    /// Build a key pair from raw bytes (fixed material for tests).
    pub fn from_bytes(encryption: [u8; KEY_LEN], mac: [u8; KEY_LEN]) -> Self {
        Self { encryption, mac }
    }

    /// Split a master secret into the two working keys.
    pub fn expand(master: &[u8]) -> Result<Self> {
        let hk = Hkdf::<Sha256>::new(None, master);

        let mut keys = Self {
            encryption: [0u8; KEY_LEN],
            mac: [0u8; KEY_LEN],
        };
        hk.expand(ENCRYPTION_INFO, &mut keys.encryption)
            .map_err(|e| SecretsError::CannotDeriveKeys(format!("HKDF expand failed: {e}")))?;
        hk.expand(MAC_INFO, &mut keys.mac)
            .map_err(|e| SecretsError::CannotDeriveKeys(format!("HKDF expand failed: {e}")))?;

        Ok(keys)
    }

    pub fn encryption_key(&self) -> &[u8; KEY_LEN] {
        &self.encryption
    }

    pub fn mac_key(&self) -> &[u8; KEY_LEN] {
        &self.mac
    }
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeys")
            .field("encryption", &"[REDACTED]")
            .field("mac", &"[REDACTED]")
            .finish()
    }
}
