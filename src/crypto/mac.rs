//! Running HMAC-SHA256 over a whole secrets file.
//!
//! The accumulator must be `reset` before use; that is the only point
//! where the MAC key is read from the key cache.  After `stop` further
//! updates are ignored, so the trailer can be read through the same
//! stream without disturbing the digest.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::{SecretsError, Result};

use super::key_cache::KeyCache;

type HmacSha256 = Hmac<Sha256>;

/// Size of the MAC digest in bytes.
pub const MAC_LEN: usize = 32;

enum MacState {
    Idle,
    Running(HmacSha256),
    Stopped([u8; MAC_LEN]),
}

/// Stateful keyed-hash accumulator.
pub struct FileMac {
    cache: Arc<dyn KeyCache>,
    key_name: String,
    state: MacState,
}

impl FileMac {
    pub(crate) fn new(cache: Arc<dyn KeyCache>, key_name: impl Into<String>) -> Self {
        Self {
            cache,
            key_name: key_name.into(),
            state: MacState::Idle,
        }
    }

    /// Start a fresh digest with the MAC key from the key cache.
    pub fn reset(&mut self) -> Result<()> {
        self.state = MacState::Idle;

        let key = self
            .cache
            .get(&self.key_name)?
            .ok_or_else(|| SecretsError::MissingKey(self.key_name.clone()))?;
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| SecretsError::CannotInitCrypto(format!("invalid MAC key: {e}")))?;

        self.state = MacState::Running(mac);
        Ok(())
    }

    /// Feed `bytes` into the digest.  Ignored unless running.
    pub fn update(&mut self, bytes: &[u8]) {
        if let MacState::Running(mac) = &mut self.state {
            mac.update(bytes);
        }
    }

    /// Freeze the digest.
    pub fn stop(&mut self) {
        self.state = match std::mem::replace(&mut self.state, MacState::Idle) {
            MacState::Running(mac) => {
                let mut digest = [0u8; MAC_LEN];
                digest.copy_from_slice(&mac.finalize().into_bytes());
                MacState::Stopped(digest)
            }
            other => other,
        };
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, MacState::Running(_))
    }

    /// Return the digest, stopping the accumulator if still running.
    pub fn read(&mut self) -> Result<[u8; MAC_LEN]> {
        self.stop();
        match &self.state {
            MacState::Stopped(digest) => Ok(*digest),
            _ => Err(SecretsError::CannotInitCrypto(
                "MAC read before reset".into(),
            )),
        }
    }

    /// Compare the digest against `expected` in constant time.
    pub fn verify(&mut self, expected: &[u8]) -> bool {
        match self.read() {
            Ok(digest) => expected.len() == MAC_LEN && bool::from(digest[..].ct_eq(expected)),
            Err(_) => false,
        }
    }
}
