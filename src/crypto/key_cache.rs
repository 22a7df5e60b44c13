//! Named key storage outside the engine.
//!
//! Derived keys are handed to a `KeyCache` once per credential change
//! and fetched back by name for every cipher or MAC operation.  In
//! production the cache is the kernel keyring (`crate::keyring`); tests
//! and platforms without one use `MemoryKeyCache`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use zeroize::Zeroizing;

use crate::errors::{SecretsError, Result};

/// A session-scoped store of named secret byte strings.
pub trait KeyCache: Send + Sync {
    /// Store `bytes` under `name`, replacing any previous value.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch the bytes stored under `name`, or `None` if absent.
    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Remove `name`.  Removing an absent name is not an error.
    fn revoke(&self, name: &str) -> Result<()>;
}

/// In-process key cache for tests and ephemeral sessions.
#[derive(Default, Clone)]
pub struct MemoryKeyCache {
    inner: Arc<Mutex<HashMap<String, Zeroizing<Vec<u8>>>>>,
}

impl MemoryKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyCache for MemoryKeyCache {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| SecretsError::KeyCache(format!("lock poisoned: {err}")))?;
        guard.insert(name.to_string(), Zeroizing::new(bytes.to_vec()));
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let guard = self
            .inner
            .lock()
            .map_err(|err| SecretsError::KeyCache(format!("lock poisoned: {err}")))?;
        Ok(guard.get(name).cloned())
    }

    fn revoke(&self, name: &str) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| SecretsError::KeyCache(format!("lock poisoned: {err}")))?;
        guard.remove(name);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyCache")
            .field("keys", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_revoke() {
        let cache = MemoryKeyCache::new();
        cache.put("a", b"one").unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref().map(Vec::as_slice), Some(&b"one"[..]));

        cache.revoke("a").unwrap();
        assert!(cache.get("a").unwrap().is_none());
        cache.revoke("a").unwrap();
    }

    #[test]
    fn clones_share_storage() {
        let cache = MemoryKeyCache::new();
        let other = cache.clone();
        cache.put("k", b"v").unwrap();
        assert!(other.get("k").unwrap().is_some());
        assert_eq!(other.len(), 1);
    }
}
