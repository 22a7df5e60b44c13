//! The public store facade.
//!
//! `SecretsStore` owns one secrets file and the crypto engine that opens
//! it.  Every operation returns a [`StoreTask`]; read-only work is
//! deferred to the awaiting thread, while anything that may wait on the
//! file lock or run the KDF is started on a blocking worker right away.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use sealbox::crypto::MemoryKeyCache;
//! # use sealbox::store::{ItemSearch, SecretsStore};
//! # async fn demo() -> sealbox::errors::Result<()> {
//! let store = SecretsStore::new(Arc::new(MemoryKeyCache::new()));
//! store.setup("/tmp/secrets.store", false).await?;
//! store.set_credentials("correct-horse").await?;
//! let work = store.create_collection("work").await?;
//! let hits = work.search_items(&ItemSearch::new().attribute("ssid", ""))?;
//! # let _ = hits;
//! store.save().await?;
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod item;
pub mod search;
pub mod task;

pub use collection::Collection;
pub use item::Item;
pub use search::{AttributeMatch, ItemSearch};
pub use task::{Dispatch, StoreTask};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{derive_keys, CryptoEngine, KeyCache, KeyNames, DEFAULT_ITERATIONS};
use crate::errors::{SecretsError, Result};
use crate::file::{FileState, Header, OpenMode, SecretsCollection, SecretsFile};

pub(crate) type Shared = Arc<Mutex<StoreState>>;

pub(crate) struct StoreState {
    cache: Arc<dyn KeyCache>,
    kdf_iterations: u32,
    read_only: bool,
    file: Option<SecretsFile>,
    engine: Option<CryptoEngine>,
}

impl StoreState {
    fn file(&self) -> Result<&SecretsFile> {
        self.file.as_ref().ok_or(SecretsError::NotSetUp)
    }

    /// The file, provided its entities have been unlocked and verified.
    fn unlocked_file(&self) -> Result<&SecretsFile> {
        let file = self.file()?;
        file.ensure_verified()?;
        Ok(file)
    }

    fn writable_file(&mut self) -> Result<&mut SecretsFile> {
        let file = self.file.as_mut().ok_or(SecretsError::NotSetUp)?;
        if self.read_only {
            return Err(SecretsError::ReadOnly);
        }
        file.ensure_verified()?;
        Ok(file)
    }

    pub(crate) fn collection(&self, name: &str) -> Result<&SecretsCollection> {
        self.unlocked_file()?
            .collection(name)
            .ok_or_else(|| SecretsError::CollectionNotFound(name.to_string()))
    }

    pub(crate) fn collection_mut(&mut self, name: &str) -> Result<&mut SecretsCollection> {
        self.writable_file()?
            .collection_mut(name)
            .ok_or_else(|| SecretsError::CollectionNotFound(name.to_string()))
    }
}

pub(crate) fn lock_state(shared: &Shared) -> Result<MutexGuard<'_, StoreState>> {
    shared.lock().map_err(|_| SecretsError::StatePoisoned)
}

/// Handle to one encrypted store.  Clones share the same state.
#[derive(Clone)]
pub struct SecretsStore {
    shared: Shared,
}

impl SecretsStore {
    pub fn new(cache: Arc<dyn KeyCache>) -> Self {
        Self::with_kdf_iterations(cache, DEFAULT_ITERATIONS)
    }

    /// Use a non-default PBKDF2 iteration count (tests, slow devices).
    pub fn with_kdf_iterations(cache: Arc<dyn KeyCache>, iterations: u32) -> Self {
        Self {
            shared: Arc::new(Mutex::new(StoreState {
                cache,
                kdf_iterations: iterations,
                read_only: true,
                file: None,
                engine: None,
            })),
        }
    }

    // ------------------------------------------------------------------
    // Setup and credentials
    // ------------------------------------------------------------------

    /// Bind the store to `path`.
    ///
    /// Read-write setup creates parent directories and an empty file if
    /// needed, then takes the exclusive lock.  Nothing is decrypted until
    /// `set_credentials`.
    pub fn setup(&self, path: impl AsRef<Path>, read_only: bool) -> StoreTask<()> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return StoreTask::ready(Err(SecretsError::NoPathGiven));
        }

        let shared = Arc::clone(&self.shared);
        let policy = if read_only {
            Dispatch::Deferred
        } else {
            Dispatch::Background
        };
        StoreTask::dispatch(policy, move || {
            let mode = if read_only {
                OpenMode::ReadOnly
            } else {
                prepare_parent(&path)?;
                OpenMode::ReadWrite
            };

            let mut state = lock_state(&shared)?;
            if let Some(old) = state.engine.take() {
                revoke_quietly(&old);
            }
            if let Some(mut old) = state.file.take() {
                old.close();
            }

            let mut file = SecretsFile::new(&path, mode);
            file.open()?;
            if !read_only {
                file.lock()?;
            }
            state.file = Some(file);
            state.read_only = read_only;
            info!(path = %path.display(), read_only, "store set up");
            Ok(())
        })
    }

    /// Derive keys from `password` under the default key names and open
    /// (or, for a blank writable file, create) the store.
    pub fn set_credentials(&self, password: &str) -> StoreTask<()> {
        self.set_credentials_with_names(password, KeyNames::default())
    }

    /// Read-only handles keep their keys under a per-handle suffix of
    /// `names`, so closing a reader never revokes the writer's keys.
    pub fn set_credentials_with_names(&self, password: &str, names: KeyNames) -> StoreTask<()> {
        let read_only = match lock_state(&self.shared) {
            Ok(state) => state.read_only,
            Err(e) => return StoreTask::ready(Err(e)),
        };
        let policy = if read_only {
            Dispatch::Deferred
        } else {
            Dispatch::Background
        };

        let shared = Arc::clone(&self.shared);
        let password = Zeroizing::new(password.to_string());
        StoreTask::dispatch(policy, move || {
            let mut guard = lock_state(&shared)?;
            let state = &mut *guard;
            let file = state.file.as_mut().ok_or(SecretsError::NotSetUp)?;
            let names = if state.read_only {
                names.scoped(&Uuid::new_v4().simple().to_string())
            } else {
                names
            };
            if let Some(old) = state.engine.take() {
                if old.key_names() != &names {
                    revoke_quietly(&old);
                }
            }
            let engine = CryptoEngine::new(Arc::clone(&state.cache), names)
                .with_iterations(state.kdf_iterations);

            if file.is_blank()? {
                if state.read_only {
                    return Err(SecretsError::ReadOnly);
                }
                let header = Header::generate()?;
                engine.set_credentials(password.as_bytes(), &header.salt)?;
                if let Err(e) = file.create(header, &engine) {
                    revoke_quietly(&engine);
                    return Err(e);
                }
            } else {
                let header = file.read_header()?;
                engine.set_credentials(password.as_bytes(), &header.salt)?;
                if let Err(e) = file.open_and_check(&engine, !state.read_only) {
                    revoke_quietly(&engine);
                    return Err(e);
                }
            }

            debug!(collections = file.collection_names().len(), "store unlocked");
            state.engine = Some(engine);
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    pub fn dir_collections(&self) -> StoreTask<Vec<String>> {
        let shared = Arc::clone(&self.shared);
        StoreTask::deferred(move || {
            let state = lock_state(&shared)?;
            Ok(state.unlocked_file()?.collection_names())
        })
    }

    /// Fails with `AlreadyExists` if the directory already lists `name`.
    pub fn create_collection(&self, name: &str) -> StoreTask<Collection> {
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        StoreTask::deferred(move || {
            lock_state(&shared)?.writable_file()?.create_collection(&name)?;
            debug!(collection = %name, "created collection");
            Ok(Collection::new(shared, name))
        })
    }

    pub fn read_collection(&self, name: &str) -> StoreTask<Collection> {
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        StoreTask::deferred(move || {
            lock_state(&shared)?.collection(&name)?;
            Ok(Collection::new(shared, name))
        })
    }

    /// Remove a collection and every item in it.  Takes a name or a
    /// [`Collection`] handle.
    pub fn delete_collection(&self, collection: impl AsRef<str>) -> StoreTask<()> {
        let shared = Arc::clone(&self.shared);
        let name = collection.as_ref().to_string();
        StoreTask::deferred(move || {
            lock_state(&shared)?.writable_file()?.delete_collection(&name)?;
            debug!(collection = %name, "deleted collection");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write all in-memory changes to disk atomically.
    pub fn save(&self) -> StoreTask<()> {
        let shared = Arc::clone(&self.shared);
        StoreTask::background(move || {
            let mut guard = lock_state(&shared)?;
            let state = &mut *guard;
            let file = state.file.as_mut().ok_or(SecretsError::NotSetUp)?;
            if state.read_only {
                return Err(SecretsError::ReadOnly);
            }
            let engine = state.engine.as_ref().ok_or(SecretsError::NoCredentials)?;
            file.save(engine)
        })
    }

    /// Re-key the store under `new_password`, keeping the file salt.
    ///
    /// If the rewrite fails the previous keys are put back, so later saves
    /// keep using the old password.  When even that fails the keys are
    /// revoked and the store must be unlocked again.
    pub fn change_password(&self, new_password: &str) -> StoreTask<()> {
        let shared = Arc::clone(&self.shared);
        let password = Zeroizing::new(new_password.to_string());
        StoreTask::background(move || {
            let mut guard = lock_state(&shared)?;
            let state = &mut *guard;
            let file = state.file.as_mut().ok_or(SecretsError::NotSetUp)?;
            if state.read_only {
                return Err(SecretsError::ReadOnly);
            }
            let engine = state.engine.clone().ok_or(SecretsError::NoCredentials)?;
            file.ensure_verified()?;

            let salt = file.header().ok_or(SecretsError::NoCredentials)?.salt;
            let keys = derive_keys(password.as_bytes(), &salt, engine.iterations())?;
            let previous = engine.snapshot_keys()?;

            if let Err(e) = engine.store_keys(&keys).and_then(|()| file.save(&engine)) {
                warn!(error = %e, "password change failed, restoring previous keys");
                if let Err(restore) = engine.store_keys(&previous) {
                    warn!(error = %restore, "could not restore previous keys");
                    revoke_quietly(&engine);
                    state.engine = None;
                }
                return Err(e);
            }
            info!(path = %file.path().display(), "store password changed");
            Ok(())
        })
    }

    /// Forget the keys and release the file and its lock.
    pub fn close(&self) -> StoreTask<()> {
        let shared = Arc::clone(&self.shared);
        StoreTask::deferred(move || {
            let mut state = lock_state(&shared)?;
            if let Some(engine) = state.engine.take() {
                engine.revoke_keys()?;
            }
            if let Some(mut file) = state.file.take() {
                file.close();
                info!(path = %file.path().display(), "store closed");
            }
            state.read_only = true;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn path(&self) -> Result<Option<PathBuf>> {
        let state = lock_state(&self.shared)?;
        Ok(state.file.as_ref().map(|f| f.path().to_path_buf()))
    }

    pub fn file_state(&self) -> Result<Option<FileState>> {
        let state = lock_state(&self.shared)?;
        Ok(state.file.as_ref().map(SecretsFile::state))
    }

    pub fn is_read_only(&self) -> Result<bool> {
        Ok(lock_state(&self.shared)?.read_only)
    }
}

impl std::fmt::Debug for SecretsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsStore").finish_non_exhaustive()
    }
}

fn prepare_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|e| SecretsError::system("creating store directory", e)),
        _ => Ok(()),
    }
}

fn revoke_quietly(engine: &CryptoEngine) {
    if let Err(e) = engine.revoke_keys() {
        warn!(error = %e, "could not revoke keys from key cache");
    }
}
