//! The secrets file: one encrypted container holding every entity.
//!
//! Lifecycle:
//!
//! ```text
//! Unopened -> Opened -> HeaderValidated -> EntitiesLoaded -> Verified
//!                  \____________\_______________\___________> Failed(reason)
//! ```
//!
//! Opening reads the complete framed stream and checks the trailing MAC
//! before a single record is decrypted.  Entities are only reachable in
//! the `Verified` state.  `save` never touches the current file; it
//! writes a sibling temp file, moves the current file to `<name>.bkp`,
//! renames the temp file into place, and re-validates the result.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::crypto::CryptoEngine;
use crate::errors::{SecretsError, Result};

use super::entity::{CollectionDirectory, RawEntity, SecretsCollection, SecretsEntity};
use super::format::{Header, MacReader, MacWriter, HEADER_LEN};
use super::lock;

/// Longest accepted collection name, in bytes.
const MAX_NAME_LEN: usize = 256;

static EMPTY_DIRECTORY: CollectionDirectory = CollectionDirectory::new();

/// How the file descriptor is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Why the last open or save attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    CannotOpenFile,
    CannotLockFile,
    CannotReadHeader,
    UnknownHeader,
    EntitiesReadError,
    IntegrityCheckFailed,
    MissingCredentials,
    SystemError,
}

impl FailureReason {
    fn of(err: &SecretsError) -> Self {
        match err {
            SecretsError::CannotOpenFile { .. } => Self::CannotOpenFile,
            SecretsError::CannotLockFile(_) => Self::CannotLockFile,
            SecretsError::CannotReadHeader => Self::CannotReadHeader,
            SecretsError::UnknownHeader => Self::UnknownHeader,
            SecretsError::EntitiesReadError(_) => Self::EntitiesReadError,
            SecretsError::IntegrityCheckFailed => Self::IntegrityCheckFailed,
            SecretsError::MissingKey(_) | SecretsError::NoCredentials => {
                Self::MissingCredentials
            }
            _ => Self::SystemError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unopened,
    Opened,
    HeaderValidated,
    EntitiesLoaded,
    Verified,
    Failed(FailureReason),
}

pub struct SecretsFile {
    path: PathBuf,
    mode: OpenMode,
    file: Option<File>,
    locked: bool,
    header: Option<Header>,
    entities: Vec<SecretsEntity>,
    state: FileState,
}

impl SecretsFile {
    pub fn new(path: impl Into<PathBuf>, mode: OpenMode) -> Self {
        Self {
            path: path.into(),
            mode,
            file: None,
            locked: false,
            header: None,
            entities: Vec::new(),
            state: FileState::Unopened,
        }
    }

    // ------------------------------------------------------------------
    // Opening and locking
    // ------------------------------------------------------------------

    /// Open the descriptor.  Read-write mode creates an empty file if
    /// none exists yet.
    pub fn open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }

        let mut options = OpenOptions::new();
        options.read(true);
        if self.mode == OpenMode::ReadWrite {
            options.write(true).create(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
        }

        match options.open(&self.path) {
            Ok(file) => {
                debug!(path = %self.path.display(), mode = ?self.mode, "opened store file");
                self.file = Some(file);
                self.locked = false;
                self.state = FileState::Opened;
                Ok(())
            }
            Err(source) => {
                self.state = FileState::Failed(FailureReason::CannotOpenFile);
                Err(SecretsError::CannotOpenFile {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    /// Take the exclusive advisory lock; fails fast if another writer has it.
    pub fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Ok(());
        }
        let file = self.file.as_ref().ok_or(SecretsError::NotSetUp)?;
        match lock::try_lock_exclusive(file) {
            Ok(()) => {
                self.locked = true;
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot lock store file");
                self.state = FileState::Failed(FailureReason::CannotLockFile);
                Err(SecretsError::CannotLockFile(self.path.clone()))
            }
        }
    }

    /// Whether the file is missing or has no content yet.
    pub fn is_blank(&self) -> Result<bool> {
        let metadata = match &self.file {
            Some(file) => file.metadata(),
            None => fs::metadata(&self.path),
        };
        match metadata {
            Ok(m) => Ok(m.len() == 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(SecretsError::system("reading store metadata", e)),
        }
    }

    /// Read just the header, unauthenticated, to learn the KDF salt.
    ///
    /// The MAC check in `open_and_check` covers these bytes later.
    pub fn read_header(&mut self) -> Result<Header> {
        self.open()?;
        let mut handle: &File = self.file.as_ref().ok_or(SecretsError::NotSetUp)?;
        handle
            .seek(SeekFrom::Start(0))
            .map_err(|e| SecretsError::system("seeking store file", e))?;

        let mut bytes = [0u8; HEADER_LEN];
        handle
            .read_exact(&mut bytes)
            .map_err(|_| SecretsError::CannotReadHeader)?;
        Header::parse(&bytes)
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Write a brand-new, empty store with the given header.
    ///
    /// Refuses to run when the file already has content.
    pub fn create(&mut self, header: Header, engine: &CryptoEngine) -> Result<()> {
        self.ensure_writable()?;
        if !self.is_blank()? {
            return Err(SecretsError::FileExists(self.path.clone()));
        }
        self.open()?;
        self.lock()?;

        {
            let file = self.file.as_ref().ok_or(SecretsError::NotSetUp)?;
            file.set_len(0)
                .map_err(|e| SecretsError::system("truncating store file", e))?;
            let mut handle: &File = file;
            handle
                .seek(SeekFrom::Start(0))
                .map_err(|e| SecretsError::system("seeking store file", e))?;

            let mut mac = engine.mac();
            mac.reset()?;
            let mut writer = MacWriter::new(BufWriter::new(handle), &mut mac);
            writer.write_header(&header)?;
            writer.write_records(&[])?;
            writer.write_trailer()?;
            writer.finish()?;

            file.sync_all()
                .map_err(|e| SecretsError::system("syncing store file", e))?;
        }

        self.header = Some(header);
        self.entities = vec![SecretsEntity::Directory(CollectionDirectory::new())];
        self.state = FileState::Verified;
        info!(path = %self.path.display(), "created secrets file");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Open (and optionally lock), then read and verify the whole file.
    ///
    /// On any failure the in-memory entity list is empty and the state
    /// records the reason.
    pub fn open_and_check(&mut self, engine: &CryptoEngine, lock: bool) -> Result<()> {
        self.entities.clear();
        self.header = None;

        let result = self.open().and_then(|()| {
            if lock {
                self.lock()?;
            }
            self.load(engine)
        });

        match result {
            Ok(()) => {
                self.state = FileState::Verified;
                debug!(
                    path = %self.path.display(),
                    entities = self.entities.len(),
                    "store file verified"
                );
                Ok(())
            }
            Err(e) => {
                self.entities.clear();
                self.header = None;
                self.state = FileState::Failed(FailureReason::of(&e));
                warn!(path = %self.path.display(), error = %e, "store file failed to open");
                Err(e)
            }
        }
    }

    fn load(&mut self, engine: &CryptoEngine) -> Result<()> {
        let file = self.file.as_ref().ok_or(SecretsError::NotSetUp)?;
        let len = file
            .metadata()
            .map_err(|e| SecretsError::system("reading store metadata", e))?
            .len();
        let mut handle: &File = file;
        handle
            .seek(SeekFrom::Start(0))
            .map_err(|e| SecretsError::system("seeking store file", e))?;

        let mut mac = engine.mac();
        mac.reset()?;
        let mut reader = MacReader::new(BufReader::new(handle), &mut mac, len);

        let header = reader.read_header()?;
        self.state = FileState::HeaderValidated;

        let records = reader.read_records().map_err(framing_error)?;
        let trailer = reader.read_trailer().map_err(framing_error)?;
        if reader.remaining() != 0 {
            return Err(SecretsError::IntegrityCheckFailed);
        }
        drop(reader);
        self.state = FileState::EntitiesLoaded;

        if !mac.verify(&trailer) {
            return Err(SecretsError::IntegrityCheckFailed);
        }

        let entities = decode_entities(&records, engine, &header.iv)
            .map_err(|e| SecretsError::EntitiesReadError(e.to_string()))?;
        self.header = Some(header);
        self.entities = entities;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------

    /// Atomically replace the file with the current in-memory entities.
    pub fn save(&mut self, engine: &CryptoEngine) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_verified()?;
        let header = self.header.clone().ok_or(SecretsError::NoCredentials)?;

        let records = self
            .entities
            .iter()
            .map(|entity| entity.seal(engine, &header.iv))
            .collect::<Result<Vec<RawEntity>>>()?;

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|e| SecretsError::system("creating temporary store file", e))?;
        {
            let mut mac = engine.mac();
            mac.reset()?;
            let mut writer = MacWriter::new(BufWriter::new(tmp.as_file_mut()), &mut mac);
            writer.write_header(&header)?;
            writer.write_records(&records)?;
            writer.write_trailer()?;
            writer.finish()?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| SecretsError::system("syncing temporary store file", e))?;

        let backup = backup_path(&self.path);
        let had_current = self.path.exists();
        if had_current {
            fs::rename(&self.path, &backup)
                .map_err(|e| SecretsError::system("moving store file to backup", e))?;
        }
        if let Err(e) = tmp.persist(&self.path) {
            if had_current {
                if let Err(restore) = fs::rename(&backup, &self.path) {
                    warn!(error = %restore, "could not restore store file from backup");
                }
            }
            return Err(SecretsError::system("installing new store file", e.error));
        }

        // The old descriptor (and its lock) now refers to the backup.
        self.file = None;
        self.locked = false;
        let expected = std::mem::take(&mut self.entities);
        self.open_and_check(engine, true)?;
        if self.entities != expected {
            self.entities.clear();
            self.state = FileState::Failed(FailureReason::EntitiesReadError);
            return Err(SecretsError::EntitiesReadError(
                "saved file does not match in-memory entities".into(),
            ));
        }

        info!(
            path = %self.path.display(),
            records = records.len(),
            "saved secrets file"
        );
        Ok(())
    }

    /// Release the descriptor and lock and forget all entities.
    pub fn close(&mut self) {
        self.file = None;
        self.locked = false;
        self.header = None;
        self.entities.clear();
        self.state = FileState::Unopened;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_verified(&self) -> bool {
        self.state == FileState::Verified
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// The flat entity list, directory first.  Empty unless verified.
    pub fn entities(&self) -> &[SecretsEntity] {
        &self.entities
    }

    pub fn directory(&self) -> &CollectionDirectory {
        self.entities
            .iter()
            .find_map(|e| match e {
                SecretsEntity::Directory(dir) => Some(dir),
                _ => None,
            })
            .unwrap_or(&EMPTY_DIRECTORY)
    }

    fn directory_mut(&mut self) -> Result<&mut CollectionDirectory> {
        if !self
            .entities
            .iter()
            .any(|e| matches!(e, SecretsEntity::Directory(_)))
        {
            self.entities
                .insert(0, SecretsEntity::Directory(CollectionDirectory::new()));
        }
        self.entities
            .iter_mut()
            .find_map(|e| match e {
                SecretsEntity::Directory(dir) => Some(dir),
                _ => None,
            })
            .ok_or(SecretsError::NoCredentials)
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.directory().names().to_vec()
    }

    pub fn collections(&self) -> impl Iterator<Item = &SecretsCollection> {
        self.entities.iter().filter_map(|e| match e {
            SecretsEntity::Collection(c) => Some(c),
            _ => None,
        })
    }

    pub fn collection(&self, name: &str) -> Option<&SecretsCollection> {
        self.collections().find(|c| c.name() == name)
    }

    pub fn collection_mut(&mut self, name: &str) -> Option<&mut SecretsCollection> {
        self.entities.iter_mut().find_map(|e| match e {
            SecretsEntity::Collection(c) if c.name() == name => Some(c),
            _ => None,
        })
    }

    // ------------------------------------------------------------------
    // Directory-consistent mutation
    // ------------------------------------------------------------------

    /// Add an empty collection; the directory is the uniqueness check.
    pub fn create_collection(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_verified()?;
        validate_collection_name(name)?;

        if !self.directory_mut()?.insert(name) {
            return Err(SecretsError::AlreadyExists(name.to_string()));
        }
        self.entities
            .push(SecretsEntity::Collection(SecretsCollection::new(name)));
        Ok(())
    }

    /// Remove a collection and all its items.
    pub fn delete_collection(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_verified()?;

        if !self.directory_mut()?.remove(name) {
            return Err(SecretsError::CollectionNotFound(name.to_string()));
        }
        self.entities
            .retain(|e| !matches!(e, SecretsEntity::Collection(c) if c.name() == name));
        Ok(())
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            OpenMode::ReadWrite => Ok(()),
            OpenMode::ReadOnly => Err(SecretsError::ReadOnly),
        }
    }

    pub(crate) fn ensure_verified(&self) -> Result<()> {
        if self.is_verified() {
            Ok(())
        } else {
            Err(SecretsError::NoCredentials)
        }
    }
}

/// Any framing failure past the magic means the bytes were altered.
fn framing_error(err: SecretsError) -> SecretsError {
    match err {
        SecretsError::PrematureEndOfFile => SecretsError::IntegrityCheckFailed,
        other => other,
    }
}

/// Decrypt all records and check the directory/collection invariants.
fn decode_entities(
    records: &[RawEntity],
    engine: &CryptoEngine,
    file_iv: &[u8],
) -> Result<Vec<SecretsEntity>> {
    let mut directory: Option<CollectionDirectory> = None;
    let mut collections: Vec<SecretsCollection> = Vec::new();

    for (index, raw) in records.iter().enumerate() {
        match SecretsEntity::unseal(raw, engine, file_iv)? {
            SecretsEntity::Directory(dir) => {
                if directory.replace(dir).is_some() {
                    return Err(SecretsError::MalformedEntity(
                        "more than one collection directory".into(),
                    ));
                }
            }
            SecretsEntity::Collection(collection) => {
                if collections.iter().any(|c| c.name() == collection.name()) {
                    return Err(SecretsError::MalformedEntity(format!(
                        "collection '{}' appears twice",
                        collection.name()
                    )));
                }
                collections.push(collection);
            }
            SecretsEntity::Item(_) => {
                return Err(SecretsError::MalformedEntity(
                    "item outside of any collection".into(),
                ));
            }
            SecretsEntity::Eof => {
                if index + 1 != records.len() {
                    return Err(SecretsError::MalformedEntity(
                        "end marker before the last record".into(),
                    ));
                }
            }
        }
    }

    let directory = directory.unwrap_or_default();
    let listed = directory.names().len();
    if listed != collections.len()
        || !collections.iter().all(|c| directory.contains(c.name()))
    {
        return Err(SecretsError::MalformedEntity(
            "collection directory does not match stored collections".into(),
        ));
    }

    let mut entities = Vec::with_capacity(collections.len() + 1);
    entities.push(SecretsEntity::Directory(directory));
    entities.extend(collections.into_iter().map(SecretsEntity::Collection));
    Ok(entities)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bkp");
    path.with_file_name(name)
}

/// Collection names: non-empty, bounded, no control characters.
fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SecretsError::InvalidName(
            "collection name cannot be empty".into(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SecretsError::InvalidName(format!(
            "collection name cannot exceed {MAX_NAME_LEN} bytes"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(SecretsError::InvalidName(format!(
            "collection name {name:?} contains control characters"
        )));
    }
    Ok(())
}
