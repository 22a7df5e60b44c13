use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in Sealbox.
#[derive(Debug, Error)]
pub enum SecretsError {
    // --- Setup errors ---
    #[error("No store path given")]
    NoPathGiven,

    #[error("System error while {context}: {source}")]
    System {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store has not been set up")]
    NotSetUp,

    #[error("Store is locked: set credentials first")]
    NoCredentials,

    #[error("Store is open read-only")]
    ReadOnly,

    #[error("Store file already exists and is not empty: {0}")]
    FileExists(PathBuf),

    // --- Secrets file errors ---
    #[error("Cannot open store file {path}: {source}")]
    CannotOpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot lock store file {0}: another writer holds it")]
    CannotLockFile(PathBuf),

    #[error("Cannot read store header")]
    CannotReadHeader,

    #[error("Unknown store header: not a sealbox file")]
    UnknownHeader,

    #[error("Failed to read store entities: {0}")]
    EntitiesReadError(String),

    #[error("Integrity check failed: the store is corrupted, tampered with, or the password is wrong")]
    IntegrityCheckFailed,

    #[error("Premature end of data")]
    PrematureEndOfFile,

    #[error("Malformed entity: {0}")]
    MalformedEntity(String),

    // --- Crypto errors ---
    #[error("Cannot derive keys: {0}")]
    CannotDeriveKeys(String),

    #[error("Cannot initialize crypto: {0}")]
    CannotInitCrypto(String),

    #[error("Key '{0}' is not present in the key cache")]
    MissingKey(String),

    #[error("Key cache error: {0}")]
    KeyCache(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: wrong key or corrupted record")]
    DecryptionFailed,

    // --- Entity model errors ---
    #[error("'{0}' already exists")]
    AlreadyExists(String),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Item not found")]
    ItemNotFound,

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid attribute pattern: {0}")]
    InvalidPattern(String),

    // --- Dispatch errors ---
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("No async runtime available for background work")]
    NoRuntime,

    #[error("Store state lock poisoned")]
    StatePoisoned,

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Config file error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SecretsError {
    /// Wrap an I/O failure with a short description of what was attempted.
    pub fn system(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::System {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Sealbox results.
pub type Result<T> = std::result::Result<T, SecretsError>;
