//! On-disk secrets file: framing, entities, and the container itself.

pub mod crypt_buffer;
pub mod entity;
pub mod format;
pub mod lock;
pub mod secrets_file;

pub use crypt_buffer::CryptBuffer;
pub use entity::{
    CollectionDirectory, EntityTag, RawEntity, SecretValue, SecretsCollection, SecretsEntity,
    SecretsItem, ABSTRACT_TAG,
};
pub use format::{Header, HEADER_LEN, IV_LEN, MAGIC, SALT_LEN};
pub use secrets_file::{FailureReason, FileState, OpenMode, SecretsFile};
