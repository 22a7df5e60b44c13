//! Entity kinds stored in a secrets file.
//!
//! Every record on disk is `[tag: u8][cipher_len: u64 LE][ciphertext]`.
//! The tag selects the concrete kind before its body is decrypted and
//! deserialized.  Collections carry their items as children inside the
//! same sealed body: `[name][item_count]` followed, per item, by
//! `[Item tag][item fields]`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::CryptoEngine;
use crate::errors::{SecretsError, Result};

use super::crypt_buffer::CryptBuffer;

/// One-byte type tags.  Values are fixed for format version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntityTag {
    Directory = 0,
    Collection = 1,
    Item = 2,
    Eof = 3,
}

/// Tag reserved for the abstract entity kind; never written or accepted.
pub const ABSTRACT_TAG: u8 = 0xFF;

impl TryFrom<u8> for EntityTag {
    type Error = SecretsError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Directory),
            1 => Ok(Self::Collection),
            2 => Ok(Self::Item),
            3 => Ok(Self::Eof),
            other => Err(SecretsError::MalformedEntity(format!(
                "unknown entity tag {other:#04x}"
            ))),
        }
    }
}

/// A secret payload with its content type.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue {
    pub content_type: String,
    pub bytes: Zeroizing<Vec<u8>>,
}

impl SecretValue {
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: Zeroizing::new(bytes.into()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretValue")
            .field("content_type", &self.content_type)
            .field("bytes", &format_args!("[{} bytes]", self.bytes.len()))
            .finish()
    }
}

/// Ordered list of collection names; the uniqueness index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionDirectory {
    names: Vec<String>,
}

impl CollectionDirectory {
    pub const fn new() -> Self {
        Self { names: Vec::new() }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Append `name`; returns `false` if it was already present.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    /// Remove `name`; returns `false` if it was not present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.names.len();
        self.names.retain(|n| n != name);
        self.names.len() != before
    }

    fn serialize(&self, buf: &mut CryptBuffer<'_>) -> Result<()> {
        buf.put_u64(self.names.len() as u64)?;
        for name in &self.names {
            buf.put_str(name)?;
        }
        Ok(())
    }

    fn deserialize(buf: &mut CryptBuffer<'_>) -> Result<Self> {
        let count = buf.get_u64()?;
        let mut dir = Self::new();
        for _ in 0..count {
            let name = buf.get_str()?;
            if !dir.insert(&name) {
                return Err(SecretsError::MalformedEntity(format!(
                    "directory lists '{name}' twice"
                )));
            }
        }
        Ok(dir)
    }
}

/// A labelled, attribute-tagged secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretsItem {
    pub id: Uuid,
    pub label: String,
    pub attributes: BTreeMap<String, String>,
    pub value: SecretValue,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl SecretsItem {
    pub fn new(
        label: impl Into<String>,
        attributes: BTreeMap<String, String>,
        value: SecretValue,
    ) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            attributes,
            value,
            created_at: now,
            modified_at: now,
        }
    }

    /// Bump the modification time.
    pub fn touch(&mut self) {
        self.modified_at = now_millis();
    }

    fn serialize(&self, buf: &mut CryptBuffer<'_>) -> Result<()> {
        buf.write(self.id.as_bytes())?;
        buf.put_str(&self.label)?;
        buf.put_u64(self.attributes.len() as u64)?;
        for (key, value) in &self.attributes {
            buf.put_str(key)?;
            buf.put_str(value)?;
        }
        buf.put_str(&self.value.content_type)?;
        buf.put_bytes(&self.value.bytes)?;
        buf.put_i64(self.created_at.timestamp_millis())?;
        buf.put_i64(self.modified_at.timestamp_millis())
    }

    fn deserialize(buf: &mut CryptBuffer<'_>) -> Result<Self> {
        let mut id = [0u8; 16];
        buf.read(&mut id)?;
        let label = buf.get_str()?;

        let count = buf.get_u64()?;
        let mut attributes = BTreeMap::new();
        for _ in 0..count {
            let key = buf.get_str()?;
            let value = buf.get_str()?;
            attributes.insert(key, value);
        }

        let content_type = buf.get_str()?;
        let bytes = buf.get_bytes()?;
        let created_at = timestamp(buf.get_i64()?)?;
        let modified_at = timestamp(buf.get_i64()?)?;

        Ok(Self {
            id: Uuid::from_bytes(id),
            label,
            attributes,
            value: SecretValue {
                content_type,
                bytes,
            },
            created_at,
            modified_at,
        })
    }
}

/// A named group of items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretsCollection {
    name: String,
    items: Vec<SecretsItem>,
}

impl SecretsCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[SecretsItem] {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn item(&self, id: Uuid) -> Option<&SecretsItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn item_mut(&mut self, id: Uuid) -> Option<&mut SecretsItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    /// Find an item with exactly this label and attribute set.
    pub fn find_duplicate(
        &mut self,
        label: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Option<&mut SecretsItem> {
        self.items
            .iter_mut()
            .find(|i| i.label == label && &i.attributes == attributes)
    }

    pub fn push_item(&mut self, item: SecretsItem) {
        self.items.push(item);
    }

    pub fn remove_item(&mut self, id: Uuid) -> Option<SecretsItem> {
        let index = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(index))
    }

    fn serialize(&self, buf: &mut CryptBuffer<'_>) -> Result<()> {
        buf.put_str(&self.name)?;
        buf.put_u64(self.items.len() as u64)?;
        self.serialize_children(buf)
    }

    fn serialize_children(&self, buf: &mut CryptBuffer<'_>) -> Result<()> {
        for item in &self.items {
            buf.put_u8(EntityTag::Item as u8)?;
            item.serialize(buf)?;
        }
        Ok(())
    }

    fn deserialize(buf: &mut CryptBuffer<'_>) -> Result<Self> {
        let name = buf.get_str()?;
        let count = buf.get_u64()?;
        let mut collection = Self::new(name);
        collection.deserialize_children(buf, count)?;
        Ok(collection)
    }

    fn deserialize_children(&mut self, buf: &mut CryptBuffer<'_>, count: u64) -> Result<()> {
        for _ in 0..count {
            match EntityTag::try_from(buf.get_u8()?)? {
                EntityTag::Item => self.items.push(SecretsItem::deserialize(buf)?),
                other => {
                    return Err(SecretsError::MalformedEntity(format!(
                        "collection '{}' has a {other:?} child",
                        self.name
                    )))
                }
            }
        }
        Ok(())
    }
}

/// A record as framed on disk, before decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntity {
    pub tag: u8,
    pub ciphertext: Vec<u8>,
}

/// The concrete entity kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretsEntity {
    Directory(CollectionDirectory),
    Collection(SecretsCollection),
    Item(SecretsItem),
    Eof,
}

impl SecretsEntity {
    pub fn tag(&self) -> EntityTag {
        match self {
            Self::Directory(_) => EntityTag::Directory,
            Self::Collection(_) => EntityTag::Collection,
            Self::Item(_) => EntityTag::Item,
            Self::Eof => EntityTag::Eof,
        }
    }

    /// Serialize and encrypt this entity for the file with `file_iv`.
    pub fn seal(&self, engine: &CryptoEngine, file_iv: &[u8]) -> Result<RawEntity> {
        let tag = self.tag() as u8;
        let mut buf = CryptBuffer::for_writing(engine, &record_context(file_iv, tag));
        match self {
            Self::Directory(dir) => dir.serialize(&mut buf)?,
            Self::Collection(collection) => collection.serialize(&mut buf)?,
            Self::Item(item) => item.serialize(&mut buf)?,
            Self::Eof => {}
        }
        Ok(RawEntity {
            tag,
            ciphertext: buf.seal()?,
        })
    }

    /// Decrypt and deserialize a framed record.
    pub fn unseal(raw: &RawEntity, engine: &CryptoEngine, file_iv: &[u8]) -> Result<Self> {
        let tag = EntityTag::try_from(raw.tag)?;
        let mut buf = CryptBuffer::from_ciphertext(
            engine,
            &record_context(file_iv, raw.tag),
            raw.ciphertext.clone(),
        );
        match tag {
            EntityTag::Directory => Ok(Self::Directory(CollectionDirectory::deserialize(&mut buf)?)),
            EntityTag::Collection => Ok(Self::Collection(SecretsCollection::deserialize(&mut buf)?)),
            EntityTag::Item => Ok(Self::Item(SecretsItem::deserialize(&mut buf)?)),
            EntityTag::Eof => {
                buf.remaining()?;
                Ok(Self::Eof)
            }
        }
    }
}

/// Associated data for a record: the file IV followed by the tag byte.
fn record_context(file_iv: &[u8], tag: u8) -> Vec<u8> {
    let mut context = Vec::with_capacity(file_iv.len() + 1);
    context.extend_from_slice(file_iv);
    context.push(tag);
    context
}

/// Current time truncated to the millisecond precision stored on disk.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| SecretsError::MalformedEntity(format!("timestamp {millis} out of range")))
}
