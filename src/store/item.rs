use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{SecretsError, Result};
use crate::file::{SecretValue, SecretsItem};

use super::{lock_state, Shared};

/// Handle to one item, addressed by its persistent id.
#[derive(Clone)]
pub struct Item {
    shared: Shared,
    collection: String,
    id: Uuid,
}

impl Item {
    pub(crate) fn new(shared: Shared, collection: String, id: Uuid) -> Self {
        Self {
            shared,
            collection,
            id,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    fn read<R>(&self, f: impl FnOnce(&SecretsItem) -> R) -> Result<R> {
        let state = lock_state(&self.shared)?;
        let item = state
            .collection(&self.collection)?
            .item(self.id)
            .ok_or(SecretsError::ItemNotFound)?;
        Ok(f(item))
    }

    /// Apply `f` and bump the modification time.
    fn update(&self, f: impl FnOnce(&mut SecretsItem)) -> Result<()> {
        let mut state = lock_state(&self.shared)?;
        let item = state
            .collection_mut(&self.collection)?
            .item_mut(self.id)
            .ok_or(SecretsError::ItemNotFound)?;
        f(item);
        item.touch();
        Ok(())
    }

    /// Label and attributes identify an item within its collection.
    fn set_identity(
        &self,
        label: Option<String>,
        attributes: Option<BTreeMap<String, String>>,
    ) -> Result<()> {
        let mut state = lock_state(&self.shared)?;
        let collection = state.collection_mut(&self.collection)?;
        let current = collection.item(self.id).ok_or(SecretsError::ItemNotFound)?;
        let label = label.unwrap_or_else(|| current.label.clone());
        let attributes = attributes.unwrap_or_else(|| current.attributes.clone());

        if collection
            .find_duplicate(&label, &attributes)
            .is_some_and(|other| other.id != self.id)
        {
            return Err(SecretsError::AlreadyExists(label));
        }

        let item = collection
            .item_mut(self.id)
            .ok_or(SecretsError::ItemNotFound)?;
        item.label = label;
        item.attributes = attributes;
        item.touch();
        Ok(())
    }

    pub fn label(&self) -> Result<String> {
        self.read(|item| item.label.clone())
    }

    /// Fails with `AlreadyExists` if another item in the collection has
    /// the new label and the current attributes.
    pub fn set_label(&self, label: impl Into<String>) -> Result<()> {
        self.set_identity(Some(label.into()), None)
    }

    pub fn attributes(&self) -> Result<BTreeMap<String, String>> {
        self.read(|item| item.attributes.clone())
    }

    /// Fails with `AlreadyExists` like [`Item::set_label`].
    pub fn set_attributes(&self, attributes: BTreeMap<String, String>) -> Result<()> {
        self.set_identity(None, Some(attributes))
    }

    pub fn value(&self) -> Result<SecretValue> {
        self.read(|item| item.value.clone())
    }

    pub fn set_value(&self, value: SecretValue) -> Result<()> {
        self.update(|item| item.value = value)
    }

    pub fn created_time(&self) -> Result<DateTime<Utc>> {
        self.read(|item| item.created_at)
    }

    pub fn modified_time(&self) -> Result<DateTime<Utc>> {
        self.read(|item| item.modified_at)
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("collection", &self.collection)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.collection == other.collection
    }
}

impl Eq for Item {}
