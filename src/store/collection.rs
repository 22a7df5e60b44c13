use std::collections::BTreeMap;

use tracing::debug;

use crate::errors::{SecretsError, Result};
use crate::file::{SecretValue, SecretsItem};

use super::item::Item;
use super::search::ItemSearch;
use super::{lock_state, Shared};

/// Handle to a named collection inside an open store.
///
/// The handle holds no data of its own; every call reads the store's
/// current in-memory state, so a deleted collection reports
/// `CollectionNotFound`.
#[derive(Clone)]
pub struct Collection {
    shared: Shared,
    name: String,
}

impl Collection {
    pub(crate) fn new(shared: Shared, name: String) -> Self {
        Self { shared, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a new item.  Fails with `AlreadyExists` when an item with the
    /// same label and attributes is already present.
    pub fn create_item(
        &self,
        label: &str,
        attributes: BTreeMap<String, String>,
        value: SecretValue,
    ) -> Result<Item> {
        let mut state = lock_state(&self.shared)?;
        let collection = state.collection_mut(&self.name)?;
        if collection.find_duplicate(label, &attributes).is_some() {
            return Err(SecretsError::AlreadyExists(label.to_string()));
        }

        let item = SecretsItem::new(label, attributes, value);
        let id = item.id;
        collection.push_item(item);
        debug!(collection = %self.name, %id, "created item");
        Ok(self.handle(id))
    }

    /// Add an item, or overwrite the value of the one with the same
    /// label and attributes.
    pub fn create_or_replace_item(
        &self,
        label: &str,
        attributes: BTreeMap<String, String>,
        value: SecretValue,
    ) -> Result<Item> {
        let mut state = lock_state(&self.shared)?;
        let collection = state.collection_mut(&self.name)?;
        if let Some(existing) = collection.find_duplicate(label, &attributes) {
            existing.value = value;
            existing.touch();
            let id = existing.id;
            debug!(collection = %self.name, %id, "replaced item value");
            return Ok(self.handle(id));
        }

        let item = SecretsItem::new(label, attributes, value);
        let id = item.id;
        collection.push_item(item);
        debug!(collection = %self.name, %id, "created item");
        Ok(self.handle(id))
    }

    pub fn search_items(&self, search: &ItemSearch) -> Result<Vec<Item>> {
        let state = lock_state(&self.shared)?;
        let collection = state.collection(&self.name)?;
        Ok(collection
            .items()
            .iter()
            .filter(|item| search.matches(item))
            .map(|item| self.handle(item.id))
            .collect())
    }

    pub fn items(&self) -> Result<Vec<Item>> {
        self.search_items(&ItemSearch::new())
    }

    pub fn item_count(&self) -> Result<usize> {
        let state = lock_state(&self.shared)?;
        Ok(state.collection(&self.name)?.item_count())
    }

    /// Remove `item`.  Returns `false` if it is not in this collection.
    pub fn delete_item(&self, item: &Item) -> Result<bool> {
        if item.collection_name() != self.name {
            return Ok(false);
        }
        let mut state = lock_state(&self.shared)?;
        let removed = state
            .collection_mut(&self.name)?
            .remove_item(item.id())
            .is_some();
        if removed {
            debug!(collection = %self.name, id = %item.id(), "deleted item");
        }
        Ok(removed)
    }

    fn handle(&self, id: uuid::Uuid) -> Item {
        Item::new(self.shared.clone(), self.name.clone(), id)
    }
}

impl AsRef<str> for Collection {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
