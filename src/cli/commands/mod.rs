//! One module per subcommand.

pub mod add;
pub mod collection;
pub mod collections;
pub mod completions;
pub mod get;
pub mod init;
pub mod passwd;
pub mod remove;
pub mod search;

use crate::errors::{Result, SecretsError};
use crate::store::{Collection, Item, ItemSearch};

/// Resolve a label plus attribute filter to exactly one item.
pub(crate) fn find_one(
    collection: &Collection,
    label: &str,
    attributes: &[(String, String)],
) -> Result<Item> {
    let search = attributes
        .iter()
        .fold(ItemSearch::new().label(label), |s, (k, v)| s.attribute(k, v));
    let mut hits = collection.search_items(&search)?;
    match hits.len() {
        0 => Err(SecretsError::ItemNotFound),
        1 => Ok(hits.remove(0)),
        n => Err(SecretsError::CommandFailed(format!(
            "'{label}' matches {n} items in '{}'; narrow it with --attr",
            collection.name()
        ))),
    }
}
