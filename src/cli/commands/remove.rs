//! `sealbox remove` — delete a secret from a collection.

use crate::cli::output;
use crate::cli::{confirm, open_store, Cli, Context};
use crate::errors::{Result, SecretsError};

use super::find_one;

/// Execute the `remove` command.
pub async fn execute(
    cli: &Cli,
    collection: &str,
    label: &str,
    attributes: &[(String, String)],
    force: bool,
) -> Result<()> {
    if !force && !confirm(&format!("Remove '{label}' from '{collection}'?"))? {
        output::info("Cancelled.");
        return Ok(());
    }

    let ctx = Context::load(cli)?;
    let store = open_store(&ctx, false).await?;

    let handle = store.read_collection(collection).await?;
    let item = find_one(&handle, label, attributes)?;
    if !handle.delete_item(&item)? {
        return Err(SecretsError::ItemNotFound);
    }
    store.save().await?;
    store.close().await?;

    output::success(&format!("Removed '{label}' from '{collection}'"));
    Ok(())
}
