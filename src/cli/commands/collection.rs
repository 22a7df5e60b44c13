//! `sealbox collection create|delete`.

use crate::cli::output;
use crate::cli::{confirm, open_store, Cli, CollectionAction, Context};
use crate::errors::Result;

/// Execute a `collection` subcommand.
pub async fn execute(cli: &Cli, action: &CollectionAction) -> Result<()> {
    match action {
        CollectionAction::Create { name } => create(cli, name).await,
        CollectionAction::Delete { name, force } => delete(cli, name, *force).await,
    }
}

async fn create(cli: &Cli, name: &str) -> Result<()> {
    let ctx = Context::load(cli)?;
    let store = open_store(&ctx, false).await?;

    store.create_collection(name).await?;
    store.save().await?;
    store.close().await?;

    output::success(&format!("Created collection '{name}'"));
    Ok(())
}

async fn delete(cli: &Cli, name: &str, force: bool) -> Result<()> {
    if !force && !confirm(&format!("Delete collection '{name}' and all its items?"))? {
        output::info("Cancelled.");
        return Ok(());
    }

    let ctx = Context::load(cli)?;
    let store = open_store(&ctx, false).await?;

    store.delete_collection(name).await?;
    store.save().await?;
    store.close().await?;

    output::success(&format!("Deleted collection '{name}'"));
    Ok(())
}
