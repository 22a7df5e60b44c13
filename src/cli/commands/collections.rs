//! `sealbox collections` — list collections with their item counts.

use crate::cli::output;
use crate::cli::{open_store, Cli, Context};
use crate::errors::Result;

/// Execute the `collections` command.
pub async fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::load(cli)?;
    let store = open_store(&ctx, true).await?;

    let mut rows = Vec::new();
    for name in store.dir_collections().await? {
        let count = store.read_collection(&name).await?.item_count()?;
        rows.push((name, count));
    }
    store.close().await?;

    output::print_collections_table(&rows);
    Ok(())
}
