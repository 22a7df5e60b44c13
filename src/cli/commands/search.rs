//! `sealbox search` — list matching items without their values.

use crate::cli::output;
use crate::cli::{open_store, Cli, Context};
use crate::errors::Result;
use crate::store::ItemSearch;

/// Execute the `search` command.
pub async fn execute(
    cli: &Cli,
    collection: &str,
    label: Option<&str>,
    attributes: &[(String, String)],
    patterns: &[(String, String)],
) -> Result<()> {
    let mut search = attributes
        .iter()
        .fold(ItemSearch::new(), |s, (k, v)| s.attribute(k, v));
    if let Some(label) = label {
        search = search.label(label);
    }
    for (key, pattern) in patterns {
        search = search.attribute_regex(key, pattern)?;
    }

    let ctx = Context::load(cli)?;
    let store = open_store(&ctx, true).await?;
    let items = store.read_collection(collection).await?.search_items(&search)?;
    output::print_items_table(&items)?;
    store.close().await?;
    Ok(())
}
