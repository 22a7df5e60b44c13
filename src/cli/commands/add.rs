//! `sealbox add` — store a secret in a collection.

use std::collections::BTreeMap;

use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{open_store, Cli, Context};
use crate::errors::{Result, SecretsError};
use crate::file::SecretValue;

/// Arguments of the `add` command.
pub struct AddArgs<'a> {
    pub collection: &'a str,
    pub label: &'a str,
    pub value: Option<&'a str>,
    pub attributes: &'a [(String, String)],
    pub content_type: &'a str,
    pub replace: bool,
}

/// Execute the `add` command.
pub async fn execute(cli: &Cli, args: AddArgs<'_>) -> Result<()> {
    let ctx = Context::load(cli)?;

    // Prompt before the store is opened and locked.
    let value = match args.value {
        Some(v) => Zeroizing::new(v.to_string()),
        None => Zeroizing::new(
            dialoguer::Password::new()
                .with_prompt(format!("Value for '{}'", args.label))
                .interact()
                .map_err(|e| SecretsError::CommandFailed(format!("value prompt: {e}")))?,
        ),
    };

    let attributes: BTreeMap<String, String> = args.attributes.iter().cloned().collect();
    let secret = SecretValue::new(args.content_type, value.as_bytes().to_vec());

    let store = open_store(&ctx, false).await?;
    let collection = store.read_collection(args.collection).await?;
    if args.replace {
        collection.create_or_replace_item(args.label, attributes, secret)?;
    } else {
        collection.create_item(args.label, attributes, secret)?;
    }
    store.save().await?;
    store.close().await?;

    output::success(&format!(
        "Stored '{}' in collection '{}'",
        args.label, args.collection
    ));
    Ok(())
}
