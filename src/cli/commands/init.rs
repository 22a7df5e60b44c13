//! `sealbox init` — create a new, empty store.

use crate::cli::output;
use crate::cli::{prompt_new_password, Cli, Context};
use crate::errors::{Result, SecretsError};

/// Execute the `init` command.
pub async fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::load(cli)?;

    if ctx.store_exists() {
        output::tip("Use `sealbox collection create` to add to the existing store.");
        return Err(SecretsError::FileExists(ctx.store_path.clone()));
    }

    let password = prompt_new_password("SEALBOX_PASSWORD")?;

    let store = ctx.store()?;
    store.setup(&ctx.store_path, false).await?;
    store
        .set_credentials_with_names(&password, ctx.settings.key_names())
        .await?;
    store.save().await?;
    store.close().await?;

    output::success(&format!("Store created at {}", ctx.store_path.display()));
    output::tip("Run `sealbox collection create <NAME>` to add a collection.");
    Ok(())
}
