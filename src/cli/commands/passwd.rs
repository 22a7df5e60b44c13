//! `sealbox passwd` — re-key the store under a new password.

use crate::cli::output;
use crate::cli::{open_store, prompt_new_password, Cli, Context};
use crate::errors::Result;

/// Execute the `passwd` command.
pub async fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::load(cli)?;
    let store = open_store(&ctx, false).await?;

    let new_password = prompt_new_password("SEALBOX_NEW_PASSWORD")?;
    store.change_password(&new_password).await?;
    store.close().await?;

    output::success("Store password changed");
    output::tip(&format!(
        "{}.bkp still opens with the old password; remove it when no longer needed.",
        ctx.store_path.display()
    ));
    Ok(())
}
