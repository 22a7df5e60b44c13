//! `sealbox get` — print a single secret's value.

use std::io::{self, Write};

use crate::cli::{open_store, Cli, Context};
use crate::errors::Result;

use super::find_one;

/// Execute the `get` command.
pub async fn execute(
    cli: &Cli,
    collection: &str,
    label: &str,
    attributes: &[(String, String)],
) -> Result<()> {
    let ctx = Context::load(cli)?;
    let store = open_store(&ctx, true).await?;

    let collection = store.read_collection(collection).await?;
    let value = find_one(&collection, label, attributes)?.value()?;
    store.close().await?;

    let stdout = io::stdout();
    write_value(value.as_bytes(), &mut stdout.lock())
}

/// Bytes go out unchanged; text values get a trailing newline.
fn write_value(bytes: &[u8], out: &mut dyn Write) -> Result<()> {
    out.write_all(bytes)?;
    if std::str::from_utf8(bytes).is_ok() && !bytes.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
