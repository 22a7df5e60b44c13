//! CLI module — Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use zeroize::Zeroizing;

use crate::config::{KeyCacheKind, Settings};
use crate::crypto::{KeyCache, MemoryKeyCache};
use crate::errors::{Result, SecretsError};
use crate::store::SecretsStore;

/// Minimum password length to prevent trivially weak passwords.
const MIN_PASSWORD_LEN: usize = 8;

/// Sealbox CLI: encrypted single-file secrets store.
#[derive(Parser)]
#[command(name = "sealbox", about = "Encrypted single-file secrets store", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store file (default: from .sealbox.toml, else .sealbox/secrets.store)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Where derived keys are cached while a command runs
    #[arg(long, value_enum, global = true)]
    pub key_cache: Option<KeyCacheKind>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create a new, empty store
    Init,

    /// List collections and their item counts
    Collections,

    /// Create or delete a collection
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Add a secret to a collection
    Add {
        /// Collection name
        collection: String,
        /// Item label
        label: String,
        /// Secret value (omit for interactive prompt)
        value: Option<String>,
        /// Attribute as key=value (repeatable)
        #[arg(short, long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
        /// Content type stored with the value
        #[arg(long, default_value = "text/plain")]
        content_type: String,
        /// Overwrite an item with the same label and attributes
        #[arg(long)]
        replace: bool,
    },

    /// Search a collection by label and attributes
    Search {
        /// Collection name
        collection: String,
        /// Exact label to match
        #[arg(long)]
        label: Option<String>,
        /// Attribute filter as key=value; an empty value matches any (repeatable)
        #[arg(short, long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
        /// Attribute filter as key=regex (repeatable)
        #[arg(long = "attr-regex", value_parser = parse_attribute)]
        patterns: Vec<(String, String)>,
    },

    /// Print a secret's value
    Get {
        /// Collection name
        collection: String,
        /// Item label
        label: String,
        /// Attribute filter as key=value (repeatable)
        #[arg(short, long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
    },

    /// Remove a secret
    Remove {
        /// Collection name
        collection: String,
        /// Item label
        label: String,
        /// Attribute filter as key=value (repeatable)
        #[arg(short, long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Change the store password
    Passwd,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Collection subcommands.
#[derive(clap::Subcommand)]
pub enum CollectionAction {
    /// Create an empty collection
    Create {
        /// Collection name
        name: String,
    },

    /// Delete a collection and every item in it
    Delete {
        /// Collection name
        name: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Parse `key=value`; a bare `key` means an empty value.
pub fn parse_attribute(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw.split_once('=').unwrap_or((raw, ""));
    if key.is_empty() {
        return Err(format!("attribute '{raw}' has an empty key"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Resolved settings for one command invocation.
pub struct Context {
    pub settings: Settings,
    pub store_path: PathBuf,
    pub key_cache: KeyCacheKind,
}

impl Context {
    /// Load `.sealbox.toml` from the working directory and apply CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let settings = Settings::load(&cwd)?;
        let store_path = match &cli.store {
            Some(path) => cwd.join(path),
            None => settings.store_path(&cwd),
        };
        let key_cache = cli.key_cache.unwrap_or(settings.key_cache);
        Ok(Self {
            settings,
            store_path,
            key_cache,
        })
    }

    /// A store handle with this context's key cache and KDF cost.
    pub fn store(&self) -> Result<SecretsStore> {
        Ok(SecretsStore::with_kdf_iterations(
            key_cache(self.key_cache)?,
            self.settings.kdf_iterations,
        ))
    }

    pub fn store_exists(&self) -> bool {
        std::fs::metadata(&self.store_path).is_ok_and(|m| m.len() > 0)
    }
}

fn key_cache(kind: KeyCacheKind) -> Result<Arc<dyn KeyCache>> {
    match kind {
        KeyCacheKind::Memory => Ok(Arc::new(MemoryKeyCache::new())),
        #[cfg(feature = "keyring-store")]
        KeyCacheKind::Keyring => Ok(Arc::new(crate::keyring::KeyringKeyCache::new())),
        #[cfg(not(feature = "keyring-store"))]
        KeyCacheKind::Keyring => Err(SecretsError::ConfigError(
            "this build has no keyring support; use --key-cache memory".into(),
        )),
    }
}

/// Set up and unlock an existing store.
pub async fn open_store(ctx: &Context, read_only: bool) -> Result<SecretsStore> {
    if !ctx.store_exists() {
        output::tip("Run `sealbox init` to create a store.");
        return Err(SecretsError::CommandFailed(format!(
            "no store at {}",
            ctx.store_path.display()
        )));
    }

    let store = ctx.store()?;
    store.setup(&ctx.store_path, read_only).await?;
    let password = prompt_password()?;
    store
        .set_credentials_with_names(&password, ctx.settings.key_names())
        .await?;
    Ok(store)
}

/// Get the store password: `SEALBOX_PASSWORD`, else an interactive prompt.
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("SEALBOX_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter store password")
        .interact()
        .map_err(|e| SecretsError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new password with confirmation.
///
/// `env_var` lets scripts supply it non-interactively.  Enforces a
/// minimum password length.
pub fn prompt_new_password(env_var: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(env_var) {
        if !pw.is_empty() {
            if pw.len() < MIN_PASSWORD_LEN {
                return Err(SecretsError::CommandFailed(format!(
                    "password must be at least {MIN_PASSWORD_LEN} characters"
                )));
            }
            return Ok(Zeroizing::new(pw));
        }
    }

    loop {
        let password = dialoguer::Password::new()
            .with_prompt("Choose store password")
            .with_confirmation(
                "Confirm store password",
                "Passwords do not match, try again",
            )
            .interact()
            .map_err(|e| SecretsError::CommandFailed(format!("password prompt: {e}")))?;

        if password.len() < MIN_PASSWORD_LEN {
            output::warning(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Zeroizing::new(password));
    }
}

/// Ask before doing something destructive.
pub fn confirm(prompt: &str) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| SecretsError::CommandFailed(format!("confirm prompt: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_with_value() {
        assert_eq!(
            parse_attribute("ssid=home").unwrap(),
            ("ssid".to_string(), "home".to_string())
        );
    }

    #[test]
    fn attribute_value_may_contain_equals() {
        assert_eq!(
            parse_attribute("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
    }

    #[test]
    fn bare_key_means_any_value() {
        assert_eq!(
            parse_attribute("ssid").unwrap(),
            ("ssid".to_string(), String::new())
        );
        assert_eq!(
            parse_attribute("ssid=").unwrap(),
            ("ssid".to_string(), String::new())
        );
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(parse_attribute("=x").is_err());
        assert!(parse_attribute("").is_err());
    }

    #[test]
    fn cli_parses_global_overrides() {
        let cli = Cli::try_parse_from([
            "sealbox",
            "--store",
            "x.store",
            "--key-cache",
            "memory",
            "collections",
        ])
        .unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("x.store")));
        assert_eq!(cli.key_cache, Some(KeyCacheKind::Memory));
    }
}
