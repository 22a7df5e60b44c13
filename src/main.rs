use clap::Parser;
use sealbox::cli::commands::add::AddArgs;
use sealbox::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => sealbox::cli::commands::init::execute(&cli).await,
        Commands::Collections => sealbox::cli::commands::collections::execute(&cli).await,
        Commands::Collection { ref action } => {
            sealbox::cli::commands::collection::execute(&cli, action).await
        }
        Commands::Add {
            ref collection,
            ref label,
            ref value,
            ref attributes,
            ref content_type,
            replace,
        } => {
            let args = AddArgs {
                collection,
                label,
                value: value.as_deref(),
                attributes,
                content_type,
                replace,
            };
            sealbox::cli::commands::add::execute(&cli, args).await
        }
        Commands::Search {
            ref collection,
            ref label,
            ref attributes,
            ref patterns,
        } => {
            sealbox::cli::commands::search::execute(
                &cli,
                collection,
                label.as_deref(),
                attributes,
                patterns,
            )
            .await
        }
        Commands::Get {
            ref collection,
            ref label,
            ref attributes,
        } => sealbox::cli::commands::get::execute(&cli, collection, label, attributes).await,
        Commands::Remove {
            ref collection,
            ref label,
            ref attributes,
            force,
        } => {
            sealbox::cli::commands::remove::execute(&cli, collection, label, attributes, force)
                .await
        }
        Commands::Passwd => sealbox::cli::commands::passwd::execute(&cli).await,
        Commands::Completions { shell } => sealbox::cli::commands::completions::execute(shell),
    };

    if let Err(e) = result {
        sealbox::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}

/// Log to stderr, filtered by `SEALBOX_LOG` (default: warn).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("SEALBOX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
