//! `cafe-export` binary.
//!
//! - `serve` resolves configuration, installs logging and runs the HTTP
//!   server until Ctrl-C
//! - `credentials set|clear` manages the Supabase secrets in the OS
//!   credential store

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cafe_export::config::{Cli, Command, CredentialsCommand, ExportConfig, ServeArgs};
use cafe_export::export::ExportOptions;
use cafe_export::server::{self, AppState};
use cafe_export::supabase::SupabaseClient;
use cafe_export::{logging, storage};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Credentials(CredentialsCommand::Set { url, anon_key }) => {
            storage::store_supabase_credentials(&url, &anon_key)
                .map_err(anyhow::Error::msg)
                .context("Failed to store Supabase credentials")?;
            println!("Supabase credentials stored");
            Ok(())
        }
        Command::Credentials(CredentialsCommand::Clear) => {
            storage::clear_credentials()
                .map_err(anyhow::Error::msg)
                .context("Failed to clear Supabase credentials")?;
            println!("Supabase credentials cleared");
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = ExportConfig::from_args(args).context("Invalid configuration")?;
    let _log_guard =
        logging::init(&config.log_dir, config.log_format).context("Failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("BUILD_GIT_SHA"),
        "starting cafe-export"
    );
    info!(config = ?config, "configuration resolved");

    let client = Arc::new(
        SupabaseClient::from_config(&config)
            .map_err(anyhow::Error::msg)
            .context("Failed to create Supabase client")?,
    );
    let state = AppState::new(
        Arc::clone(&client),
        client,
        ExportOptions {
            archive_prefix: config.archive_prefix.clone(),
        },
    );

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                on_signal.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C; stop the process to exit"),
        }
    });

    server::serve(config.bind_addr, state, shutdown).await
}
