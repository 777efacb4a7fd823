//! logwarden daemon binary entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use logwarden_core::config::LogwardenConfig;
use logwarden_daemon::Daemon;

/// logwarden - log ingestion and analysis daemon.
#[derive(Parser, Debug)]
#[command(name = "logwarden", version, about)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "~/.config/logwarden/config.toml")]
    config: String,

    /// Override the listen address from the config file.
    #[arg(long)]
    listen: Option<String>,

    /// Override the store path from the config file.
    #[arg(long)]
    store: Option<String>,

    #[command(subcommand)]
    command: Option<DaemonCommand>,
}

#[derive(Subcommand, Debug)]
enum DaemonCommand {
    /// Run the daemon (HTTP/WebSocket API, retention sweep, summaries).
    Run,
    /// Delete records past the retention window once, then exit.
    Sweep,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_env("LOGWARDEN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = expand_tilde(&args.config);
    tracing::info!(config = %config_path.display(), "logwarden starting");

    let mut config = LogwardenConfig::load(&config_path).context("loading configuration")?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(store) = args.store {
        config.store.path = expand_tilde(&store);
    }

    match args.command {
        Some(DaemonCommand::Run) | None => {
            let daemon = Daemon::new(config)?;
            daemon.run().await
        }
        Some(DaemonCommand::Sweep) => {
            let daemon = Daemon::new(config)?;
            let deleted = daemon.sweep()?;
            println!("deleted {deleted} expired records");
            Ok(())
        }
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs_fallback(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Resolve a relative path under the user's home directory.
fn dirs_fallback(relative: &str) -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(relative)
    } else {
        PathBuf::from("/tmp").join(relative)
    }
}
