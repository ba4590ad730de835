//! Hookwatch CLI - Watch captured webhooks live
//!
//! Usage:
//!   hookwatch new [--watch]                       Create a capture session
//!   hookwatch watch <SESSION_ID>                  Stream a session's requests
//!   hookwatch fetch <SESSION_ID>                  List earlier requests
//!   hookwatch show <SESSION_ID> <REQUEST_ID>      Show one request
//!   hookwatch config set-relay <URL>              Save the default relay

mod commands;
mod config;
mod render;
mod viewer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hookwatch_common::constants::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hookwatch")]
#[command(author = "Hookwatch Team")]
#[command(version)]
#[command(about = "Watch captured webhooks live", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Relay base URL (overrides the config file)
    #[arg(long, global = true, env = "HOOKWATCH_RELAY_URL")]
    relay: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a capture session and print its ingestion URL
    New {
        /// Start watching the new session right away
        #[arg(short, long)]
        watch: bool,
    },

    /// Stream a session's requests as they arrive
    Watch {
        /// Session ID
        session_id: String,

        /// Number of earlier requests to load (0 to skip)
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT, value_parser = history_limit)]
        limit: usize,
    },

    /// List a session's earlier requests
    Fetch {
        /// Session ID
        session_id: String,

        /// Page size
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT, value_parser = history_limit)]
        limit: usize,

        /// Number of requests to skip
        #[arg(short, long, default_value_t = 0)]
        offset: usize,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show one captured request
    Show {
        /// Session ID
        session_id: String,

        /// Request ID
        request_id: String,

        /// Print a curl command replaying the request against BASE_URL
        #[arg(
            long,
            value_name = "BASE_URL",
            num_args = 0..=1,
            default_missing_value = "http://localhost:8080"
        )]
        curl: Option<String>,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Save the default relay URL
    SetRelay {
        /// Relay base URL
        url: String,
    },

    /// Show the effective configuration
    Show,
}

fn history_limit(value: &str) -> Result<usize, String> {
    let limit: usize = value.parse().map_err(|_| format!("not a number: {}", value))?;
    if limit > MAX_HISTORY_LIMIT {
        return Err(format!("at most {} requests per page", MAX_HISTORY_LIMIT));
    }
    Ok(limit)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    let cli_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},hookwatch_cli={}", log_level, cli_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let relay = cli.relay.as_deref();

    match cli.command {
        Commands::New { watch } => {
            let relay_url = config::Config::load()?.resolve_relay(relay)?;
            commands::new::run(&relay_url, watch).await?;
        }

        Commands::Watch { session_id, limit } => {
            let relay_url = config::Config::load()?.resolve_relay(relay)?;
            commands::watch::run(commands::watch::WatchOptions {
                session_id,
                relay_url,
                limit,
            })
            .await?;
        }

        Commands::Fetch {
            session_id,
            limit,
            offset,
            json,
        } => {
            let relay_url = config::Config::load()?.resolve_relay(relay)?;
            let limit = limit.max(1);
            commands::fetch::run(&relay_url, &session_id, limit, offset, json).await?;
        }

        Commands::Show {
            session_id,
            request_id,
            curl,
        } => {
            let relay_url = config::Config::load()?.resolve_relay(relay)?;
            commands::show::run(&relay_url, &session_id, &request_id, curl).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::SetRelay { url } => commands::config::set_relay(&url)?,
            ConfigAction::Show => commands::config::show(relay)?,
        },
    }

    Ok(())
}
