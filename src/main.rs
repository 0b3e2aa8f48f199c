//! postbot - OAuth2-authenticated periodic poster
//!
//! Keeps a user access token alive (proactive refresh before expiry, reactive
//! refresh on 401) and publishes through it on a fixed interval.

mod api;
mod auth;
mod config;
mod runner;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AuthenticatedClient;
use crate::auth::{Authorizer, HttpTokenExchanger, TokenManager};
use crate::config::Config;

#[derive(Parser)]
#[command(name = "postbot")]
#[command(about = "Post on a schedule with a self-refreshing OAuth2 token", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the callback server and the periodic poster
    Run,

    /// Publish a single post with the configured tokens
    Post {
        /// Post content
        text: String,
    },

    /// Print an authorization URL
    AuthUrl,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    match cli.command {
        Commands::Run => run(config).await?,
        Commands::Post { text } => post_once(config, &text).await?,
        Commands::AuthUrl => {
            let authorizer = Authorizer::new(&config)?;
            println!("{}", authorizer.begin());
        }
    }

    Ok(())
}

fn token_manager(config: &Config, http: reqwest::Client) -> Arc<TokenManager> {
    let exchanger = HttpTokenExchanger::new(http, config.token_url.clone(), config.credentials());
    Arc::new(TokenManager::new(
        Arc::new(exchanger),
        config.refresh_buffer(),
        config.seed_expires_in_secs,
    ))
}

async fn run(config: Config) -> Result<()> {
    let http = config.http_client()?;
    let manager = token_manager(&config, http.clone());

    let seeded = match config.seed_pair() {
        Some(pair) => {
            manager.seed(pair);
            true
        }
        None => {
            tracing::info!("No tokens found in configuration. Waiting for authentication...");
            false
        }
    };

    let client = Arc::new(AuthenticatedClient::new(http, manager.clone()));
    let poster = runner::spawn(
        client,
        config.post_url.clone(),
        config.post_text.clone(),
        config.post_interval(),
    );

    let addr = config.listen_addr()?;
    let state = server::ServerState {
        manager,
        authorizer: Arc::new(Authorizer::new(&config)?),
    };
    if seeded {
        println!("Server started with existing tokens on http://{}", addr);
    } else {
        println!("Visit http://{}/auth to authenticate", addr);
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
        tracing::info!("Shutting down...");
    };
    let result = server::serve(addr, server::build_router(state), shutdown).await;
    poster.abort();
    result
}

async fn post_once(config: Config, text: &str) -> Result<()> {
    let Some(pair) = config.seed_pair() else {
        bail!("No tokens configured. Set access_token/refresh_token or ACCESS_TOKEN/REFRESH_TOKEN.");
    };

    let http = config.http_client()?;
    let manager = token_manager(&config, http.clone());
    manager.seed(pair);

    let client = AuthenticatedClient::new(http, manager);
    let post = api::publish(&client, &config.post_url, text).await?;
    println!("Posted {}: {}", post.id, post.text);
    Ok(())
}
