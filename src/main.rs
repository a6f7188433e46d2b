//! Huddle server
//!
//! Run with: cargo run -- serve [--config <path>] [--host <host>] [--port <port>]

use anyhow::Context;
use clap::{Parser, Subcommand};
use huddle::auth::{load_or_generate_secret, JwtAuthority};
use huddle::config::{generate_default_config, Config};
use huddle::websocket::Hub;
use huddle::{serve, AppState, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "huddle")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time chat server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP and WebSocket server
    Serve {
        /// Config file (default: search standard locations)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print a commented default configuration
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => {
            let mut config = match config {
                Some(path) => Config::load_with_env(&path)?,
                None => Config::load_default(),
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            huddle::logging::init(&config.logging)?;
            run(config).await
        }
        Commands::InitConfig => {
            print!("{}", generate_default_config());
            Ok(())
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting Huddle v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = config.storage.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Cannot create data directory {:?}", data_dir))?;

    let db_path = config.storage.database_path();
    tracing::info!("Database: {:?}", db_path);
    let store = Arc::new(SqliteStore::open(&db_path)?);

    let secret = match &config.auth.jwt_secret {
        Some(secret) => secret.as_bytes().to_vec(),
        None => {
            tracing::info!("No jwt_secret configured, using key from {:?}", data_dir);
            load_or_generate_secret(&data_dir)?
        }
    };
    let authority = Arc::new(JwtAuthority::new(
        &secret,
        config.auth.issuer.clone(),
        config.auth.token_ttl_hours,
    ));

    tracing::info!(
        outbound_capacity = config.hub.outbound_capacity,
        echo_to_sender = config.hub.echo_to_sender,
        max_connections = config.hub.max_connections,
        "Starting connection hub"
    );
    let (hub, hub_task) = Hub::spawn(config.hub.clone(), store.clone());

    let state = AppState::new(store, authority, hub.clone(), config.connection.clone());
    serve(state, &config.server).await?;

    tracing::info!("Stopping connection hub...");
    hub.shutdown().await;
    hub_task.await.context("Hub task failed")?;

    tracing::info!("Huddle stopped");
    Ok(())
}
