//! peerctl - Main entry point

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peerctl::api::{self, AppState};
use peerctl::bridge::{DevicectlClient, IxctlClient, MemberDirectory, PdbctlClient, SotDirectory};
use peerctl::email::LogOnlyTransport;
use peerctl::refs::Resolver;
use peerctl::tasks::TaskRegistry;
use peerctl_common::config::Config;
use peerctl_common::db;

/// Command-line arguments for peerctl
#[derive(Parser, Debug)]
#[command(name = "peerctl")]
#[command(about = "BGP peering management service")]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "peerctl.toml", env = "PEERCTL_CONFIG")]
    config: PathBuf,

    /// Database file path (overrides the config file)
    #[arg(short, long, env = "PEERCTL_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peerctl=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config_path = args.config.exists().then_some(args.config.as_path());
    let mut config = Config::load(config_path).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database = database.to_string_lossy().to_string();
    }

    info!("Starting peerctl on {}", config.listen);
    info!("Database: {}", config.database);

    let pool = db::init_database_pool(Path::new(&config.database))
        .await
        .context("Failed to initialize database")?;

    let timeout_secs = config.bridges.timeout_secs;
    let pdbctl = Arc::new(PdbctlClient::new(&config.bridges.pdbctl_url, timeout_secs)?);
    let ixctl = Arc::new(IxctlClient::new(&config.bridges.ixctl_url, timeout_secs)?);
    let devicectl = Arc::new(DevicectlClient::new(
        &config.bridges.devicectl_url,
        timeout_secs,
    )?);

    let pdb_members: Arc<dyn MemberDirectory> = pdbctl.clone();
    let members = Arc::new(SotDirectory::new(ixctl, pdb_members));
    let resolver = Arc::new(Resolver::new(members, pdbctl, devicectl));

    let state = AppState {
        db: pool,
        resolver,
        transport: Arc::new(LogOnlyTransport),
        config: Arc::new(config.clone()),
        tasks: TaskRegistry::new(),
    };

    let app = api::build_router(state);

    let addr: SocketAddr = config
        .listen
        .parse()
        .context("Invalid listen address")?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    axum::serve(listener, app)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
