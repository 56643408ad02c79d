//! pollbus-watcher
//!
//! Follows an Ethereum node's head and logs balance and nonce changes of the
//! configured accounts. Each account is an emitter on a pollbus
//! [`EventService`]; every new block pings the bus.

mod accounts;
mod chain;
mod config;
mod shutdown;
mod ticker;

use accounts::AccountRegistry;
use clap::Parser;
use config::ConfigLoader;
use pollbus_core::{EventService, TracingErrorLog};
use pollbus_sdk::client::RpcClient;
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use std::path::PathBuf;
use std::sync::Arc;
use ticker::HeadFollower;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// pollbus-watcher - Block-driven account watcher
#[derive(Parser, Debug)]
#[command(name = "pollbus-watcher")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./pollbus-watcher.toml")]
    config: PathBuf,

    /// Override the node's JSON-RPC endpoint
    #[arg(long, env = "POLLBUS_RPC_URL")]
    rpc_url: Option<Url>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting pollbus-watcher v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.rpc_url));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", config_loader.path());

    let client = Arc::new(RpcClient::new(loaded_config.rpc.url.clone()));
    let service = EventService::with_config(loaded_config.bus.clone(), Arc::new(TracingErrorLog));

    let registry = Arc::new(AccountRegistry::new(client.clone(), service.clone()));
    registry.apply(&loaded_config.accounts).await?;
    let accounts = registry.len().await;
    tracing::info!(accounts, "Accounts registered");

    let follower = HeadFollower::new(client, service.clone(), loaded_config.rpc.poll_interval);

    // Spawn config reload handler (listens for SIGHUP)
    let shutdown_notify = spawn_config_reload_handler(registry, config_loader, loaded_config);

    let result = tokio::select! {
        _ = follower.run() => Ok(()),
        result = shutdown_signal() => result,
    };

    shutdown_notify.notify_one();
    service.stop_all_polls();
    tracing::info!("Watcher shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pollbus_core=debug,reqwest=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
