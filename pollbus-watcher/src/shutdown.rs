//! Signal handling for graceful shutdown and config reload.

use crate::accounts::AccountRegistry;
use crate::chain::ChainSource;
use crate::config::{ConfigLoader, LoadedConfig};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Spawns a task that listens for SIGHUP, reloads the configuration and
/// reconciles the watched accounts.
///
/// `current` is the configuration the process started with; RPC and bus
/// settings only take effect on restart.
///
/// Returns a Notify that can be used to signal when shutdown is complete.
pub fn spawn_config_reload_handler<C: ChainSource>(
    registry: Arc<AccountRegistry<C>>,
    config_loader: Arc<ConfigLoader>,
    current: LoadedConfig,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!("Failed to install SIGHUP handler, reload disabled: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            if loaded_config.rpc != current.rpc {
                                tracing::warn!("RPC settings changed; restart to apply them");
                            }
                            if loaded_config.bus != current.bus {
                                tracing::warn!("Bus settings changed; restart to apply them");
                            }
                            match registry.apply(&loaded_config.accounts).await {
                                Ok(()) => {
                                    let accounts = registry.len().await;
                                    tracing::info!(accounts, "Configuration reloaded successfully");
                                }
                                Err(e) => tracing::error!("Failed to apply accounts: {}", e),
                            }
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
