//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use bazaar_core::config::{ConfigStore, RateLimitConfig};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

/// Completes when SIGTERM or SIGINT (Ctrl+C) is received.
///
/// If only one handler installs, that one is awaited. If neither does,
/// this returns immediately.
pub async fn shutdown_signal() {
    let sigterm = signal(SignalKind::terminate());
    let sigint = signal(SignalKind::interrupt());

    match (sigterm, sigint) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::error!(error = %e, "Failed to install a shutdown signal handler");
            only.recv().await;
            tracing::info!("Received shutdown signal, initiating graceful shutdown");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Failed to install shutdown signal handlers");
        }
    }
}

/// Spawns a task that reloads the rate-limit policies on SIGHUP.
///
/// The task stops when `shutdown_rx` flips to `true`.
pub fn spawn_config_reload_handler(
    config_loader: Arc<ConfigLoader>,
    rate_limits: ConfigStore<RateLimitConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, config reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            rate_limits.replace(loaded_config.core.rate_limits);
                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
            }
        }
    });
}

/// Logs every policy swap so operators can confirm a reload took effect.
pub fn spawn_rate_limit_watcher(
    rate_limits: &ConfigStore<RateLimitConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut watcher = rate_limits.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                changed = watcher.changed() => match changed {
                    Ok(config) => {
                        let mut operations: Vec<_> = config
                            .policies
                            .iter()
                            .map(|(op, policy)| format!("{op}={}/{}s", policy.max, policy.window.as_secs()))
                            .collect();
                        operations.sort();
                        tracing::info!(policies = ?operations, "Rate limit policies updated");
                    }
                    Err(_) => break,
                },
            }
        }
    });
}
