//! `Zilzzz` store server: the authoritative home of every owner's tasks.
//!
//! An axum WebSocket server that binds each connection to one owner,
//! applies task writes, and pushes the owner's full task list to every
//! subscribed connection after each change.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9400, memory only
//! cargo run --bin zilzzz-store
//!
//! # Persist tasks to a JSON file
//! cargo run --bin zilzzz-store -- --bind 127.0.0.1:9400 --data-file tasks.json
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use zilzzz_store::config::{StoreCliArgs, StoreConfig};
use zilzzz_store::server::{self, ServerState};
use zilzzz_store::store::TaskStore;

#[tokio::main]
async fn main() {
    let cli = StoreCliArgs::parse();

    let config = match StoreConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting zilzzz store server");

    let store = match &config.data_file {
        Some(path) => match TaskStore::with_data_file(path) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(error = %e, "failed to open data file");
                std::process::exit(1);
            }
        },
        None => TaskStore::new(),
    };
    let state = Arc::new(ServerState::with_store(store));

    match server::start_server_with_state(&config.bind_addr.to_string(), Arc::clone(&state)).await {
        Ok((bound_addr, mut handle)) => {
            tracing::info!(addr = %bound_addr, "store server listening");
            tokio::select! {
                result = &mut handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "store server task failed");
                    }
                }
                () = shutdown_signal() => {
                    tracing::info!("shutting down");
                    state.close_all_connections().await;
                    // Give writer tasks a moment to flush the close frames.
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    handle.abort();
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start store server");
            std::process::exit(1);
        }
    }
}

/// Resolves on ctrl-c. If the signal cannot be watched, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
