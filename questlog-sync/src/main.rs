//! `questlog-sync` -- record store for checklist sync.
//!
//! An axum HTTP server that keeps one JSON document per sync id in `SQLite`
//! and serves it to any device that knows the id.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin questlog-sync
//!
//! # Custom address, throwaway database, one browser origin
//! cargo run --bin questlog-sync -- --bind 127.0.0.1:8080 \
//!     --database :memory: --allow-origin http://localhost:5173
//! ```

use std::sync::Arc;

use clap::Parser;
use questlog_sync::config::{SyncCliArgs, SyncConfig};
use questlog_sync::server::{self, SyncState};
use questlog_sync::store::{IN_MEMORY, RecordStore};

#[tokio::main]
async fn main() {
    let cli = SyncCliArgs::parse();

    let config = match SyncConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if config.database.as_os_str() != IN_MEMORY {
        if let Some(parent) = config.database.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(path = %parent.display(), error = %e, "failed to create database directory");
                std::process::exit(1);
            }
        }
    }

    let store = match RecordStore::open(&config.database) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(path = %config.database.display(), error = %e, "failed to open database");
            std::process::exit(1);
        }
    };
    if config.allowed_origins.is_empty() {
        tracing::warn!("no allowed origins configured; browser clients will be refused by CORS");
    }

    tracing::info!(
        addr = %config.bind_addr,
        database = %config.database.display(),
        "starting questlog sync server"
    );

    let state = Arc::new(SyncState::with_config(
        store,
        config.max_payload_size,
        config.allowed_origins,
    ));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "sync server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "sync server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start sync server");
            std::process::exit(1);
        }
    }
}
