//! `SyncBoard` hub: in-memory board server for development.
//!
//! An axum server exposing the REST API under `/api/v1` and the real-time
//! endpoint at `/ws`. Data lives in memory and is lost on exit.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:8080 with a demo board
//! cargo run --bin syncboard-hub -- --seed-demo
//!
//! # Run on custom address
//! cargo run --bin syncboard-hub -- --bind 0.0.0.0:9000
//!
//! # Or via environment variable
//! SYNCBOARD_HUB_ADDR=0.0.0.0:9000 cargo run --bin syncboard-hub
//! ```

use std::sync::Arc;

use clap::Parser;
use syncboard_hub::config::{HubCliArgs, HubConfig};
use syncboard_hub::server::{self, HubState};
use syncboard_hub::store::demo_board;

#[tokio::main]
async fn main() {
    let cli = HubCliArgs::parse();

    let config = match HubConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting syncboard hub");

    let state = Arc::new(HubState::new());
    if config.seed_demo {
        state.boards.insert(demo_board()).await;
        tracing::info!("seeded demo board");
    }

    match server::start_server_with_state(&config.bind_addr, Arc::clone(&state)).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "hub listening");
            tokio::select! {
                result = handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "hub server task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    state.close_all_connections().await;
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start hub");
            std::process::exit(1);
        }
    }
}
