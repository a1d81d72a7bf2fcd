//! mediasrv HTTP playback server: wires mediasrv-core's dispatch core to
//! an HTTP playback API, an admin reload endpoint, and a config watcher.

#![allow(dead_code)]

mod boundary;
mod error;
mod http;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use mediasrv_core::config::Config;
use mediasrv_core::config_watcher::ConfigWatcher;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::Result;
use crate::http::create_router;
use crate::state::AppState;

const APP_NAME: &str = "mediasrv";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = APP_NAME, version = VERSION)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(default_value = "mediasrv.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("failed to load config {}: {e}. using defaults", cli.config);
                Config::parse("[auth]\nmethod = \"internal\"\n").expect("default config parses")
            }
        }
    } else {
        tracing::warn!("no config file at {}, using defaults", cli.config);
        Config::parse("[auth]\nmethod = \"internal\"\n").expect("default config parses")
    };

    let addr: SocketAddr = config.api_addr.parse().expect("invalid api_addr");
    let state = Arc::new(AppState::new(config));

    if std::path::Path::new(&cli.config).exists() {
        let state_bg = Arc::clone(&state);
        let config_path = cli.config.clone();
        match ConfigWatcher::new(&config_path) {
            Ok(mut watcher) => {
                tokio::spawn(async move {
                    while watcher.recv().await.is_some() {
                        match Config::load(&config_path) {
                            Ok(config) => {
                                tracing::info!("reloading configuration from {config_path}");
                                state_bg.reload(config).await;
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "config reload from {config_path} failed: {e}. keeping previous configuration"
                                );
                            }
                        }
                    }
                });
            }
            Err(e) => tracing::warn!("could not start config watcher: {e}"),
        }
    }

    let app = create_router(state);

    tracing::info!("starting HTTP server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();

    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediasrv_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
