//! telecast-server: LL-HLS live streaming and recorded-video HLS playback
//! on top of an EDCB-compatible backend RPC daemon.

mod backend_adapter;
mod config;
mod config_file;
mod epg;
mod error;
mod http;
mod limits;
mod live;
mod metrics;
mod notify;
mod recorded;
mod scan_task;
mod state;

use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::http::create_router;
use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_NAME: &str = "telecast-server";

const EPG_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        match config_file::ConfigFile::from_file(&config_path) {
            Ok(cf) => cf.into_server_config(),
            Err(err) => {
                tracing::warn!("failed to load config file {}: {}. using defaults.", config_path, err);
                ServerConfig::default()
            }
        }
    } else {
        ServerConfig::default()
    };
    tracing::info!(?config, "configuration loaded");

    let state = AppState::new(config.clone());

    if let Err(err) = scan_task::start(state.clone()).await {
        tracing::warn!(error = %err, "recorded-library scan task failed to start");
    }

    let epg_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EPG_REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            match epg::refresh_once(&epg_state.epg, epg_state.backend_client()).await {
                Ok(()) => {
                    epg_state.epg.prune_stale();
                    tracing::debug!(channels = epg_state.epg.channel_count(), "epg refreshed");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "epg refresh failed, keeping previous snapshot");
                }
            }
        }
    });

    tokio::spawn(notify::run_status_notify_loop(state.clone()));

    let app = create_router(state.clone());

    let addr: SocketAddr = config.socket_addr().parse().expect("socket_addr produces a valid address");
    tracing::info!("starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telecast_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
