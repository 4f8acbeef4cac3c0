//! Shared application state: every handler and background task reaches
//! the rest of the world through one `Arc<AppState>` cloned into axum's
//! router.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use telecast_core::backend::BackendClient;
use telecast_core::hls::SharedPlaylist;
use telecast_core::live::LiveStreamRegistry;
use telecast_core::model::RecordedVideo;
use telecast_core::recorded::{RecordedEncoderSpec, RecordedSession};
use telecast_core::scan::{DriveLimiter, MetadataAnalyzer, ScanTaskHandle};
use telecast_core::tuner::TunerRegistry;
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::backend_adapter::{tcp_connector, RpcBackendAdapter};
use crate::config::ServerConfig;
use crate::epg::EpgStore;
use crate::limits::{create_connection_limiter, create_rate_limiter, ConnectionLimiter, RateLimiter};
use crate::metrics::Metrics;

pub type Backend = RpcBackendAdapter<
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = std::io::Result<TcpStream>> + Send>> + Send + Sync>,
>;

/// One live-channel's playlist/init-segment side state, keyed the same
/// way as the `LiveStream` it rides on (`"{channel_id}-{quality}"`).
pub struct LiveSegmenterState {
    pub playlist: SharedPlaylist,
    pub init_segment: parking_lot::RwLock<Option<bytes::Bytes>>,
}

/// A recorded-playback session alongside the encoder spec that started
/// it, kept together so a look-ahead-cancel restart can replay the same
/// spec against a later `start_index` without re-resolving it.
pub struct RecordedPlayback {
    pub session: Arc<RecordedSession>,
    pub spec: RecordedEncoderSpec,
}

pub struct AppState {
    pub config: ServerConfig,
    pub backend: Arc<Backend>,
    pub tuner_registry: Arc<TunerRegistry>,
    pub live_registry: Arc<LiveStreamRegistry>,
    pub live_segmenters: DashMap<String, Arc<LiveSegmenterState>>,
    pub recorded_sessions: DashMap<Uuid, Arc<RecordedPlayback>>,
    pub recorded_videos: DashMap<Uuid, RecordedVideo>,
    pub recorded_video_hash_index: DashMap<[u8; 32], Uuid>,
    pub epg: Arc<EpgStore>,
    pub analyzer: Arc<MetadataAnalyzer>,
    pub drive_limiter: Arc<DriveLimiter>,
    pub metrics: Arc<Metrics>,
    pub rate_limiter: Arc<RateLimiter>,
    pub connection_limiter: Arc<ConnectionLimiter>,
    pub scan_handle: parking_lot::Mutex<Option<ScanTaskHandle>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let backend_addr = config.backend_addr();
        let connect = tcp_connector(backend_addr);
        let boxed_connect: Box<
            dyn Fn() -> Pin<Box<dyn Future<Output = std::io::Result<TcpStream>> + Send>> + Send + Sync,
        > = Box::new(connect);
        let backend = Arc::new(RpcBackendAdapter::new(boxed_connect, std::time::Duration::from_secs(15)));

        let rate_limiter = create_rate_limiter(&config);
        let connection_limiter = create_connection_limiter(&config);
        let analyzer = Arc::new(MetadataAnalyzer::new(config.scan.ffprobe_path.clone()));

        Arc::new(Self {
            backend,
            tuner_registry: Arc::new(TunerRegistry::new()),
            live_registry: Arc::new(LiveStreamRegistry::new()),
            live_segmenters: DashMap::new(),
            recorded_sessions: DashMap::new(),
            recorded_videos: DashMap::new(),
            recorded_video_hash_index: DashMap::new(),
            epg: Arc::new(EpgStore::new()),
            analyzer,
            drive_limiter: Arc::new(DriveLimiter::new()),
            metrics: Arc::new(Metrics::new()),
            rate_limiter,
            connection_limiter,
            scan_handle: parking_lot::Mutex::new(None),
            config,
        })
    }

    /// A fresh, unauthenticated RPC client for one-shot calls (service
    /// enumeration, EPG refresh) that don't need a `TunerSession`.
    pub fn backend_client(
        &self,
    ) -> &BackendClient<
        Box<dyn Fn() -> Pin<Box<dyn Future<Output = std::io::Result<TcpStream>> + Send>> + Send + Sync>,
    > {
        self.backend.client()
    }

    pub fn refresh_gauges(&self) {
        self.metrics.set_active_live_streams(self.live_registry.len() as u64);
        self.metrics.set_active_recorded_sessions(self.recorded_sessions.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_empty() {
        let state = AppState::new(ServerConfig::default());
        assert_eq!(state.live_registry.len(), 0);
        assert_eq!(state.recorded_sessions.len(), 0);
        assert_eq!(state.tuner_registry.len(), 0);
    }
}
