//! Runtime server configuration: recording-library roots, the backend RPC endpoint, encoder
//! selection, and the HLS/limits knobs the HTTP surface needs. A flat
//! runtime struct (with computed helpers) kept separate from the nested
//! on-disk `ConfigFile` in `config_file.rs`.

use std::path::PathBuf;

/// LL-HLS segmenter/playlist tuning.
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Target partial-segment duration in seconds.
    pub partial_target_duration_secs: f64,
    /// Sliding playlist window size in full segments.
    pub window_segments: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            partial_target_duration_secs: 0.5,
            window_segments: 10,
        }
    }
}

/// Recorded-segment cache and lifetime knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_memory_mb: usize,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_mb * 1024 * 1024
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 512,
            ttl_secs: 300,
        }
    }
}

/// How long an `Idling` live stream is kept tuned before the supervisor
/// transitions it to `Offline`, and how long an idle recorded-playback
/// session is retained before eviction.
#[derive(Debug, Clone)]
pub struct LifetimeConfig {
    pub max_idle_secs: u64,
    pub recorded_session_timeout_secs: u64,
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        Self {
            max_idle_secs: 60,
            recorded_session_timeout_secs: 600,
        }
    }
}

/// Backend RPC daemon connection.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4510,
        }
    }
}

/// External process paths and the chosen hardware/software encoder
/// backend.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub tsreadex_path: String,
    pub encoder_backend: String,
    pub encoder_path: Option<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            tsreadex_path: "tsreadex".to_string(),
            encoder_backend: "ffmpeg".to_string(),
            encoder_path: None,
        }
    }
}

/// Recording-library scan task knobs.
#[derive(Debug, Clone)]
pub struct RecordedScanConfig {
    pub roots: Vec<PathBuf>,
    pub ffprobe_path: String,
}

impl Default for RecordedScanConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendConfig,
    pub encoder: EncoderConfig,
    pub scan: RecordedScanConfig,
    pub segment: SegmentConfig,
    pub cache: CacheConfig,
    pub lifetime: LifetimeConfig,
    pub cors_enabled: bool,
    pub log_level: String,
    pub max_concurrent_streams: Option<usize>,
    pub rate_limit_rps: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            backend: BackendConfig::default(),
            encoder: EncoderConfig::default(),
            scan: RecordedScanConfig::default(),
            segment: SegmentConfig::default(),
            cache: CacheConfig::default(),
            lifetime: LifetimeConfig::default(),
            cors_enabled: true,
            log_level: "info".to_string(),
            max_concurrent_streams: Some(100),
            rate_limit_rps: Some(100),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn backend_addr(&self) -> String {
        format!("{}:{}", self.backend.host, self.backend.port)
    }
}
