//! On-disk TOML configuration shape. Kept as a separate nested
//! `ConfigFile` from the flat runtime `ServerConfig` so the file format
//! can evolve (optional fields, defaults) independently of the in-memory
//! shape the rest of the server works with.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::ServerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub encoder: EncoderSettings,
    pub scan: Option<ScanSettings>,
    pub segment: Option<SegmentSettings>,
    pub cache: Option<CacheSettings>,
    pub lifetime: Option<LifetimeSettings>,
    pub logging: Option<LoggingSettings>,
    pub limits: Option<LimitsSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSettings {
    pub tsreadex_path: String,
    pub backend: String,
    pub encoder_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    pub roots: Vec<String>,
    pub ffprobe_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSettings {
    pub partial_target_duration_secs: Option<f64>,
    pub window_segments: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub max_memory_mb: usize,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifetimeSettings {
    pub max_idle_secs: Option<u64>,
    pub recorded_session_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSettings {
    pub max_concurrent_streams: Option<usize>,
    pub rate_limit_rps: Option<u32>,
}

impl ConfigFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn default_config() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 3000,
                cors_enabled: Some(true),
            },
            backend: BackendSettings {
                host: "127.0.0.1".to_string(),
                port: 4510,
            },
            encoder: EncoderSettings {
                tsreadex_path: "tsreadex".to_string(),
                backend: "ffmpeg".to_string(),
                encoder_path: None,
            },
            scan: Some(ScanSettings { roots: Vec::new(), ffprobe_path: None }),
            segment: Some(SegmentSettings {
                partial_target_duration_secs: Some(0.5),
                window_segments: Some(10),
            }),
            cache: Some(CacheSettings { max_memory_mb: 512, ttl_secs: 300 }),
            lifetime: Some(LifetimeSettings {
                max_idle_secs: Some(60),
                recorded_session_timeout_secs: Some(600),
            }),
            logging: Some(LoggingSettings { level: "info".to_string(), format: Some("pretty".to_string()) }),
            limits: Some(LimitsSettings {
                max_concurrent_streams: Some(100),
                rate_limit_rps: Some(100),
            }),
        }
    }

    pub fn into_server_config(self) -> ServerConfig {
        let limits = self.limits.unwrap_or(LimitsSettings {
            max_concurrent_streams: None,
            rate_limit_rps: None,
        });
        let segment = self.segment.unwrap_or(SegmentSettings {
            partial_target_duration_secs: None,
            window_segments: None,
        });
        let lifetime = self.lifetime.unwrap_or(LifetimeSettings {
            max_idle_secs: None,
            recorded_session_timeout_secs: None,
        });
        let scan = self.scan.unwrap_or(ScanSettings { roots: Vec::new(), ffprobe_path: None });
        let cache = self.cache.unwrap_or(CacheSettings { max_memory_mb: 512, ttl_secs: 300 });

        ServerConfig {
            host: self.server.host,
            port: self.server.port,
            backend: crate::config::BackendConfig {
                host: self.backend.host,
                port: self.backend.port,
            },
            encoder: crate::config::EncoderConfig {
                tsreadex_path: self.encoder.tsreadex_path,
                encoder_backend: self.encoder.backend,
                encoder_path: self.encoder.encoder_path,
            },
            scan: crate::config::RecordedScanConfig {
                roots: scan.roots.into_iter().map(std::path::PathBuf::from).collect(),
                ffprobe_path: scan.ffprobe_path.unwrap_or_else(|| "ffprobe".to_string()),
            },
            segment: crate::config::SegmentConfig {
                partial_target_duration_secs: segment.partial_target_duration_secs.unwrap_or(0.5),
                window_segments: segment.window_segments.unwrap_or(10),
            },
            cache: crate::config::CacheConfig {
                max_memory_mb: cache.max_memory_mb,
                ttl_secs: cache.ttl_secs,
            },
            lifetime: crate::config::LifetimeConfig {
                max_idle_secs: lifetime.max_idle_secs.unwrap_or(60),
                recorded_session_timeout_secs: lifetime.recorded_session_timeout_secs.unwrap_or(600),
            },
            cors_enabled: self.server.cors_enabled.unwrap_or(true),
            log_level: self.logging.map(|l| l.level).unwrap_or_else(|| "info".to_string()),
            max_concurrent_streams: limits.max_concurrent_streams,
            rate_limit_rps: limits.rate_limit_rps,
        }
    }
}

/// Resolves `ServerConfig.encoder.encoder_backend`'s name into the enum
/// `telecast_core::live` commands actually dispatch on.
pub fn resolve_encoder_backend(name: &str) -> telecast_core::live::EncoderBackend {
    match name {
        "qsv" => telecast_core::live::EncoderBackend::QsvEncC,
        "nvenc" => telecast_core::live::EncoderBackend::NvEncC,
        "vce" => telecast_core::live::EncoderBackend::VceEncC,
        "rkmpp" => telecast_core::live::EncoderBackend::RkmppEncC,
        _ => telecast_core::live::EncoderBackend::Ffmpeg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let cf = ConfigFile::default_config();
        let text = toml::to_string_pretty(&cf).unwrap();
        let parsed: ConfigFile = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.port, cf.server.port);
    }

    #[test]
    fn into_server_config_applies_defaults_for_missing_sections() {
        let cf = ConfigFile {
            server: ServerSettings { host: "127.0.0.1".to_string(), port: 8080, cors_enabled: None },
            backend: BackendSettings { host: "127.0.0.1".to_string(), port: 4510 },
            encoder: EncoderSettings { tsreadex_path: "tsreadex".to_string(), backend: "ffmpeg".to_string(), encoder_path: None },
            scan: None,
            segment: None,
            cache: None,
            lifetime: None,
            logging: None,
            limits: None,
        };
        let config = cf.into_server_config();
        assert_eq!(config.port, 8080);
        assert_eq!(config.segment.window_segments, 10);
        assert!(config.cors_enabled);
    }
}
