//! Prometheus text-format metrics endpoint covering this server's
//! live/recorded-stream counters.

use axum::http::header;
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Default)]
struct Counters {
    requests_by_endpoint: HashMap<String, u64>,
    errors_by_type: HashMap<String, u64>,
}

pub struct Metrics {
    start_time: Instant,
    request_count: AtomicU64,
    bytes_served: AtomicU64,
    segments_served: AtomicU64,
    parts_served: AtomicU64,
    playlist_requests: AtomicU64,
    active_live_streams: AtomicU64,
    active_recorded_sessions: AtomicU64,
    counters: RwLock<Counters>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            bytes_served: AtomicU64::new(0),
            segments_served: AtomicU64::new(0),
            parts_served: AtomicU64::new(0),
            playlist_requests: AtomicU64::new(0),
            active_live_streams: AtomicU64::new(0),
            active_recorded_sessions: AtomicU64::new(0),
            counters: RwLock::new(Counters::default()),
        }
    }

    pub fn record_request(&self, endpoint: &str) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        *self.counters.write().requests_by_endpoint.entry(endpoint.to_string()).or_insert(0) += 1;
    }

    pub fn record_bytes(&self, n: u64) {
        self.bytes_served.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_segment_served(&self) {
        self.segments_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_part_served(&self) {
        self.parts_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_playlist_request(&self) {
        self.playlist_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, kind: &str) {
        *self.counters.write().errors_by_type.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn set_active_live_streams(&self, n: u64) {
        self.active_live_streams.store(n, Ordering::Relaxed);
    }

    pub fn set_active_recorded_sessions(&self, n: u64) {
        self.active_recorded_sessions.store(n, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn export_prometheus(&self) -> String {
        let counters = self.counters.read();
        let mut out = String::new();

        out.push_str("# HELP telecast_requests_total Total HTTP requests received\n");
        out.push_str("# TYPE telecast_requests_total counter\n");
        out.push_str(&format!(
            "telecast_requests_total {}\n",
            self.request_count.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP telecast_requests_by_endpoint_total Requests per endpoint\n");
        out.push_str("# TYPE telecast_requests_by_endpoint_total counter\n");
        for (endpoint, count) in counters.requests_by_endpoint.iter() {
            out.push_str(&format!(
                "telecast_requests_by_endpoint_total{{endpoint=\"{endpoint}\"}} {count}\n"
            ));
        }

        out.push_str("# HELP telecast_bytes_served_total Bytes served to clients\n");
        out.push_str("# TYPE telecast_bytes_served_total counter\n");
        out.push_str(&format!(
            "telecast_bytes_served_total {}\n",
            self.bytes_served.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP telecast_segments_served_total Full HLS segments served\n");
        out.push_str("# TYPE telecast_segments_served_total counter\n");
        out.push_str(&format!(
            "telecast_segments_served_total {}\n",
            self.segments_served.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP telecast_parts_served_total LL-HLS partial segments served\n");
        out.push_str("# TYPE telecast_parts_served_total counter\n");
        out.push_str(&format!(
            "telecast_parts_served_total {}\n",
            self.parts_served.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP telecast_playlist_requests_total Playlist requests, including blocking reloads\n");
        out.push_str("# TYPE telecast_playlist_requests_total counter\n");
        out.push_str(&format!(
            "telecast_playlist_requests_total {}\n",
            self.playlist_requests.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP telecast_active_live_streams Live streams currently Standby/OnAir/Idling\n");
        out.push_str("# TYPE telecast_active_live_streams gauge\n");
        out.push_str(&format!(
            "telecast_active_live_streams {}\n",
            self.active_live_streams.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP telecast_active_recorded_sessions Open recorded-playback sessions\n");
        out.push_str("# TYPE telecast_active_recorded_sessions gauge\n");
        out.push_str(&format!(
            "telecast_active_recorded_sessions {}\n",
            self.active_recorded_sessions.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP telecast_errors_by_type_total Errors by classification\n");
        out.push_str("# TYPE telecast_errors_by_type_total counter\n");
        for (kind, count) in counters.errors_by_type.iter() {
            out.push_str(&format!("telecast_errors_by_type_total{{kind=\"{kind}\"}} {count}\n"));
        }

        out.push_str("# HELP telecast_uptime_seconds Seconds since process start\n");
        out.push_str("# TYPE telecast_uptime_seconds gauge\n");
        out.push_str(&format!("telecast_uptime_seconds {}\n", self.uptime_secs()));

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn metrics_handler(
    state: axum::extract::State<std::sync::Arc<crate::state::AppState>>,
) -> Response {
    let body = state.metrics.export_prometheus();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_count_increments_per_endpoint() {
        let metrics = Metrics::new();
        metrics.record_request("/live/gr011-1080p/playlist.m3u8");
        metrics.record_request("/live/gr011-1080p/playlist.m3u8");
        let text = metrics.export_prometheus();
        assert!(text.contains("telecast_requests_total 2"));
    }

    #[test]
    fn export_includes_gauges() {
        let metrics = Metrics::new();
        metrics.set_active_live_streams(3);
        let text = metrics.export_prometheus();
        assert!(text.contains("telecast_active_live_streams 3"));
    }
}
