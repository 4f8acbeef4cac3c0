//! Per-IP rate limiting and a global connection cap for HLS/mpegts
//! requests.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ServerConfig;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

struct TokenBucket {
    max_tokens: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            max_tokens: config.burst_size as f64,
            tokens: config.burst_size as f64,
            refill_rate: config.requests_per_second as f64,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    limiters: RwLock<HashMap<SocketAddr, TokenBucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { limiters: RwLock::new(HashMap::new()), config }
    }

    pub fn is_allowed(&self, ip: SocketAddr) -> bool {
        let mut limiters = self.limiters.write();
        let bucket = limiters.entry(ip).or_insert_with(|| TokenBucket::new(self.config));
        bucket.try_consume()
    }

    /// Drops per-IP buckets idle past `max_age` so a long-lived process
    /// doesn't accumulate one entry per distinct client forever.
    pub fn cleanup(&self, max_age: Duration) {
        let mut limiters = self.limiters.write();
        limiters.retain(|_, bucket| bucket.last_refill.elapsed() < max_age);
    }
}

pub struct ConnectionLimiter {
    connections: RwLock<HashMap<SocketAddr, u32>>,
    max_connections_per_ip: u32,
    max_total_connections: u32,
}

impl ConnectionLimiter {
    pub fn new(max_connections_per_ip: u32, max_total_connections: u32) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections_per_ip,
            max_total_connections,
        }
    }

    pub fn try_acquire(&self, ip: SocketAddr) -> bool {
        let mut connections = self.connections.write();
        let total: u32 = connections.values().sum();
        if total >= self.max_total_connections {
            return false;
        }
        let count = connections.entry(ip).or_insert(0);
        if *count >= self.max_connections_per_ip {
            return false;
        }
        *count += 1;
        true
    }

    pub fn release(&self, ip: SocketAddr) {
        let mut connections = self.connections.write();
        if let Some(count) = connections.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                connections.remove(&ip);
            }
        }
    }

    pub fn connection_count(&self) -> u32 {
        self.connections.read().values().sum()
    }
}

pub fn create_rate_limiter(config: &ServerConfig) -> Arc<RateLimiter> {
    let rps = config.rate_limit_rps.unwrap_or(100);
    Arc::new(RateLimiter::new(RateLimitConfig { requests_per_second: rps, burst_size: rps * 2 }))
}

pub fn create_connection_limiter(config: &ServerConfig) -> Arc<ConnectionLimiter> {
    let max_total = config.max_concurrent_streams.unwrap_or(100) as u32;
    Arc::new(ConnectionLimiter::new(max_total, max_total))
}

fn client_ip(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0)
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if let Some(ip) = client_ip(&request) {
        if !limiter.is_allowed(ip) {
            return Err((StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"));
        }
    }
    Ok(next.run(request).await)
}

pub async fn connection_limit_middleware(
    State(limiter): State<Arc<ConnectionLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(ip) = client_ip(&request) else {
        return Ok(next.run(request).await);
    };
    if !limiter.try_acquire(ip) {
        return Err((StatusCode::SERVICE_UNAVAILABLE, "too many concurrent connections"));
    }
    let response = next.run(request).await;
    limiter.release(ip);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_bucket_denies_past_burst() {
        let mut bucket = TokenBucket::new(RateLimitConfig { requests_per_second: 1, burst_size: 2 });
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    #[test]
    fn connection_limiter_enforces_per_ip_cap() {
        let limiter = ConnectionLimiter::new(1, 10);
        let ip: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        assert!(limiter.try_acquire(ip));
        assert!(!limiter.try_acquire(ip));
        limiter.release(ip);
        assert!(limiter.try_acquire(ip));
    }

    #[test]
    fn connection_limiter_enforces_global_cap() {
        let limiter = ConnectionLimiter::new(10, 1);
        let a: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:2".parse().unwrap();
        assert!(limiter.try_acquire(a));
        assert!(!limiter.try_acquire(b));
    }
}
