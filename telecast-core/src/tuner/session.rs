//! Tuner session lifecycle.

use super::registry::TunerRegistry;
use crate::backend::SetChInfo;
use crate::error::{CoreError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Everything the tuner session manager needs from the backend RPC client.
/// Kept as a trait so unit tests can stand in a fake daemon.
#[async_trait::async_trait]
pub trait TunerBackend: Send + Sync {
    async fn set_ch(&self, info: &SetChInfo) -> crate::error::RpcResult<u32>;
    async fn close(&self, nwtv_id: u32) -> crate::error::RpcResult<()>;
    async fn relay_view_stream(
        &self,
        process_id: u32,
    ) -> crate::error::RpcResult<Box<dyn TsSocket>>;
}

/// The raw-TS socket handed back by `RelayViewStream`.
pub trait TsSocket: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> TsSocket for T {}

const OPEN_RETRY_BUDGET: Duration = Duration::from_secs(5);
const OPEN_RETRY_BACKOFF: Duration = Duration::from_millis(500);
/// How long a disconnected-but-not-closed tuner is left running so a
/// follow-up channel change can reuse it.
pub const KEEPALIVE_AFTER_DISCONNECT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy)]
pub struct ChannelRef {
    pub network_id: u16,
    pub transport_stream_id: u16,
    pub service_id: u16,
}

/// A caller-opaque handle onto a live broadcast stream.
pub struct TunerSession {
    pub nwtv_id: u32,
    pub edcb_process_id: u32,
    registry: Arc<TunerRegistry>,
    registry_index: usize,
    locked: AtomicBool,
    delegated: Arc<AtomicBool>,
}

impl TunerSession {
    /// Runs the open/connect sequence of steps 1–3.
    pub async fn open(
        registry: Arc<TunerRegistry>,
        backend: &dyn TunerBackend,
        channel: ChannelRef,
    ) -> Result<(TunerSession, Box<dyn TsSocket>)> {
        let nwtv_id = registry.allocate_nwtv_id();

        let info = SetChInfo {
            network_id: channel.network_id,
            transport_stream_id: channel.transport_stream_id,
            service_id: channel.service_id,
            nwtv_id,
            use_sid: true,
            use_bon_ch: false,
        };

        let deadline = tokio::time::Instant::now() + OPEN_RETRY_BUDGET;
        let process_id = loop {
            match backend.set_ch(&info).await {
                Ok(pid) => break pid,
                Err(e) if tokio::time::Instant::now() < deadline => {
                    tracing::debug!(error = %e, "NwTVIDSetCh failed, retrying");
                    tokio::time::sleep(OPEN_RETRY_BACKOFF).await;
                }
                Err(e) => return Err(CoreError::TunerUnavailable(e.to_string())),
            }
        };

        let socket = backend
            .relay_view_stream(process_id)
            .await
            .map_err(|e| CoreError::TunerUnavailable(format!("RelayViewStream failed: {e}")))?;

        let (registry_index, delegated) = registry.insert(nwtv_id);

        Ok((
            TunerSession {
                nwtv_id,
                edcb_process_id: process_id,
                registry,
                registry_index,
                locked: AtomicBool::new(false),
                delegated,
            },
            socket,
        ))
    }

    pub fn is_delegated(&self) -> bool {
        self.delegated.load(Ordering::Acquire)
    }

    /// Step 4: lock while the live stream is Standby/ONAir.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::Release);
        self.registry.set_locked(self.registry_index, true);
    }

    /// Step 5: unlock while Idling so another stream starting soon may
    /// reuse this tuner.
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
        self.registry.set_locked(self.registry_index, false);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Step 7: a delegated session MUST NOT call `Close`/`SetCh` — the
    /// caller that harvested its `nwtv_id` now owns the tuner.
    pub async fn close(&self, backend: &dyn TunerBackend) -> Result<()> {
        if self.is_delegated() {
            return Err(CoreError::TunerUnavailable(
                "attempted Close on a delegated tuner session".into(),
            ));
        }
        backend
            .close(self.nwtv_id)
            .await
            .map_err(|e| CoreError::TunerUnavailable(e.to_string()))?;
        self.registry.tombstone(self.registry_index);
        Ok(())
    }

    /// Marks this session delegated: its `nwtv_id` has been harvested by a
    /// newer session. Idempotent. In production this happens automatically
    /// (the registry flips the shared flag from `allocate_nwtv_id`); kept
    /// for tests that want to force the delegated path directly.
    #[cfg(test)]
    pub(crate) fn mark_delegated(&self) {
        self.delegated.store(true, Ordering::Release);
    }

    /// Step 6: drop the TS socket but leave the tuner running for
    /// `KEEPALIVE_AFTER_DISCONNECT` so a follow-up `Connect` can reuse it
    /// without a full retune. Callers drop the socket themselves; this
    /// just holds the caller until the keepalive window has elapsed.
    pub async fn disconnect(&self) {
        tokio::time::sleep(KEEPALIVE_AFTER_DISCONNECT).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::io::duplex;

    struct FakeBackend {
        fail_first_n: AtomicU32,
    }

    #[async_trait::async_trait]
    impl TunerBackend for FakeBackend {
        async fn set_ch(&self, _info: &SetChInfo) -> crate::error::RpcResult<u32> {
            if self.fail_first_n.load(Ordering::SeqCst) > 0 {
                self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
                return Err(crate::error::RpcError::Status(0));
            }
            Ok(4242)
        }

        async fn close(&self, _nwtv_id: u32) -> crate::error::RpcResult<()> {
            Ok(())
        }

        async fn relay_view_stream(
            &self,
            _process_id: u32,
        ) -> crate::error::RpcResult<Box<dyn TsSocket>> {
            let (a, _b) = duplex(1024);
            Ok(Box::new(a))
        }
    }

    #[tokio::test]
    async fn open_retries_transient_set_ch_failures() {
        let backend = FakeBackend { fail_first_n: AtomicU32::new(2) };
        let registry = Arc::new(TunerRegistry::new());
        let channel = ChannelRef { network_id: 1, transport_stream_id: 1, service_id: 1 };
        let (session, _socket) = TunerSession::open(registry, &backend, channel)
            .await
            .unwrap();
        assert_eq!(session.edcb_process_id, 4242);
        assert!(!session.is_locked());
    }

    #[tokio::test]
    async fn delegated_session_cannot_close() {
        let backend = FakeBackend { fail_first_n: AtomicU32::new(0) };
        let registry = Arc::new(TunerRegistry::new());
        let channel = ChannelRef { network_id: 1, transport_stream_id: 1, service_id: 1 };
        let (session, _socket) = TunerSession::open(registry, &backend, channel)
            .await
            .unwrap();
        session.mark_delegated();
        assert!(session.close(&backend).await.is_err());
    }

    #[tokio::test]
    async fn lock_unlock_round_trip() {
        let backend = FakeBackend { fail_first_n: AtomicU32::new(0) };
        let registry = Arc::new(TunerRegistry::new());
        let channel = ChannelRef { network_id: 1, transport_stream_id: 1, service_id: 1 };
        let (session, _socket) = TunerSession::open(registry, &backend, channel)
            .await
            .unwrap();
        session.lock();
        assert!(session.is_locked());
        session.unlock();
        assert!(!session.is_locked());
    }
}
