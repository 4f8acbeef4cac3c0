//! Adapts `telecast_core::backend::BackendClient` (a plain RPC call
//! surface) to the `TunerBackend` trait `TunerSession::open` drives
//! against — the seam the core crate leaves for a caller-supplied
//! transport (`telecast_core::tuner::session` docs this explicitly).

use std::future::Future;
use std::time::Duration;
use telecast_core::backend::{BackendClient, SetChInfo};
use telecast_core::error::RpcResult;
use telecast_core::tuner::{TsSocket, TunerBackend};
use tokio::net::TcpStream;

pub struct RpcBackendAdapter<F> {
    client: BackendClient<F>,
}

impl<F, Fut> RpcBackendAdapter<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = std::io::Result<TcpStream>> + Send,
{
    pub fn new(connect: F, timeout: Duration) -> Self {
        Self { client: BackendClient::new(connect).with_timeout(timeout) }
    }

    pub fn client(&self) -> &BackendClient<F> {
        &self.client
    }
}

#[async_trait::async_trait]
impl<F, Fut> TunerBackend for RpcBackendAdapter<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = std::io::Result<TcpStream>> + Send,
{
    async fn set_ch(&self, info: &SetChInfo) -> RpcResult<u32> {
        self.client.nwtv_id_set_ch(info).await
    }

    async fn close(&self, nwtv_id: u32) -> RpcResult<()> {
        self.client.nwtv_id_close(nwtv_id).await
    }

    async fn relay_view_stream(&self, process_id: u32) -> RpcResult<Box<dyn TsSocket>> {
        let socket = self.client.relay_view_stream(process_id).await?;
        Ok(Box::new(socket))
    }
}

/// Builds a `BackendClient` connect closure that dials `addr` fresh on
/// every call.
pub fn tcp_connector(addr: String) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = std::io::Result<TcpStream>> + Send>> + Send + Sync {
    move || {
        let addr = addr.clone();
        Box::pin(async move { TcpStream::connect(addr).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecast_core::tuner::{ChannelRef, TunerRegistry, TunerSession};
    use std::sync::Arc;

    #[tokio::test]
    #[ignore = "requires a reachable backend daemon"]
    async fn open_session_against_real_backend() {
        let adapter = RpcBackendAdapter::new(tcp_connector("127.0.0.1:4510".to_string()), Duration::from_secs(5));
        let registry = Arc::new(TunerRegistry::new());
        let channel = ChannelRef { network_id: 1, transport_stream_id: 1, service_id: 1 };
        let _ = TunerSession::open(registry, &adapter, channel).await;
    }
}
