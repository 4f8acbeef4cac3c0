//! Framed request/response roundtrip over a single connection per call.
//!
//! Framing: little-endian `u32 cmd_or_status`, `u32 payload_len`, then
//! `payload_len` bytes. "v2" commands prefix their payload with a `u16`
//! protocol version (currently 5). A response status of `1` means success.

use crate::error::{RpcError, RpcResult};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const PROTOCOL_VERSION: u16 = 5;
pub const STATUS_SUCCESS: u32 = 1;

/// Default connect-and-roundtrip timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// A byte-duplex connection to the backend daemon: a TCP stream, or
/// locally a named pipe / UNIX domain socket. Abstracted behind a trait so
/// the framing and codec layers above don't care which.
#[async_trait::async_trait]
pub trait RpcTransport: Send {
    async fn read_exact_bytes(&mut self, n: usize) -> std::io::Result<Vec<u8>>;
    async fn write_all_bytes(&mut self, buf: &[u8]) -> std::io::Result<()>;
}

#[async_trait::async_trait]
impl RpcTransport for tokio::net::TcpStream {
    async fn read_exact_bytes(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn write_all_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_all(buf).await
    }
}

#[cfg(unix)]
#[async_trait::async_trait]
impl RpcTransport for tokio::net::UnixStream {
    async fn read_exact_bytes(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn write_all_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_all(buf).await
    }
}

/// Sends one `cmd` + `payload`, reads back one framed response, and
/// returns `(status_or_cmd, payload)`. Honors `timeout` end to end.
pub async fn roundtrip(
    transport: &mut dyn RpcTransport,
    cmd: u32,
    payload: &[u8],
    timeout: Duration,
) -> RpcResult<(u32, Vec<u8>)> {
    tokio::time::timeout(timeout, async {
        let mut header = Vec::with_capacity(8);
        header.extend_from_slice(&cmd.to_le_bytes());
        header.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        transport.write_all_bytes(&header).await?;
        transport.write_all_bytes(payload).await?;

        let resp_header = transport.read_exact_bytes(8).await?;
        let status = u32::from_le_bytes(resp_header[0..4].try_into().unwrap());
        let declared_len = u32::from_le_bytes(resp_header[4..8].try_into().unwrap());
        let body = transport.read_exact_bytes(declared_len as usize).await?;

        if body.len() != declared_len as usize {
            return Err(RpcError::Truncated {
                expected: declared_len,
                available: body.len() as u32,
            });
        }

        Ok((status, body))
    })
    .await
    .map_err(|_| RpcError::Timeout(timeout))?
}

/// Wraps a "v2" payload with its leading `u16` protocol version field.
pub fn v2_envelope(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Strips and validates the leading protocol version of a v2 response.
pub fn check_v2_version(body: &[u8]) -> RpcResult<&[u8]> {
    if body.len() < 2 {
        return Err(RpcError::Truncated {
            expected: 2,
            available: body.len() as u32,
        });
    }
    let actual = u16::from_le_bytes([body[0], body[1]]);
    if actual != PROTOCOL_VERSION {
        return Err(RpcError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual,
        });
    }
    Ok(&body[2..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// An in-memory transport pair for unit-testing the framing without a
    /// real socket.
    struct MockTransport {
        inbound: std::collections::VecDeque<u8>,
        outbound: Arc<Mutex<Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl RpcTransport for MockTransport {
        async fn read_exact_bytes(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
            if self.inbound.len() < n {
                return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short"));
            }
            Ok((0..n).map(|_| self.inbound.pop_front().unwrap()).collect())
        }

        async fn write_all_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
            self.outbound.lock().unwrap().extend_from_slice(buf);
            Ok(())
        }
    }

    #[tokio::test]
    async fn roundtrip_reads_declared_size_exactly() {
        let mut response = Vec::new();
        response.extend_from_slice(&STATUS_SUCCESS.to_le_bytes());
        response.extend_from_slice(&3u32.to_le_bytes());
        response.extend_from_slice(&[9, 8, 7]);

        let mut transport = MockTransport {
            inbound: response.into_iter().collect(),
            outbound: Arc::new(Mutex::new(Vec::new())),
        };

        let (status, body) = roundtrip(&mut transport, 42, b"hi", DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(status, STATUS_SUCCESS);
        assert_eq!(body, vec![9, 8, 7]);
    }

    #[test]
    fn v2_envelope_roundtrip() {
        let wrapped = v2_envelope(b"payload");
        let stripped = check_v2_version(&wrapped).unwrap();
        assert_eq!(stripped, b"payload");
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut buf = vec![];
        buf.extend_from_slice(&999u16.to_le_bytes());
        assert!(check_v2_version(&buf).is_err());
    }
}
