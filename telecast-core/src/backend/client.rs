//! High-level backend RPC calls.

use super::codec::{ByteReader, ByteWriter};
use super::rpc::{self, RpcTransport, DEFAULT_TIMEOUT};
use super::systemtime::SystemTime;
use crate::error::{RpcError, RpcResult};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    EnumService = 1,
    EnumPgInfoEx = 2,
    NwTvIdSetCh = 3,
    NwTvIdClose = 4,
    RelayViewStream = 5,
    GetStatusNotify2 = 6,
    GetRecFilePath = 7,
}

#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub network_id: u16,
    pub transport_stream_id: u16,
    pub service_id: u16,
    pub service_name: String,
    pub network_name: String,
    pub remocon_id: u8,
}

fn read_service_info(r: &mut ByteReader<'_>) -> RpcResult<ServiceInfo> {
    r.read_sized(|r| {
        Ok(ServiceInfo {
            network_id: r.read_u16()?,
            transport_stream_id: r.read_u16()?,
            service_id: r.read_u16()?,
            service_name: r.read_string()?,
            network_name: r.read_string()?,
            remocon_id: r.read_u8()?,
        })
    })
}

#[derive(Debug, Clone)]
pub struct ServiceEventInfo {
    pub network_id: u16,
    pub service_id: u16,
    pub event_id: u16,
    pub start: SystemTime,
    /// `None` means the EIT carried no duration ("未定"); callers apply the
    /// 5-minute sentinel.
    pub duration_seconds: Option<u32>,
    pub title: String,
    pub description: String,
}

fn read_service_event_info(r: &mut ByteReader<'_>) -> RpcResult<ServiceEventInfo> {
    r.read_sized(|r| {
        let network_id = r.read_u16()?;
        let service_id = r.read_u16()?;
        let event_id = r.read_u16()?;
        let start = SystemTime::read_le(r)?;
        let duration_raw = r.read_u32()?;
        let duration_seconds = if duration_raw == u32::MAX {
            None
        } else {
            Some(duration_raw)
        };
        let title = r.read_string()?;
        let description = r.read_string()?;
        Ok(ServiceEventInfo {
            network_id,
            service_id,
            event_id,
            start,
            duration_seconds,
            title,
            description,
        })
    })
}

/// Parameters for `NwTVIDSetCh`: binds a NetworkTV tuner
/// process to a caller-chosen `nwtv_id`.
#[derive(Debug, Clone, Copy)]
pub struct SetChInfo {
    pub network_id: u16,
    pub transport_stream_id: u16,
    pub service_id: u16,
    pub nwtv_id: u32,
    pub use_sid: bool,
    pub use_bon_ch: bool,
}

const CH_OR_MODE_TCP: u32 = 2;

fn write_set_ch_info(w: &mut ByteWriter, info: &SetChInfo) {
    w.write_sized(|w| {
        w.write_u16(info.network_id);
        w.write_u16(info.transport_stream_id);
        w.write_u16(info.service_id);
        w.write_u32(info.nwtv_id);
        w.write_u32(CH_OR_MODE_TCP);
        w.write_u8(info.use_sid as u8);
        w.write_u8(info.use_bon_ch as u8);
    });
}

/// A thin client bound to one `RpcTransport` factory; every call opens a
/// fresh connection.
pub struct BackendClient<F> {
    connect: F,
    timeout: Duration,
}

impl<F, Fut, T> BackendClient<F>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = std::io::Result<T>>,
    T: RpcTransport + 'static,
{
    pub fn new(connect: F) -> Self {
        Self {
            connect,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call(&self, cmd: Command, payload: &[u8]) -> RpcResult<Vec<u8>> {
        let mut transport = self.connect().await.map_err(RpcError::Io)?;
        let (status, body) =
            rpc::roundtrip(&mut transport, cmd as u32, payload, self.timeout).await?;
        if status != rpc::STATUS_SUCCESS {
            return Err(RpcError::Status(status));
        }
        Ok(body)
    }

    pub async fn enum_service(&self) -> RpcResult<Vec<ServiceInfo>> {
        let body = self.call(Command::EnumService, &[]).await?;
        let mut r = ByteReader::new(&body);
        r.read_vec(read_service_info)
    }

    pub async fn enum_pg_info_ex(&self, service_keys: &[u64]) -> RpcResult<Vec<ServiceEventInfo>> {
        let mut w = ByteWriter::new();
        w.write_vec(service_keys, |w, k| w.write_u64(*k));
        let body = self.call(Command::EnumPgInfoEx, &w.buf).await?;
        let mut r = ByteReader::new(&body);
        r.read_vec(read_service_event_info)
    }

    /// Starts or retunes a NetworkTV tuner process bound to `info.nwtv_id`;
    /// returns its OS process id.
    pub async fn nwtv_id_set_ch(&self, info: &SetChInfo) -> RpcResult<u32> {
        let mut w = ByteWriter::new();
        write_set_ch_info(&mut w, info);
        let body = self.call(Command::NwTvIdSetCh, &w.buf).await?;
        let mut r = ByteReader::new(&body);
        r.read_u32()
    }

    pub async fn nwtv_id_close(&self, nwtv_id: u32) -> RpcResult<()> {
        let mut w = ByteWriter::new();
        w.write_u32(nwtv_id);
        self.call(Command::NwTvIdClose, &w.buf).await?;
        Ok(())
    }

    /// Opens a second TCP connection that, after a success reply, streams
    /// raw TS from the tuner process `process_id`. The
    /// returned transport is the raw-TS socket itself — callers keep
    /// reading from it directly rather than through `call`.
    pub async fn relay_view_stream(&self, process_id: u32) -> RpcResult<T> {
        let mut transport = self.connect().await.map_err(RpcError::Io)?;
        let mut payload = Vec::new();
        payload.extend_from_slice(&process_id.to_le_bytes());
        let (status, _body) = rpc::roundtrip(
            &mut transport,
            Command::RelayViewStream as u32,
            &payload,
            self.timeout,
        )
        .await?;
        if status != rpc::STATUS_SUCCESS {
            return Err(RpcError::Status(status));
        }
        Ok(transport)
    }

    /// Long-polls until the server-side notify counter exceeds
    /// `target_count`; returns `(notify_id, params, time, count)`. Callers
    /// must be able to cancel mid-call — wrap in
    /// `tokio::select!` against a cancellation token.
    pub async fn get_status_notify2(&self, target_count: u32) -> RpcResult<StatusNotify> {
        let mut w = ByteWriter::new();
        w.write_u32(target_count);
        // Long polls are allowed to sit far past the ordinary roundtrip
        // timeout; the caller's cancellation token is the real bound.
        let mut transport = self.connect().await.map_err(RpcError::Io)?;
        let (status, body) = rpc::roundtrip(
            &mut transport,
            Command::GetStatusNotify2 as u32,
            &w.buf,
            Duration::from_secs(3600),
        )
        .await?;
        if status != rpc::STATUS_SUCCESS {
            return Err(RpcError::Status(status));
        }
        let mut r = ByteReader::new(&body);
        r.read_sized(|r| {
            let notify_id = r.read_u32()?;
            let mut params = [0u32; 6];
            for p in &mut params {
                *p = r.read_u32()?;
            }
            let time = SystemTime::read_le(r)?;
            let count = r.read_u32()?;
            Ok(StatusNotify {
                notify_id,
                params,
                time,
                count,
            })
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatusNotify {
    pub notify_id: u32,
    pub params: [u32; 6],
    pub time: SystemTime,
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_info_roundtrip() {
        let info = ServiceInfo {
            network_id: 0x7fe1,
            transport_stream_id: 1,
            service_id: 1024,
            service_name: "Example".into(),
            network_name: "Example Network".into(),
            remocon_id: 1,
        };
        let mut w = ByteWriter::new();
        w.write_sized(|w| {
            w.write_u16(info.network_id);
            w.write_u16(info.transport_stream_id);
            w.write_u16(info.service_id);
            w.write_string(&info.service_name);
            w.write_string(&info.network_name);
            w.write_u8(info.remocon_id);
        });
        let mut r = ByteReader::new(&w.buf);
        let decoded = read_service_info(&mut r).unwrap();
        assert_eq!(decoded.network_id, info.network_id);
        assert_eq!(decoded.service_name, info.service_name);
    }

    #[test]
    fn undetermined_duration_decodes_to_none() {
        let mut w = ByteWriter::new();
        w.write_sized(|w| {
            w.write_u16(1);
            w.write_u16(1);
            w.write_u16(1);
            SystemTime {
                year: 2026,
                month: 1,
                day_of_week: 0,
                day: 1,
                hour: 0,
                minute: 0,
                second: 0,
                millisecond: 0,
            }
            .write_le(&mut w.buf);
            w.write_u32(u32::MAX);
            w.write_string("t");
            w.write_string("d");
        });
        let mut r = ByteReader::new(&w.buf);
        let decoded = read_service_event_info(&mut r).unwrap();
        assert_eq!(decoded.duration_seconds, None);
    }
}
