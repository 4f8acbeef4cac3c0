//! `LiveStream`: the per-`(channel, quality)` identity singleton that
//! tracks status and fans out encoder output to connected clients.

use bytes::Bytes;
use parking_lot::Mutex;
use std::time::Instant;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStreamStatus {
    Offline,
    Standby,
    OnAir,
    Idling,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Mpegts,
    LlHls,
}

/// Bound on a client's outgoing chunk queue; a slow client backs up here
/// rather than unboundedly, matching's FIFO-per-client model.
const CLIENT_QUEUE_DEPTH: usize = 512;

struct LiveStreamClient {
    kind: ClientKind,
    sender: mpsc::Sender<Bytes>,
}

struct StatusState {
    status: LiveStreamStatus,
    detail: String,
    updated_at: Instant,
}

/// A live stream's caller-visible state: status/detail, the client
/// fan-out list (tombstoned slots,), and a handle a caller can
/// use to feed freshly-received TS chunks in.
pub struct LiveStream {
    pub identity: String,
    status: Mutex<StatusState>,
    clients: Mutex<Vec<Option<LiveStreamClient>>>,
}

impl LiveStream {
    pub fn new(identity: String) -> Self {
        Self {
            identity,
            status: Mutex::new(StatusState {
                status: LiveStreamStatus::Offline,
                detail: String::new(),
                updated_at: Instant::now(),
            }),
            clients: Mutex::new(Vec::new()),
        }
    }

    pub fn status(&self) -> (LiveStreamStatus, String) {
        let s = self.status.lock();
        (s.status, s.detail.clone())
    }

    /// Idempotent on equal `(status, detail)` pairs. On a
    /// transition into `Offline`/`Restart`, every client is disconnected
    /// and the caller is expected to tear down the PSI archiver.
    pub fn set_status(&self, status: LiveStreamStatus, detail: impl Into<String>) {
        let detail = detail.into();
        {
            let mut s = self.status.lock();
            if s.status == status && s.detail == detail {
                return;
            }
            s.status = status;
            s.detail = detail;
            s.updated_at = Instant::now();
        }
        if matches!(status, LiveStreamStatus::Offline | LiveStreamStatus::Restart) {
            self.disconnect_all();
        }
    }

    /// Step into this stream. `idle_victim`, if
    /// given, is an existing `Idling` stream reclaimed so its tuner can be
    /// reused; `spawn_encoder` starts component F and is only invoked on
    /// the `Offline -> Standby` transition.
    pub fn connect(
        &self,
        kind: ClientKind,
        idle_victim: Option<&LiveStream>,
        spawn_encoder: impl FnOnce(),
    ) -> (usize, mpsc::Receiver<Bytes>) {
        let should_spawn = {
            let mut s = self.status.lock();
            match s.status {
                LiveStreamStatus::Offline => {
                    s.status = LiveStreamStatus::Standby;
                    s.detail = "チューナーを起動しています".to_string();
                    s.updated_at = Instant::now();
                    true
                }
                LiveStreamStatus::Idling => {
                    s.status = LiveStreamStatus::OnAir;
                    s.updated_at = Instant::now();
                    false
                }
                _ => false,
            }
        };
        if should_spawn {
            if let Some(victim) = idle_victim {
                victim.set_status(LiveStreamStatus::Offline, "別のチャンネルにチューナーを譲りました");
            }
            spawn_encoder();
        }
        self.push_client(kind)
    }

    fn push_client(&self, kind: ClientKind) -> (usize, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        let mut clients = self.clients.lock();
        if let Some(idx) = clients.iter().position(|c| c.is_none()) {
            clients[idx] = Some(LiveStreamClient { kind, sender: tx });
            (idx, rx)
        } else {
            clients.push(Some(LiveStreamClient { kind, sender: tx }));
            (clients.len() - 1, rx)
        }
    }

    /// Tombstones a client slot; the slot is
    /// never compacted, so other clients' ids stay valid.
    pub fn disconnect(&self, client_id: usize) {
        let mut clients = self.clients.lock();
        if let Some(slot) = clients.get_mut(client_id) {
            *slot = None;
        }
    }

    fn disconnect_all(&self) {
        let mut clients = self.clients.lock();
        for slot in clients.iter_mut() {
            *slot = None;
        }
    }

    /// `clients_count == count(clients where slot != nil)`.
    pub fn client_count(&self) -> usize {
        self.clients.lock().iter().filter(|c| c.is_some()).count()
    }

    /// Fans a chunk out to every live `Mpegts` client. A client whose queue is full is dropped from
    /// future writes rather than blocking the whole fan-out.
    pub fn write_stream_data(&self, chunk: Bytes) {
        let mut clients = self.clients.lock();
        for slot in clients.iter_mut() {
            let drop_slot = if let Some(client) = slot {
                if client.kind != ClientKind::Mpegts {
                    false
                } else {
                    client.sender.try_send(chunk.clone()).is_err()
                }
            } else {
                false
            };
            if drop_slot {
                *slot = None;
            }
        }
    }
}
