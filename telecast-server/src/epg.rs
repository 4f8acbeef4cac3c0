//! EPG cache and refresh loop. `telecast_core` defines the `Channel`/
//! `Program` data model but owns no store or refresh policy for it; this
//! module is the client of `BackendClient` that keeps one in memory, with
//! a periodic background sweep applied to EPG instead of segment data.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use telecast_core::backend::{BackendClient, ServiceEventInfo, ServiceInfo};
use telecast_core::model::channel::{Channel, ChannelId, ChannelType};
use telecast_core::model::program::{jst, Genre, Program, UNDETERMINED_DURATION_SECONDS};
use tokio::net::TcpStream;

/// EDCB-style combined service key: `(network_id << 16) | service_id`,
/// the format `EnumPgInfoEx` expects per service.
fn service_key(network_id: u16, service_id: u16) -> u64 {
    ((network_id as u64) << 16) | service_id as u64
}

/// In-memory EPG: one program list per channel, refreshed wholesale on
/// each poll rather than patched incrementally, since EDCB's
/// `EnumPgInfoEx` already returns a channel's full schedule.
pub struct EpgStore {
    channels: DashMap<ChannelId, Channel>,
    programs: DashMap<ChannelId, RwLock<Vec<Program>>>,
}

impl EpgStore {
    pub fn new() -> Self {
        Self { channels: DashMap::new(), programs: DashMap::new() }
    }

    pub fn replace_channels(&self, channels: Vec<Channel>) {
        self.channels.clear();
        for channel in channels {
            self.channels.insert(channel.id, channel);
        }
    }

    pub fn channel(&self, id: &ChannelId) -> Option<Channel> {
        self.channels.get(id).map(|c| c.clone())
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.channels.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Looks a channel up by its HTTP-facing display id (`gr011`, `bs101`,
    /// ...) rather than its `(network_id, service_id)` key.
    pub fn channel_by_display_id(&self, display_id: &str) -> Option<Channel> {
        self.channels.iter().map(|entry| entry.value().clone()).find(|c| c.display_channel_id() == display_id)
    }

    /// Replaces one channel's full program list, sorted by start time.
    pub fn replace_channel_programs(&self, channel_id: ChannelId, mut programs: Vec<Program>) {
        programs.sort_by_key(|p| p.start_time);
        self.programs
            .entry(channel_id)
            .or_insert_with(|| RwLock::new(Vec::new()))
            .write()
            .clone_from(&programs);
    }

    pub fn programs_for(&self, channel_id: &ChannelId) -> Vec<Program> {
        self.programs.get(channel_id).map(|p| p.read().clone()).unwrap_or_default()
    }

    pub fn current_program(&self, channel_id: &ChannelId) -> Option<Program> {
        let now = chrono::Utc::now().with_timezone(&jst());
        self.programs_for(channel_id)
            .into_iter()
            .find(|p| p.start_time <= now && now < p.end_time)
    }

    /// Drops programs whose scheduled end passed more than an hour ago
    /// (`Program::is_stale`), so a long-running process doesn't keep
    /// every broadcast a channel has ever aired.
    pub fn prune_stale(&self) {
        let now = chrono::Utc::now().with_timezone(&jst());
        for entry in self.programs.iter() {
            entry.value().write().retain(|p| !p.is_stale(now));
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for EpgStore {
    fn default() -> Self {
        Self::new()
    }
}

fn channel_from_service_info(info: &ServiceInfo) -> Channel {
    let channel_type = ChannelType::from_network_id(info.network_id);
    Channel {
        id: ChannelId { network_id: info.network_id, service_id: info.service_id },
        transport_stream_id: Some(info.transport_stream_id),
        remocon_id: info.remocon_id,
        channel_number: info.remocon_id.to_string(),
        channel_type,
        name: info.service_name.clone(),
        is_subchannel: info.service_id & 0x0f00 != 0,
        is_radiochannel: false,
        is_watchable: true,
    }
}

fn program_from_event(channel_id: ChannelId, event: &ServiceEventInfo) -> Option<Program> {
    let start_time = event.start.to_jst().ok()?;
    let duration_seconds = event
        .duration_seconds
        .map(|s| s as f64)
        .unwrap_or(UNDETERMINED_DURATION_SECONDS);
    let end_time = start_time + chrono::Duration::milliseconds((duration_seconds * 1000.0) as i64);
    Some(Program {
        network_id: event.network_id,
        service_id: event.service_id,
        event_id: event.event_id,
        channel_id,
        start_time,
        end_time,
        duration_seconds,
        title: event.title.clone(),
        description: event.description.clone(),
        detail: Vec::new(),
        genres: Vec::<Genre>::new(),
        video_codec: None,
        video_resolution: None,
        video_type: None,
        primary_audio: None,
        secondary_audio: None,
        is_free: true,
    })
}

type BoxedConnect =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = std::io::Result<TcpStream>> + Send>> + Send + Sync>;

/// Runs one `EnumService` + `EnumPgInfoEx` round and replaces the
/// store's contents. Errors are the caller's to log and retry; a
/// failed refresh leaves the previous EPG snapshot in place.
pub async fn refresh_once(
    store: &EpgStore,
    client: &BackendClient<BoxedConnect>,
) -> telecast_core::error::RpcResult<()> {
    let services = client.enum_service().await?;
    let channels: Vec<Channel> = services.iter().map(channel_from_service_info).collect();
    let keys: Vec<u64> = services
        .iter()
        .map(|s| service_key(s.network_id, s.service_id))
        .collect();
    let events = client.enum_pg_info_ex(&keys).await?;

    store.replace_channels(channels);

    let mut by_channel: std::collections::HashMap<ChannelId, Vec<Program>> = std::collections::HashMap::new();
    for event in &events {
        let channel_id = ChannelId { network_id: event.network_id, service_id: event.service_id };
        if let Some(program) = program_from_event(channel_id, event) {
            by_channel.entry(channel_id).or_default().push(program);
        }
    }
    for (channel_id, programs) in by_channel {
        store.replace_channel_programs(channel_id, programs);
    }
    Ok(())
}

/// Background task: refreshes the EPG every `interval`, pruning stale
/// programs after each successful refresh. Runs until the process
/// exits; refresh failures are logged and retried next tick rather
/// than aborting the loop.
pub async fn run_epg_refresh_loop(
    store: Arc<EpgStore>,
    client: Arc<BackendClient<BoxedConnect>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match refresh_once(&store, &client).await {
            Ok(()) => {
                store.prune_stale();
                tracing::debug!(channels = store.channel_count(), "epg refreshed");
            }
            Err(err) => {
                tracing::warn!(error = %err, "epg refresh failed, keeping previous snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecast_core::backend::systemtime::SystemTime as WireTime;

    fn channel_id() -> ChannelId {
        ChannelId { network_id: 1, service_id: 101 }
    }

    #[test]
    fn service_key_combines_network_and_service_id() {
        assert_eq!(service_key(1, 101), (1u64 << 16) | 101);
    }

    #[test]
    fn program_from_event_applies_undetermined_sentinel() {
        let event = ServiceEventInfo {
            network_id: 1,
            service_id: 101,
            event_id: 5,
            start: WireTime::from_jst(jst().with_ymd_and_hms(2026, 7, 28, 21, 0, 0).unwrap()),
            duration_seconds: None,
            title: "番組".into(),
            description: String::new(),
        };
        let program = program_from_event(channel_id(), &event).unwrap();
        assert_eq!(program.duration_seconds, UNDETERMINED_DURATION_SECONDS);
    }

    #[test]
    fn store_prunes_stale_programs_only() {
        let store = EpgStore::new();
        let now = chrono::Utc::now().with_timezone(&jst());
        let fresh = Program {
            network_id: 1,
            service_id: 101,
            event_id: 1,
            channel_id: channel_id(),
            start_time: now,
            end_time: now + chrono::Duration::hours(1),
            duration_seconds: 3600.0,
            title: "fresh".into(),
            description: String::new(),
            detail: Vec::new(),
            genres: Vec::new(),
            video_codec: None,
            video_resolution: None,
            video_type: None,
            primary_audio: None,
            secondary_audio: None,
            is_free: true,
        };
        let mut stale = fresh.clone();
        stale.event_id = 2;
        stale.end_time = now - chrono::Duration::hours(2);
        store.replace_channel_programs(channel_id(), vec![fresh, stale]);
        store.prune_stale();
        let remaining = store.programs_for(&channel_id());
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].event_id, 1);
    }
}
