//! Starts the tuner + encoder + segmenter pipeline behind a
//! `(channel, quality)` `LiveStream` identity on its first request,
//! idempotently — the piece that sits above
//! `telecast_core::live`/`telecast_core::tuner`, since those crates
//! leave pipeline wiring to the caller by design.

use std::sync::Arc;

use telecast_core::hls::Playlist;
use telecast_core::live::{
    profile_for_quality, run_live_encoder, ClientKind, LiveEncoderSpec, LiveStream, LiveStreamStatus,
};
use telecast_core::model::Channel;
use telecast_core::tuner::{ChannelRef, TunerSession};

use crate::config_file::resolve_encoder_backend;
use crate::error::{Result, ServerError};
use crate::live::segmenter_task;
use crate::state::{AppState, LiveSegmenterState};

/// `LiveStream`/`DashMap` key for one channel+quality combination.
pub fn live_identity(channel: &Channel, quality: &str) -> String {
    format!("{}-{}", channel.display_channel_id(), quality)
}

pub async fn ensure_live_stream_started(
    state: &Arc<AppState>,
    channel: &Channel,
    quality: &str,
) -> Result<Arc<LiveStream>> {
    let identity = live_identity(channel, quality);
    let stream = state.live_registry.get_or_create(&identity);

    if !matches!(stream.status().0, LiveStreamStatus::Offline) {
        return Ok(stream);
    }

    let profile = profile_for_quality(quality)
        .ok_or_else(|| ServerError::BadRequest(format!("unknown quality preset: {quality}")))?;

    let segmenter_state = Arc::new(LiveSegmenterState {
        playlist: Arc::new(Playlist::new(4)),
        init_segment: parking_lot::RwLock::new(None),
    });
    state.live_segmenters.insert(identity.clone(), segmenter_state.clone());

    let service_id = channel.id.service_id;
    let app_state = state.clone();
    let channel = channel.clone();
    let quality = quality.to_string();
    let stream_for_pipeline = stream.clone();
    let segmenter_for_pipeline = segmenter_state.clone();

    let (_client_id, rx) = stream.connect(ClientKind::Mpegts, None, move || {
        tokio::spawn(run_pipeline(app_state, stream_for_pipeline, channel, quality, profile));
    });

    tokio::spawn(segmenter_task::run_segmenter_loop(
        rx,
        segmenter_for_pipeline,
        service_id,
        profile.is_hevc,
        profile.width,
        profile.height,
    ));

    Ok(stream)
}

/// Owns one tuner session and encoder run end-to-end: opens the tuner,
/// drives `run_live_encoder` until it exits, then tears the session
/// down and marks the stream `Offline`.
async fn run_pipeline(
    state: Arc<AppState>,
    stream: Arc<LiveStream>,
    channel: Channel,
    quality: String,
    profile: telecast_core::live::EncoderProfile,
) {
    let channel_ref = ChannelRef {
        network_id: channel.id.network_id,
        transport_stream_id: channel.transport_stream_id.unwrap_or(0),
        service_id: channel.id.service_id,
    };

    let (session, tuner_socket) = match TunerSession::open(state.tuner_registry.clone(), state.backend.as_ref(), channel_ref).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::warn!(channel = %channel.display_channel_id(), quality, error = %err, "tuner open failed");
            stream.set_status(LiveStreamStatus::Offline, format!("チューナー起動失敗: {err}"));
            return;
        }
    };
    let session = Arc::new(session);
    // Step 4: lock immediately — the stream enters Standby right away and
    // the tuner must not be harvested while we're still setting up.
    session.lock();

    let watcher = tokio::spawn(lock_watcher(session.clone(), stream.clone()));

    let encoder_backend = resolve_encoder_backend(&state.config.encoder.encoder_backend);

    let epg_state = state.clone();
    let epg_channel_id = channel.id;
    let spec = LiveEncoderSpec {
        service_id: Some(channel.id.service_id as i32),
        tsreadex_path: state.config.encoder.tsreadex_path.clone(),
        encoder_backend,
        encoder_path: state.config.encoder.encoder_path.clone(),
        profile,
        is_radio: channel.is_radiochannel,
        current_program_title: Arc::new(move || epg_state.epg.current_program(&epg_channel_id).map(|p| p.title)),
    };

    let result = run_live_encoder(stream.clone(), spec, tuner_socket).await;
    if let Err(err) = result {
        tracing::warn!(channel = %channel.display_channel_id(), quality, error = %err, "live encoder exited");
    }

    watcher.abort();
    // Step 6: drop the TS socket (already gone, `run_live_encoder` owned
    // it) but hold the tuner alive a little longer in case a client
    // reconnects to the same channel momentarily.
    session.disconnect().await;

    if session.is_delegated() {
        tracing::debug!(channel = %channel.display_channel_id(), "tuner session delegated, skipping close");
    } else if let Err(err) = session.close(state.backend.as_ref()).await {
        tracing::warn!(channel = %channel.display_channel_id(), error = %err, "tuner close failed");
    }
    stream.set_status(LiveStreamStatus::Offline, "エンコーダーが終了しました");
}

/// Mirrors the live stream's Standby/OnAir/Idling status onto the tuner
/// session's lock state (spec steps 4-5) so a delegated harvest is only
/// ever valid while this pipeline is genuinely idle between clients.
async fn lock_watcher(session: Arc<TunerSession>, stream: Arc<LiveStream>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(200));
    loop {
        interval.tick().await;
        match stream.status().0 {
            LiveStreamStatus::Standby | LiveStreamStatus::OnAir => {
                if !session.is_locked() {
                    session.lock();
                }
            }
            LiveStreamStatus::Idling => {
                if session.is_locked() {
                    session.unlock();
                }
            }
            LiveStreamStatus::Offline | LiveStreamStatus::Restart => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecast_core::model::channel::{ChannelId, ChannelType};

    fn sample_channel() -> Channel {
        Channel {
            id: ChannelId { network_id: 1, service_id: 101 },
            transport_stream_id: Some(1),
            remocon_id: 1,
            channel_number: "1".into(),
            channel_type: ChannelType::Gr,
            name: "test".into(),
            is_subchannel: false,
            is_radiochannel: false,
            is_watchable: true,
        }
    }

    #[test]
    fn identity_combines_channel_and_quality() {
        let channel = sample_channel();
        assert_eq!(live_identity(&channel, "1080p"), format!("{}-1080p", channel.display_channel_id()));
    }
}
