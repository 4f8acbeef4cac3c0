//! Starts a recorded-video playback session: plans segments from the
//! stored keyframe index and drives `run_recorded_encoder` against them
//! — the caller-side wiring `telecast_core::recorded` leaves open by
//! design.

use std::sync::Arc;

use telecast_core::model::RecordedVideo;
use telecast_core::recorded::{
    plan_segments, run_recorded_encoder, RecordedEncoderSpec, RecordedSession,
    TARGET_SEGMENT_DURATION_SECONDS,
};
use uuid::Uuid;

use crate::config_file::resolve_encoder_backend;
use crate::error::{Result, ServerError};
use crate::state::{AppState, RecordedPlayback};

/// Default quality preset for recorded playback; a future revision may
/// let callers request others the way live streaming does.
const DEFAULT_RECORDED_QUALITY: &str = "1080p";

pub async fn create_session(state: &Arc<AppState>, video: &RecordedVideo) -> Result<Uuid> {
    let plans = plan_segments(&video.key_frames, video.duration_seconds, TARGET_SEGMENT_DURATION_SECONDS);
    if plans.is_empty() {
        return Err(ServerError::BadRequest("recording has no usable key frames".into()));
    }

    let session = RecordedSession::new(plans);
    let session_id = Uuid::new_v4();

    let encoder_backend = resolve_encoder_backend(&state.config.encoder.encoder_backend);
    let profile = telecast_core::live::profile_for_quality(DEFAULT_RECORDED_QUALITY)
        .expect("default recorded quality preset always exists");

    let spec = RecordedEncoderSpec {
        file_path: video.file_path.clone(),
        service_id: None,
        tsreadex_path: state.config.encoder.tsreadex_path.clone(),
        encoder_backend,
        encoder_path: state.config.encoder.encoder_path.clone(),
        profile,
        scan_type: video.video.scan_type,
    };

    state.recorded_sessions.insert(
        session_id,
        Arc::new(RecordedPlayback { session: session.clone(), spec: spec.clone() }),
    );
    state.refresh_gauges();

    spawn_encoder_run(session, spec, 0);
    Ok(session_id)
}

fn spawn_encoder_run(session: Arc<RecordedSession>, spec: RecordedEncoderSpec, start_index: usize) {
    tokio::spawn(async move {
        if let Err(err) = run_recorded_encoder(session, spec, start_index).await {
            tracing::warn!(error = %err, "recorded encoder exited");
        }
    });
}

pub fn playback(state: &Arc<AppState>, session_id: Uuid) -> Result<Arc<RecordedPlayback>> {
    state
        .recorded_sessions
        .get(&session_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| ServerError::NotFound(format!("no recorded session {session_id}")))
}

pub fn session(state: &Arc<AppState>, session_id: Uuid) -> Result<Arc<RecordedSession>> {
    playback(state, session_id).map(|p| p.session.clone())
}

/// Notifies the session that `index` was just requested; if the
/// in-flight encoder has fallen too far behind (or is running ahead of
/// a rewind), spawns a fresh encoder-driver run at `index` with the same
/// spec the session was opened with.
pub fn request_segment(state: &Arc<AppState>, session_id: Uuid, index: usize) -> Result<()> {
    let playback = playback(state, session_id)?;
    if let Some(restart_index) = playback.session.request_segment(index) {
        spawn_encoder_run(playback.session.clone(), playback.spec.clone(), restart_index);
    }
    Ok(())
}

/// Tears a session down: cancels the in-flight encoder and drops it
/// from the registry so its generation counter stops mattering.
pub fn end_session(state: &Arc<AppState>, session_id: Uuid) {
    if let Some((_, playback)) = state.recorded_sessions.remove(&session_id) {
        playback.session.cancel();
    }
    state.refresh_gauges();
}
