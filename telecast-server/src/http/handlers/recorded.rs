//! Recorded-video playback endpoints: session creation, a plain VOD HLS
//! playlist built from the session's segment plan, and segment bytes
//! served as raw MPEG-TS (the remuxer never builds fMP4 for recordings).

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{Json, Response};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::recorded;
use crate::state::AppState;

use super::response::{mpegts_response, playlist_response};

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<Uuid>,
) -> Result<Json<CreateSessionResponse>> {
    let video = state
        .recorded_videos
        .get(&video_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| ServerError::NotFound(format!("unknown recording: {video_id}")))?;

    let session_id = recorded::create_session(&state, &video).await?;
    Ok(Json(CreateSessionResponse { session_id }))
}

pub async fn playlist(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session = recorded::session(&state, session_id)?;

    let mut body = String::new();
    let _ = writeln!(body, "#EXTM3U");
    let _ = writeln!(body, "#EXT-X-VERSION:3");
    let target = session.plan().iter().fold(0u32, |acc, p| acc.max(p.duration_seconds.ceil() as u32));
    let _ = writeln!(body, "#EXT-X-TARGETDURATION:{}", target.max(1));
    let _ = writeln!(body, "#EXT-X-MEDIA-SEQUENCE:0");
    let _ = writeln!(body, "#EXT-X-PLAYLIST-TYPE:VOD");
    for (index, plan) in session.plan().iter().enumerate() {
        let _ = writeln!(body, "#EXTINF:{:.3},", plan.duration_seconds);
        let _ = writeln!(body, "segment/{index}.ts");
    }
    let _ = writeln!(body, "#EXT-X-ENDLIST");

    state.metrics.record_request("recorded_playlist");
    state.metrics.record_playlist_request();
    Ok(playlist_response(body))
}

pub async fn segment(
    State(state): State<Arc<AppState>>,
    Path((session_id, index)): Path<(Uuid, usize)>,
) -> Result<Response> {
    let session = recorded::session(&state, session_id)?;
    if index >= session.segment_count() {
        return Err(ServerError::NotFound(format!("segment {index} not found")));
    }

    recorded::request_segment(&state, session_id, index)?;

    let bytes = session
        .segment_bytes(index)
        .await
        .ok_or_else(|| ServerError::Internal("session cancelled while waiting for segment".into()))?;

    state.metrics.record_request("recorded_segment");
    state.metrics.record_segment_served();
    state.metrics.record_bytes(bytes.len() as u64);
    Ok(mpegts_response(bytes))
}

pub async fn end_session(State(state): State<Arc<AppState>>, Path(session_id): Path<Uuid>) -> Result<()> {
    recorded::end_session(&state, session_id);
    Ok(())
}
