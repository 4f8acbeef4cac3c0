//! Live-channel LL-HLS endpoints: blocking-reload playlist, init
//! segment, full segments, and partial segments.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::error::{Result, ServerError};
use crate::live::{ensure_live_stream_started, live_identity};
use crate::state::AppState;

use super::resolve_channel;
use super::response::{fmp4_response, playlist_response};

#[derive(Debug, Deserialize)]
pub struct PlaylistQuery {
    #[serde(rename = "_HLS_msn")]
    pub hls_msn: Option<u64>,
    #[serde(rename = "_HLS_part")]
    pub hls_part: Option<u32>,
}

async fn segmenter_state(
    state: &Arc<AppState>,
    channel: &str,
    quality: &str,
) -> Result<Arc<crate::state::LiveSegmenterState>> {
    let channel = resolve_channel(state, channel)?;
    ensure_live_stream_started(state, &channel, quality).await?;
    let identity = live_identity(&channel, quality);
    state
        .live_segmenters
        .get(&identity)
        .map(|entry| entry.clone())
        .ok_or_else(|| ServerError::Internal("segmenter state missing after stream start".into()))
}

pub async fn playlist(
    State(state): State<Arc<AppState>>,
    Path((channel, quality)): Path<(String, String)>,
    Query(query): Query<PlaylistQuery>,
) -> Result<Response> {
    let segmenter = segmenter_state(&state, &channel, &quality).await?;

    if let (Some(msn), Some(part)) = (query.hls_msn, query.hls_part) {
        segmenter.playlist.await_part(msn, part).await;
    }

    state.metrics.record_request("live_playlist");
    state.metrics.record_playlist_request();
    Ok(playlist_response(segmenter.playlist.render("segment")))
}

pub async fn init_segment(
    State(state): State<Arc<AppState>>,
    Path((channel, quality)): Path<(String, String)>,
) -> Result<Response> {
    let segmenter = segmenter_state(&state, &channel, &quality).await?;
    let bytes = segmenter
        .init_segment
        .read()
        .clone()
        .ok_or_else(|| ServerError::NotFound("init segment not ready yet".into()))?;
    state.metrics.record_request("live_init");
    state.metrics.record_bytes(bytes.len() as u64);
    Ok(fmp4_response(bytes))
}

pub async fn segment(
    State(state): State<Arc<AppState>>,
    Path((channel, quality, sequence)): Path<(String, String, u64)>,
) -> Result<Response> {
    let segmenter = segmenter_state(&state, &channel, &quality).await?;
    let segment = segmenter
        .playlist
        .segment(sequence)
        .ok_or_else(|| ServerError::NotFound(format!("segment {sequence} not found")))?;
    let bytes = bytes::Bytes::from(segment.concatenated_bytes());
    state.metrics.record_request("live_segment");
    state.metrics.record_segment_served();
    state.metrics.record_bytes(bytes.len() as u64);
    Ok(fmp4_response(bytes))
}

pub async fn part(
    State(state): State<Arc<AppState>>,
    Path((channel, quality, sequence, index)): Path<(String, String, u64, u32)>,
) -> Result<Response> {
    let segmenter = segmenter_state(&state, &channel, &quality).await?;
    segmenter.playlist.await_part(sequence, index).await;
    let partial = segmenter
        .playlist
        .partial(sequence, index)
        .ok_or_else(|| ServerError::NotFound(format!("part {sequence}/{index} not found")))?;
    state.metrics.record_request("live_part");
    state.metrics.record_part_served();
    state.metrics.record_bytes(partial.data.len() as u64);
    Ok(fmp4_response(partial.data))
}
