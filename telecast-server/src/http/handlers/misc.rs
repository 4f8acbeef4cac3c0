//! Health check, channel listing, and EPG lookup endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Json;
use telecast_core::model::{Channel, Program};

use crate::error::Result;
use crate::state::AppState;

use super::resolve_channel;

pub async fn healthz() -> &'static str {
    "OK"
}

pub async fn list_channels(State(state): State<Arc<AppState>>) -> Json<Vec<Channel>> {
    Json(state.epg.channels())
}

pub async fn channel_programs(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Result<Json<Vec<Program>>> {
    let channel = resolve_channel(&state, &channel)?;
    Ok(Json(state.epg.programs_for(&channel.id)))
}

pub async fn channel_current_program(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Result<Json<Option<Program>>> {
    let channel = resolve_channel(&state, &channel)?;
    Ok(Json(state.epg.current_program(&channel.id)))
}
