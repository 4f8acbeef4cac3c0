//! Request handlers, grouped by the surface they serve.

pub mod live;
pub mod misc;
pub mod recorded;
pub mod response;

use std::sync::Arc;

use telecast_core::model::Channel;

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Resolves a `{channel}` path segment (`gr011`, `bs101`, ...) against the
/// current EPG snapshot.
pub(crate) fn resolve_channel(state: &Arc<AppState>, display_id: &str) -> Result<Channel> {
    state
        .epg
        .channel_by_display_id(display_id)
        .ok_or_else(|| ServerError::NotFound(format!("unknown channel: {display_id}")))
}
