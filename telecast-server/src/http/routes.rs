//! Axum router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::limits::{connection_limit_middleware, rate_limit_middleware};
use crate::metrics::metrics_handler;
use crate::state::AppState;

use super::handlers::{live, misc, recorded};

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers([header::ACCEPT, header::RANGE, header::CONTENT_TYPE, header::ORIGIN])
        .allow_private_network(true)
        .max_age(Duration::from_secs(3600));

    let mut router = Router::new()
        .route("/health", get(misc::healthz))
        .route("/metrics", get(metrics_handler))
        .route("/channels", get(misc::list_channels))
        .route("/channels/{channel}/programs", get(misc::channel_programs))
        .route("/channels/{channel}/programs/current", get(misc::channel_current_program))
        .route("/live/{channel}/{quality}/playlist.m3u8", get(live::playlist))
        .route("/live/{channel}/{quality}/init.mp4", get(live::init_segment))
        .route("/live/{channel}/{quality}/segment/{sequence}.m4s", get(live::segment))
        .route("/live/{channel}/{quality}/segment/{sequence}.{index}.part.m4s", get(live::part))
        .route("/recorded/{video_id}/sessions", post(recorded::create_session))
        .route("/recorded/sessions/{session_id}/playlist.m3u8", get(recorded::playlist))
        .route("/recorded/sessions/{session_id}/segment/{index}.ts", get(recorded::segment))
        .route("/recorded/sessions/{session_id}", axum::routing::delete(recorded::end_session));

    router = router.layer(from_fn_with_state(state.connection_limiter.clone(), connection_limit_middleware));
    router = router.layer(from_fn_with_state(state.rate_limiter.clone(), rate_limit_middleware));

    if state.config.cors_enabled {
        router = router.layer(cors);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn router_builds() {
        let state = AppState::new(ServerConfig::default());
        let _router = create_router(state);
    }
}
