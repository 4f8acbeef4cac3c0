//! Shared response builders: every media response is `no-store` since
//! segments/parts are never meant to be cached by an intermediary, and
//! HLS playlists must always be refetched.

use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

pub fn playlist_response(body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
        .into_response()
}

pub fn fmp4_response(body: Bytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, "video/mp4"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
        .into_response()
}

pub fn mpegts_response(body: Bytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, "video/mp2t"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
        .into_response()
}
