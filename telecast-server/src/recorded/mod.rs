//! Recorded-video playback session lifecycle.

mod orchestrator;

pub use orchestrator::{create_session, end_session, playback, request_segment, session};
