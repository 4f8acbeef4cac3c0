//! Live-channel streaming surface: starts/owns the tuner + encoder +
//! segmenter pipeline behind a channel/quality identity and serves the
//! resulting LL-HLS playlist, init segment, and fragments.

pub mod segmenter_task;
mod orchestrator;

pub use orchestrator::{ensure_live_stream_started, live_identity};
