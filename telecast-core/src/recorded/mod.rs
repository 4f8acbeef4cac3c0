//! Recorded-video playback: segment planning, the per-session future
//! registry clients await segments from, the on-the-fly remuxer, and the
//! encoder-driver task that ties them together.

mod command;
mod encoder_task;
mod plan;
mod remux;
mod session;

pub use command::recorded_encoder_args;
pub use encoder_task::{run_recorded_encoder, RecordedEncoderSpec};
pub use plan::{plan_segments, SegmentPlan, TARGET_SEGMENT_DURATION_SECONDS};
pub use remux::{RemuxBatch, Remuxer};
pub use session::{RecordedSession, LOOK_AHEAD_SEGMENTS};
