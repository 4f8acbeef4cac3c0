//! Live streaming: per-channel `LiveStream` state machines, the process
//! registry that owns them, and the encoder task that feeds them.

mod command;
mod encoder_profile;
mod encoder_task;
mod log_classifier;
mod registry;
mod restart_budget;
mod stream;
mod supervisor;
mod writer_buffer;

pub use command::{encoder_args, encoder_args_scan, encoder_program_name, tsreadex_args, tsreadex_args_for};
pub use encoder_profile::{profile_for_quality, EncoderBackend, EncoderProfile};
pub use encoder_task::{run_live_encoder, CurrentProgramTitleFn, LiveEncoderSpec};
pub use log_classifier::{classify_log_line, LogClassification};
pub use registry::LiveStreamRegistry;
pub use restart_budget::{RestartBudget, MAX_RETRY_COUNT};
pub use stream::{ClientKind, LiveStream, LiveStreamStatus};
pub use supervisor::{supervisor_tick, SupervisorInputs};
pub use writer_buffer::{WriterBuffer, FLUSH_THRESHOLD_BYTES, SUBWRITER_INTERVAL};
