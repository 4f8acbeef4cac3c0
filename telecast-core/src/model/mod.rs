//! Channel, program, and recorded-video entities, kept as plain
//! in-memory data — persistence is out of scope.

pub mod channel;
pub mod program;
pub mod recorded_video;

pub use channel::{Channel, ChannelId, ChannelType};
pub use program::{AudioInfo, Genre, Program, ProgramDetail, RecordedProgram};
pub use recorded_video::{CmSection, Container, KeyFrame, RecordedVideo, ScanType, VideoInfo};
