//! Core domain logic: backend RPC client, tuner session management,
//! MPEG-TS demultiplexing, and (as added) live/recorded streaming and
//! library scanning.

pub mod backend;
pub mod error;
pub mod hls;
pub mod live;
pub mod model;
pub mod psc;
pub mod recorded;
pub mod scan;
pub mod ts;
pub mod tuner;

pub use error::{CoreError, Result};
