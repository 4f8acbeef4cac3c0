//! Tuner session manager: acquires, reuses, locks/unlocks,
//! and releases logical tuners via the backend RPC client.

mod registry;
mod session;

pub use registry::TunerRegistry;
pub use session::{ChannelRef, TsSocket, TunerBackend, TunerSession, KEEPALIVE_AFTER_DISCONNECT};
