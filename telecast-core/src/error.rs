//! Core error types.
//!
//! Parsing and transient I/O errors are handled locally and logged; the
//! kinds here exist for the decisions that must cross a component
//! boundary.

use thiserror::Error;

/// Top-level error for everything in `telecast-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// No tuner could be acquired, or the open/retune call kept failing
    /// past the retry budget.
    #[error("tuner unavailable: {0}")]
    TunerUnavailable(String),

    /// Malformed/truncated RPC response, version mismatch, or a
    /// command-level error status from the backend daemon.
    #[error("backend RPC error: {0}")]
    BackendRpc(#[from] RpcError),

    /// Invalid sync byte, bad section CRC, or an impossible PES length.
    /// Recoverable: the caller drops the offending unit and continues.
    #[error("TS parse error: {0}")]
    TsParse(String),

    /// The encoder log classifier produced a diagnosis the hardware cannot
    /// recover from (e.g. HEVC unsupported on this platform).
    #[error("encoder fatal: {0}")]
    EncoderFatal(String),

    /// Any other unexpected encoder death or output stall.
    #[error("encoder transient failure: {0}")]
    EncoderTransient(String),

    /// Tuner connected but the stream carries no video/audio.
    #[error("off-air: {0}")]
    OffAir(String),

    /// MetadataAnalyzer rejected a file (missing streams, scrambled, too
    /// small to hash).
    #[error("recorded file not playable: {0}")]
    RecordedFileUnplayable(String),

    /// A client asked for a segment index outside the planned list.
    #[error("requested segment out of bounds: {0}")]
    RecordedSegmentOob(usize),

    /// `.psc` archive structurally invalid (bad magic, declared size
    /// exceeds available data, dictionary window overflow).
    #[error("PSI/SI archive error: {0}")]
    Psc(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors from the backend RPC client.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("connect/roundtrip timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("I/O error talking to backend: {0}")]
    Io(#[from] std::io::Error),

    /// The envelope declared `expected` bytes but the transport only had
    /// `available` — this MUST be treated as recoverable, never a panic.
    #[error("truncated response: expected {expected} bytes, got {available}")]
    Truncated { expected: u32, available: u32 },

    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u16, actual: u16 },

    #[error("backend returned error status {0}")]
    Status(u32),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

pub type RpcResult<T> = std::result::Result<T, RpcError>;
