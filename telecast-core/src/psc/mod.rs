//! `.psc` PSI/SI archive sidecar reader.

mod reader;
mod synth;
mod writer;

pub use reader::{read_psi_data, PscSection};
pub use synth::synthesize_section_packets;
pub use writer::{encode_chunk, ArchiveEntry};
