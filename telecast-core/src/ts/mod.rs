//! MPEG-TS demultiplexing: packet framing, PSI/SI section assembly and
//! table parsing, and PES reassembly.

pub mod packet;
pub mod pes;
pub mod psi;
pub mod section;

pub use packet::{pcr_add, pcr_diff, AdaptationFieldControl, PacketReader, TsPacket, PCR_CYCLE};
pub use pes::{PesAssembler, PesPacket};
pub use psi::{
    decode_aribstring_lossy, mjd_bcd_to_utc, parse_eit, parse_nit_network_name, parse_pat,
    parse_pmt, parse_sdt, parse_tot, EitEvent, EitShortEvent, PatEntry, Pmt, PmtStream,
    SdtService, Tot, PID_EIT_PF_ACTUAL, PID_NIT_ACTUAL, PID_PAT, PID_SDT_ACTUAL, PID_TOT,
};
pub use section::SectionAssembler;
