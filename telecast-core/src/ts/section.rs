//! PSI/SI section assembly across multiple TS packets, with CRC32
//! verification.

use super::packet::TsPacket;
use crc::{Crc, CRC_32_ISO_HDLC};

/// MPEG-2 section CRC32 is the same polynomial as `CRC_32_ISO_HDLC`
/// (the "IEEE 802.3" / `crc32()` CRC), just computed MSB-first over the
/// section without the final trailing CRC bytes.
const CRC32_MPEG2: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Accumulates packets for one PID into complete, CRC-verified sections.
/// Several PIDs can each have their own assembler; this one is
/// single-PID and handles multi-packet sections via `payload_unit_start`.
#[derive(Default)]
pub struct SectionAssembler {
    buf: Vec<u8>,
    expecting_start: bool,
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            expecting_start: true,
        }
    }

    /// Feeds one packet's payload. Returns a verified, CRC-stripped
    /// section body (tag byte onward, excluding the trailing 4-byte CRC)
    /// whenever one completes.
    pub fn feed(&mut self, pkt: &TsPacket<'_>) -> Option<Vec<u8>> {
        if !pkt.adaptation_field_control.has_payload() || pkt.payload.is_empty() {
            return None;
        }

        let mut payload = pkt.payload;
        if pkt.payload_unit_start {
            // First byte is a pointer_field: number of bytes before the
            // first section starts (stuffing from a previous section).
            let pointer = payload[0] as usize;
            if pointer + 1 > payload.len() {
                self.buf.clear();
                self.expecting_start = true;
                return None;
            }
            if !self.expecting_start && pointer > 0 {
                self.buf.extend_from_slice(&payload[1..1 + pointer]);
            }
            let completed = if !self.expecting_start && !self.buf.is_empty() {
                self.try_complete()
            } else {
                None
            };
            self.buf.clear();
            self.buf.extend_from_slice(&payload[1 + pointer..]);
            self.expecting_start = false;
            if let Some(section) = self.try_complete() {
                return Some(section);
            }
            return completed;
        } else if !self.expecting_start {
            self.buf.extend_from_slice(payload);
            return self.try_complete();
        }
        let _ = &mut payload;
        None
    }

    /// If enough bytes have accumulated to know the declared
    /// `section_length` and the buffer now holds that many bytes, verifies
    /// the CRC and returns the section (consuming it from `self.buf`).
    fn try_complete(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < 3 {
            return None;
        }
        let section_length = (((self.buf[1] & 0x0f) as usize) << 8) | self.buf[2] as usize;
        let total_len = 3 + section_length;
        if self.buf.len() < total_len {
            return None;
        }
        let section = self.buf[..total_len].to_vec();
        self.buf.drain(..total_len);
        self.expecting_start = true;

        if section.len() < 4 {
            return None;
        }
        let (body, crc_bytes) = section.split_at(section.len() - 4);
        let declared_crc = u32::from_be_bytes(crc_bytes.try_into().unwrap());
        let computed = CRC32_MPEG2.checksum(body);
        if declared_crc != computed {
            tracing::debug!("section CRC mismatch, dropping section");
            return None;
        }
        Some(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crc_section(table_id: u8, body: &[u8]) -> Vec<u8> {
        let mut section = vec![table_id];
        // section_syntax_indicator=1, reserved bits set, length filled below
        let payload_len = body.len() + 4; // + CRC
        section.push(0xb0 | ((payload_len >> 8) as u8 & 0x0f));
        section.push((payload_len & 0xff) as u8);
        section.extend_from_slice(body);
        let crc = CRC32_MPEG2.checksum(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    fn packet_with_payload(pid: u16, payload_unit_start: bool, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; super::super::packet::PACKET_SIZE];
        buf[0] = super::super::packet::SYNC_BYTE;
        buf[1] = if payload_unit_start { 0x40 } else { 0 } | ((pid >> 8) as u8 & 0x1f);
        buf[2] = (pid & 0xff) as u8;
        buf[3] = 0x10;
        let n = payload.len().min(buf.len() - 4);
        buf[4..4 + n].copy_from_slice(&payload[..n]);
        buf
    }

    #[test]
    fn assembles_single_packet_section_and_verifies_crc() {
        let body = vec![0, 1, 2, 3, 4, 5];
        let section = crc_section(0x00, &body);
        let mut payload = vec![0u8]; // pointer_field = 0
        payload.extend_from_slice(&section);
        let buf = packet_with_payload(0, true, &payload);

        let mut reader = super::super::packet::PacketReader::new(&buf);
        let pkt = reader.next_packet().unwrap();
        let mut assembler = SectionAssembler::new();
        let completed = assembler.feed(&pkt).unwrap();
        assert_eq!(completed, section);
    }

    #[test]
    fn rejects_section_with_bad_crc() {
        let body = vec![0, 1, 2, 3];
        let mut section = crc_section(0x00, &body);
        let last = section.len() - 1;
        section[last] ^= 0xff; // corrupt CRC

        let mut payload = vec![0u8];
        payload.extend_from_slice(&section);
        let buf = packet_with_payload(0, true, &payload);
        let mut reader = super::super::packet::PacketReader::new(&buf);
        let pkt = reader.next_packet().unwrap();
        let mut assembler = SectionAssembler::new();
        assert!(assembler.feed(&pkt).is_none());
    }
}
