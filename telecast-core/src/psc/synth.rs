//! Synthesizes MPEG-TS packets from `.psc`-recovered PSI/SI sections so
//! the `ts` module's section/table parsers can be reused unchanged.

use crate::ts::packet::PACKET_SIZE;

/// Packs one PSI/SI section into 188-byte TS packets for `pid`, starting
/// continuity at `continuity_counter` (mod 16 per packet emitted). The
/// final packet is 0xFF-padded to the fixed packet size, matching a real
/// demultiplexer's stuffing.
pub fn synthesize_section_packets(pid: u16, continuity_counter: u8, section: &[u8]) -> Vec<[u8; PACKET_SIZE]> {
    // pointer_field(1) + section bytes, chunked into 184-byte payloads.
    let mut with_pointer = Vec::with_capacity(section.len() + 1);
    with_pointer.push(0u8);
    with_pointer.extend_from_slice(section);

    let mut packets = Vec::new();
    let mut cc = continuity_counter;
    let mut offset = 0;
    let mut first = true;
    while offset < with_pointer.len() {
        let mut packet = [0xffu8; PACKET_SIZE];
        packet[0] = 0x47;
        packet[1] = (if first { 0x40 } else { 0 }) | ((pid >> 8) as u8 & 0x1f);
        packet[2] = (pid & 0xff) as u8;
        packet[3] = 0x10 | (cc & 0x0f);

        let chunk_len = (with_pointer.len() - offset).min(PACKET_SIZE - 4);
        packet[4..4 + chunk_len].copy_from_slice(&with_pointer[offset..offset + chunk_len]);

        packets.push(packet);
        offset += chunk_len;
        cc = cc.wrapping_add(1) & 0x0f;
        first = false;
    }
    packets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::packet::PacketReader;
    use crate::ts::section::SectionAssembler;
    use crc::{Crc, CRC_32_ISO_HDLC};

    fn crc_section(table_id: u8, body: &[u8]) -> Vec<u8> {
        let mut section = vec![table_id];
        let payload_len = body.len() + 4;
        section.push(0xb0 | ((payload_len >> 8) as u8 & 0x0f));
        section.push((payload_len & 0xff) as u8);
        section.extend_from_slice(body);
        let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    #[test]
    fn synthesized_packets_are_reparsed_into_the_original_section() {
        let body = vec![0u8; 300]; // forces a multi-packet section
        let section = crc_section(0x00, &body);
        let packets = synthesize_section_packets(0x0010, 0, &section);
        assert!(packets.len() > 1);

        let mut flat = Vec::new();
        for p in &packets {
            flat.extend_from_slice(p);
        }
        let mut reader = PacketReader::new(&flat);
        let mut assembler = SectionAssembler::new();
        let mut recovered = None;
        while let Some(pkt) = reader.next_packet() {
            if let Some(s) = assembler.feed(&pkt) {
                recovered = Some(s);
            }
        }
        assert_eq!(recovered.unwrap(), section);
    }

    #[test]
    fn first_packet_sets_payload_unit_start() {
        let section = crc_section(0x00, &[1, 2, 3]);
        let packets = synthesize_section_packets(0x11, 3, &section);
        assert_eq!(packets[0][1] & 0x40, 0x40);
        assert_eq!(packets[0][3] & 0x0f, 3);
    }
}
