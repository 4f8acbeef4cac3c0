//! PES packet assembly and PTS/DTS extraction.

use super::packet::TsPacket;

const PES_START_CODE_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];
/// Bounds a single PES packet's accumulation buffer so a corrupt stream
/// with no terminating boundary can't grow this without limit.
const MAX_PES_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct PesPacket {
    pub stream_id: u8,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    pub payload: Vec<u8>,
}

/// Reassembles PES packets for one elementary stream PID out of
/// `payload_unit_start`-delimited TS payloads.
#[derive(Default)]
pub struct PesAssembler {
    buf: Vec<u8>,
    collecting: bool,
}

impl PesAssembler {
    pub fn new() -> Self {
        Self { buf: Vec::new(), collecting: false }
    }

    /// Feeds one packet's payload, returning the previously-accumulated
    /// PES packet once a new one's start code arrives (PES packets whose
    /// `PES_packet_length` is 0, common for video, rely on the next
    /// `payload_unit_start` to mark the boundary instead of a length).
    pub fn feed(&mut self, pkt: &TsPacket<'_>) -> Option<PesPacket> {
        if !pkt.adaptation_field_control.has_payload() {
            return None;
        }
        if pkt.payload_unit_start {
            let completed = if self.collecting && !self.buf.is_empty() {
                parse_pes(&self.buf)
            } else {
                None
            };
            self.buf.clear();
            self.buf.extend_from_slice(pkt.payload);
            self.collecting = true;
            completed
        } else if self.collecting {
            if self.buf.len() + pkt.payload.len() <= MAX_PES_SIZE {
                self.buf.extend_from_slice(pkt.payload);
            }
            None
        } else {
            None
        }
    }

    /// Flushes whatever is buffered, e.g. at end of stream.
    pub fn flush(&mut self) -> Option<PesPacket> {
        if self.collecting && !self.buf.is_empty() {
            self.collecting = false;
            let buf = std::mem::take(&mut self.buf);
            parse_pes(&buf)
        } else {
            None
        }
    }
}

fn read_timestamp(b: &[u8]) -> u64 {
    // 5-byte 33-bit timestamp: 4 marker bits + 3 value bits, then two
    // 15-bit + marker-bit groups (ISO 13818-1 §2.4.3.7).
    let a = ((b[0] as u64 & 0x0e) << 29)
        | ((b[1] as u64) << 22)
        | ((b[2] as u64 & 0xfe) << 14)
        | ((b[3] as u64) << 7)
        | ((b[4] as u64) >> 1);
    a
}

/// Parses one complete PES packet (start code + header + payload).
pub fn parse_pes(buf: &[u8]) -> Option<PesPacket> {
    if buf.len() < 9 || buf[0..3] != PES_START_CODE_PREFIX {
        return None;
    }
    let stream_id = buf[3];
    // stream IDs that carry no PES header (program_stream_map, padding,
    // private_stream_2, ...) are not used by this system's elementary
    // streams, so an absent optional header is treated as "no timestamps".
    let pts_dts_flags = (buf[7] >> 6) & 0b11;
    let header_data_length = buf[8] as usize;
    let header_start = 9;
    let header_end = (header_start + header_data_length).min(buf.len());

    let mut pts = None;
    let mut dts = None;
    if pts_dts_flags & 0b10 != 0 && header_start + 5 <= buf.len() {
        pts = Some(read_timestamp(&buf[header_start..header_start + 5]));
    }
    if pts_dts_flags == 0b11 && header_start + 10 <= buf.len() {
        dts = Some(read_timestamp(&buf[header_start + 5..header_start + 10]));
    }

    let payload = buf.get(header_end..).unwrap_or(&[]).to_vec();
    Some(PesPacket { stream_id, pts, dts, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::packet::PacketReader;

    fn make_packet(payload_unit_start: bool, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; super::super::packet::PACKET_SIZE];
        buf[0] = super::super::packet::SYNC_BYTE;
        buf[1] = if payload_unit_start { 0x40 } else { 0 };
        buf[2] = 0x01;
        buf[3] = 0x10;
        let n = payload.len().min(buf.len() - 4);
        buf[4..4 + n].copy_from_slice(&payload[..n]);
        buf
    }

    fn pes_with_pts_dts(pts: u64, dts: u64, payload: &[u8]) -> Vec<u8> {
        fn write_ts(marker: u8, ts: u64) -> [u8; 5] {
            [
                (marker << 4) | (((ts >> 30) & 0x07) as u8) << 1 | 1,
                ((ts >> 22) & 0xff) as u8,
                (((ts >> 15) & 0x7f) as u8) << 1 | 1,
                ((ts >> 7) & 0xff) as u8,
                (((ts & 0x7f) as u8) << 1) | 1,
            ]
        }
        let mut pes = vec![0x00, 0x00, 0x01, 0xe0]; // video stream_id
        let mut optional_header = vec![0x80, 0xc0]; // marker bits, PTS+DTS flags = 11
        optional_header.extend_from_slice(&write_ts(0x3, pts));
        optional_header.extend_from_slice(&write_ts(0x1, dts));
        pes.push(0); // PES_packet_length placeholder (high)
        pes.push(0);
        pes.extend_from_slice(&optional_header[..2]);
        pes.push(optional_header.len() as u8 - 2);
        pes.extend_from_slice(&optional_header[2..]);
        pes.extend_from_slice(payload);
        pes
    }

    #[test]
    fn extracts_pts_and_dts() {
        let pes = pes_with_pts_dts(90000, 45000, b"framedata");
        let pkt_buf = make_packet(true, &pes);
        let mut reader = PacketReader::new(&pkt_buf);
        let pkt = reader.next_packet().unwrap();
        let mut assembler = PesAssembler::new();
        assembler.feed(&pkt);
        let completed = assembler.flush().unwrap();
        assert_eq!(completed.pts, Some(90000));
        assert_eq!(completed.dts, Some(45000));
    }

    #[test]
    fn accumulates_across_continuation_packets() {
        let mut big_payload = vec![0u8; 300];
        big_payload[0] = 0xaa;
        let pes = pes_with_pts_dts(1, 1, &big_payload);
        let mut stream = Vec::new();
        let mut offset = 0;
        let mut first = true;
        while offset < pes.len() {
            let chunk_len = (pes.len() - offset).min(184);
            stream.extend(make_packet(first, &pes[offset..offset + chunk_len]));
            offset += chunk_len;
            first = false;
        }
        let mut reader = PacketReader::new(&stream);
        let mut assembler = PesAssembler::new();
        let mut completed = None;
        while let Some(pkt) = reader.next_packet() {
            if let Some(pes_pkt) = assembler.feed(&pkt) {
                completed = Some(pes_pkt);
            }
        }
        if completed.is_none() {
            completed = assembler.flush();
        }
        let pes_pkt = completed.unwrap();
        assert_eq!(pes_pkt.payload.len(), big_payload.len());
    }
}
