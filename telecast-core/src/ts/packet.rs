//! MPEG-TS packet framing.
//!
//! Packets are fixed 188 bytes, sync byte `0x47`. `PCR_CYCLE` is the 90 kHz
//! wrap modulus (`2^33`) the LL-HLS segmenter uses for PROGRAM-DATE-TIME
//! arithmetic across a PCR wraparound.

pub const PACKET_SIZE: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;
pub const PCR_CYCLE: u64 = 1u64 << 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptationFieldControl {
    PayloadOnly,
    AdaptationOnly,
    AdaptationAndPayload,
    Reserved,
}

impl AdaptationFieldControl {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0b01 => AdaptationFieldControl::PayloadOnly,
            0b10 => AdaptationFieldControl::AdaptationOnly,
            0b11 => AdaptationFieldControl::AdaptationAndPayload,
            _ => AdaptationFieldControl::Reserved,
        }
    }

    pub fn has_payload(self) -> bool {
        matches!(
            self,
            AdaptationFieldControl::PayloadOnly | AdaptationFieldControl::AdaptationAndPayload
        )
    }

    pub fn has_adaptation_field(self) -> bool {
        matches!(
            self,
            AdaptationFieldControl::AdaptationOnly | AdaptationFieldControl::AdaptationAndPayload
        )
    }
}

/// A single parsed 188-byte TS packet, borrowing its payload from the
/// source buffer.
#[derive(Debug)]
pub struct TsPacket<'a> {
    pub pid: u16,
    pub payload_unit_start: bool,
    pub adaptation_field_control: AdaptationFieldControl,
    pub continuity_counter: u8,
    pub transport_error: bool,
    /// PCR in 90 kHz units, reconstructed from the 33-bit base plus the
    /// 300-count 27 MHz extension.
    pub pcr: Option<u64>,
    pub payload: &'a [u8],
}

/// Parses one 188-byte slice. The caller guarantees `buf.len() ==
/// PACKET_SIZE` and `buf[0] == SYNC_BYTE` — re-syncing lives in
/// `PacketReader`.
fn parse_packet(buf: &[u8]) -> Result<TsPacket<'_>, String> {
    if buf.len() != PACKET_SIZE {
        return Err(format!("packet is {} bytes, expected {}", buf.len(), PACKET_SIZE));
    }
    if buf[0] != SYNC_BYTE {
        return Err(format!("bad sync byte 0x{:02x}", buf[0]));
    }

    let transport_error = buf[1] & 0x80 != 0;
    let payload_unit_start = buf[1] & 0x40 != 0;
    let pid = (((buf[1] & 0x1f) as u16) << 8) | buf[2] as u16;
    let adaptation_field_control = AdaptationFieldControl::from_bits((buf[3] >> 4) & 0b11);
    let continuity_counter = buf[3] & 0x0f;

    let mut cursor = 4usize;
    let mut pcr = None;

    if adaptation_field_control.has_adaptation_field() {
        let af_len = buf[cursor] as usize;
        let af_start = cursor + 1;
        if af_len > 0 && af_start < buf.len() {
            let flags = buf[af_start];
            let pcr_flag = flags & 0x10 != 0;
            if pcr_flag && af_start + 6 <= buf.len() {
                let b = &buf[af_start + 1..af_start + 7];
                let base = ((b[0] as u64) << 25)
                    | ((b[1] as u64) << 17)
                    | ((b[2] as u64) << 9)
                    | ((b[3] as u64) << 1)
                    | ((b[4] as u64) >> 7);
                let ext = (((b[4] as u64) & 0x01) << 8) | b[5] as u64;
                // Reconstruct the 27MHz value then fold the 300-count
                // extension back down to 90kHz units.
                pcr = Some((base + ext / 300) % PCR_CYCLE);
            }
        }
        cursor += 1 + af_len;
    }

    let payload: &[u8] = if adaptation_field_control.has_payload() && cursor <= buf.len() {
        &buf[cursor.min(buf.len())..]
    } else {
        &[]
    };

    Ok(TsPacket {
        pid,
        payload_unit_start,
        adaptation_field_control,
        continuity_counter,
        transport_error,
        pcr,
        payload,
    })
}

/// Adds two 90kHz PCR-space timestamps modulo the wrap cycle.
pub fn pcr_add(a: u64, delta: u64) -> u64 {
    (a + delta) % PCR_CYCLE
}

/// Signed difference `b - a` in PCR space, accounting for wraparound, so
/// that a timestamp just after a wrap still reads as "later" than one
/// just before it.
pub fn pcr_diff(a: u64, b: u64) -> i64 {
    let half = (PCR_CYCLE / 2) as i64;
    let raw = (b as i64) - (a as i64);
    if raw > half {
        raw - PCR_CYCLE as i64
    } else if raw < -half {
        raw + PCR_CYCLE as i64
    } else {
        raw
    }
}

/// Reads packets out of a byte stream, verifying sync and re-syncing one
/// byte at a time on mismatch.
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Byte offset into the source buffer just past the last packet
    /// returned (or past any garbage skipped while re-syncing). Callers
    /// streaming from a growing buffer use this to know how much of the
    /// buffer has been consumed and can be dropped.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn next_packet(&mut self) -> Option<TsPacket<'a>> {
        loop {
            if self.pos + PACKET_SIZE > self.buf.len() {
                return None;
            }
            if self.buf[self.pos] != SYNC_BYTE {
                self.pos += 1;
                continue;
            }
            let slice = &self.buf[self.pos..self.pos + PACKET_SIZE];
            self.pos += PACKET_SIZE;
            match parse_packet(slice) {
                Ok(pkt) => return Some(pkt),
                Err(_) => continue,
            }
        }
    }
}

impl<'a> Iterator for PacketReader<'a> {
    type Item = TsPacket<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet()
    }
}
