//! PSI/SI table parsing: PAT, PMT, SDT, NIT, TOT, EIT.
//!
//! Only the fields the rest of the crate actually consumes are decoded;
//! unknown descriptors are skipped by length rather than rejected.

use crate::model::program::Genre;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

pub const PID_PAT: u16 = 0x0000;
pub const PID_NIT_ACTUAL: u16 = 0x0010;
pub const PID_SDT_ACTUAL: u16 = 0x0011;
pub const PID_EIT_PF_ACTUAL: u16 = 0x0012;
pub const PID_TOT: u16 = 0x0014;

#[derive(Debug, Clone)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid: u16,
}

/// Parses a Program Association Table section body (table_id 0x00,
/// already CRC-verified by `SectionAssembler`).
pub fn parse_pat(section: &[u8]) -> Result<Vec<PatEntry>, String> {
    if section.len() < 8 {
        return Err("PAT section too short".into());
    }
    let section_length = (((section[1] & 0x0f) as usize) << 8) | section[2] as usize;
    let end = (3 + section_length).saturating_sub(4); // drop trailing CRC
    let mut entries = Vec::new();
    let mut cursor = 8;
    while cursor + 4 <= end && cursor + 4 <= section.len() {
        let program_number = ((section[cursor] as u16) << 8) | section[cursor + 1] as u16;
        let pmt_pid = (((section[cursor + 2] & 0x1f) as u16) << 8) | section[cursor + 3] as u16;
        if program_number != 0 {
            entries.push(PatEntry { program_number, pmt_pid });
        }
        cursor += 4;
    }
    Ok(entries)
}

#[derive(Debug, Clone)]
pub struct PmtStream {
    pub stream_type: u8,
    pub elementary_pid: u16,
}

#[derive(Debug, Clone)]
pub struct Pmt {
    pub pcr_pid: u16,
    pub streams: Vec<PmtStream>,
}

/// Parses a Program Map Table section (table_id 0x02).
pub fn parse_pmt(section: &[u8]) -> Result<Pmt, String> {
    if section.len() < 12 {
        return Err("PMT section too short".into());
    }
    let section_length = (((section[1] & 0x0f) as usize) << 8) | section[2] as usize;
    let end = (3 + section_length).saturating_sub(4);
    let pcr_pid = (((section[8] & 0x1f) as u16) << 8) | section[9] as u16;
    let program_info_length = (((section[10] & 0x0f) as usize) << 8) | section[11] as usize;
    let mut cursor = 12 + program_info_length;
    let mut streams = Vec::new();
    while cursor + 5 <= end && cursor + 5 <= section.len() {
        let stream_type = section[cursor];
        let elementary_pid = (((section[cursor + 1] & 0x1f) as u16) << 8) | section[cursor + 2] as u16;
        let es_info_length = (((section[cursor + 3] & 0x0f) as usize) << 8) | section[cursor + 4] as usize;
        streams.push(PmtStream { stream_type, elementary_pid });
        cursor += 5 + es_info_length;
    }
    Ok(Pmt { pcr_pid, streams })
}

/// Decodes an ARIB `Jis8` / ISO-2022-JP-ish service or event name into a
/// lossy UTF-8 string. Real ARIB text uses an extended character set with
/// embedded control codes (colour, half-width switches); this strips the
/// 0x00-0x1f control range the way the upstream project's player-facing
/// players already tolerate malformed titles, and otherwise passes bytes
/// through as Shift_JIS-adjacent Latin-1 when the full ARIB tables aren't
/// loaded.
pub fn decode_aribstring_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|&&b| b >= 0x20)
        .map(|&b| b as char)
        .collect()
}

#[derive(Debug, Clone)]
pub struct SdtService {
    pub service_id: u16,
    pub service_name: String,
}

/// Parses a Service Description Table Actual (table_id 0x42), extracting
/// only the service descriptor's service name.
pub fn parse_sdt(section: &[u8]) -> Result<Vec<SdtService>, String> {
    if section.len() < 11 {
        return Err("SDT section too short".into());
    }
    let section_length = (((section[1] & 0x0f) as usize) << 8) | section[2] as usize;
    let end = (3 + section_length).saturating_sub(4);
    let mut cursor = 11;
    let mut services = Vec::new();
    while cursor + 5 <= end && cursor + 5 <= section.len() {
        let service_id = ((section[cursor] as u16) << 8) | section[cursor + 1] as u16;
        let descriptors_loop_length = (((section[cursor + 3] & 0x0f) as usize) << 8) | section[cursor + 4] as usize;
        let desc_start = cursor + 5;
        let desc_end = (desc_start + descriptors_loop_length).min(section.len());
        let mut service_name = String::new();
        let mut d = desc_start;
        while d + 2 <= desc_end {
            let tag = section[d];
            let len = section[d + 1] as usize;
            let body = &section[(d + 2).min(section.len())..(d + 2 + len).min(section.len())];
            if tag == 0x48 && body.len() >= 2 {
                // service_descriptor: service_type(1) + provider_name(len-prefixed) + service_name(len-prefixed)
                let provider_len = body[1] as usize;
                let name_off = 2 + provider_len;
                if name_off < body.len() {
                    let name_len = body[name_off] as usize;
                    let name_bytes = &body[(name_off + 1).min(body.len())..(name_off + 1 + name_len).min(body.len())];
                    service_name = decode_aribstring_lossy(name_bytes);
                }
            }
            d += 2 + len;
        }
        services.push(SdtService { service_id, service_name });
        cursor = desc_end;
    }
    Ok(services)
}

/// Parses enough of a Network Information Table Actual (table_id 0x40) to
/// recover the broadcaster's network_name descriptor.
pub fn parse_nit_network_name(section: &[u8]) -> Option<String> {
    if section.len() < 10 {
        return None;
    }
    let network_descriptors_length = (((section[8] & 0x0f) as usize) << 8) | section[9] as usize;
    let mut d = 10;
    let end = (10 + network_descriptors_length).min(section.len());
    while d + 2 <= end {
        let tag = section[d];
        let len = section[d + 1] as usize;
        let body = &section[(d + 2).min(section.len())..(d + 2 + len).min(section.len())];
        if tag == 0x40 {
            return Some(decode_aribstring_lossy(body));
        }
        d += 2 + len;
    }
    None
}

/// Converts an ARIB MJD+BCD timestamp (used by TDT/TOT/EIT) to UTC.
/// `bytes` is the 5-byte `start_time` field: 16-bit Modified Julian Date
/// followed by 24-bit BCD-encoded JST hh:mm:ss.
pub fn mjd_bcd_to_utc(bytes: &[u8]) -> Option<DateTime<Utc>> {
    if bytes.len() < 5 {
        return None;
    }
    let mjd = ((bytes[0] as u32) << 8) | bytes[1] as u32;
    if mjd == 0xffff {
        return None; // undefined, e.g. "未定" events
    }
    fn bcd(b: u8) -> u32 {
        ((b >> 4) * 10 + (b & 0x0f)) as u32
    }
    let hour = bcd(bytes[2]);
    let minute = bcd(bytes[3]);
    let second = bcd(bytes[4]);

    // MJD epoch is 1858-11-17; JST has no DST so the MJD+hms triple is a
    // JST wall-clock time directly.
    let days_since_epoch = mjd as i64;
    let epoch = Utc.with_ymd_and_hms(1858, 11, 17, 0, 0, 0).single()?;
    let jst = epoch
        + ChronoDuration::days(days_since_epoch)
        + ChronoDuration::hours(hour as i64)
        + ChronoDuration::minutes(minute as i64)
        + ChronoDuration::seconds(second as i64);
    Some(jst - ChronoDuration::hours(9))
}

#[derive(Debug, Clone)]
pub struct Tot {
    pub jst_time: DateTime<Utc>,
}

/// Parses a Time Offset Table (table_id 0x73): just the current JST time,
/// the offset descriptors are not needed since JST has no DST.
pub fn parse_tot(section: &[u8]) -> Option<Tot> {
    if section.len() < 8 {
        return None;
    }
    let jst_time = mjd_bcd_to_utc(&section[3..8])?;
    Some(Tot { jst_time })
}

#[derive(Debug, Clone)]
pub struct EitShortEvent {
    pub event_name: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct EitEvent {
    pub event_id: u16,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u32>,
    pub short_event: Option<EitShortEvent>,
    pub genres: Vec<Genre>,
}

/// Parses one EIT section (table_id 0x4e present/following, or 0x50-0x5f
/// schedule) into its constituent events. `◇`-prefixed short-event
/// headings are stripped the way upstream broadcasters' subtitle
/// conventions expect.
pub fn parse_eit(section: &[u8]) -> Result<Vec<EitEvent>, String> {
    if section.len() < 14 {
        return Err("EIT section too short".into());
    }
    let section_length = (((section[1] & 0x0f) as usize) << 8) | section[2] as usize;
    let end = (3 + section_length).saturating_sub(4);
    let mut cursor = 14;
    let mut events = Vec::new();
    while cursor + 12 <= end && cursor + 12 <= section.len() {
        let event_id = ((section[cursor] as u16) << 8) | section[cursor + 1] as u16;
        let start_time = mjd_bcd_to_utc(&section[cursor + 2..cursor + 7]);
        let dur = &section[cursor + 7..cursor + 10];
        fn bcd(b: u8) -> u32 {
            ((b >> 4) * 10 + (b & 0x0f)) as u32
        }
        let duration_seconds = if dur == [0xff, 0xff, 0xff] {
            None
        } else {
            Some(bcd(dur[0]) * 3600 + bcd(dur[1]) * 60 + bcd(dur[2]))
        };
        let descriptors_loop_length =
            (((section[cursor + 10] & 0x0f) as usize) << 8) | section[cursor + 11] as usize;
        let desc_start = cursor + 12;
        let desc_end = (desc_start + descriptors_loop_length).min(section.len());

        let mut short_event = None;
        let mut genres = Vec::new();
        let mut d = desc_start;
        while d + 2 <= desc_end {
            let tag = section[d];
            let len = section[d + 1] as usize;
            let body = &section[(d + 2).min(section.len())..(d + 2 + len).min(section.len())];
            match tag {
                0x4d if body.len() >= 5 => {
                    let name_len = body[3] as usize;
                    let name_bytes = &body[4.min(body.len())..(4 + name_len).min(body.len())];
                    let mut event_name = decode_aribstring_lossy(name_bytes);
                    if let Some(stripped) = event_name.strip_prefix('◇') {
                        event_name = stripped.to_string();
                    }
                    let text_len_off = 4 + name_len;
                    let text = if text_len_off < body.len() {
                        let text_len = body[text_len_off] as usize;
                        let text_bytes = &body[(text_len_off + 1).min(body.len())..(text_len_off + 1 + text_len).min(body.len())];
                        decode_aribstring_lossy(text_bytes)
                    } else {
                        String::new()
                    };
                    short_event = Some(EitShortEvent { event_name, text });
                }
                0x54 => {
                    // content_descriptor: pairs of (content_nibble_level_1<<4 |
                    // level_2, user_nibble).
                    for pair in body.chunks(2) {
                        if pair.len() == 2 {
                            genres.push(Genre::from_content_nibbles(pair[0] >> 4, pair[0] & 0x0f));
                        }
                    }
                }
                _ => {}
            }
            d += 2 + len;
        }

        events.push(EitEvent {
            event_id,
            start_time,
            duration_seconds,
            short_event,
            genres,
        });
        cursor = desc_end;
    }
    Ok(events)
}
