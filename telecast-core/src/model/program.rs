//! EPG program and recorded-program metadata.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// JST is always UTC+9 for this system (backend SYSTEMTIME values and EPG
/// tables never carry any other zone).
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("JST offset is always valid")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genre {
    pub major: String,
    pub middle: String,
}

/// ARIB STD-B10 content_nibble_level_1 major genre names, indexed by
/// nibble value 0x0-0xF.
const MAJOR_GENRES: [&str; 16] = [
    "ニュース/報道",
    "スポーツ",
    "情報/ワイドショー",
    "ドラマ",
    "音楽",
    "バラエティ",
    "映画",
    "アニメ/特撮",
    "ドキュメンタリー/教養",
    "劇場/公演",
    "趣味/教育",
    "福祉",
    "予備",
    "予備",
    "拡張",
    "その他",
];

impl Genre {
    /// Maps a `content_descriptor` nibble pair to a genre. Level-1 nibble
    /// 0xE ("拡張", BS/地上デジタル extended table) is rewritten using the
    /// `user_nibble`-derived table broadcasters share for data/multimedia
    /// genres rather than the generic level-2 table.
    pub fn from_content_nibbles(level_1: u8, level_2: u8) -> Genre {
        let major = MAJOR_GENRES
            .get(level_1 as usize)
            .copied()
            .unwrap_or("その他")
            .to_string();
        let middle = if level_1 == 0x0e {
            match level_2 {
                0x0 => "BS/地上デジタル放送用番組付属情報",
                0x1 => "広帯域メディア等",
                _ => "拡張",
            }
            .to_string()
        } else {
            format!("middle_{level_2:x}")
        };
        Genre { major, middle }
    }
}

/// Ordered heading -> body pairs. A `Vec`, not a map: heading order is part
/// of the EPG text a frontend renders (original_source's
/// `Program.detail` preserves insertion order for the same reason).
pub type ProgramDetail = Vec<(String, String)>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    pub codec: String,
    pub language: String,
    pub sampling_rate: u32,
}

/// EIT "未定" (undetermined) duration sentinel: 5 minutes.
pub const UNDETERMINED_DURATION_SECONDS: f64 = 5.0 * 60.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub network_id: u16,
    pub service_id: u16,
    pub event_id: u16,
    pub channel_id: super::channel::ChannelId,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub duration_seconds: f64,
    pub title: String,
    pub description: String,
    pub detail: ProgramDetail,
    pub genres: Vec<Genre>,
    pub video_codec: Option<String>,
    pub video_resolution: Option<String>,
    pub video_type: Option<String>,
    pub primary_audio: Option<AudioInfo>,
    pub secondary_audio: Option<AudioInfo>,
    pub is_free: bool,
}

impl Program {
    /// `NID{nid}-SID{sid:03}-EID{eid}` identity string.
    pub fn identity(&self) -> String {
        format!(
            "NID{}-SID{:03}-EID{}",
            self.network_id, self.service_id, self.event_id
        )
    }

    /// Whether this program's scheduled end has passed the one-hour grace
    /// window used by EPG refresh pruning.
    pub fn is_stale(&self, now: DateTime<FixedOffset>) -> bool {
        now.signed_duration_since(self.end_time) > chrono::Duration::hours(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedProgram {
    pub recorded_video_id: uuid::Uuid,
    pub program: Program,
    pub recording_start_margin: f64,
    pub recording_end_margin: f64,
    pub is_partially_recorded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn program_ending_at(end: DateTime<FixedOffset>) -> Program {
        Program {
            network_id: 1,
            service_id: 1,
            event_id: 1,
            channel_id: super::super::channel::ChannelId { network_id: 1, service_id: 1 },
            start_time: end - chrono::Duration::hours(1),
            end_time: end,
            duration_seconds: 3600.0,
            title: "t".into(),
            description: String::new(),
            detail: Vec::new(),
            genres: Vec::new(),
            video_codec: None,
            video_resolution: None,
            video_type: None,
            primary_audio: None,
            secondary_audio: None,
            is_free: true,
        }
    }

    #[test]
    fn stale_after_one_hour_past_end() {
        let end = jst().with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let p = program_ending_at(end);
        assert!(!p.is_stale(end + chrono::Duration::minutes(59)));
        assert!(p.is_stale(end + chrono::Duration::minutes(61)));
    }

    #[test]
    fn identity_format() {
        let end = jst().with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let p = program_ending_at(end);
        assert_eq!(p.identity(), "NID1-SID001-EID1");
    }

    #[test]
    fn extended_nibble_rewrites_middle_genre() {
        let g = Genre::from_content_nibbles(0x0e, 0x00);
        assert_eq!(g.major, "拡張");
        assert_eq!(g.middle, "BS/地上デジタル放送用番組付属情報");
    }

    #[test]
    fn ordinary_nibble_uses_generic_middle_label() {
        let g = Genre::from_content_nibbles(0x00, 0x01);
        assert_eq!(g.major, "ニュース/報道");
        assert_eq!(g.middle, "middle_1");
    }
}
