//! Recorded TS/MP4 file metadata.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Container {
    MpegTs,
    Mpeg4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanType {
    Interlaced,
    Progressive,
}

/// One keyframe reference. `key_frames` MUST be strictly ascending on both
/// fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFrame {
    /// Presentation timestamp in 90 kHz units.
    pub dts: u64,
    /// Byte offset into the TS file where this keyframe's TS packet begins.
    pub offset: u64,
}

/// A CM (commercial) break, in seconds from the start of the recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CmSection {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub codec: String,
    pub profile: Option<String>,
    pub scan_type: ScanType,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// SHA-256 over three 1 MiB chunks sampled at 1/4, 1/2, 3/4 of the file.
/// Forbidden for files under 3 MiB.
pub const MIN_HASHABLE_FILE_SIZE: u64 = 3 * 1024 * 1024;
pub const HASH_CHUNK_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedVideo {
    pub id: uuid::Uuid,
    pub file_path: std::path::PathBuf,
    pub file_hash: [u8; 32],
    pub file_size: u64,
    pub created_at: DateTime<FixedOffset>,
    pub modified_at: DateTime<FixedOffset>,
    pub recording_start_time: DateTime<FixedOffset>,
    pub recording_end_time: DateTime<FixedOffset>,
    pub duration_seconds: f64,
    pub container: Container,
    pub video: VideoInfo,
    pub primary_audio: super::program::AudioInfo,
    pub secondary_audio: Option<super::program::AudioInfo>,
    pub key_frames: Vec<KeyFrame>,
    pub cm_sections: Vec<CmSection>,
}

impl RecordedVideo {
    /// Validates the invariants `key_frames` must hold:
    /// strictly ascending on both `dts` and `offset`, and the recording's
    /// duration must not end before the last keyframe.
    pub fn validate(&self) -> Result<(), String> {
        for w in self.key_frames.windows(2) {
            if w[1].dts <= w[0].dts || w[1].offset <= w[0].offset {
                return Err(format!(
                    "key_frames not strictly ascending: {:?} then {:?}",
                    w[0], w[1]
                ));
            }
        }
        if let Some(last) = self.key_frames.last() {
            let last_dts_secs = last.dts as f64 / 90_000.0;
            if self.duration_seconds < last_dts_secs {
                return Err(format!(
                    "duration {} is before last key frame at {}",
                    self.duration_seconds, last_dts_secs
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_video(key_frames: Vec<KeyFrame>, duration: f64) -> RecordedVideo {
        RecordedVideo {
            id: uuid::Uuid::new_v4(),
            file_path: "test.ts".into(),
            file_hash: [0u8; 32],
            file_size: 10 * 1024 * 1024,
            created_at: super::super::program::jst().timestamp_opt(0, 0).unwrap(),
            modified_at: super::super::program::jst().timestamp_opt(0, 0).unwrap(),
            recording_start_time: super::super::program::jst().timestamp_opt(0, 0).unwrap(),
            recording_end_time: super::super::program::jst().timestamp_opt(0, 0).unwrap(),
            duration_seconds: duration,
            container: Container::MpegTs,
            video: VideoInfo {
                codec: "H.264".into(),
                profile: None,
                scan_type: ScanType::Progressive,
                fps: 29.97,
                width: 1920,
                height: 1080,
            },
            primary_audio: super::super::program::AudioInfo {
                codec: "AAC".into(),
                language: "jpn".into(),
                sampling_rate: 48000,
            },
            secondary_audio: None,
            key_frames,
            cm_sections: Vec::new(),
        }
    }

    #[test]
    fn ascending_key_frames_are_valid() {
        let kf = vec![
            KeyFrame { dts: 0, offset: 0 },
            KeyFrame { dts: 90_000, offset: 1000 },
        ];
        assert!(base_video(kf, 1.0).validate().is_ok());
    }

    #[test]
    fn non_ascending_dts_is_rejected() {
        let kf = vec![
            KeyFrame { dts: 90_000, offset: 0 },
            KeyFrame { dts: 90_000, offset: 1000 },
        ];
        assert!(base_video(kf, 2.0).validate().is_err());
    }

    #[test]
    fn duration_before_last_key_frame_is_rejected() {
        let kf = vec![KeyFrame { dts: 900_000, offset: 0 }];
        assert!(base_video(kf, 1.0).validate().is_err());
    }
}
