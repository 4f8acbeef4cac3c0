//! Live LL-HLS segmenter: demuxes the encoder's MPEG-TS
//! output into fMP4 init + media + partial segments and drives a
//! `Playlist` per logical track.

use super::adts::{audio_specific_config, split_adts_frames, AdtsFrame};
use super::mp4box::{self, AudioTrackInfo, FragmentSample, VideoCodec, VideoTrackInfo};
use super::nal::{classify_h264_nal, classify_h265_nal, split_nal_units, H264NalType, H265NalType};
use super::playlist::PARTIAL_TARGET_DURATION;
use crate::ts::{
    parse_pat, parse_pmt, pcr_diff, AdaptationFieldControl, PacketReader, PesAssembler, PCR_CYCLE,
};
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

const PTS_CLOCK_HZ: f64 = 90_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecKind {
    H264,
    H265,
}

/// Tracks the state needed to emit an init segment once both the video
/// parameter sets and the audio config have been observed: ready once
/// SPS/PPS (+VPS for HEVC) and both AAC configs have been seen.
pub struct InitAccumulator {
    codec: VideoCodecKind,
    width: u16,
    height: u16,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    vps: Option<Vec<u8>>,
    audio: Option<AdtsFrame>,
}

impl InitAccumulator {
    pub fn new(codec: VideoCodecKind, width: u16, height: u16) -> Self {
        Self { codec, width, height, sps: None, pps: None, vps: None, audio: None }
    }

    pub fn observe_video_nal(&mut self, nal: &[u8]) {
        match self.codec {
            VideoCodecKind::H264 => match classify_h264_nal(nal) {
                H264NalType::Sps => self.sps = Some(nal.to_vec()),
                H264NalType::Pps => self.pps = Some(nal.to_vec()),
                _ => {}
            },
            VideoCodecKind::H265 => match classify_h265_nal(nal) {
                H265NalType::Sps => self.sps = Some(nal.to_vec()),
                H265NalType::Pps => self.pps = Some(nal.to_vec()),
                H265NalType::Vps => self.vps = Some(nal.to_vec()),
                _ => {}
            },
        }
    }

    pub fn observe_audio_frame(&mut self, frame: AdtsFrame) {
        self.audio = Some(frame);
    }

    pub fn is_ready(&self) -> bool {
        let video_ready = match self.codec {
            VideoCodecKind::H264 => self.sps.is_some() && self.pps.is_some(),
            VideoCodecKind::H265 => self.sps.is_some() && self.pps.is_some() && self.vps.is_some(),
        };
        video_ready && self.audio.is_some()
    }

    /// Builds `ftyp + moov`. Panics if `is_ready()` is false — callers
    /// must check readiness first, since there is no sane partial init
    /// segment to fall back to.
    pub fn build(&self, video_track_id: u32, audio_track_id: u32) -> Vec<u8> {
        let audio = self.audio.expect("init segment requested before audio config observed");
        let video = VideoTrackInfo {
            track_id: video_track_id,
            codec: match self.codec {
                VideoCodecKind::H264 => VideoCodec::Avc,
                VideoCodecKind::H265 => VideoCodec::Hevc,
            },
            width: self.width,
            height: self.height,
            sps: self.sps.clone().expect("sps observed"),
            pps: self.pps.clone().expect("pps observed"),
            vps: self.vps.clone().unwrap_or_default(),
        };
        let audio_track = AudioTrackInfo {
            track_id: audio_track_id,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            audio_specific_config: audio_specific_config(&audio).to_vec(),
        };
        let mut out = mp4box::ftyp();
        out.extend_from_slice(&mp4box::moov(&video, &audio_track, 90_000));
        out
    }
}

/// One elementary stream's in-progress GOP: buffered samples waiting for
/// the next 0.5 s partial boundary or the next IDR (full segment
/// boundary).
struct TrackBuffer {
    track_id: u32,
    sequence_number: u32,
    pending_samples: Vec<FragmentSample>,
    pending_payload: Vec<u8>,
    base_media_decode_time: u64,
    last_partial_pts: Option<u64>,
}

impl TrackBuffer {
    fn new(track_id: u32) -> Self {
        Self {
            track_id,
            sequence_number: 0,
            pending_samples: Vec::new(),
            pending_payload: Vec::new(),
            base_media_decode_time: 0,
            last_partial_pts: None,
        }
    }

    fn push_sample(&mut self, duration: u32, data: &[u8], is_sync: bool) {
        self.pending_samples.push(FragmentSample {
            duration,
            size: data.len() as u32,
            is_sync,
            composition_time_offset: 0,
        });
        self.pending_payload.extend_from_slice(data);
    }

    fn take_fragment(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        if self.pending_samples.is_empty() {
            return None;
        }
        let (moof, mdat) = mp4box::moof_and_mdat(
            self.sequence_number,
            self.track_id,
            self.base_media_decode_time,
            &self.pending_samples,
            &self.pending_payload,
        );
        self.base_media_decode_time += self.pending_samples.iter().map(|s| s.duration as u64).sum::<u64>();
        self.sequence_number += 1;
        self.pending_samples.clear();
        self.pending_payload.clear();
        Some((moof, mdat))
    }
}

/// Drives one track's PES stream into partials/segments on a `Playlist`,
/// independent of which codec/PID it came from — callers feed it complete
/// PES payloads plus a PTS already converted to 90 kHz ticks.
pub struct TrackSegmenter {
    buffer: TrackBuffer,
    is_video: bool,
    is_hevc: bool,
}

impl TrackSegmenter {
    pub fn new(track_id: u32, is_video: bool, is_hevc: bool) -> Self {
        Self { buffer: TrackBuffer::new(track_id), is_video, is_hevc }
    }

    /// Feeds one video access unit. `is_idr` starts a new full segment;
    /// `pts_ticks` is this frame's 90 kHz PTS, `duration_ticks` its
    /// decode-time span (derived by the caller from frame cadence).
    pub fn feed_video_access_unit(
        &mut self,
        data: &[u8],
        pts_ticks: u64,
        duration_ticks: u32,
        is_idr: bool,
    ) -> VideoFeedResult {
        self.buffer.push_sample(duration_ticks, data, is_idr);
        let partial_due = self
            .buffer
            .last_partial_pts
            .map(|last| pts_ticks.saturating_sub(last) as f64 / PTS_CLOCK_HZ >= PARTIAL_TARGET_DURATION)
            .unwrap_or(true);

        if is_idr {
            let fragment = self.buffer.take_fragment();
            self.buffer.last_partial_pts = Some(pts_ticks);
            return VideoFeedResult { fragment, ends_segment: true, starts_partial: true };
        }
        if partial_due {
            let fragment = self.buffer.take_fragment();
            let starts_partial = fragment.is_some();
            self.buffer.last_partial_pts = Some(pts_ticks);
            return VideoFeedResult { fragment, ends_segment: false, starts_partial };
        }
        VideoFeedResult { fragment: None, ends_segment: false, starts_partial: false }
    }

    /// Feeds one AAC access unit; audio never forces a segment boundary
    /// on its own, only rides whatever partial cadence the video track
    /// set.
    pub fn feed_audio_frame(&mut self, data: &[u8], duration_ticks: u32, flush: bool) -> Option<(Vec<u8>, Vec<u8>)> {
        self.buffer.push_sample(duration_ticks, data, true);
        if flush {
            self.buffer.take_fragment()
        } else {
            None
        }
    }
}

pub struct VideoFeedResult {
    pub fragment: Option<(Vec<u8>, Vec<u8>)>,
    pub ends_segment: bool,
    pub starts_partial: bool,
}

/// Computes `EXT-X-PROGRAM-DATE-TIME` from a PCR sample and an initial
/// wall-clock anchor established at the first PCR, using
/// `pcr_diff`'s wraparound-aware arithmetic so a PCR rollover across
/// `PCR_CYCLE` still produces a monotonically increasing timestamp.
pub fn program_date_time(anchor_wall_clock: DateTime<Utc>, anchor_pcr: u64, current_pcr: u64) -> DateTime<Utc> {
    let delta_90khz = pcr_diff(anchor_pcr, current_pcr);
    let millis = (delta_90khz * 1000) / 90_000;
    anchor_wall_clock + ChronoDuration::milliseconds(millis)
}

/// Demuxes raw TS bytes into PES payloads per PID, given the PAT/PMT have
/// already identified which PIDs carry video/audio.
pub struct TsDemuxer {
    reader_tail: Vec<u8>,
    video_pes: PesAssembler,
    audio_pes: PesAssembler,
    video_pid: u16,
    audio_pid: u16,
    last_pcr: Option<u64>,
}

impl TsDemuxer {
    pub fn new(video_pid: u16, audio_pid: u16) -> Self {
        Self {
            reader_tail: Vec::new(),
            video_pes: PesAssembler::new(),
            audio_pes: PesAssembler::new(),
            video_pid,
            audio_pid,
            last_pcr: None,
        }
    }

    /// Identifies the video/audio PIDs for `service_id` out of a freshly
    /// parsed PAT/PMT pair, the way a segmenter session bootstraps before
    /// any PES can be attributed to a track.
    pub fn pids_from_pmt(pat_section: &[u8], pmt_section: &[u8], service_id: u16) -> Option<(u16, u16)> {
        let pat = parse_pat(pat_section).ok()?;
        pat.iter().find(|e| e.program_number == service_id)?;
        let pmt = parse_pmt(pmt_section).ok()?;
        let video = pmt.streams.iter().find(|s| is_video_stream_type(s.stream_type))?.elementary_pid;
        let audio = pmt.streams.iter().find(|s| is_audio_stream_type(s.stream_type))?.elementary_pid;
        Some((video, audio))
    }

    /// Feeds raw bytes (any multiple of 188), returning completed PES
    /// payloads keyed by which track they belong to.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DemuxedUnit> {
        self.reader_tail.extend_from_slice(bytes);
        let mut out = Vec::new();
        let mut reader = PacketReader::new(&self.reader_tail);
        while let Some(pkt) = reader.next_packet() {
            if let Some(pcr) = pkt.pcr {
                self.last_pcr = Some(pcr);
            }
            if pkt.adaptation_field_control == AdaptationFieldControl::AdaptationOnly {
                continue;
            }
            let pid = pkt.pid;
            if pid == self.video_pid {
                if let Some(pes) = self.video_pes.feed(&pkt) {
                    out.push(DemuxedUnit::Video(Bytes::from(pes.payload), pes.pts.unwrap_or(0)));
                }
            } else if pid == self.audio_pid {
                if let Some(pes) = self.audio_pes.feed(&pkt) {
                    out.push(DemuxedUnit::Audio(Bytes::from(pes.payload), pes.pts.unwrap_or(0)));
                }
            }
        }
        let consumed = reader.position();
        drop(reader);
        if consumed > 0 {
            self.reader_tail.drain(0..consumed);
        }
        out
    }

    pub fn last_pcr(&self) -> Option<u64> {
        self.last_pcr
    }
}

pub enum DemuxedUnit {
    Video(Bytes, u64),
    Audio(Bytes, u64),
}

fn is_video_stream_type(stream_type: u8) -> bool {
    matches!(stream_type, 0x02 | 0x1B | 0x24)
}

fn is_audio_stream_type(stream_type: u8) -> bool {
    matches!(stream_type, 0x0F | 0x11)
}

/// Splits a video PES payload into NAL access units for `feed_video_access_unit`.
pub fn video_access_units(pes_payload: &[u8]) -> Vec<&[u8]> {
    split_nal_units(pes_payload)
}

/// Splits an audio PES payload into `(frame, asc-ready frame)` pairs for
/// `feed_audio_frame`.
pub fn audio_access_units(pes_payload: &[u8]) -> Vec<(AdtsFrame, &[u8])> {
    split_adts_frames(pes_payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sps_h264() -> Vec<u8> {
        vec![0x67, 0x64, 0x00, 0x28, 0xAC]
    }
    fn sample_pps_h264() -> Vec<u8> {
        vec![0x68, 0xEB]
    }

    #[test]
    fn init_accumulator_becomes_ready_after_sps_pps_and_audio() {
        let mut acc = InitAccumulator::new(VideoCodecKind::H264, 1920, 1080);
        assert!(!acc.is_ready());
        acc.observe_video_nal(&sample_sps_h264());
        acc.observe_video_nal(&sample_pps_h264());
        assert!(!acc.is_ready());
        acc.observe_audio_frame(AdtsFrame { profile: 2, sample_rate: 48000, channels: 2, frame_length: 100 });
        assert!(acc.is_ready());
    }

    #[test]
    fn init_accumulator_build_embeds_moov() {
        let mut acc = InitAccumulator::new(VideoCodecKind::H264, 1920, 1080);
        acc.observe_video_nal(&sample_sps_h264());
        acc.observe_video_nal(&sample_pps_h264());
        acc.observe_audio_frame(AdtsFrame { profile: 2, sample_rate: 48000, channels: 2, frame_length: 100 });
        let init = acc.build(1, 2);
        assert_eq!(&init[4..8], b"ftyp");
        assert!(init.windows(4).any(|w| w == b"moov"));
    }

    #[test]
    fn hevc_requires_vps_before_ready() {
        let mut acc = InitAccumulator::new(VideoCodecKind::H265, 1920, 1080);
        acc.observe_video_nal(&[0x42, 0x01]); // sps nal_unit_type=33 -> header 0x42
        acc.observe_video_nal(&[0x44, 0x01]); // pps nal_unit_type=34 -> header 0x44
        acc.observe_audio_frame(AdtsFrame { profile: 2, sample_rate: 48000, channels: 2, frame_length: 100 });
        assert!(!acc.is_ready());
        acc.observe_video_nal(&[0x40, 0x01]); // vps nal_unit_type=32 -> header 0x40
        assert!(acc.is_ready());
    }

    #[test]
    fn idr_access_unit_forces_fragment_and_segment_boundary() {
        let mut track = TrackSegmenter::new(1, true, false);
        let result = track.feed_video_access_unit(&[0xAA; 10], 0, 3000, true);
        assert!(result.ends_segment);
        assert!(result.fragment.is_some());
    }

    #[test]
    fn non_idr_before_partial_threshold_does_not_flush() {
        let mut track = TrackSegmenter::new(1, true, false);
        track.feed_video_access_unit(&[0xAA; 10], 0, 1500, true);
        let result = track.feed_video_access_unit(&[0xBB; 10], 1500, 1500, false);
        assert!(!result.ends_segment);
        assert!(result.fragment.is_none());
    }

    #[test]
    fn program_date_time_advances_monotonically_across_pcr_wrap() {
        let anchor_wall_clock = Utc::now();
        let anchor_pcr = PCR_CYCLE - 90_000; // 1s before wrap
        let before_wrap = program_date_time(anchor_wall_clock, anchor_pcr, PCR_CYCLE - 45_000);
        let after_wrap = program_date_time(anchor_wall_clock, anchor_pcr, 45_000);
        assert!(after_wrap > before_wrap);
    }

    #[test]
    fn demuxer_identifies_video_and_audio_pids_from_common_stream_types() {
        assert!(is_video_stream_type(0x1B));
        assert!(is_audio_stream_type(0x0F));
        assert!(!is_video_stream_type(0x0F));
    }
}
