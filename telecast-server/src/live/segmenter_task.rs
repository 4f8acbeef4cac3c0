//! Wires a live encoder's MPEG-TS output into LL-HLS fMP4 segments.
//! `telecast_core::hls` provides the demuxer, the per-track segmenter
//! and the playlist; this task is the glue that
//! subscribes to a `LiveStream` as an internal MPEG-TS client and drives
//! them, the way `telecast_core::live::encoder_task` drives the
//! tsreadex/encoder pipeline one layer down.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use telecast_core::hls::{
    audio_access_units, program_date_time, video_access_units, DemuxedUnit, InitAccumulator,
    TrackSegmenter, TsDemuxer, VideoCodecKind,
};
use telecast_core::ts::{parse_pat, PacketReader, SectionAssembler, PID_PAT};
use tokio::sync::mpsc;

use crate::state::LiveSegmenterState;

const VIDEO_TRACK_ID: u32 = 1;
const AUDIO_TRACK_ID: u32 = 2;

/// Collects PAT/PMT sections out of the live feed until the video/audio
/// PIDs for `service_id` are known. Built fresh per encoder run since
/// PIDs can change across a channel retune.
struct PidBootstrap {
    service_id: u16,
    pat_assembler: SectionAssembler,
    pat_section: Option<Vec<u8>>,
    pmt_pid: Option<u16>,
    pmt_assembler: SectionAssembler,
}

impl PidBootstrap {
    fn new(service_id: u16) -> Self {
        Self {
            service_id,
            pat_assembler: SectionAssembler::new(),
            pat_section: None,
            pmt_pid: None,
            pmt_assembler: SectionAssembler::new(),
        }
    }

    /// Feeds raw TS bytes, returning the `(video_pid, audio_pid)` pair
    /// once both PAT and PMT have been seen.
    fn feed(&mut self, bytes: &[u8]) -> Option<(u16, u16)> {
        let mut reader = PacketReader::new(bytes);
        while let Some(pkt) = reader.next_packet() {
            if pkt.pid == PID_PAT && self.pat_section.is_none() {
                if let Some(section) = self.pat_assembler.feed(&pkt) {
                    if let Ok(entries) = parse_pat(&section) {
                        self.pmt_pid = entries
                            .iter()
                            .find(|e| e.program_number == self.service_id)
                            .map(|e| e.pmt_pid);
                    }
                    self.pat_section = Some(section);
                }
            } else if self.pmt_pid == Some(pkt.pid) {
                if let Some(pmt_section) = self.pmt_assembler.feed(&pkt) {
                    if let Some(pat_section) = &self.pat_section {
                        if let Some(pids) = TsDemuxer::pids_from_pmt(pat_section, &pmt_section, self.service_id) {
                            return Some(pids);
                        }
                    }
                }
            }
        }
        None
    }
}

/// Runs until the MPEG-TS client channel closes (encoder exited and
/// `LiveStream` tore the client down), feeding the demuxed video/audio
/// access units into `segmenter_state`'s shared `Playlist` and caching
/// the init segment once both tracks' configuration is known.
pub async fn run_segmenter_loop(
    mut rx: mpsc::Receiver<Bytes>,
    segmenter_state: Arc<LiveSegmenterState>,
    service_id: u16,
    is_hevc: bool,
    width: u16,
    height: u16,
) {
    let mut bootstrap = Some(PidBootstrap::new(service_id));
    let mut demuxer: Option<TsDemuxer> = None;
    let codec = if is_hevc { VideoCodecKind::H265 } else { VideoCodecKind::H264 };
    let mut init_acc = InitAccumulator::new(codec, width, height);
    let mut video_segmenter = TrackSegmenter::new(VIDEO_TRACK_ID, true, is_hevc);
    let mut audio_segmenter = TrackSegmenter::new(AUDIO_TRACK_ID, false, false);

    let mut anchor_wall_clock: Option<chrono::DateTime<Utc>> = None;
    let mut anchor_pcr: Option<u64> = None;
    let mut sequence: u64 = 0;
    let mut segment_open = false;
    let mut partial_index: u32 = 0;

    while let Some(chunk) = rx.recv().await {
        let demuxer = match &mut demuxer {
            Some(d) => d,
            None => {
                let Some(bootstrap_ref) = bootstrap.as_mut() else { break };
                match bootstrap_ref.feed(&chunk) {
                    Some((video_pid, audio_pid)) => {
                        demuxer = Some(TsDemuxer::new(video_pid, audio_pid));
                        bootstrap = None;
                        demuxer.as_mut().unwrap()
                    }
                    None => continue,
                }
            }
        };

        for unit in demuxer.feed(&chunk) {
            if let Some(pcr) = demuxer.last_pcr() {
                if anchor_pcr.is_none() {
                    anchor_pcr = Some(pcr);
                    anchor_wall_clock = Some(Utc::now());
                }
            }
            match unit {
                DemuxedUnit::Video(payload, pts) => {
                    for nal in video_access_units(&payload) {
                        init_acc.observe_video_nal(nal);
                    }
                    if !init_acc.is_ready() {
                        continue;
                    }
                    if segmenter_state.init_segment.read().is_none() {
                        let bytes = init_acc.build(VIDEO_TRACK_ID, AUDIO_TRACK_ID);
                        *segmenter_state.init_segment.write() = Some(Bytes::from(bytes));
                    }
                    let is_idr = telecast_core::hls::contains_idr(&payload, is_hevc);
                    let duration_ticks = 3000; // one 25fps-equivalent frame at 90kHz; refined once real cadence is tracked
                    let result = video_segmenter.feed_video_access_unit(&payload, pts, duration_ticks, is_idr);

                    if result.ends_segment {
                        if segment_open {
                            segmenter_state.playlist.finalize_segment();
                        }
                        let (anchor_wc, anchor_p) = match (anchor_wall_clock, anchor_pcr) {
                            (Some(wc), Some(p)) => (wc, p),
                            _ => (Utc::now(), pts),
                        };
                        let pdt = demuxer
                            .last_pcr()
                            .map(|pcr| program_date_time(anchor_wc, anchor_p, pcr))
                            .unwrap_or_else(Utc::now);
                        segmenter_state.playlist.begin_segment(sequence, pdt);
                        sequence += 1;
                        segment_open = true;
                        partial_index = 0;
                    }
                    if let Some((moof, mdat)) = result.fragment {
                        push_partial(&segmenter_state, partial_index, moof, mdat, result.starts_partial);
                        partial_index += 1;
                    }
                }
                DemuxedUnit::Audio(payload, _pts) => {
                    for (frame, data) in audio_access_units(&payload) {
                        init_acc.observe_audio_frame(frame);
                        if let Some((moof, mdat)) = audio_segmenter.feed_audio_frame(data, 1920, false) {
                            push_partial(&segmenter_state, partial_index, moof, mdat, false);
                            partial_index += 1;
                        }
                    }
                }
            }
        }
    }

    if segment_open {
        segmenter_state.playlist.finalize_segment();
    }
    segmenter_state.playlist.mark_ended();
}

fn push_partial(state: &LiveSegmenterState, index: u32, moof: Vec<u8>, mdat: Vec<u8>, independent: bool) {
    let mut data = moof;
    data.extend_from_slice(&mdat);
    let partial = telecast_core::hls::Partial {
        index,
        data: Bytes::from(data),
        duration: telecast_core::hls::PARTIAL_TARGET_DURATION,
        independent,
    };
    state.playlist.push_partial(partial);
}
