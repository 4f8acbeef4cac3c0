//! Metadata analyzer: file hashing, stream probing via
//! FFprobe, recorded-program linkage for MPEG-TS sources, and keyframe
//! indexing.

use crate::error::{CoreError, Result};
use crate::hls::contains_idr;
use crate::model::program::jst;
use crate::model::recorded_video::{
    Container, KeyFrame, RecordedVideo, ScanType, VideoInfo, HASH_CHUNK_SIZE, MIN_HASHABLE_FILE_SIZE,
};
use crate::model::{AudioInfo, ChannelId, Program, RecordedProgram};
use crate::psc::read_psi_data;
use crate::ts::packet::PACKET_SIZE;
use crate::ts::psi::{parse_eit, parse_pat, parse_pmt, parse_sdt, EitEvent, PID_EIT_PF_ACTUAL, PID_NIT_ACTUAL, PID_PAT, PID_SDT_ACTUAL};
use crate::ts::section::SectionAssembler;
use crate::ts::{PacketReader, PesAssembler, PesPacket};
use chrono::{DateTime, FixedOffset, TimeZone};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const ALLOWED_VIDEO_CODECS: [&str; 3] = ["mpeg2video", "h264", "hevc"];
const ALLOWED_AUDIO_CODECS: [&str; 2] = ["aac", "mp2"];
const ALLOWED_AUDIO_CHANNELS: [u32; 3] = [1, 2, 6];
/// How far into the file to seek for a fresh
/// present/following EIT, matching the original pipeline's `0.2 *
/// duration` heuristic.
const PROGRAM_SCAN_SEEK_FRACTION: u64 = 5;
/// Bounds how much of the file the in-file program scan reads before
/// giving up and falling back to the `.psc` sidecar.
const PROGRAM_SCAN_WINDOW_BYTES: u64 = 8 * 1024 * 1024;

fn is_video_stream_type(stream_type: u8) -> bool {
    matches!(stream_type, 0x02 | 0x1B | 0x24)
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    format_name: Option<String>,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: String,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    field_order: Option<String>,
    #[serde(default)]
    channels: Option<u32>,
    #[serde(default)]
    sample_rate: Option<String>,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

/// Channel/program information recovered by scanning PAT/NIT/SDT/EIT,
/// either straight out of the file or via its `.psc` sidecar.
struct TsProgramInfo {
    network_id: u16,
    service_id: u16,
    service_name: Option<String>,
    event: Option<EitEvent>,
}

pub struct AnalyzedRecording {
    pub recorded_video: RecordedVideo,
    pub recorded_program: RecordedProgram,
}

pub struct MetadataAnalyzer {
    ffprobe_path: String,
}

impl MetadataAnalyzer {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self { ffprobe_path: ffprobe_path.into() }
    }

    /// Runs the full pipeline for one file: hash, probe,
    /// recording-start-time bias, TS program linkage (or synthesis), and
    /// keyframe indexing.
    pub async fn analyze(&self, path: &Path) -> Result<AnalyzedRecording> {
        let metadata = tokio::fs::metadata(path).await?;
        let file_size = metadata.len();
        let file_hash = hash_file(path, file_size).await?;

        let probe = self.probe(path).await?;
        let video_stream = probe
            .streams
            .iter()
            .find(|s| s.codec_type == "video")
            .ok_or_else(|| CoreError::RecordedFileUnplayable("no video stream".into()))?;
        if !ALLOWED_VIDEO_CODECS.contains(&video_stream.codec_name.as_str()) {
            return Err(CoreError::RecordedFileUnplayable(format!("unsupported video codec {}", video_stream.codec_name)));
        }

        let mut audio_streams = probe.streams.iter().filter(|s| s.codec_type == "audio");
        let primary_stream = audio_streams.next().ok_or_else(|| CoreError::RecordedFileUnplayable("no audio stream".into()))?;
        validate_audio_stream(primary_stream)?;
        let secondary_stream = audio_streams.next();
        if let Some(stream) = secondary_stream {
            validate_audio_stream(stream)?;
        }

        let duration_seconds: f64 = probe.format.duration.as_deref().and_then(|d| d.parse().ok()).unwrap_or(0.0);
        let recording_start_time = probe
            .format
            .tags
            .as_ref()
            .and_then(|t| t.get("creation_time"))
            .and_then(|raw| biased_recording_start_time(raw, duration_seconds))
            .unwrap_or_else(|| jst().timestamp_opt(0, 0).unwrap());
        let recording_end_time = recording_start_time + chrono::Duration::milliseconds((duration_seconds * 1000.0) as i64);

        let container = container_from_format_name(probe.format.format_name.as_deref().unwrap_or(""));
        let scan_type = match video_stream.field_order.as_deref() {
            None | Some("progressive") => ScanType::Progressive,
            _ => ScanType::Interlaced,
        };

        let video = VideoInfo {
            codec: video_stream.codec_name.clone(),
            profile: video_stream.profile.clone(),
            scan_type,
            fps: parse_frame_rate(video_stream.r_frame_rate.as_deref().unwrap_or("0/1")),
            width: video_stream.width.unwrap_or(0),
            height: video_stream.height.unwrap_or(0),
        };
        let primary_audio = audio_info_from_stream(primary_stream);
        let secondary_audio = secondary_stream.map(audio_info_from_stream);

        let key_frames = if container == Container::MpegTs {
            scan_key_frames(path, video.codec == "hevc").await?
        } else {
            Vec::new()
        };

        let cm_sections = if container == Container::MpegTs {
            super::chapter::detect_cm_sections(path, duration_seconds).await
        } else {
            Vec::new()
        };

        let id = uuid::Uuid::new_v4();
        let recorded_program = match container {
            Container::MpegTs => self.link_ts_program(path, file_size).await,
            Container::Mpeg4 => None,
        }
        .map(|info| build_recorded_program(info, id, recording_start_time, recording_end_time, duration_seconds))
        .unwrap_or_else(|| synth_recorded_program(id, path, recording_start_time, recording_end_time, duration_seconds));

        let recorded_video = RecordedVideo {
            id,
            file_path: path.to_path_buf(),
            file_hash,
            file_size,
            created_at: system_time_to_jst(metadata.created()),
            modified_at: system_time_to_jst(metadata.modified()),
            recording_start_time,
            recording_end_time,
            duration_seconds,
            container,
            video,
            primary_audio,
            secondary_audio,
            key_frames,
            cm_sections,
        };
        recorded_video.validate().map_err(CoreError::RecordedFileUnplayable)?;

        Ok(AnalyzedRecording { recorded_video, recorded_program })
    }

    async fn probe(&self, path: &Path) -> Result<FfprobeOutput> {
        let output = tokio::process::Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .await?;
        if !output.status.success() {
            return Err(CoreError::RecordedFileUnplayable(format!("ffprobe exited with {:?}", output.status.code())));
        }
        serde_json::from_slice(&output.stdout).map_err(|e| CoreError::RecordedFileUnplayable(format!("ffprobe output unparsable: {e}")))
    }

    /// step 4: seek to ≈20% of the file for a fresh EIT,
    /// falling back to the `.psc` archive sidecar if the in-file scan
    /// comes up empty.
    async fn link_ts_program(&self, path: &Path, file_size: u64) -> Option<TsProgramInfo> {
        if let Some(info) = scan_ts_program_in_file(path, file_size).await {
            return Some(info);
        }
        scan_ts_program_from_psc(path).await
    }
}

fn build_recorded_program(
    info: TsProgramInfo,
    recorded_video_id: uuid::Uuid,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    duration_seconds: f64,
) -> RecordedProgram {
    let title = info
        .event
        .as_ref()
        .and_then(|e| e.short_event.as_ref())
        .map(|s| s.event_name.clone())
        .or_else(|| info.service_name.clone())
        .unwrap_or_else(|| "recording".to_string());
    let description = info.event.as_ref().and_then(|e| e.short_event.as_ref()).map(|s| s.text.clone()).unwrap_or_default();
    let genres = info.event.as_ref().map(|e| e.genres.clone()).unwrap_or_default();
    let event_id = info.event.as_ref().map(|e| e.event_id).unwrap_or(0);

    RecordedProgram {
        recorded_video_id,
        program: Program {
            network_id: info.network_id,
            service_id: info.service_id,
            event_id,
            channel_id: ChannelId { network_id: info.network_id, service_id: info.service_id },
            start_time: start,
            end_time: end,
            duration_seconds,
            title,
            description,
            detail: Vec::new(),
            genres,
            video_codec: None,
            video_resolution: None,
            video_type: None,
            primary_audio: None,
            secondary_audio: None,
            is_free: true,
        },
        recording_start_margin: 0.0,
        recording_end_margin: 0.0,
        is_partially_recorded: false,
    }
}

/// step 4 "otherwise": no channel could be linked, either
/// because the container isn't MPEG-TS or because the PSI/SI scan (file
/// and `.psc` sidecar both) came up empty. `ChannelId { 0, 0 }` is this
/// crate's "no channel" sentinel — never a real ARIB identity.
fn synth_recorded_program(
    recorded_video_id: uuid::Uuid,
    path: &Path,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    duration_seconds: f64,
) -> RecordedProgram {
    let title = path.file_stem().and_then(|s| s.to_str()).unwrap_or("recording").to_string();
    RecordedProgram {
        recorded_video_id,
        program: Program {
            network_id: 0,
            service_id: 0,
            event_id: 0,
            channel_id: ChannelId { network_id: 0, service_id: 0 },
            start_time: start,
            end_time: end,
            duration_seconds,
            title,
            description: String::new(),
            detail: Vec::new(),
            genres: Vec::new(),
            video_codec: None,
            video_resolution: None,
            video_type: None,
            primary_audio: None,
            secondary_audio: None,
            is_free: true,
        },
        recording_start_margin: 0.0,
        recording_end_margin: 0.0,
        is_partially_recorded: false,
    }
}

async fn scan_ts_program_in_file(path: &Path, file_size: u64) -> Option<TsProgramInfo> {
    let mut file = tokio::fs::File::open(path).await.ok()?;
    let seek_offset = file_size / PROGRAM_SCAN_SEEK_FRACTION;
    file.seek(std::io::SeekFrom::Start(seek_offset)).await.ok()?;

    let mut pat_section = SectionAssembler::new();
    let mut nit_section = SectionAssembler::new();
    let mut sdt_section = SectionAssembler::new();
    let mut eit_section = SectionAssembler::new();
    let mut service_id: Option<u16> = None;
    let mut network_id: Option<u16> = None;
    let mut service_name: Option<String> = None;
    let mut event: Option<EitEvent> = None;

    let mut reader_tail: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut scanned = 0u64;

    while scanned < PROGRAM_SCAN_WINDOW_BYTES {
        let n = file.read(&mut buf).await.ok()?;
        if n == 0 {
            break;
        }
        scanned += n as u64;
        reader_tail.extend_from_slice(&buf[..n]);
        let local = std::mem::take(&mut reader_tail);
        let mut reader = PacketReader::new(&local);
        while let Some(pkt) = reader.next_packet() {
            match pkt.pid {
                PID_PAT => {
                    if let Some(section) = pat_section.feed(&pkt) {
                        if let Ok(entries) = parse_pat(&section) {
                            if let Some(e) = entries.first() {
                                service_id = Some(e.program_number);
                            }
                        }
                    }
                }
                PID_NIT_ACTUAL => {
                    if let Some(section) = nit_section.feed(&pkt) {
                        if section.len() >= 5 {
                            network_id = Some(((section[3] as u16) << 8) | section[4] as u16);
                        }
                    }
                }
                PID_SDT_ACTUAL => {
                    if let Some(section) = sdt_section.feed(&pkt) {
                        if let Ok(services) = parse_sdt(&section) {
                            let found = match service_id {
                                Some(sid) => services.iter().find(|s| s.service_id == sid),
                                None => services.first(),
                            };
                            if let Some(s) = found {
                                service_name = Some(s.service_name.clone());
                            }
                        }
                    }
                }
                PID_EIT_PF_ACTUAL => {
                    if event.is_none() {
                        if let Some(section) = eit_section.feed(&pkt) {
                            if let Ok(events) = parse_eit(&section) {
                                event = events.into_iter().next();
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        let consumed = reader.position();
        drop(reader);
        reader_tail = local[consumed..].to_vec();

        if service_id.is_some() && network_id.is_some() && event.is_some() {
            break;
        }
    }

    let service_id = service_id?;
    Some(TsProgramInfo { network_id: network_id.unwrap_or(0), service_id, service_name, event })
}

async fn scan_ts_program_from_psc(path: &Path) -> Option<TsProgramInfo> {
    let psc_path = path.with_extension("psc");
    let data = tokio::fs::read(&psc_path).await.ok()?;
    let mut cursor = std::io::Cursor::new(data);

    let mut service_id: Option<u16> = None;
    let mut network_id: Option<u16> = None;
    let mut service_name: Option<String> = None;
    let mut event: Option<EitEvent> = None;

    let target_pids = [PID_PAT, PID_NIT_ACTUAL, PID_SDT_ACTUAL, PID_EIT_PF_ACTUAL];
    read_psi_data(&mut cursor, &target_pids, |section| {
        match section.pid {
            PID_PAT => {
                if let Ok(entries) = parse_pat(&section.data) {
                    if let Some(e) = entries.first() {
                        service_id = Some(e.program_number);
                    }
                }
            }
            PID_NIT_ACTUAL => {
                if section.data.len() >= 5 {
                    network_id = Some(((section.data[3] as u16) << 8) | section.data[4] as u16);
                }
            }
            PID_SDT_ACTUAL => {
                if let Ok(services) = parse_sdt(&section.data) {
                    let found = match service_id {
                        Some(sid) => services.iter().find(|s| s.service_id == sid),
                        None => services.first(),
                    };
                    if let Some(s) = found {
                        service_name = Some(s.service_name.clone());
                    }
                }
            }
            PID_EIT_PF_ACTUAL => {
                if event.is_none() {
                    if let Ok(events) = parse_eit(&section.data) {
                        event = events.into_iter().next();
                    }
                }
            }
            _ => {}
        }
        !(service_id.is_some() && network_id.is_some() && event.is_some())
    })
    .ok()?;

    let service_id = service_id?;
    Some(TsProgramInfo { network_id: network_id.unwrap_or(0), service_id, service_name, event })
}

/// step 1: SHA-256 over three 1 MiB chunks at 1/4, 1/2, 3/4
/// of the file; refuses files under 3 MiB.
pub async fn hash_file(path: &Path, file_size: u64) -> Result<[u8; 32]> {
    if file_size < MIN_HASHABLE_FILE_SIZE {
        return Err(CoreError::RecordedFileUnplayable(format!("file too small to hash: {file_size} bytes")));
    }
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    for numerator in [1u64, 2, 3] {
        let offset = (file_size * numerator) / 4;
        let len = HASH_CHUNK_SIZE.min(file_size - offset);
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut chunk = vec![0u8; len as usize];
        file.read_exact(&mut chunk).await?;
        hasher.update(&chunk);
    }
    Ok(hasher.finalize().into())
}

/// step 5: scans the whole file for video key frames,
/// producing `(dts, file offset)` pairs in the order `RecordedVideo`
/// requires.
pub async fn scan_key_frames(path: &Path, is_hevc: bool) -> Result<Vec<KeyFrame>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut scanner = KeyFrameScanner::new(is_hevc);
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        scanner.feed(&buf[..n]);
    }
    Ok(scanner.finish())
}

struct KeyFrameScanner {
    reader_tail: Vec<u8>,
    file_offset: u64,
    pat_section: SectionAssembler,
    pmt_section: Option<SectionAssembler>,
    pmt_pid: Option<u16>,
    video_pid: Option<u16>,
    video_pes: PesAssembler,
    pending_pes_start_offset: Option<u64>,
    is_hevc: bool,
    key_frames: Vec<KeyFrame>,
}

impl KeyFrameScanner {
    fn new(is_hevc: bool) -> Self {
        Self {
            reader_tail: Vec::new(),
            file_offset: 0,
            pat_section: SectionAssembler::new(),
            pmt_section: None,
            pmt_pid: None,
            video_pid: None,
            video_pes: PesAssembler::new(),
            pending_pes_start_offset: None,
            is_hevc,
            key_frames: Vec::new(),
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        self.reader_tail.extend_from_slice(bytes);
        let buf = std::mem::take(&mut self.reader_tail);
        let mut reader = PacketReader::new(&buf);

        while let Some(pkt) = reader.next_packet() {
            let end = reader.position();
            let packet_file_offset = self.file_offset + (end - PACKET_SIZE) as u64;

            if pkt.pid == 0x0000 {
                if let Some(section) = self.pat_section.feed(&pkt) {
                    if let Ok(entries) = parse_pat(&section) {
                        if let Some(e) = entries.first() {
                            if self.pmt_pid != Some(e.pmt_pid) {
                                self.pmt_pid = Some(e.pmt_pid);
                                self.pmt_section = Some(SectionAssembler::new());
                            }
                        }
                    }
                }
                continue;
            }
            if Some(pkt.pid) == self.pmt_pid {
                if let Some(assembler) = self.pmt_section.as_mut() {
                    if let Some(section) = assembler.feed(&pkt) {
                        if let Ok(pmt) = parse_pmt(&section) {
                            self.video_pid = pmt.streams.iter().find(|s| is_video_stream_type(s.stream_type)).map(|s| s.elementary_pid);
                        }
                    }
                }
                continue;
            }
            if Some(pkt.pid) == self.video_pid {
                if pkt.payload_unit_start {
                    let prev_start = self.pending_pes_start_offset;
                    self.pending_pes_start_offset = Some(packet_file_offset);
                    if let Some(pes) = self.video_pes.feed(&pkt) {
                        self.observe_completed_pes(pes, prev_start);
                    }
                } else {
                    self.video_pes.feed(&pkt);
                }
            }
        }
        let consumed = reader.position();
        drop(reader);
        self.reader_tail = buf[consumed..].to_vec();
        self.file_offset += consumed as u64;
    }

    fn observe_completed_pes(&mut self, pes: PesPacket, start_offset: Option<u64>) {
        let Some(offset) = start_offset else { return };
        if !contains_idr(&pes.payload, self.is_hevc) {
            return;
        }
        let dts = pes.dts.or(pes.pts).unwrap_or(0);
        let ascending = self.key_frames.last().map(|last| dts > last.dts && offset > last.offset).unwrap_or(true);
        if ascending {
            self.key_frames.push(KeyFrame { dts, offset });
        }
    }

    fn finish(mut self) -> Vec<KeyFrame> {
        if let Some(pes) = self.video_pes.flush() {
            let start = self.pending_pes_start_offset;
            self.observe_completed_pes(pes, start);
        }
        self.key_frames
    }
}

fn container_from_format_name(name: &str) -> Container {
    if name.contains("mpegts") {
        Container::MpegTs
    } else {
        Container::Mpeg4
    }
}

fn parse_frame_rate(raw: &str) -> f64 {
    let mut parts = raw.splitn(2, '/');
    let num: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let den: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1.0);
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn audio_info_from_stream(stream: &FfprobeStream) -> AudioInfo {
    AudioInfo {
        codec: stream.codec_name.clone(),
        language: stream.tags.as_ref().and_then(|t| t.get("language")).cloned().unwrap_or_else(|| "jpn".to_string()),
        sampling_rate: stream.sample_rate.as_deref().and_then(|s| s.parse().ok()).unwrap_or(48000),
    }
}

fn validate_audio_stream(stream: &FfprobeStream) -> Result<()> {
    if !ALLOWED_AUDIO_CODECS.contains(&stream.codec_name.as_str()) {
        return Err(CoreError::RecordedFileUnplayable(format!("unsupported audio codec {}", stream.codec_name)));
    }
    let channels = stream.channels.unwrap_or(0);
    if !ALLOWED_AUDIO_CHANNELS.contains(&channels) {
        return Err(CoreError::RecordedFileUnplayable(format!("unsupported channel count {channels}")));
    }
    Ok(())
}

/// step 3: MediaInfo/FFprobe's start time is JST despite
/// being labelled UTC; bias it backward by half the sub-second remainder
/// of the recording's duration to approximate the true start past
/// MediaInfo's second-granularity truncation.
fn biased_recording_start_time(raw: &str, duration_seconds: f64) -> Option<DateTime<FixedOffset>> {
    let naive = DateTime::parse_from_rfc3339(raw).ok()?.naive_utc();
    let wall_clock = jst().from_local_datetime(&naive).single()?;
    let duration_ms = (duration_seconds * 1000.0).round() as i64;
    let bias_ms = (duration_ms % 1000) / 2;
    Some(wall_clock - chrono::Duration::milliseconds(bias_ms))
}

fn system_time_to_jst(result: std::io::Result<std::time::SystemTime>) -> DateTime<FixedOffset> {
    result
        .ok()
        .map(|t| DateTime::<chrono::Utc>::from(t).with_timezone(&jst()))
        .unwrap_or_else(|| jst().timestamp_opt(0, 0).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::packet::SYNC_BYTE;

    #[test]
    fn parse_frame_rate_handles_fraction() {
        assert!((parse_frame_rate("30000/1001") - 29.97).abs() < 0.01);
    }

    #[test]
    fn parse_frame_rate_handles_zero_denominator() {
        assert_eq!(parse_frame_rate("0/0"), 0.0);
    }

    #[test]
    fn container_from_format_name_detects_mpegts() {
        assert_eq!(container_from_format_name("mpegts"), Container::MpegTs);
        assert_eq!(container_from_format_name("mov,mp4,m4a,3gp,3g2,mj2"), Container::Mpeg4);
    }

    #[test]
    fn biased_start_time_shifts_backward_by_half_subsecond_remainder() {
        let start = biased_recording_start_time("2026-01-01T12:00:00.000000Z", 1800.5).unwrap();
        let unbiased = jst().with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert_eq!((unbiased - start).num_milliseconds(), 250);
    }

    #[tokio::test]
    async fn hash_file_rejects_files_under_minimum_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.ts");
        tokio::fs::write(&path, vec![0u8; 1024]).await.unwrap();
        assert!(hash_file(&path, 1024).await.is_err());
    }

    #[tokio::test]
    async fn hash_file_is_deterministic_for_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.ts");
        let data = vec![7u8; MIN_HASHABLE_FILE_SIZE as usize + 4096];
        tokio::fs::write(&path, &data).await.unwrap();
        let size = data.len() as u64;
        let first = hash_file(&path, size).await.unwrap();
        let second = hash_file(&path, size).await.unwrap();
        assert_eq!(first, second);
    }

    fn pat_packet(pmt_pid: u16) -> Vec<u8> {
        use crc::{Crc, CRC_32_ISO_HDLC};
        let mut body = vec![0, 1, 0xc1, 0, 0];
        body.extend_from_slice(&[0x00, 0x01]); // program_number = 1
        body.extend_from_slice(&[0xe0 | ((pmt_pid >> 8) as u8 & 0x1f), (pmt_pid & 0xff) as u8]);
        let mut section = vec![0x00u8];
        let payload_len = body.len() + 4;
        section.push(0xb0 | ((payload_len >> 8) as u8 & 0x0f));
        section.push((payload_len & 0xff) as u8);
        section.extend_from_slice(&body);
        let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&section);
        section.extend_from_slice(&crc.to_be_bytes());

        let mut pkt = vec![0u8; PACKET_SIZE];
        pkt[0] = SYNC_BYTE;
        pkt[1] = 0x40;
        pkt[2] = 0x00;
        pkt[3] = 0x10;
        pkt[4] = 0x00; // pointer field
        pkt[5..5 + section.len()].copy_from_slice(&section);
        pkt
    }

    #[test]
    fn keyframe_scanner_finds_nothing_without_pmt_identifying_video_pid() {
        let mut scanner = KeyFrameScanner::new(false);
        scanner.feed(&pat_packet(0x100));
        assert!(scanner.finish().is_empty());
    }
}
