//! Recorded-segment-run encoder driver.
//!
//! Shares the tsreadex -> encoder subprocess-pipeline shape of
//! `live::encoder_task`, but reads from a seek point in a TS file instead
//! of a tuner socket, and remuxes the encoder's own MPEG-TS output into
//! per-segment byte ranges instead of fanning raw bytes out to live
//! clients.

use super::command::recorded_encoder_args;
use super::plan::SegmentPlan;
use super::remux::Remuxer;
use super::session::RecordedSession;
use crate::error::Result;
use crate::live::{encoder_program_name, tsreadex_args_for, EncoderBackend, EncoderProfile};
use crate::model::ScanType;
use bytes::Bytes;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::process::{Child, Command};

const KILL_TIMEOUT: Duration = Duration::from_secs(5);
const PTS_CLOCK_HZ: f64 = 90_000.0;

#[derive(Clone)]
pub struct RecordedEncoderSpec {
    pub file_path: PathBuf,
    pub service_id: Option<i32>,
    pub tsreadex_path: String,
    pub encoder_backend: EncoderBackend,
    pub encoder_path: Option<String>,
    pub profile: EncoderProfile,
    pub scan_type: ScanType,
}

/// Runs one encoder-driver attempt starting at `session.plan()[start_index]`,
/// sealing each planned segment's future as its PTS boundary is crossed.
/// Returns once the run is cancelled, superseded by a newer
/// `request_segment` restart, or the source file is exhausted.
pub async fn run_recorded_encoder(session: Arc<RecordedSession>, spec: RecordedEncoderSpec, start_index: usize) -> Result<()> {
    let my_generation = session.generation();
    let plans = session.plan().to_vec();
    let Some(start_plan) = plans.get(start_index) else {
        return Ok(());
    };

    let mut file = tokio::fs::File::open(&spec.file_path).await?;
    file.seek(std::io::SeekFrom::Start(start_plan.start_file_position)).await?;

    let mut tsreadex = Command::new(&spec.tsreadex_path)
        .args(tsreadex_args_for(spec.service_id, 0, true))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let output_ts_offset = start_plan.start_dts as f64 / PTS_CLOCK_HZ;
    let encoder_program = spec.encoder_path.clone().unwrap_or_else(|| encoder_program_name(spec.encoder_backend).to_string());
    let mut encoder = Command::new(&encoder_program)
        .args(recorded_encoder_args(spec.encoder_backend, &spec.profile, output_ts_offset, spec.scan_type))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let mut tsreadex_stdin = tsreadex.stdin.take().expect("piped stdin");
    let mut tsreadex_stdout = tsreadex.stdout.take().expect("piped stdout");
    let mut encoder_stdin = encoder.stdin.take().expect("piped stdin");
    let mut encoder_stdout = encoder.stdout.take().expect("piped stdout");

    session.set_cursor(start_index);

    let reader_task = tokio::spawn(async move {
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => break,
            };
            if tsreadex_stdin.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
    });

    let relay_task = tokio::spawn(async move {
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = match tsreadex_stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => break,
            };
            if encoder_stdin.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
    });

    let remux_result = remux_loop(&session, &mut encoder_stdout, &plans, start_index, my_generation).await;

    reader_task.abort();
    relay_task.abort();
    kill_with_timeout(&mut tsreadex).await;
    kill_with_timeout(&mut encoder).await;

    remux_result
}

/// On cancellation the tsreadex and encoder processes are killed and
/// awaited with a 5 s timeout each.
async fn kill_with_timeout(child: &mut Child) {
    let _ = child.start_kill();
    let _ = tokio::time::timeout(KILL_TIMEOUT, child.wait()).await;
}

/// Consumes the encoder's stdout, remuxing it into the planned segments
///. Stops early if `session` is
/// cancelled or superseded by a newer restart request.
async fn remux_loop<R: tokio::io::AsyncRead + Unpin>(
    session: &Arc<RecordedSession>,
    encoder_stdout: &mut R,
    plans: &[SegmentPlan],
    start_index: usize,
    my_generation: usize,
) -> Result<()> {
    let mut remuxer = Remuxer::new();
    let mut current_index = start_index;
    let mut current_buffer: Vec<u8> = Vec::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        if session.is_cancelled() || session.generation() != my_generation {
            return Ok(());
        }

        let n = match encoder_stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };

        let batch = remuxer.feed(&buf[..n]);
        current_buffer.extend_from_slice(&batch.bytes);

        if let Some(pts_ticks) = batch.video_pts_ticks {
            while current_index < plans.len() {
                let plan = &plans[current_index];
                let boundary_seconds = plan.start_dts as f64 / PTS_CLOCK_HZ + plan.duration_seconds;
                let pts_seconds = pts_ticks as f64 / PTS_CLOCK_HZ;
                if pts_seconds < boundary_seconds || current_index + 1 >= plans.len() {
                    break;
                }
                seal_segment(session, &mut remuxer, &mut current_buffer, current_index);
                current_index += 1;
                session.set_cursor(current_index);
            }
        }
    }

    if !current_buffer.is_empty() {
        session.complete_segment(current_index, Bytes::from(current_buffer));
    }
    Ok(())
}

fn seal_segment(session: &Arc<RecordedSession>, remuxer: &mut Remuxer, current_buffer: &mut Vec<u8>, index: usize) {
    let sealed = std::mem::take(current_buffer);
    session.complete_segment(index, Bytes::from(sealed));
    if remuxer.has_pat_and_pmt() {
        current_buffer.extend_from_slice(&remuxer.fresh_pat_pmt());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builds_with_expected_fields() {
        let spec = RecordedEncoderSpec {
            file_path: "rec.ts".into(),
            service_id: None,
            tsreadex_path: "tsreadex".into(),
            encoder_backend: EncoderBackend::Ffmpeg,
            encoder_path: None,
            profile: EncoderProfile {
                width: 1920,
                height: 1080,
                video_bitrate_kbps: 6000,
                video_bitrate_max_kbps: 9000,
                audio_bitrate_kbps: 192,
                is_60fps: false,
                is_hevc: false,
            },
            scan_type: ScanType::Interlaced,
        };
        assert_eq!(spec.scan_type, ScanType::Interlaced);
    }

    #[tokio::test]
    async fn remux_loop_seals_final_segment_on_eof_with_no_pts() {
        let session = RecordedSession::new(vec![SegmentPlan { start_file_position: 0, start_dts: 0, duration_seconds: 10.0 }]);
        let mut cursor = std::io::Cursor::new(vec![0u8; 8]);
        let plans = session.plan().to_vec();
        remux_loop(&session, &mut cursor, &plans, 0, session.generation()).await.unwrap();
        let bytes = session.segment_bytes(0).await.unwrap();
        assert_eq!(bytes.len(), 8);
    }
}
