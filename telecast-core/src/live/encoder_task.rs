//! Live encoding task: tuner socket -> tsreadex -> encoder,
//! with a supervisor that watches both ends and restarts on stall.
//!
//! tsreadex and the transcoder are always external subprocesses connected
//! by pipes, driven through `tokio::process::Command`. Dedicated
//! reader/writer tasks join through channels, state is an explicit status
//! type rather than bare booleans, and errors always propagate as
//! `Result` rather than panicking a background task.

use super::command::{encoder_args, encoder_program_name, tsreadex_args};
use super::encoder_profile::{EncoderBackend, EncoderProfile};
use super::log_classifier::{classify_log_line, LogClassification};
use super::restart_budget::RestartBudget;
use super::stream::{LiveStream, LiveStreamStatus};
use super::supervisor::{supervisor_tick, SupervisorInputs};
use super::writer_buffer::WriterBuffer;
use crate::error::{CoreError, Result};
use bytes::Bytes;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::interval;

const SUPERVISOR_TICK: Duration = Duration::from_millis(100);
const TS_PACKET_SIZE: usize = 188;

/// Looks up the title of whatever program the EPG says is airing "now"
/// on this channel; `None` when no program covers the current time.
/// Boxed so `telecast-core` doesn't need to know about the EPG store
/// type that lives in `telecast-server`.
pub type CurrentProgramTitleFn = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Everything `run_live_encoder` needs to know about the channel being
/// tuned, independent of the tuner session itself.
pub struct LiveEncoderSpec {
    pub service_id: Option<i32>,
    pub tsreadex_path: String,
    pub encoder_backend: EncoderBackend,
    pub encoder_path: Option<String>,
    pub profile: EncoderProfile,
    pub is_radio: bool,
    pub current_program_title: CurrentProgramTitleFn,
}

struct SharedState {
    last_tuner_read: AsyncMutex<Instant>,
    last_stream_write: AsyncMutex<Instant>,
    last_log_lines: AsyncMutex<Vec<String>>,
    encoder_exited: AtomicBool,
    backend_half_closed: AtomicBool,
}

impl SharedState {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            last_tuner_read: AsyncMutex::new(now),
            last_stream_write: AsyncMutex::new(now),
            last_log_lines: AsyncMutex::new(Vec::new()),
            encoder_exited: AtomicBool::new(false),
            backend_half_closed: AtomicBool::new(false),
        }
    }
}

/// Runs one live encoding attempt end to end, restarting on transient
/// failure until `RestartBudget` is exhausted. `tuner_socket` is the raw TS
/// socket from `TunerSession::open`'s `RelayViewStream` call.
pub async fn run_live_encoder<S>(
    stream: Arc<LiveStream>,
    spec: LiveEncoderSpec,
    mut tuner_socket: S,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let budget = RestartBudget::new();
    loop {
        let outcome = run_one_attempt(&stream, &spec, &mut tuner_socket, &budget).await;
        match outcome {
            Ok(()) => return Ok(()),
            Err(CoreError::EncoderFatal(detail)) => {
                stream.set_status(LiveStreamStatus::Offline, detail.clone());
                return Err(CoreError::EncoderFatal(detail));
            }
            Err(e) => {
                if !budget.record_restart() {
                    let detail = "リトライ回数が上限に達しました".to_string();
                    stream.set_status(LiveStreamStatus::Offline, detail.clone());
                    return Err(CoreError::EncoderTransient(detail));
                }
                tracing::warn!(error = %e, retries = budget.retries(), "live encoder attempt failed, restarting");
            }
        }
    }
}

async fn run_one_attempt<S>(
    stream: &Arc<LiveStream>,
    spec: &LiveEncoderSpec,
    tuner_socket: &mut S,
    budget: &RestartBudget,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let probe_bump = budget.probe_size_bump();
    let mut tsreadex = Command::new(&spec.tsreadex_path)
        .args(tsreadex_args(spec.service_id, probe_bump))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let encoder_program = spec
        .encoder_path
        .clone()
        .unwrap_or_else(|| encoder_program_name(spec.encoder_backend).to_string());
    let mut encoder = Command::new(&encoder_program)
        .args(encoder_args(spec.encoder_backend, &spec.profile, None))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let shared = Arc::new(SharedState::new());

    let mut tsreadex_stdin = tsreadex.stdin.take().expect("piped stdin");
    let mut tsreadex_stdout = tsreadex.stdout.take().expect("piped stdout");
    let mut encoder_stdin = encoder.stdin.take().expect("piped stdin");
    let mut encoder_stdout = encoder.stdout.take().expect("piped stdout");
    let encoder_stderr = encoder.stderr.take().expect("piped stderr");

    stream.set_status(LiveStreamStatus::Standby, "チューナーを起動しています");

    // Reader: tuner socket -> tsreadex stdin.
    let reader_shared = shared.clone();
    let reader_task = tokio::spawn(async move {
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = match tuner_socket.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => break,
            };
            *reader_shared.last_tuner_read.lock().await = Instant::now();
            if tsreadex_stdin.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
        reader_shared.backend_half_closed.store(true, Ordering::Release);
    });

    // Relay: tsreadex stdout -> encoder stdin.
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

    // Writer/SubWriter: encoder stdout -> LiveStream clients, 64 KiB
    // batched or every 25 ms for radio channels.
    let writer_buffer = Arc::new(WriterBuffer::new());
    let writer_shared = shared.clone();
    let writer_stream = stream.clone();
    let writer_buf_for_reader = writer_buffer.clone();
    let writer_task = tokio::spawn(async move {
        let mut packet = [0u8; TS_PACKET_SIZE];
        loop {
            if encoder_stdout.read_exact(&mut packet).await.is_err() {
                break;
            }
            *writer_shared.last_stream_write.lock().await = Instant::now();
            if let Some(chunk) = writer_buf_for_reader.push_packet(&packet) {
                writer_stream.write_stream_data(Bytes::from(chunk));
            }
        }
        writer_shared.encoder_exited.store(true, Ordering::Release);
    });

    let subwriter_stream = stream.clone();
    let subwriter_buffer = writer_buffer.clone();
    let is_radio = spec.is_radio;
    let subwriter_task = tokio::spawn(async move {
        if !is_radio {
            return;
        }
        let mut ticker = interval(Duration::from_millis(25));
        loop {
            ticker.tick().await;
            if let Some(chunk) = subwriter_buffer.tick(Instant::now()) {
                subwriter_stream.write_stream_data(Bytes::from(chunk));
            }
        }
    });

    // LogWatcher: encoder stderr -> status transitions / fatal diagnosis.
    let log_shared = shared.clone();
    let log_stream = stream.clone();
    let log_task = tokio::spawn(async move {
        let mut lines = BufReader::new(encoder_stderr).lines();
        let mut fatal = None;
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(line = %line, "encoder stderr");
            {
                let mut recent = log_shared.last_log_lines.lock().await;
                recent.push(line.clone());
                if recent.len() > 32 {
                    recent.remove(0);
                }
            }
            match classify_log_line(&line) {
                Some(LogClassification::Status(status, detail)) => {
                    log_stream.set_status(status, detail);
                }
                Some(LogClassification::Fatal(detail)) => {
                    fatal = Some(detail);
                }
                None => {}
            }
        }
        fatal
    });

    let result = supervise(stream, &shared, &mut tsreadex, &mut encoder, &spec.current_program_title).await;

    reader_task.abort();
    relay_task.abort();
    subwriter_task.abort();
    let _ = tsreadex.start_kill();
    let _ = encoder.start_kill();
    let _ = writer_task.await;
    let fatal_from_log = log_task.await.ok().flatten();

    if let Some(detail) = fatal_from_log {
        return Err(CoreError::EncoderFatal(detail));
    }
    result
}

/// Drives the 100 ms supervisor tick until it decides to
/// end the attempt, either by reaching a terminal status or by the process
/// pair exiting on its own.
async fn supervise(
    stream: &Arc<LiveStream>,
    shared: &Arc<SharedState>,
    tsreadex: &mut Child,
    encoder: &mut Child,
    current_program_title: &CurrentProgramTitleFn,
) -> Result<()> {
    let mut ticker = interval(SUPERVISOR_TICK);
    let idling_since = AsyncMutex::new(None::<Instant>);
    let max_alive_time = Duration::from_secs(6 * 60 * 60);
    let mut last_logged_title: Option<String> = None;

    loop {
        ticker.tick().await;

        if let Ok(Some(_)) = tsreadex.try_wait() {
            shared.backend_half_closed.store(true, Ordering::Release);
        }
        if let Ok(Some(_)) = encoder.try_wait() {
            shared.encoder_exited.store(true, Ordering::Release);
        }

        let (status, _) = stream.status();
        if status == LiveStreamStatus::Idling {
            let mut since = idling_since.lock().await;
            if since.is_none() {
                *since = Some(Instant::now());
            }
        } else {
            *idling_since.lock().await = None;
        }

        // (a) track the current program and log on change.
        let program_title = current_program_title();
        if program_title != last_logged_title {
            tracing::info!(
                channel = %stream.identity,
                title = program_title.as_deref().unwrap_or("(no program data)"),
                "current program changed"
            );
            last_logged_title = program_title.clone();
        }

        let inputs = SupervisorInputs {
            status,
            client_count: stream.client_count(),
            idling_since: *idling_since.lock().await,
            max_alive_time,
            last_tuner_read: *shared.last_tuner_read.lock().await,
            last_stream_write: *shared.last_stream_write.lock().await,
            is_vceenc: false,
            backend_half_closed: shared.backend_half_closed.load(Ordering::Acquire),
            encoder_exited: shared.encoder_exited.load(Ordering::Acquire),
            last_log_lines: shared.last_log_lines.lock().await.clone(),
            current_program_title: program_title,
        };

        if let Some((next_status, detail)) = supervisor_tick(Instant::now(), &inputs) {
            let is_terminal_restart =
                matches!(next_status, LiveStreamStatus::Restart | LiveStreamStatus::Offline);
            stream.set_status(next_status, detail.clone());
            if is_terminal_restart {
                return if next_status == LiveStreamStatus::Offline {
                    Ok(())
                } else {
                    Err(CoreError::EncoderTransient(detail))
                };
            }
        }
    }
}
