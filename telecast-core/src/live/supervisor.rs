//! Pure supervisor decision logic,
//! separated from the 100 ms tick driver so each rule is independently
//! testable.

use super::log_classifier::{classify_log_line, LogClassification};
use super::stream::LiveStreamStatus;
use std::time::{Duration, Instant};

const OFF_AIR_TIMEOUT: Duration = Duration::from_secs(15);
const STANDBY_WRITE_TIMEOUT: Duration = Duration::from_secs(20);
const ONAIR_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const VCEENC_ONAIR_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Substrings EPG programs use to mark a scheduled off-air slot. A title
/// missing or not carrying one of these is treated as a genuine reception
/// failure rather than a planned silence.
const OFF_AIR_TITLE_MARKERS: &[&str] = &["放送休止", "放送終了"];

pub struct SupervisorInputs {
    pub status: LiveStreamStatus,
    pub client_count: usize,
    pub idling_since: Option<Instant>,
    pub max_alive_time: Duration,
    pub last_tuner_read: Instant,
    pub last_stream_write: Instant,
    pub is_vceenc: bool,
    pub backend_half_closed: bool,
    pub encoder_exited: bool,
    /// Most recent stderr lines, oldest first — the classifier scans
    /// from the end.
    pub last_log_lines: Vec<String>,
    /// Title of the program currently airing on this channel, per EPG.
    /// `None` when no EPG data covers "now" for this channel.
    pub current_program_title: Option<String>,
}

/// Rule (d)'s off-air-vs-receive-error split: an off-air-timeout during a
/// program whose title doesn't read as a scheduled silence is a receive
/// failure, not a station off-air.
fn is_off_air_title(title: Option<&str>) -> bool {
    match title {
        Some(title) => OFF_AIR_TITLE_MARKERS.iter().any(|marker| title.contains(marker)),
        None => true,
    }
}

/// One supervisor tick's verdict: the next `(status, detail)` to apply,
/// or `None` if nothing changed. Checks the lettered rules in order; the
/// first rule that fires wins.
pub fn supervisor_tick(now: Instant, inputs: &SupervisorInputs) -> Option<(LiveStreamStatus, String)> {
    // (b)
    if inputs.status == LiveStreamStatus::OnAir && inputs.client_count == 0 {
        return Some((LiveStreamStatus::Idling, String::new()));
    }
    // (c)
    if inputs.status == LiveStreamStatus::Idling {
        if let Some(since) = inputs.idling_since {
            if now.duration_since(since) > inputs.max_alive_time {
                return Some((LiveStreamStatus::Offline, "アイドルタイムアウト".into()));
            }
        }
    }
    // (d)
    if now.duration_since(inputs.last_tuner_read) > OFF_AIR_TIMEOUT {
        let detail = if is_off_air_title(inputs.current_program_title.as_deref()) {
            "放送休止"
        } else {
            "放送波の受信に失敗しました"
        };
        return Some((LiveStreamStatus::Offline, detail.into()));
    }
    // (e)
    let write_timeout = match inputs.status {
        LiveStreamStatus::Standby => Some(STANDBY_WRITE_TIMEOUT),
        LiveStreamStatus::OnAir if inputs.is_vceenc => Some(VCEENC_ONAIR_WRITE_TIMEOUT),
        LiveStreamStatus::OnAir => Some(ONAIR_WRITE_TIMEOUT),
        _ => None,
    };
    if let Some(timeout) = write_timeout {
        if now.duration_since(inputs.last_stream_write) > timeout {
            return Some((LiveStreamStatus::Restart, "エンコーダーの出力が停止しました".into()));
        }
    }
    // (f)
    if inputs.backend_half_closed {
        return Some((LiveStreamStatus::Restart, "チューナーとの接続が切断されました".into()));
    }
    // (g)
    if inputs.encoder_exited {
        for line in inputs.last_log_lines.iter().rev() {
            if let Some(classification) = classify_log_line(line) {
                return Some(match classification {
                    LogClassification::Status(status, detail) => (status, detail),
                    LogClassification::Fatal(detail) => (LiveStreamStatus::Offline, detail),
                });
            }
        }
        return Some((LiveStreamStatus::Restart, "エンコーダーが終了しました".into()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs(now: Instant) -> SupervisorInputs {
        SupervisorInputs {
            status: LiveStreamStatus::OnAir,
            client_count: 1,
            idling_since: None,
            max_alive_time: Duration::from_secs(60),
            last_tuner_read: now,
            last_stream_write: now,
            is_vceenc: false,
            backend_half_closed: false,
            encoder_exited: false,
            last_log_lines: Vec::new(),
            current_program_title: None,
        }
    }

    #[test]
    fn onair_with_no_clients_goes_idling() {
        let now = Instant::now();
        let mut inputs = base_inputs(now);
        inputs.client_count = 0;
        assert_eq!(
            supervisor_tick(now, &inputs),
            Some((LiveStreamStatus::Idling, String::new()))
        );
    }

    #[test]
    fn stale_tuner_read_with_no_program_info_is_off_air() {
        let now = Instant::now();
        let mut inputs = base_inputs(now);
        inputs.last_tuner_read = now - Duration::from_secs(16);
        assert_eq!(
            supervisor_tick(now, &inputs),
            Some((LiveStreamStatus::Offline, "放送休止".into()))
        );
    }

    #[test]
    fn stale_tuner_read_during_scheduled_silence_is_off_air() {
        let now = Instant::now();
        let mut inputs = base_inputs(now);
        inputs.last_tuner_read = now - Duration::from_secs(16);
        inputs.current_program_title = Some("放送休止".into());
        assert_eq!(
            supervisor_tick(now, &inputs),
            Some((LiveStreamStatus::Offline, "放送休止".into()))
        );
    }

    #[test]
    fn stale_tuner_read_during_a_real_program_is_a_receive_error() {
        let now = Instant::now();
        let mut inputs = base_inputs(now);
        inputs.last_tuner_read = now - Duration::from_secs(16);
        inputs.current_program_title = Some("ニュース".into());
        assert_eq!(
            supervisor_tick(now, &inputs),
            Some((LiveStreamStatus::Offline, "放送波の受信に失敗しました".into()))
        );
    }

    #[test]
    fn stalled_onair_writer_triggers_restart() {
        let now = Instant::now();
        let mut inputs = base_inputs(now);
        inputs.last_stream_write = now - Duration::from_secs(6);
        assert_eq!(
            supervisor_tick(now, &inputs).unwrap().0,
            LiveStreamStatus::Restart
        );
    }

    #[test]
    fn vceenc_gets_a_longer_onair_write_grace_period() {
        let now = Instant::now();
        let mut inputs = base_inputs(now);
        inputs.is_vceenc = true;
        inputs.last_stream_write = now - Duration::from_secs(6);
        assert_eq!(supervisor_tick(now, &inputs), None);
    }

    #[test]
    fn encoder_exit_with_fatal_log_line_is_permanent_offline() {
        let now = Instant::now();
        let mut inputs = base_inputs(now);
        inputs.encoder_exited = true;
        inputs.last_log_lines = vec!["HEVC encoding is not supported on current platform".into()];
        assert_eq!(
            supervisor_tick(now, &inputs),
            Some((LiveStreamStatus::Offline, "HEVC unsupported on this hardware".into()))
        );
    }

    #[test]
    fn encoder_exit_with_no_classifiable_line_is_a_plain_restart() {
        let now = Instant::now();
        let mut inputs = base_inputs(now);
        inputs.encoder_exited = true;
        inputs.last_log_lines = vec!["some unrelated crash trace".into()];
        assert_eq!(
            supervisor_tick(now, &inputs),
            Some((LiveStreamStatus::Restart, "エンコーダーが終了しました".into()))
        );
    }
}
