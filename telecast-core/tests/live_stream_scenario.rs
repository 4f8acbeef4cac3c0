//! End-to-end-ish coverage for the live-stream client fan-out and the
//! off-air classification path, driven directly against the public
//! `live` API rather than through real tsreadex/encoder subprocesses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use telecast_core::live::{supervisor_tick, ClientKind, LiveStream, LiveStreamStatus, SupervisorInputs};

const TS_PACKET_SIZE: usize = 188;

fn synthetic_ts_packet() -> Bytes {
    let mut packet = vec![0u8; TS_PACKET_SIZE];
    packet[0] = 0x47;
    Bytes::from(packet)
}

/// Start a live stream, connect an Mpegts client, feed it synthetic TS
/// packets, and confirm the client receives them and the stream can move
/// to `OnAir`.
#[tokio::test]
async fn live_stream_delivers_writer_chunks_once_onair() {
    let stream = Arc::new(LiveStream::new("gr011-1080p".to_string()));

    let spawned = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let spawned_for_closure = spawned.clone();
    let (_client_id, mut rx) = stream.connect(ClientKind::Mpegts, None, move || {
        spawned_for_closure.store(true, std::sync::atomic::Ordering::SeqCst);
    });
    assert!(spawned.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(stream.status().0, LiveStreamStatus::Standby);

    stream.set_status(LiveStreamStatus::OnAir, "");
    for _ in 0..5 {
        stream.write_stream_data(synthetic_ts_packet());
    }

    let mut received = 0;
    while let Ok(chunk) = rx.try_recv() {
        assert_eq!(chunk.len(), TS_PACKET_SIZE);
        assert_eq!(chunk[0], 0x47);
        received += 1;
    }
    assert!(received >= 1);
    assert_eq!(stream.status().0, LiveStreamStatus::OnAir);
    assert_eq!(stream.client_count(), 1);
}

/// A tuner read gap longer than the off-air timeout during a program
/// whose EPG title reads as a scheduled silence is classified `Offline`
/// with the 放送休止 detail, not a reception failure.
#[tokio::test]
async fn off_air_timeout_during_scheduled_silence_is_reported_as_off_air() {
    let now = Instant::now();
    let inputs = SupervisorInputs {
        status: LiveStreamStatus::OnAir,
        client_count: 1,
        idling_since: None,
        max_alive_time: Duration::from_secs(60),
        last_tuner_read: now - Duration::from_secs(20),
        last_stream_write: now,
        is_vceenc: false,
        backend_half_closed: false,
        encoder_exited: false,
        last_log_lines: Vec::new(),
        current_program_title: Some("放送休止".to_string()),
    };

    let verdict = supervisor_tick(now, &inputs);
    assert_eq!(verdict, Some((LiveStreamStatus::Offline, "放送休止".to_string())));
}
