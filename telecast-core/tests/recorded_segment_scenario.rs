//! Recorded-playback segment-planning scenario: a 60 s recording with
//! key frames every 2 s plans into 10 s segments whose boundaries line up
//! with the key frames that start them.

use telecast_core::model::KeyFrame;
use telecast_core::recorded::plan_segments;

const PCR_HZ: u64 = 90_000;

#[test]
fn sixty_second_recording_plans_into_ten_second_segments() {
    // A key frame every 2s across 60s: 30 key frames, offsets track dts 1:1.
    let key_frames: Vec<KeyFrame> = (0..30)
        .map(|n| KeyFrame { dts: n as u64 * 2 * PCR_HZ, offset: n as u64 * 1_000_000 })
        .collect();

    let plans = plan_segments(&key_frames, 60.0, 10.0);

    assert_eq!(plans.len(), 6);
    for plan in &plans[..plans.len() - 1] {
        assert!(plan.duration_seconds >= 10.0);
    }

    // Each group spans 10s = 5 key frames at this 2s cadence, so segment
    // index 3 (0-based) starts at the key frame 30s in.
    let segment_3 = plans[3];
    assert_eq!(segment_3.start_dts, 30 * PCR_HZ);
    assert_eq!(segment_3.start_file_position, 15_000_000);
}
