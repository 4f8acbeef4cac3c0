//! Recorded-video segment planning.

use crate::model::KeyFrame;

pub const TARGET_SEGMENT_DURATION_SECONDS: f64 = 10.0;
const PCR_HZ: f64 = 90_000.0;

/// One planned segment: where to seek in the source file and how long the
/// segment runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPlan {
    pub start_file_position: u64,
    pub start_dts: u64,
    pub duration_seconds: f64,
}

/// Greedily groups consecutive key frames into segments so each segment's
/// duration, `(next_group_start_dts - group_start_dts) / 90000`, is at
/// least `target_duration_seconds` (the last segment may be shorter,
/// running to `total_duration_seconds`). `key_frames` must already be
/// validated strictly ascending (`RecordedVideo::validate`); an empty
/// slice produces no segments.
pub fn plan_segments(
    key_frames: &[KeyFrame],
    total_duration_seconds: f64,
    target_duration_seconds: f64,
) -> Vec<SegmentPlan> {
    let mut plans = Vec::new();
    if key_frames.is_empty() {
        return plans;
    }

    let mut group_start_idx = 0usize;
    loop {
        let group_start = key_frames[group_start_idx];
        let group_start_seconds = group_start.dts as f64 / PCR_HZ;

        let next_start_idx = ((group_start_idx + 1)..key_frames.len()).find(|&j| {
            let span = (key_frames[j].dts - group_start.dts) as f64 / PCR_HZ;
            span >= target_duration_seconds
        });

        match next_start_idx {
            Some(j) => {
                let duration = (key_frames[j].dts - group_start.dts) as f64 / PCR_HZ;
                plans.push(SegmentPlan {
                    start_file_position: group_start.offset,
                    start_dts: group_start.dts,
                    duration_seconds: duration,
                });
                group_start_idx = j;
            }
            None => {
                plans.push(SegmentPlan {
                    start_file_position: group_start.offset,
                    start_dts: group_start.dts,
                    duration_seconds: (total_duration_seconds - group_start_seconds).max(0.0),
                });
                break;
            }
        }
    }

    plans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kf(dts: u64, offset: u64) -> KeyFrame {
        KeyFrame { dts, offset }
    }

    #[test]
    fn groups_consecutive_key_frames_into_ten_second_segments() {
        // keyframes every 2s; the first 5 collapse into one >=10s group.
        let frames: Vec<KeyFrame> = (0..7).map(|n| kf(n * 2 * 90_000, n * 1_000_000)).collect();
        let plans = plan_segments(&frames, 12.0, 10.0);
        assert_eq!(plans[0].start_dts, 0);
        assert!(plans[0].duration_seconds >= 10.0);
    }

    #[test]
    fn last_segment_may_be_shorter_than_target() {
        let frames = vec![kf(0, 0), kf(3 * 90_000, 1000), kf(5 * 90_000, 2000)];
        let plans = plan_segments(&frames, 7.0, 10.0);
        let last = plans.last().unwrap();
        assert!(last.duration_seconds < 10.0);
    }

    #[test]
    fn single_key_frame_produces_one_segment_spanning_full_duration() {
        let frames = vec![kf(0, 0)];
        let plans = plan_segments(&frames, 30.0, 10.0);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].start_file_position, 0);
        assert_eq!(plans[0].duration_seconds, 30.0);
    }

    #[test]
    fn empty_key_frames_produce_no_segments() {
        assert!(plan_segments(&[], 30.0, 10.0).is_empty());
    }

    #[test]
    fn every_segment_start_matches_a_key_frame() {
        let frames: Vec<KeyFrame> = (0..4).map(|n| kf(n * 12 * 90_000, n * 500_000)).collect();
        let plans = plan_segments(&frames, 48.0, 10.0);
        for plan in &plans {
            assert!(frames.iter().any(|f| f.dts == plan.start_dts && f.offset == plan.start_file_position));
        }
    }
}
