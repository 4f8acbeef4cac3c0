//! Recorded-mode encoder argv: the same per-backend
//! argument builder live streaming uses, plus the fixed-GOP flags and PTS
//! continuity options recorded playback requires.

use crate::live::{encoder_args_scan, EncoderBackend, EncoderProfile};
use crate::model::ScanType;

/// Builds the transcoder argv for one recorded-segment-run encode.
/// `output_ts_offset` is `segment.start_dts / 90000`, so
/// the encoder's output PTS lines up with the recording's global
/// timeline; `-copyts` is applied whenever an offset is given. The
/// deinterlace filter is only included for `ScanType::Interlaced`
/// sources.
/// On top of that, the GOP is forced fixed rather than scene-adaptive,
/// since recorded-segment boundaries must land exactly on the planned
/// key frames regardless of scene cuts.
pub fn recorded_encoder_args(
    backend: EncoderBackend,
    profile: &EncoderProfile,
    output_ts_offset: f64,
    scan_type: ScanType,
) -> Vec<String> {
    let deinterlace = scan_type == ScanType::Interlaced;
    let mut args = encoder_args_scan(backend, profile, Some(output_ts_offset), deinterlace);
    match backend {
        EncoderBackend::Ffmpeg => {
            args.push("-sc_threshold".into());
            args.push("0".into());
        }
        EncoderBackend::QsvEncC => {
            args.push("--strict-gop".into());
        }
        EncoderBackend::NvEncC => {
            args.push("--no-i-adapt".into());
        }
        EncoderBackend::VceEncC | EncoderBackend::RkmppEncC => {
            args.push("--strict-gop".into());
        }
    }
    args
}
