//! Fixed external command lines.
//!
//! tsreadex and the transcoder are always invoked the same way modulo the
//! handful of parameters the channel/profile/restart state actually change;
//! collecting the argv-building here keeps `encoder_task` free of string
//! formatting.

use super::encoder_profile::{EncoderBackend, EncoderProfile};

/// Builds the fixed tsreadex argv: `-x 18/38/39` drops null,
/// CAT, and (redundant) NIT-other packets; `-n <service_id>` filters to one
/// service, or `-1` to pass every service through untouched; the
/// ARIB-caption/superimpose knobs (`-a`/`-b`/`-c`) and `-u 1` (handle
/// scrambled-but-unencrypted streams) are always on; `-d` selects the probe
/// read size, bumped slightly per restart attempt to ride out transient
/// parse failures.
pub fn tsreadex_args(service_id: Option<i32>, probe_size_bump: usize) -> Vec<String> {
    tsreadex_args_for(service_id, probe_size_bump, false)
}

/// As `tsreadex_args`, but `recorded = true` appends `-b 7`.
pub fn tsreadex_args_for(service_id: Option<i32>, probe_size_bump: usize, recorded: bool) -> Vec<String> {
    let base_probe_size: usize = 9;
    let mut args = vec![
        "-x".to_string(),
        "18/38/39".into(),
        "-n".into(),
        service_id.map(|id| id.to_string()).unwrap_or_else(|| "-1".into()),
        "-a".into(),
        "13".into(),
        "-b".into(),
        "5".into(),
        "-c".into(),
        "5".into(),
        "-u".into(),
        "1".into(),
        "-d".into(),
        (base_probe_size + probe_size_bump).to_string(),
    ];
    if recorded {
        args.push("-b".into());
        args.push("7".into());
    }
    args.push("-".into());
    args
}

/// Builds the transcoder argv for `backend` assuming interlaced source
/// (live ISDB-T/ISDB-S broadcast video always is). Every backend reads
/// raw TS on stdin and writes raw TS on stdout; only the video filter
/// chain and rate control flags differ between them.
pub fn encoder_args(backend: EncoderBackend, profile: &EncoderProfile, output_ts_offset: Option<f64>) -> Vec<String> {
    encoder_args_scan(backend, profile, output_ts_offset, true)
}

/// As `encoder_args`, but `deinterlace` is explicit rather than assumed —
/// recorded playback drives this off the source file's
/// `ScanType` instead of always deinterlacing.
pub fn encoder_args_scan(
    backend: EncoderBackend,
    profile: &EncoderProfile,
    output_ts_offset: Option<f64>,
    deinterlace: bool,
) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-i".to_string(), "pipe:0".to_string()];
    if let Some(offset) = output_ts_offset {
        args.push("-output_ts_offset".into());
        args.push(format!("{offset:.3}"));
        args.push("-copyts".into());
    }

    let scale = format!("scale={}:{}", profile.width, profile.height);
    let deinterlace_filter = match backend {
        EncoderBackend::Ffmpeg => "yadif=0:-1:0".to_string(),
        EncoderBackend::QsvEncC | EncoderBackend::NvEncC | EncoderBackend::VceEncC | EncoderBackend::RkmppEncC => {
            "vpp-deinterlace=normal".to_string()
        }
    };

    match backend {
        EncoderBackend::Ffmpeg => {
            let codec = if profile.is_hevc { "libx265" } else { "libx264" };
            let vf = if deinterlace { format!("{deinterlace_filter},{scale}") } else { scale.clone() };
            args.extend([
                "-vf".into(),
                vf,
                "-c:v".into(),
                codec.into(),
                "-b:v".into(),
                format!("{}k", profile.video_bitrate_kbps),
                "-maxrate:v".into(),
                format!("{}k", profile.video_bitrate_max_kbps),
                "-g".into(),
                if profile.is_60fps { "120".into() } else { "60".into() },
                "-c:a".into(),
                "aac".into(),
                "-ar".into(),
                "48000".into(),
                "-ac".into(),
                "2".into(),
                "-b:a".into(),
                format!("{}k", profile.audio_bitrate_kbps),
                "-f".into(),
                "mpegts".into(),
                "pipe:1".into(),
            ]);
        }
        other => {
            let codec_flag = if profile.is_hevc { "--codec hevc" } else { "--codec h264" };
            args.extend(["--raw-input".into(), "-".into(), "--vpp-resize".into(), format!("{}x{}", profile.width, profile.height)]);
            if deinterlace {
                args.extend(["--vpp-deinterlace".into(), "normal".into()]);
            }
            args.extend([
                "--bitrate".into(),
                profile.video_bitrate_kbps.to_string(),
                "--max-bitrate".into(),
                profile.video_bitrate_max_kbps.to_string(),
                "--audio-codec".into(),
                "aac".into(),
                "--audio-bitrate".into(),
                profile.audio_bitrate_kbps.to_string(),
                "--output-format".into(),
                "mpegts".into(),
                "-o".into(),
                "-".into(),
            ]);
            let _ = (other, codec_flag);
        }
    }
    args
}

/// The executable name for `backend`, as looked up on `PATH`.
pub fn encoder_program_name(backend: EncoderBackend) -> &'static str {
    match backend {
        EncoderBackend::Ffmpeg => "ffmpeg",
        EncoderBackend::QsvEncC => "QSVEncC",
        EncoderBackend::NvEncC => "NVEncC",
        EncoderBackend::VceEncC => "VCEEncC",
        EncoderBackend::RkmppEncC => "rkmppenc",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsreadex_args_filter_to_requested_service() {
        let args = tsreadex_args(Some(101), 0);
        let n_pos = args.iter().position(|a| a == "-n").unwrap();
        assert_eq!(args[n_pos + 1], "101");
    }

    #[test]
    fn tsreadex_args_pass_all_services_when_unset() {
        let args = tsreadex_args(None, 0);
        let n_pos = args.iter().position(|a| a == "-n").unwrap();
        assert_eq!(args[n_pos + 1], "-1");
    }

    #[test]
    fn probe_size_bump_increases_d_flag() {
        let base = tsreadex_args(Some(101), 0);
        let bumped = tsreadex_args(Some(101), 16);
        let d_pos = base.iter().position(|a| a == "-d").unwrap();
        let base_size: usize = base[d_pos + 1].parse().unwrap();
        let bumped_size: usize = bumped[d_pos + 1].parse().unwrap();
        assert!(bumped_size > base_size);
    }

    #[test]
    fn ffmpeg_args_read_stdin_and_write_mpegts_stdout() {
        let profile = EncoderProfile {
            width: 1920,
            height: 1080,
            video_bitrate_kbps: 6000,
            video_bitrate_max_kbps: 9000,
            audio_bitrate_kbps: 192,
            is_60fps: false,
            is_hevc: false,
        };
        let args = encoder_args(EncoderBackend::Ffmpeg, &profile, None);
        assert_eq!(args[1], "-i");
        assert_eq!(args[2], "pipe:0");
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn recorded_tsreadex_args_append_dual_mono_flag() {
        let args = tsreadex_args_for(Some(101), 0, true);
        let positions: Vec<usize> = args.iter().enumerate().filter(|(_, a)| *a == "-b").map(|(i, _)| i).collect();
        assert_eq!(positions.len(), 2);
        assert_eq!(args[positions[1] + 1], "7");
    }

    #[test]
    fn recorded_mode_offset_sets_copyts() {
        let profile = EncoderProfile {
            width: 1280,
            height: 720,
            video_bitrate_kbps: 3000,
            video_bitrate_max_kbps: 4500,
            audio_bitrate_kbps: 128,
            is_60fps: false,
            is_hevc: false,
        };
        let args = encoder_args(EncoderBackend::Ffmpeg, &profile, Some(12.5));
        assert!(args.iter().any(|a| a == "-copyts"));
        assert!(args.iter().any(|a| a == "12.500"));
    }
}
