//! Encoder stderr log classifier.
//!
//! A small ordered pattern table: the first matching substring wins,
//! covering the full encoder family this system supervises (FFmpeg,
//! QSVEncC, NVEncC, VCEEncC, rkmppenc all share enough vocabulary —
//! "frame=", stream errors — that one table covers them).

use crate::live::stream::LiveStreamStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogClassification {
    /// A transition to report via `LiveStream::set_status`.
    Status(LiveStreamStatus, String),
    /// The hardware/profile combination cannot ever succeed; do not
    /// retry.
    Fatal(String),
}

struct Rule {
    needle: &'static str,
    classify: fn(&str) -> LogClassification,
}

const RULES: &[Rule] = &[
    Rule {
        needle: "arib parser was created",
        classify: |_| {
            LogClassification::Status(LiveStreamStatus::Standby, "エンコードを開始しています".into())
        },
    },
    Rule {
        needle: "Application startup complete",
        classify: |_| LogClassification::Status(LiveStreamStatus::OnAir, String::new()),
    },
    Rule {
        needle: "frame=",
        classify: |_| LogClassification::Status(LiveStreamStatus::OnAir, String::new()),
    },
    Rule {
        needle: "HEVC encoding is not supported on current platform",
        classify: |_| LogClassification::Fatal("HEVC unsupported on this hardware".into()),
    },
    Rule {
        needle: "Stream map '0:v:0' matches no streams",
        classify: |_| {
            LogClassification::Status(LiveStreamStatus::Offline, "放送休止".into())
        },
    },
];

/// Classifies one line of encoder stderr, or `None` if nothing matches
/// (the caller simply logs the line and keeps waiting).
pub fn classify_log_line(line: &str) -> Option<LogClassification> {
    RULES
        .iter()
        .find(|rule| line.contains(rule.needle))
        .map(|rule| (rule.classify)(line))
}
