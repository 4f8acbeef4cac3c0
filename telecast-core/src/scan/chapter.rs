//! CM-section detection from an OGM-style chapter sidecar
//! (`<stem>.chapter.txt`), written by some third-party capture tools
//! alongside a recording. No in-stream CM detector exists; a missing
//! sidecar simply yields no CM sections.

use crate::model::recorded_video::CmSection;
use std::path::Path;

/// Chapters whose name starts with this prefix mark a CM break.
const CM_CHAPTER_PREFIX: &str = "CM";

struct Chapter {
    name: String,
    time_seconds: f64,
}

fn time_to_seconds(time: &str) -> Option<f64> {
    let mut parts = time.trim().splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parses `CHAPTERnn=HH:MM:SS.mmm` / `CHAPTERnnNAME=...` line pairs,
/// dropping any chapter whose time exceeds `duration_seconds`.
fn parse_chapters(contents: &str, duration_seconds: f64) -> Vec<Chapter> {
    let lines: Vec<&str> = contents.lines().collect();
    let mut chapters = Vec::new();

    let mut i = 0;
    while i + 1 < lines.len() {
        let time_line = lines[i].trim();
        let name_line = lines[i + 1].trim();
        i += 2;

        if !time_line.starts_with("CHAPTER") || !name_line.starts_with("CHAPTER") || !name_line.contains("NAME") {
            continue;
        }

        let Some((_, time_value)) = time_line.split_once('=') else { continue };
        let Some((_, name_value)) = name_line.split_once('=') else { continue };

        let Some(time_seconds) = time_to_seconds(time_value) else { continue };
        if time_seconds > duration_seconds {
            continue;
        }

        chapters.push(Chapter { name: name_value.to_string(), time_seconds });
    }

    chapters
}

/// Turns a chapter list into CM sections: every run of consecutive
/// `CM`-prefixed chapters becomes one section spanning from its first
/// chapter's time to the next non-`CM` chapter's time (or to
/// `duration_seconds` if the recording ends mid-CM-run).
fn cm_sections_from_chapters(chapters: &[Chapter], duration_seconds: f64) -> Vec<CmSection> {
    let mut sections = Vec::new();
    let mut current_start: Option<f64> = None;

    for chapter in chapters {
        let is_cm = chapter.name.starts_with(CM_CHAPTER_PREFIX);
        match (is_cm, current_start) {
            (true, None) => current_start = Some(chapter.time_seconds),
            (false, Some(start)) => {
                sections.push(CmSection { start_seconds: start, end_seconds: chapter.time_seconds });
                current_start = None;
            }
            _ => {}
        }
    }

    if let Some(start) = current_start {
        sections.push(CmSection { start_seconds: start, end_seconds: duration_seconds });
    }

    sections
}

/// Looks for `<stem>.chapter.txt` beside `path` and parses it into CM
/// sections; returns an empty list if the sidecar is absent or
/// unreadable.
pub async fn detect_cm_sections(path: &Path, duration_seconds: f64) -> Vec<CmSection> {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { return Vec::new() };
    let chapter_path = path.with_file_name(format!("{stem}.chapter.txt"));

    let contents = match tokio::fs::read_to_string(&chapter_path).await {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };

    let chapters = parse_chapters(&contents, duration_seconds);
    cm_sections_from_chapters(&chapters, duration_seconds)
}
