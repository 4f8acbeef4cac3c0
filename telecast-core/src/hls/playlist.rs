//! LL-HLS playlist state: a 10-segment sliding window plus the partial
//! segments of the in-progress one, and the blocking-playlist-request
//! primitive (`_HLS_msn`/`_HLS_part`).

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

pub const TARGET_WINDOW_SEGMENTS: usize = 10;
pub const PARTIAL_TARGET_DURATION: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct Partial {
    pub index: u32,
    pub data: Bytes,
    pub duration: f64,
    pub independent: bool,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub sequence: u64,
    pub partials: Vec<Partial>,
    pub program_date_time: DateTime<Utc>,
    pub duration: f64,
}

impl Segment {
    /// The concatenation of a segment's partials equals the segment's
    /// bytes.
    pub fn concatenated_bytes(&self) -> Vec<u8> {
        self.partials.iter().flat_map(|p| p.data.iter().copied()).collect()
    }
}

struct Inner {
    segments: VecDeque<Segment>,
    /// Sequence number of the first entry in `segments`.
    media_sequence: u64,
    /// The segment currently accumulating partials, not yet finalized.
    in_progress: Option<Segment>,
    target_duration_secs: u32,
    ended: bool,
}

/// One of the two logical playlists a single encoded TS drives (primary
/// audio / secondary audio, e.g. for dual-language broadcasts).
pub struct Playlist {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Playlist {
    pub fn new(target_duration_secs: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                segments: VecDeque::new(),
                media_sequence: 0,
                in_progress: None,
                target_duration_secs,
                ended: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Starts a new segment (called at an IDR boundary).
    pub fn begin_segment(&self, sequence: u64, program_date_time: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.in_progress = Some(Segment { sequence, partials: Vec::new(), program_date_time, duration: 0.0 });
    }

    /// Appends a partial to the in-progress segment and wakes any blocked
    /// playlist/part request that was waiting on exactly this one.
    pub fn push_partial(&self, partial: Partial) {
        {
            let mut inner = self.inner.lock();
            if let Some(segment) = inner.in_progress.as_mut() {
                segment.duration += partial.duration;
                segment.partials.push(partial);
            }
        }
        self.notify.notify_waiters();
    }

    /// Finalizes the in-progress segment into the window, evicting the
    /// oldest entry once the window exceeds `TARGET_WINDOW_SEGMENTS`.
    pub fn finalize_segment(&self) {
        let mut inner = self.inner.lock();
        if let Some(segment) = inner.in_progress.take() {
            inner.segments.push_back(segment);
            while inner.segments.len() > TARGET_WINDOW_SEGMENTS {
                inner.segments.pop_front();
                inner.media_sequence += 1;
            }
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn mark_ended(&self) {
        self.inner.lock().ended = true;
        self.notify.notify_waiters();
    }

    fn has_part(&self, msn: u64, part: u32) -> bool {
        let inner = self.inner.lock();
        if let Some(segment) = inner.segments.iter().find(|s| s.sequence == msn) {
            return segment.partials.iter().any(|p| p.index >= part) || inner.segments.back().map(|s| s.sequence).unwrap_or(0) > msn;
        }
        if let Some(in_progress) = &inner.in_progress {
            if in_progress.sequence == msn {
                return in_progress.partials.iter().any(|p| p.index >= part);
            }
        }
        inner.segments.iter().any(|s| s.sequence > msn) || inner.ended
    }

    /// Blocks until segment `msn`'s partial `part` exists (or the stream
    /// ends), implementing the `_HLS_msn`/`_HLS_part` blocking-reload
    /// contract. There is no server-side timeout — the caller's HTTP
    /// client timeout is the only bound.
    pub async fn await_part(&self, msn: u64, part: u32) {
        loop {
            if self.has_part(msn, part) {
                return;
            }
            let notified = self.notify.notified();
            if self.has_part(msn, part) {
                return;
            }
            notified.await;
        }
    }

    pub fn segment(&self, sequence: u64) -> Option<Segment> {
        self.inner.lock().segments.iter().find(|s| s.sequence == sequence).cloned()
    }

    pub fn partial(&self, sequence: u64, index: u32) -> Option<Partial> {
        self.segment(sequence)?.partials.into_iter().find(|p| p.index == index)
    }

    /// Renders the current media playlist as `EXT-X-*` text.
    pub fn render(&self, name_prefix: &str) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        out.push_str("#EXT-X-VERSION:9\n");
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", inner.target_duration_secs));
        out.push_str(&format!(
            "#EXT-X-PART-INF:PART-TARGET={:.3}\n",
            PARTIAL_TARGET_DURATION
        ));
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", inner.media_sequence));
        out.push_str("#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,PART-HOLD-BACK=1.0\n");

        for segment in inner.segments.iter() {
            out.push_str(&format!(
                "#EXT-X-PROGRAM-DATE-TIME:{}\n",
                segment.program_date_time.to_rfc3339()
            ));
            for partial in &segment.partials {
                out.push_str(&format!(
                    "#EXT-X-PART:DURATION={:.3},URI=\"part/{}/{}.m4s\"{}\n",
                    partial.duration,
                    segment.sequence,
                    partial.index,
                    if partial.independent { ",INDEPENDENT=YES" } else { "" }
                ));
            }
            out.push_str(&format!("#EXTINF:{:.3},\n", segment.duration));
            out.push_str(&format!("segment/{}.m4s\n", segment.sequence));
        }

        if let Some(in_progress) = &inner.in_progress {
            for partial in &in_progress.partials {
                out.push_str(&format!(
                    "#EXT-X-PART:DURATION={:.3},URI=\"part/{}/{}.m4s\"{}\n",
                    partial.duration,
                    in_progress.sequence,
                    partial.index,
                    if partial.independent { ",INDEPENDENT=YES" } else { "" }
                ));
            }
        }

        if inner.ended {
            out.push_str("#EXT-X-ENDLIST\n");
        }
        out
    }
}

pub type SharedPlaylist = Arc<Playlist>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_partial(index: u32, bytes: &[u8]) -> Partial {
        Partial { index, data: Bytes::copy_from_slice(bytes), duration: 0.5, independent: index == 0 }
    }

    #[tokio::test]
    async fn await_part_returns_immediately_once_already_present() {
        let playlist = Playlist::new(6);
        playlist.begin_segment(5, Utc::now());
        playlist.push_partial(sample_partial(0, b"abcd"));
        tokio::time::timeout(std::time::Duration::from_millis(50), playlist.await_part(5, 0))
            .await
            .expect("should not block");
    }

    #[tokio::test]
    async fn await_part_blocks_until_partial_is_pushed() {
        let playlist = Arc::new(Playlist::new(6));
        playlist.begin_segment(5, Utc::now());
        let waiter_playlist = playlist.clone();
        let waiter = tokio::spawn(async move { waiter_playlist.await_part(5, 0).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        playlist.push_partial(sample_partial(0, b"abcd"));
        tokio::time::timeout(std::time::Duration::from_millis(200), waiter)
            .await
            .expect("waiter should complete")
            .unwrap();
    }

    #[test]
    fn window_evicts_oldest_segment_past_ten() {
        let playlist = Playlist::new(2);
        for i in 0..12u64 {
            playlist.begin_segment(i, Utc::now());
            playlist.push_partial(sample_partial(0, b"x"));
            playlist.finalize_segment();
        }
        let inner = playlist.inner.lock();
        assert_eq!(inner.segments.len(), TARGET_WINDOW_SEGMENTS);
        assert_eq!(inner.segments.front().unwrap().sequence, 2);
        assert_eq!(inner.media_sequence, 2);
    }

    #[test]
    fn segment_concatenation_equals_partial_bytes_joined() {
        let playlist = Playlist::new(6);
        playlist.begin_segment(0, Utc::now());
        playlist.push_partial(sample_partial(0, b"ab"));
        playlist.push_partial(sample_partial(1, b"cd"));
        playlist.finalize_segment();
        let segment = playlist.segment(0).unwrap();
        assert_eq!(segment.concatenated_bytes(), b"abcd");
    }
}
