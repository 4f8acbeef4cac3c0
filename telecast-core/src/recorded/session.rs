//! Recorded-video playback session: per-segment futures fed by one encoder-driver task,
//! with look-ahead cancellation when a client jumps forward.

use super::plan::SegmentPlan;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// How far behind the most recently requested segment the in-flight
/// encoder may lag before a new request cancels and restarts it.
pub const LOOK_AHEAD_SEGMENTS: usize = 3;

struct SegmentSlot {
    bytes: Mutex<Option<Bytes>>,
    notify: Notify,
}

impl SegmentSlot {
    fn new() -> Self {
        Self { bytes: Mutex::new(None), notify: Notify::new() }
    }

    fn complete(&self, bytes: Bytes) {
        *self.bytes.lock() = Some(bytes);
        self.notify.notify_waiters();
    }

    fn get(&self) -> Option<Bytes> {
        self.bytes.lock().clone()
    }

    /// Blocks until this segment's bytes are available or the session is
    /// cancelled.
    async fn await_bytes(&self) -> Option<Bytes> {
        loop {
            if let Some(b) = self.get() {
                return Some(b);
            }
            let notified = self.notify.notified();
            if let Some(b) = self.get() {
                return Some(b);
            }
            notified.await;
        }
    }
}

/// Tracks, for one open playback session, which segment the encoder is
/// currently producing and whether the caller asked it to stop.
pub struct RecordedSession {
    plans: Vec<SegmentPlan>,
    slots: Vec<SegmentSlot>,
    cursor: AtomicUsize,
    cancelled: AtomicBool,
    /// Bumped every time `request_segment` decides the in-flight encoder
    /// must restart elsewhere; the encoder-driver task checks this to know
    /// its current run has been superseded.
    generation: AtomicUsize,
}

impl RecordedSession {
    pub fn new(plans: Vec<SegmentPlan>) -> Arc<Self> {
        let slots = plans.iter().map(|_| SegmentSlot::new()).collect();
        Arc::new(Self {
            plans,
            slots,
            cursor: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            generation: AtomicUsize::new(0),
        })
    }

    pub fn plan(&self) -> &[SegmentPlan] {
        &self.plans
    }

    pub fn segment_count(&self) -> usize {
        self.plans.len()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::SeqCst)
    }

    /// Records that the encoder is now producing `index`. Panics are
    /// avoided by clamping: callers only pass indices the encoder driver
    /// itself produced.
    pub fn set_cursor(&self, index: usize) {
        self.cursor.store(index, Ordering::SeqCst);
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Delivers the finished bytes for segment `index` and wakes any
    /// client blocked on it.
    pub fn complete_segment(&self, index: usize, bytes: Bytes) {
        if let Some(slot) = self.slots.get(index) {
            slot.complete(bytes);
        }
    }

    /// A request for segment n cancels the in-flight encoder if it is
    /// encoding segment m < n - look-ahead, and restarts from n.
    /// Returns `Some(n)` if the caller must spawn a fresh
    /// encoder-driver run starting at `n`; `None` if the existing run will
    /// reach `n` within the look-ahead window on its own.
    pub fn request_segment(&self, index: usize) -> Option<usize> {
        let m = self.cursor();
        if index >= m && index.saturating_sub(m) <= LOOK_AHEAD_SEGMENTS {
            return None;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        Some(index)
    }

    /// Blocks the caller until segment `index`'s bytes are ready. Returns
    /// `None` for an out-of-range index.
    pub async fn segment_bytes(&self, index: usize) -> Option<Bytes> {
        let slot = self.slots.get(index)?;
        slot.await_bytes().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plans(n: usize) -> Vec<SegmentPlan> {
        (0..n)
            .map(|i| SegmentPlan { start_file_position: i as u64 * 1000, start_dts: i as u64 * 900_000, duration_seconds: 10.0 })
            .collect()
    }

    #[tokio::test]
    async fn segment_bytes_resolves_once_completed() {
        let session = RecordedSession::new(plans(3));
        session.complete_segment(1, Bytes::from_static(b"abc"));
        let bytes = session.segment_bytes(1).await.unwrap();
        assert_eq!(&bytes[..], b"abc");
    }

    #[test]
    fn out_of_range_segment_is_none() {
        let session = RecordedSession::new(plans(2));
        assert!(session.slots.get(5).is_none());
    }

    #[test]
    fn request_within_lookahead_does_not_restart() {
        let session = RecordedSession::new(plans(10));
        session.set_cursor(2);
        assert_eq!(session.request_segment(4), None);
    }

    #[test]
    fn request_beyond_lookahead_restarts_at_requested_index() {
        let session = RecordedSession::new(plans(10));
        session.set_cursor(2);
        assert_eq!(session.request_segment(8), Some(8));
    }

    #[test]
    fn request_before_cursor_restarts() {
        let session = RecordedSession::new(plans(10));
        session.set_cursor(5);
        assert_eq!(session.request_segment(0), Some(0));
    }

    #[tokio::test]
    async fn waiter_unblocks_when_segment_completes_later() {
        let session = RecordedSession::new(plans(2));
        let waiter = session.clone();
        let handle = tokio::spawn(async move { waiter.segment_bytes(0).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        session.complete_segment(0, Bytes::from_static(b"done"));
        let result = tokio::time::timeout(std::time::Duration::from_millis(200), handle).await.unwrap().unwrap();
        assert_eq!(result.unwrap(), Bytes::from_static(b"done"));
    }
}
