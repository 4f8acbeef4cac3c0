//! The Writer/SubWriter shared flush buffer.
//!
//! Writer appends exactly-188-byte reads and flushes once the buffer
//! reaches 64 KiB; SubWriter ticks every 25 ms and flushes whatever is
//! buffered if that much time has passed since the last flush (this is
//! the only path radio channels, which rarely fill 64 KiB, ever flush
//! through). Both share one lock so two partial flushes can never
//! interleave into a corrupt chunk boundary.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub const FLUSH_THRESHOLD_BYTES: usize = 64 * 1024;
pub const SUBWRITER_INTERVAL: Duration = Duration::from_millis(25);

struct Inner {
    buffer: Vec<u8>,
    last_flush: Instant,
}

pub struct WriterBuffer {
    inner: Mutex<Inner>,
}

impl WriterBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { buffer: Vec::new(), last_flush: Instant::now() }),
        }
    }

    /// Appends one 188-byte TS packet. Returns the flushed bytes if this
    /// push crossed `FLUSH_THRESHOLD_BYTES`.
    pub fn push_packet(&self, packet: &[u8]) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.buffer.extend_from_slice(packet);
        if inner.buffer.len() >= FLUSH_THRESHOLD_BYTES {
            inner.last_flush = Instant::now();
            Some(std::mem::take(&mut inner.buffer))
        } else {
            None
        }
    }

    /// SubWriter's 25 ms tick: flushes whatever is buffered if the
    /// interval has elapsed, even if under the size threshold.
    pub fn tick(&self, now: Instant) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        if inner.buffer.is_empty() {
            return None;
        }
        if now.duration_since(inner.last_flush) >= SUBWRITER_INTERVAL {
            inner.last_flush = now;
            Some(std::mem::take(&mut inner.buffer))
        } else {
            None
        }
    }
}

impl Default for WriterBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_once_64kib_threshold_is_crossed() {
        let buf = WriterBuffer::new();
        let packet = [0u8; 188];
        let mut flushed = None;
        for _ in 0..(FLUSH_THRESHOLD_BYTES / 188 + 1) {
            if let Some(bytes) = buf.push_packet(&packet) {
                flushed = Some(bytes);
                break;
            }
        }
        assert!(flushed.unwrap().len() >= FLUSH_THRESHOLD_BYTES);
    }

    #[test]
    fn subwriter_flushes_small_buffer_after_interval_elapses() {
        let buf = WriterBuffer::new();
        buf.push_packet(&[0u8; 188]);
        assert!(buf.tick(Instant::now()).is_none());
        let later = Instant::now() + SUBWRITER_INTERVAL + Duration::from_millis(1);
        assert_eq!(buf.tick(later).unwrap().len(), 188);
    }

    #[test]
    fn tick_on_empty_buffer_is_a_noop() {
        let buf = WriterBuffer::new();
        assert!(buf.tick(Instant::now() + SUBWRITER_INTERVAL).is_none());
    }
}
