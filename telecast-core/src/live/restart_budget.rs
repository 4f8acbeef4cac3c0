//! Encoder restart budget.

use std::sync::atomic::{AtomicU32, Ordering};

pub const MAX_RETRY_COUNT: u32 = 10;

/// Every restart nudges probe size / interleave delta up slightly to
/// ride over transient parse failures; a successful `OnAir` resets the
/// counter back to zero.
#[derive(Default)]
pub struct RestartBudget {
    retries: AtomicU32,
}

impl RestartBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a restart attempt, returning `false` once the budget is
    /// exhausted (the caller must then give up and go permanently
    /// `Offline`).
    pub fn record_restart(&self) -> bool {
        let previous = self.retries.fetch_add(1, Ordering::SeqCst);
        previous + 1 <= MAX_RETRY_COUNT
    }

    pub fn record_onair(&self) {
        self.retries.store(0, Ordering::SeqCst);
    }

    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Small monotone probe-size bump applied per restart, capped so it
    /// can never dwarf a sane default read size.
    pub fn probe_size_bump(&self) -> usize {
        (self.retries() as usize * 4).min(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_allows_exactly_ten_restarts() {
        let budget = RestartBudget::new();
        for _ in 0..MAX_RETRY_COUNT {
            assert!(budget.record_restart());
        }
        assert!(!budget.record_restart());
    }

    #[test]
    fn onair_resets_the_counter() {
        let budget = RestartBudget::new();
        budget.record_restart();
        budget.record_restart();
        budget.record_onair();
        assert_eq!(budget.retries(), 0);
    }
}
