//! Encoder restart-budget scenario: a repeatedly crashing encoder gets
//! exactly ten restart attempts before the stream is treated as
//! permanently offline.

use telecast_core::live::{RestartBudget, MAX_RETRY_COUNT};

#[test]
fn ten_restarts_are_allowed_then_the_budget_is_exhausted() {
    let budget = RestartBudget::new();
    let mut allowed = 0;
    for _ in 0..(MAX_RETRY_COUNT + 5) {
        if budget.record_restart() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, MAX_RETRY_COUNT as usize);
    assert_eq!(budget.retries(), MAX_RETRY_COUNT + 5);
}

#[test]
fn a_clean_onair_resets_the_budget() {
    let budget = RestartBudget::new();
    for _ in 0..3 {
        budget.record_restart();
    }
    assert_eq!(budget.retries(), 3);
    budget.record_onair();
    assert_eq!(budget.retries(), 0);
}
