//! Background long-poll driver for `GetStatusNotify2`: EDCB only answers
//! this call once its internal notify counter advances past the caller's
//! `target_count`, so staying current means reopening the poll after
//! every response and backing off exponentially after every RPC error
//! rather than busy-looping against a dead daemon.

use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Runs until the process exits. Each response's `count` becomes the next
/// call's `target_count`, so the daemon always blocks until the next
/// change rather than replaying one already seen.
pub async fn run_status_notify_loop(state: Arc<AppState>) {
    let mut target_count = 0u32;
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match state.backend_client().get_status_notify2(target_count).await {
            Ok(notify) => {
                tracing::debug!(
                    notify_id = notify.notify_id,
                    count = notify.count,
                    "backend status notify"
                );
                target_count = notify.count;
                backoff = INITIAL_BACKOFF;
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    backoff_secs = backoff.as_secs(),
                    "status notify long-poll failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = INITIAL_BACKOFF;
        for _ in 0..10 {
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        assert_eq!(backoff, MAX_BACKOFF);
    }
}
