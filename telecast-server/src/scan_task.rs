//! Starts the recorded-library scan task and applies its events to
//! `AppState`'s recorded-video index — the storage layer
//! `telecast_core::scan` deliberately leaves to the caller.

use std::sync::Arc;

use telecast_core::scan::{dedup_action, run_scan_task, DedupAction};

use crate::state::AppState;

pub async fn start(state: Arc<AppState>) -> std::io::Result<()> {
    if state.config.scan.roots.is_empty() {
        tracing::info!("no scan roots configured, recorded-library scanning disabled");
        return Ok(());
    }

    let roots = state.config.scan.roots.clone();
    let analyzer = state.analyzer.clone();
    let drive_limiter = state.drive_limiter.clone();

    let lookup_state = state.clone();
    let existing_hash_lookup = move |hash: [u8; 32]| {
        lookup_state
            .recorded_video_hash_index
            .get(&hash)
            .and_then(|id| lookup_state.recorded_videos.get(&id).map(|v| v.file_path.clone()))
    };

    let event_state = state.clone();
    let on_event = move |event: telecast_core::scan::ScanEvent| {
        apply_scan_event(&event_state, event);
    };

    let handle = run_scan_task(roots, analyzer, drive_limiter, existing_hash_lookup, on_event)
        .await
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;

    *state.scan_handle.lock() = Some(handle);
    Ok(())
}

fn apply_scan_event(state: &Arc<AppState>, event: telecast_core::scan::ScanEvent) {
    let video = event.analyzed.recorded_video;
    match event.action {
        DedupAction::Skip => {}
        DedupAction::Insert => {
            state.recorded_video_hash_index.insert(video.file_hash, video.id);
            tracing::info!(path = %video.file_path.display(), "indexed new recording");
            state.recorded_videos.insert(video.id, video);
        }
        DedupAction::UpdatePath => {
            if let Some(existing_id) = state.recorded_video_hash_index.get(&video.file_hash).map(|e| *e) {
                if let Some(mut existing) = state.recorded_videos.get_mut(&existing_id) {
                    tracing::info!(
                        old = %existing.file_path.display(),
                        new = %video.file_path.display(),
                        "recording moved"
                    );
                    existing.file_path = video.file_path.clone();
                    return;
                }
            }
            state.recorded_video_hash_index.insert(video.file_hash, video.id);
            state.recorded_videos.insert(video.id, video);
        }
    }
}
