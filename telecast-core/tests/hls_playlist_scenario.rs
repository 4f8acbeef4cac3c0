//! LL-HLS blocking-playlist-request scenario: a request for a partial
//! that doesn't exist yet blocks until it's produced, then returns.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use telecast_core::hls::{Partial, Playlist};

fn partial(index: u32) -> Partial {
    Partial { index, data: Bytes::from_static(b"x"), duration: 0.5, independent: index == 0 }
}

#[tokio::test]
async fn await_part_blocks_until_the_partial_is_pushed() {
    let playlist = Arc::new(Playlist::new(4));
    playlist.begin_segment(5, Utc::now());

    let waiter_playlist = playlist.clone();
    let waiter = tokio::spawn(async move {
        waiter_playlist.await_part(5, 0).await;
    });

    // Give the waiter a chance to block before the partial exists.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    playlist.push_partial(partial(0));

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("await_part should resolve once the partial exists")
        .unwrap();
}

#[tokio::test]
async fn finalized_segment_concatenates_its_partials_in_order() {
    let playlist = Playlist::new(4);
    playlist.begin_segment(5, Utc::now());
    playlist.push_partial(Partial { index: 0, data: Bytes::from_static(b"ab"), duration: 0.5, independent: true });
    playlist.push_partial(Partial { index: 1, data: Bytes::from_static(b"cd"), duration: 0.5, independent: false });
    playlist.finalize_segment();

    let segment = playlist.segment(5).expect("segment 5 should be present after finalize");
    assert_eq!(segment.concatenated_bytes(), b"abcd".to_vec());
}
