//! Process-wide `LiveStream` registry.

use super::stream::LiveStream;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct LiveStreamRegistry {
    streams: DashMap<String, Arc<LiveStream>>,
}

impl LiveStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing `LiveStream` for `identity`, creating one
    /// (starting `Offline`) if this is the first connection ever made to
    /// it.
    pub fn get_or_create(&self, identity: &str) -> Arc<LiveStream> {
        self.streams
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(LiveStream::new(identity.to_string())))
            .clone()
    }

    pub fn get(&self, identity: &str) -> Option<Arc<LiveStream>> {
        self.streams.get(identity).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::stream::ClientKind;

    #[test]
    fn get_or_create_returns_the_same_instance() {
        let registry = LiveStreamRegistry::new();
        let a = registry.get_or_create("gr011-1080p");
        let b = registry.get_or_create("gr011-1080p");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_identities_never_collide() {
        let registry = LiveStreamRegistry::new();
        let a = registry.get_or_create("gr011-1080p");
        let b = registry.get_or_create("gr012-1080p");
        a.connect(ClientKind::Mpegts, None, || {});
        assert_eq!(a.client_count(), 1);
        assert_eq!(b.client_count(), 0);
    }
}
