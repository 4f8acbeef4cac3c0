//! Per-drive I/O concurrency limiter: one counting
//! semaphore per physical device, so a batch scan of a library spread
//! across several mounts doesn't thrash a single spinning disk.

use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default concurrent metadata jobs allowed per device.
const DEFAULT_PERMITS: usize = 1;

#[derive(Default)]
pub struct DriveLimiter {
    devices: DashMap<u64, Arc<Semaphore>>,
}

impl DriveLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the permit for whichever device `path` resolves to,
    /// creating that device's semaphore on first use. The permit is owned
    /// so it can be held across the caller's own `.await` points without
    /// borrowing from `self` or from the `DashMap` entry guard.
    pub async fn acquire_for(&self, path: &Path) -> std::io::Result<OwnedSemaphorePermit> {
        let device_id = device_id(path)?;
        let semaphore = self
            .devices
            .entry(device_id)
            .or_insert_with(|| Arc::new(Semaphore::new(DEFAULT_PERMITS)))
            .clone();
        Ok(semaphore.acquire_owned().await.expect("semaphore never closed"))
    }
}

#[cfg(unix)]
fn device_id(path: &Path) -> std::io::Result<u64> {
    use std::os::unix::fs::MetadataExt;
    Ok(std::fs::metadata(path)?.dev())
}

#[cfg(not(unix))]
fn device_id(_path: &Path) -> std::io::Result<u64> {
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_file_shares_one_semaphore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ts");
        tokio::fs::write(&path, b"x").await.unwrap();

        let limiter = DriveLimiter::new();
        let first = limiter.acquire_for(&path).await.unwrap();
        assert_eq!(limiter.devices.len(), 1);
        drop(first);
    }

    #[tokio::test]
    async fn second_acquire_waits_for_first_to_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ts");
        tokio::fs::write(&path, b"x").await.unwrap();

        let limiter = Arc::new(DriveLimiter::new());
        let first = limiter.acquire_for(&path).await.unwrap();

        let limiter2 = limiter.clone();
        let path2 = path.clone();
        let waiter = tokio::spawn(async move { limiter2.acquire_for(&path2).await.unwrap() });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = waiter.await.unwrap();
        drop(second);
    }
}
