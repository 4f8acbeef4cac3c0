//! Recorded-scan task: a batch walker and a filesystem
//! watcher feed one priority queue, newest files first, so a user who
//! just finished a recording sees it appear before an old backlog
//! finishes scanning.

use super::analyzer::{AnalyzedRecording, MetadataAnalyzer};
use super::drive_limiter::DriveLimiter;
use crate::error::Result;
use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// File extensions the batch walker and watcher both recognize as
/// candidate recordings.
const RECORDING_EXTENSIONS: [&str; 3] = ["ts", "m2ts", "mp4"];

#[derive(Debug, Clone)]
pub struct PrioritizedFile {
    pub path: PathBuf,
    pub file_created_at: DateTime<Utc>,
}

impl PrioritizedFile {
    /// `priority = -file_created_at_unix`, so a min-heap
    /// over this value pops the newest file first.
    fn priority(&self) -> i64 {
        -self.file_created_at.timestamp()
    }
}

impl PartialEq for PrioritizedFile {
    fn eq(&self, other: &Self) -> bool {
        self.priority() == other.priority()
    }
}
impl Eq for PrioritizedFile {}

impl PartialOrd for PrioritizedFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedFile {
    /// `BinaryHeap` is a max-heap; reversed against `priority()` so the
    /// file with the smallest `priority()` (the newest one) compares
    /// greatest and is popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.priority().cmp(&self.priority())
    }
}

/// Pure dedup/ordering state, split out from the driving loop the same
/// way `live::supervisor` separates its decision rules from the 100 ms
/// tick. Holds no I/O.
#[derive(Default)]
struct ScanQueue {
    batch: Vec<PrioritizedFile>,
    watch_heap: BinaryHeap<PrioritizedFile>,
    processed: HashSet<PathBuf>,
}

impl ScanQueue {
    fn load_batch(&mut self, mut files: Vec<PrioritizedFile>) {
        // Ascending so the newest file (the `Ord`-greatest one) is last
        // and `Vec::pop` — not a front-removal — returns it first.
        files.sort();
        self.batch = files;
    }

    /// Drops events for paths already processed.
    fn push_watch_event(&mut self, file: PrioritizedFile) {
        if !self.processed.contains(&file.path) {
            self.watch_heap.push(file);
        }
    }

    /// Pops the heap first; if it's empty, advances the sorted batch
    /// list; skips anything already processed (guards against
    /// watcher-then-batch duplicates). `None` once both are drained.
    fn pop_next(&mut self) -> Option<PrioritizedFile> {
        loop {
            let candidate = self.watch_heap.pop().or_else(|| self.batch.pop())?;
            if !self.processed.contains(&candidate.path) {
                return Some(candidate);
            }
        }
    }

    fn mark_processed(&mut self, path: PathBuf) {
        self.processed.insert(path);
    }
}

/// Dedup outcome for one analyzed file against a lookup of already-known
/// recordings.
#[derive(Debug, PartialEq, Eq)]
pub enum DedupAction {
    /// Same hash, same path: nothing to do.
    Skip,
    /// Same hash, different path: the row's path should be updated.
    UpdatePath,
    /// New hash: insert a new row.
    Insert,
}

/// Decides what to do with a freshly analyzed file given the existing
/// path (if any) already on record for its `file_hash`.
pub fn dedup_action(existing_path_for_hash: Option<&Path>, new_path: &Path) -> DedupAction {
    match existing_path_for_hash {
        Some(existing) if existing == new_path => DedupAction::Skip,
        Some(_) => DedupAction::UpdatePath,
        None => DedupAction::Insert,
    }
}

fn is_recording_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| RECORDING_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

async fn walk_recursive(root: PathBuf, out: &mut Vec<PrioritizedFile>) -> std::io::Result<()> {
    let mut stack = vec![root];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() && is_recording_file(&path) {
                let metadata = entry.metadata().await?;
                let created = metadata.created().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                out.push(PrioritizedFile { path, file_created_at: created.into() });
            }
        }
    }
    Ok(())
}

/// Outcome of analyzing and deduping one file, handed to the caller's
/// sink so it can update whatever index it keeps of recordings.
pub struct ScanEvent {
    pub action: DedupAction,
    pub analyzed: AnalyzedRecording,
}

/// Keeps the `notify` watcher alive for the scan task's lifetime; drop
/// this to stop watching and let the task's channel close.
pub struct ScanTaskHandle {
    _watcher: RecommendedWatcher,
    join: tokio::task::JoinHandle<()>,
}

impl ScanTaskHandle {
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Starts the batch walk, the filesystem watcher, and the combined
/// processing loop. `existing_hash_lookup` resolves a file's hash to
/// whatever path is currently on record for it (if any), feeding
/// `dedup_action`. `on_event` receives each analyzed, deduped file.
pub async fn run_scan_task(
    roots: Vec<PathBuf>,
    analyzer: Arc<MetadataAnalyzer>,
    drive_limiter: Arc<DriveLimiter>,
    existing_hash_lookup: impl Fn([u8; 32]) -> Option<PathBuf> + Send + Sync + 'static,
    on_event: impl Fn(ScanEvent) + Send + Sync + 'static,
) -> Result<ScanTaskHandle> {
    let mut batch = Vec::new();
    for root in &roots {
        walk_recursive(root.clone(), &mut batch).await?;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<PrioritizedFile>();
    let watcher_tx = tx.clone();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let Ok(event) = res else { return };
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        for path in event.paths {
            if !is_recording_file(&path) {
                continue;
            }
            let created = std::fs::metadata(&path)
                .and_then(|m| m.created())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            let _ = watcher_tx.send(PrioritizedFile { path, file_created_at: created.into() });
        }
    })
    .map_err(|e| crate::error::CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    for root in &roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| crate::error::CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    }
    drop(tx);

    let mut queue = ScanQueue::default();
    queue.load_batch(batch);

    let join = tokio::spawn(async move {
        loop {
            while let Ok(file) = rx.try_recv() {
                queue.push_watch_event(file);
            }
            let Some(candidate) = queue.pop_next() else {
                match rx.recv().await {
                    Some(file) => {
                        queue.push_watch_event(file);
                        continue;
                    }
                    None => break,
                }
            };

            let permit = match drive_limiter.acquire_for(&candidate.path).await {
                Ok(permit) => permit,
                Err(_) => {
                    queue.mark_processed(candidate.path);
                    continue;
                }
            };
            let analyzed = analyzer.analyze(&candidate.path).await;
            drop(permit);
            queue.mark_processed(candidate.path.clone());

            if let Ok(analyzed) = analyzed {
                let existing = existing_hash_lookup(analyzed.recorded_video.file_hash);
                let action = dedup_action(existing.as_deref(), &candidate.path);
                if action != DedupAction::Skip {
                    on_event(ScanEvent { action, analyzed });
                }
            }
        }
    });

    Ok(ScanTaskHandle { _watcher: watcher, join })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_at(path: &str, secs: i64) -> PrioritizedFile {
        PrioritizedFile {
            path: PathBuf::from(path),
            file_created_at: DateTime::from_timestamp(secs, 0).unwrap(),
        }
    }

    #[test]
    fn batch_list_sorts_newest_first() {
        let mut queue = ScanQueue::default();
        queue.load_batch(vec![file_at("old.ts", 100), file_at("new.ts", 300), file_at("mid.ts", 200)]);
        assert_eq!(queue.pop_next().unwrap().path, PathBuf::from("new.ts"));
        assert_eq!(queue.pop_next().unwrap().path, PathBuf::from("mid.ts"));
        assert_eq!(queue.pop_next().unwrap().path, PathBuf::from("old.ts"));
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn watch_heap_takes_priority_over_batch() {
        let mut queue = ScanQueue::default();
        queue.load_batch(vec![file_at("batch.ts", 500)]);
        queue.push_watch_event(file_at("watched.ts", 100));
        assert_eq!(queue.pop_next().unwrap().path, PathBuf::from("watched.ts"));
        assert_eq!(queue.pop_next().unwrap().path, PathBuf::from("batch.ts"));
    }

    #[test]
    fn watch_event_for_processed_path_is_dropped() {
        let mut queue = ScanQueue::default();
        queue.mark_processed(PathBuf::from("seen.ts"));
        queue.push_watch_event(file_at("seen.ts", 100));
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn batch_entry_already_processed_by_watcher_is_skipped() {
        let mut queue = ScanQueue::default();
        queue.load_batch(vec![file_at("a.ts", 100)]);
        queue.mark_processed(PathBuf::from("a.ts"));
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn dedup_action_matches_spec_cases() {
        let path = PathBuf::from("/rec/a.ts");
        assert_eq!(dedup_action(Some(&path), &path), DedupAction::Skip);
        assert_eq!(dedup_action(Some(Path::new("/rec/old.ts")), &path), DedupAction::UpdatePath);
        assert_eq!(dedup_action(None, &path), DedupAction::Insert);
    }

    #[test]
    fn recognizes_known_recording_extensions_case_insensitively() {
        assert!(is_recording_file(Path::new("a.TS")));
        assert!(is_recording_file(Path::new("a.m2ts")));
        assert!(is_recording_file(Path::new("a.mp4")));
        assert!(!is_recording_file(Path::new("a.psc")));
        assert!(!is_recording_file(Path::new("a.txt")));
    }
}
