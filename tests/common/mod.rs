//! Shared test fixtures
//!
//! - `FakeStore`: in-memory `ObjectStore` that records the order of transfer
//!   start/finish events and can be told to fail or slow down specific keys
//!   and, on Linux, how many files under a watched folder are open mid-transfer
//! - `write_sparse`: creates large source files without writing their content

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use quota_uploadr::s3::{ObjectStore, StorageError};
use quota_uploadr::upload::Candidate;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::fs::File;

pub const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Started,
    Finished,
}

#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub key: String,
    pub kind: EventKind,
    pub seq: usize,
}

#[derive(Default)]
pub struct FakeStore {
    stored_bytes: u64,
    fail_size_query: bool,
    fail_keys: HashSet<String>,
    delays: HashMap<String, Duration>,
    max_jitter_ms: u64,
    watched_dir: Option<PathBuf>,
    max_open_files: AtomicUsize,
    seq: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    events: Mutex<Vec<TransferEvent>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket already holds `bytes` across all versions
    pub fn with_stored_bytes(mut self, bytes: u64) -> Self {
        self.stored_bytes = bytes;
        self
    }

    pub fn with_failing_size_query(mut self) -> Self {
        self.fail_size_query = true;
        self
    }

    pub fn with_failing_key(mut self, key: &str) -> Self {
        self.fail_keys.insert(key.to_string());
        self
    }

    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    /// Every transfer sleeps a random 0..=max_ms
    pub fn with_jitter(mut self, max_ms: u64) -> Self {
        self.max_jitter_ms = max_ms;
        self
    }

    /// Sample open handles under `dir` at the start of every transfer
    pub fn watch_open_files(mut self, dir: &Path) -> Self {
        self.watched_dir = Some(dir.canonicalize().unwrap());
        self
    }

    /// Peak number of open files under the watched folder
    pub fn max_open_files(&self) -> usize {
        self.max_open_files.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<TransferEvent> {
        self.events.lock().clone()
    }

    pub fn put_calls(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == EventKind::Started)
            .count()
    }

    pub fn uploaded_keys(&self) -> HashSet<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == EventKind::Finished)
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn event_seq(&self, key: &str, kind: EventKind) -> Option<usize> {
        self.events
            .lock()
            .iter()
            .find(|e| e.key == key && e.kind == kind)
            .map(|e| e.seq)
    }

    fn push(&self, key: &str, kind: EventKind) {
        let mut events = self.events.lock();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        events.push(TransferEvent {
            key: key.to_string(),
            kind,
            seq,
        });
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put_object(
        &self,
        _bucket: &str,
        key: &str,
        _file: File,
        size: u64,
    ) -> Result<u64, StorageError> {
        self.push(key, EventKind::Started);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(dir) = &self.watched_dir {
            self.max_open_files
                .fetch_max(open_files_under(dir), Ordering::SeqCst);
        }

        let mut delay = self.delays.get(key).copied().unwrap_or_default();
        if self.max_jitter_ms > 0 {
            delay += Duration::from_millis(rand::random_range(0..=self.max_jitter_ms));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_keys.contains(key) {
            return Err(StorageError::RequestError {
                operation: "PutObject",
                message: "injected failure".into(),
            });
        }

        self.push(key, EventKind::Finished);
        Ok(size)
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        _dest: &Path,
    ) -> Result<u64, StorageError> {
        Err(StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    async fn total_stored_bytes(&self, _bucket: &str) -> Result<u64, StorageError> {
        if self.fail_size_query {
            return Err(StorageError::RequestError {
                operation: "ListObjectVersions",
                message: "injected failure".into(),
            });
        }
        Ok(self.stored_bytes)
    }
}

/// Count this process's descriptors pointing below `dir`
fn open_files_under(dir: &Path) -> usize {
    std::fs::read_dir("/proc/self/fd")
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter_map(|entry| std::fs::read_link(entry.path()).ok())
                .filter(|target| target.starts_with(dir))
                .count()
        })
        .unwrap_or(0)
}

/// Create `dir/name` with length `size` without writing its content
pub fn write_sparse(dir: &Path, name: &str, size: u64) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(size).unwrap();
    path
}

/// Sparse files plus the matching candidates
pub fn make_candidates(dir: &Path, files: &[(&str, u64)]) -> Vec<Candidate> {
    files
        .iter()
        .map(|(name, size)| Candidate::new(write_sparse(dir, name, *size), *name, *size))
        .collect()
}
