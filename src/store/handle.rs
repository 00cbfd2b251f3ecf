//! Public record store handle
//!
//! `RecordStore` is the concurrency boundary: it wraps the slot engine in
//! one mutex and hands out cheap clones, so multiple producer threads and a
//! consumer thread can share a single store instance. Every operation that
//! mutates file layout (put, reclamation, truncation) runs under that lock;
//! a `put` simply blocks while another thread holds it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::StoreConfig;
use crate::observability::{MetricsSnapshot, StoreMetrics};

use super::core::StoreCore;
use super::errors::{StoreError, StoreResult};
use super::iter::RecordIter;

/// Receipt for a successfully written record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHandle {
    seq: u64,
    payload_len: u32,
}

impl RecordHandle {
    pub(crate) fn new(seq: u64, payload_len: u32) -> Self {
        Self { seq, payload_len }
    }

    /// The record's persistent sequence number. Sequence numbers start at 1,
    /// increase monotonically, and are never reused, even across reopen.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    /// Length of the stored payload in bytes.
    pub fn payload_len(&self) -> u32 {
        self.payload_len
    }
}

/// A single-file, size-bounded record store.
///
/// Cloning is cheap and clones share the same backing file and lock, which
/// is the intended way to hand the store to another thread. Exactly one
/// `RecordStore` lineage should own a given file per process.
///
/// # Durability
///
/// With `sync_writes` enabled (the default) a record is fsynced to disk
/// before `put` returns.
#[derive(Clone, Debug)]
pub struct RecordStore {
    core: Arc<Mutex<StoreCore>>,
    metrics: Arc<StoreMetrics>,
    max_size: u64,
}

impl RecordStore {
    /// Opens or creates the store described by `config`.
    ///
    /// # Errors
    ///
    /// - `CAPSTORE_CONFIG_MISMATCH` if the config is invalid or the file was
    ///   created with a different cap
    /// - `CAPSTORE_CORRUPTION` if an existing file fails the opening scan
    /// - `CAPSTORE_IO_ERROR` on underlying I/O failure
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        config
            .validate()
            .map_err(|e| StoreError::config_mismatch(e.to_string()))?;
        let metrics = Arc::new(StoreMetrics::new());
        let core = StoreCore::open(config, Arc::clone(&metrics))?;
        Ok(Self {
            core: Arc::new(Mutex::new(core)),
            metrics,
            max_size: config.max_size_bytes,
        })
    }

    /// Opens or creates a store at `directory/filename` with the given byte
    /// cap and synchronous writes.
    pub fn create(
        directory: impl AsRef<Path>,
        filename: &str,
        max_size_bytes: u64,
    ) -> StoreResult<Self> {
        Self::open(&StoreConfig::new(directory.as_ref(), filename, max_size_bytes))
    }

    /// Writes a record.
    ///
    /// The record lands in a reclaimed slot when one is large enough,
    /// otherwise it is appended, and the file never grows past the cap.
    ///
    /// # Errors
    ///
    /// - `CAPSTORE_CAPACITY_EXCEEDED` if the record cannot fit within the
    ///   cap even after reclamation; the caller may retry once a consumer
    ///   has called `remove_read_records`
    /// - `CAPSTORE_WRITE_FAILED` on I/O failure; the store remains usable
    pub fn put(&self, payload: &[u8]) -> StoreResult<RecordHandle> {
        let mut core = self.lock()?;
        let seq = core.put(payload)?;
        Ok(RecordHandle::new(seq, payload.len() as u32))
    }

    /// Opens an iterator over the records currently unread, oldest first.
    ///
    /// The iterator snapshots the set of live records at this call: records
    /// put afterwards are NOT yielded by this iterator (open a new one to
    /// see them). Records reclaimed by another iterator while this one is
    /// open are silently skipped.
    pub fn iter(&self) -> StoreResult<RecordIter> {
        let core = self.lock()?;
        let snapshot = core.snapshot_live_seqs();
        Ok(RecordIter::new(Arc::clone(&self.core), snapshot))
    }

    /// Current size of the backing file in bytes.
    pub fn file_size(&self) -> StoreResult<u64> {
        Ok(self.lock()?.file_size())
    }

    /// The byte cap fixed at creation.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Number of unread records.
    pub fn record_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.record_count())
    }

    /// Bytes held in reclaimed slots, reusable by future puts.
    pub fn free_bytes(&self) -> StoreResult<u64> {
        Ok(self.lock()?.free_bytes())
    }

    /// Flushes all file state to disk. Useful as a clean-shutdown step when
    /// `sync_writes` is disabled.
    pub fn sync(&self) -> StoreResult<()> {
        self.lock()?.sync()
    }

    /// Point-in-time snapshot of the store's operational counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreCore>> {
        self.core.lock().map_err(|_| StoreError::lock_poisoned())
    }
}
