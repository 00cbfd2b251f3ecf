//! Operational counters for the record store
//!
//! Counters only, monotonic, reset on process start. All values are exact.
//! Atomic with Relaxed ordering: metrics never need to synchronize with the
//! store mutex.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter registry shared by a store and its iterators.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Records successfully written by put
    records_written: AtomicU64,
    /// Payload bytes successfully written by put
    bytes_written: AtomicU64,
    /// Puts that landed in a reclaimed slot instead of appending
    slots_reused: AtomicU64,
    /// Records physically reclaimed
    records_reclaimed: AtomicU64,
    /// Slot bytes returned to the free pool
    bytes_reclaimed: AtomicU64,
    /// Puts rejected because no space fit under the cap
    capacity_rejections: AtomicU64,
    /// Times trailing free space was truncated off the file
    truncations: AtomicU64,
}

impl StoreMetrics {
    /// Create a registry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful put of `payload_bytes`.
    pub fn record_put(&self, payload_bytes: u64, reused_slot: bool) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(payload_bytes, Ordering::Relaxed);
        if reused_slot {
            self.slots_reused.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record reclamation of one slot of `slot_bytes`.
    pub fn record_reclaim(&self, slot_bytes: u64) {
        self.records_reclaimed.fetch_add(1, Ordering::Relaxed);
        self.bytes_reclaimed.fetch_add(slot_bytes, Ordering::Relaxed);
    }

    /// Record a put rejected with CAPSTORE_CAPACITY_EXCEEDED.
    pub fn record_capacity_rejection(&self) {
        self.capacity_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tail truncation.
    pub fn record_truncation(&self) {
        self.truncations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_written: self.records_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            slots_reused: self.slots_reused.load(Ordering::Relaxed),
            records_reclaimed: self.records_reclaimed.load(Ordering::Relaxed),
            bytes_reclaimed: self.bytes_reclaimed.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            truncations: self.truncations.load(Ordering::Relaxed),
        }
    }

    /// Get all counters as JSON.
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"records_written":{},"bytes_written":{},"slots_reused":{},"records_reclaimed":{},"bytes_reclaimed":{},"capacity_rejections":{},"truncations":{}}}"#,
            s.records_written,
            s.bytes_written,
            s.slots_reused,
            s.records_reclaimed,
            s.bytes_reclaimed,
            s.capacity_rejections,
            s.truncations,
        )
    }
}

/// A point-in-time snapshot of all store counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_written: u64,
    pub bytes_written: u64,
    pub slots_reused: u64,
    pub records_reclaimed: u64,
    pub bytes_reclaimed: u64,
    pub capacity_rejections: u64,
    pub truncations: u64,
}
