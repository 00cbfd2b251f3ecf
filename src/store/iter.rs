//! Record iterator with deferred space reclamation
//!
//! Reading a record does not free its slot. The iterator remembers every
//! record it has yielded, and `remove_read_records` reclaims all of them at
//! once. That split lets a consumer process a record fully before its bytes
//! become reusable, so a crash between read and reclaim loses nothing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::core::StoreCore;
use super::errors::{StoreError, StoreResult};

/// Iterator over the records that were unread when it was opened, in FIFO
/// (write) order.
///
/// Records put after the iterator was opened are not yielded. The iterator
/// takes the store lock only for the duration of each call, so producers
/// keep making progress while a consumer drains slowly.
///
/// Record lifecycle: a record yielded by [`next_record`](Self::next_record)
/// is read-pending until [`remove_read_records`](Self::remove_read_records)
/// physically reclaims its slot.
pub struct RecordIter {
    core: Arc<Mutex<StoreCore>>,
    /// Sequence numbers not yet yielded, oldest first.
    queue: VecDeque<u64>,
    /// Sequence numbers yielded but not yet reclaimed.
    read_pending: Vec<u64>,
}

impl RecordIter {
    pub(crate) fn new(core: Arc<Mutex<StoreCore>>, snapshot: Vec<u64>) -> Self {
        Self {
            core,
            queue: snapshot.into(),
            read_pending: Vec::new(),
        }
    }

    /// Whether the iterator may yield another record.
    ///
    /// This is an upper-bound check: a queued record can still disappear if
    /// another iterator reclaims it first, in which case `next_record`
    /// skips it and may return `None` despite `has_next` being true.
    pub fn has_next(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Yields the next unread record's payload, marking it read-pending.
    ///
    /// The payload checksum is verified on every read.
    ///
    /// # Errors
    ///
    /// - `CAPSTORE_READ_FAILED` on I/O failure
    /// - `CAPSTORE_CORRUPTION` if the stored record fails verification
    pub fn next_record(&mut self) -> StoreResult<Option<Vec<u8>>> {
        while let Some(seq) = self.queue.pop_front() {
            let payload = {
                let mut core = self
                    .core
                    .lock()
                    .map_err(|_| StoreError::lock_poisoned())?;
                core.read_by_seq(seq)?
            };
            match payload {
                Some(payload) => {
                    self.read_pending.push(seq);
                    return Ok(Some(payload));
                }
                // Reclaimed by another iterator since the snapshot; skip.
                None => continue,
            }
        }
        Ok(None)
    }

    /// Number of records yielded but not yet reclaimed.
    pub fn read_count(&self) -> usize {
        self.read_pending.len()
    }

    /// Physically reclaims the slots of all records this iterator has
    /// yielded, making their space available to future puts. Adjacent freed
    /// slots are coalesced and trailing free space is truncated off the
    /// file.
    ///
    /// Idempotent: calling again with no new reads is a no-op and returns 0.
    /// Safe to call while other threads are putting records.
    ///
    /// Returns the number of slot bytes returned to the free pool.
    pub fn remove_read_records(&mut self) -> StoreResult<u64> {
        if self.read_pending.is_empty() {
            return Ok(0);
        }

        let freed = {
            let mut core = self
                .core
                .lock()
                .map_err(|_| StoreError::lock_poisoned())?;
            core.reclaim(&self.read_pending)?
        };

        // Only forget the pending set once reclamation fully succeeded; a
        // retry after an I/O error re-marks the same records, which is safe
        // because reclaim skips sequences that are already free.
        self.read_pending.clear();
        Ok(freed)
    }
}
