//! Size-bounded single-file record store
//!
//! One backing file holds a sequence of length-prefixed, checksummed slots.
//! Producers append records with `put`; a consumer drains them through a
//! FIFO iterator and reclaims their space with `remove_read_records`.
//!
//! # Invariants Enforced
//!
//! - The file never grows past the cap fixed at creation: a put that cannot
//!   fit fails with `CAPSTORE_CAPACITY_EXCEEDED` instead of growing the file
//! - Space freed by consumed records is reused in place, and trailing free
//!   space is truncated, so a drained store shrinks back to its header
//! - Checksums on every record, verified on scan and on every read
//! - One mutex serializes all structural mutation; `put` and
//!   `remove_read_records` are safe to call from different threads on the
//!   same store

mod checksum;
mod core;
mod errors;
mod handle;
mod iter;
mod record;

pub use errors::{Severity, StoreError, StoreErrorCode, StoreResult};
pub use handle::{RecordHandle, RecordStore};
pub use iter::RecordIter;
pub use record::{FILE_HEADER_SIZE, SLOT_HEADER_SIZE};
