//! Store Capacity Tests
//!
//! - Bounded size: the backing file never exceeds the cap fixed at creation,
//!   under any sequence of puts and reclaims
//! - Fail-fast admission: a put that cannot fit returns a typed capacity
//!   error and leaves the file untouched
//! - Reclamation shrinks: draining every record returns the file to its
//!   pre-burst size

use std::fs;

use capstore::store::{RecordStore, FILE_HEADER_SIZE, SLOT_HEADER_SIZE};
use tempfile::TempDir;

const STORE_FILE: &str = "records.dat";

/// On-disk size of one slot holding a payload of `payload_len` bytes.
fn frame(payload_len: u64) -> u64 {
    SLOT_HEADER_SIZE + payload_len
}

// =============================================================================
// Bounded Size
// =============================================================================

#[test]
fn test_file_never_exceeds_cap() {
    let temp_dir = TempDir::new().unwrap();
    let payload = [0xABu8; 1024];

    // Room for exactly 8 records, plus slack smaller than one frame.
    let cap = FILE_HEADER_SIZE + 8 * frame(1024) + 100;
    let store = RecordStore::create(temp_dir.path(), STORE_FILE, cap).unwrap();

    let mut accepted = 0;
    for _ in 0..50 {
        match store.put(&payload) {
            Ok(_) => accepted += 1,
            Err(err) => assert!(err.is_capacity_exceeded(), "unexpected error: {}", err),
        }
        assert!(store.file_size().unwrap() <= cap);
    }
    assert_eq!(accepted, 8);
}

#[test]
fn test_rejected_put_leaves_file_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let cap = FILE_HEADER_SIZE + frame(256) + 10;
    let store = RecordStore::create(temp_dir.path(), STORE_FILE, cap).unwrap();

    store.put(&[1u8; 256]).unwrap();
    let size_before = store.file_size().unwrap();
    let count_before = store.record_count().unwrap();

    let err = store.put(&[2u8; 256]).unwrap_err();
    assert!(err.is_capacity_exceeded());
    assert!(!err.is_fatal());

    assert_eq!(store.file_size().unwrap(), size_before);
    assert_eq!(store.record_count().unwrap(), count_before);
}

#[test]
fn test_oversized_record_rejected_outright() {
    let temp_dir = TempDir::new().unwrap();
    let cap = FILE_HEADER_SIZE + frame(128);
    let store = RecordStore::create(temp_dir.path(), STORE_FILE, cap).unwrap();

    // Larger than the whole file could ever hold.
    let err = store.put(&vec![0u8; 4096]).unwrap_err();
    assert!(err.is_capacity_exceeded());
    assert_eq!(store.file_size().unwrap(), FILE_HEADER_SIZE);
}

#[test]
fn test_tracked_size_matches_filesystem() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(STORE_FILE);
    let store = RecordStore::create(temp_dir.path(), STORE_FILE, 1 << 16).unwrap();

    let check = |store: &RecordStore| {
        let tracked = store.file_size().unwrap();
        let on_disk = fs::metadata(&path).unwrap().len();
        assert_eq!(tracked, on_disk);
    };

    check(&store);
    store.put(&[1u8; 700]).unwrap();
    store.put(&[2u8; 30]).unwrap();
    check(&store);

    let mut iter = store.iter().unwrap();
    iter.next_record().unwrap().unwrap();
    iter.remove_read_records().unwrap();
    check(&store);

    while iter.next_record().unwrap().is_some() {}
    iter.remove_read_records().unwrap();
    check(&store);
}

// =============================================================================
// Reclamation Shrinks
// =============================================================================

#[test]
fn test_full_drain_returns_to_pre_burst_size() {
    let temp_dir = TempDir::new().unwrap();
    let store = RecordStore::create(temp_dir.path(), STORE_FILE, 1 << 20).unwrap();
    let pre_burst = store.file_size().unwrap();
    assert_eq!(pre_burst, FILE_HEADER_SIZE);

    for i in 0..30 {
        store.put(&vec![i as u8; 4096]).unwrap();
    }
    assert!(store.file_size().unwrap() > pre_burst);

    let mut iter = store.iter().unwrap();
    while iter.next_record().unwrap().is_some() {}
    iter.remove_read_records().unwrap();

    assert_eq!(store.file_size().unwrap(), pre_burst);
    assert_eq!(store.record_count().unwrap(), 0);
    assert_eq!(store.free_bytes().unwrap(), 0);
}

#[test]
fn test_put_succeeds_again_after_reclaim() {
    let temp_dir = TempDir::new().unwrap();
    let cap = FILE_HEADER_SIZE + 4 * frame(512) + 50;
    let store = RecordStore::create(temp_dir.path(), STORE_FILE, cap).unwrap();

    for _ in 0..4 {
        store.put(&[9u8; 512]).unwrap();
    }
    assert!(store.put(&[9u8; 512]).unwrap_err().is_capacity_exceeded());

    // Free one slot; the same-size put now fits without growing the file.
    let mut iter = store.iter().unwrap();
    iter.next_record().unwrap().unwrap();
    iter.remove_read_records().unwrap();

    let size_when_full = store.file_size().unwrap();
    store.put(&[9u8; 512]).unwrap();
    assert_eq!(store.file_size().unwrap(), size_when_full);
}

#[test]
fn test_reclaim_then_put_then_reclaim_again() {
    let temp_dir = TempDir::new().unwrap();
    let store = RecordStore::create(temp_dir.path(), STORE_FILE, 1 << 16).unwrap();

    store.put(&[1u8; 200]).unwrap();
    store.put(&[2u8; 200]).unwrap();

    let mut iter = store.iter().unwrap();
    iter.next_record().unwrap().unwrap();
    assert!(iter.remove_read_records().unwrap() > 0);

    // The pending set was cleared, so a put followed by another reclaim
    // call on the same iterator must not touch the new record.
    store.put(&[3u8; 200]).unwrap();
    let count_before = store.record_count().unwrap();
    assert_eq!(iter.remove_read_records().unwrap(), 0);
    assert_eq!(store.record_count().unwrap(), count_before);
}

#[test]
fn test_interior_holes_are_reused_not_grown() {
    let temp_dir = TempDir::new().unwrap();
    let cap = FILE_HEADER_SIZE + 6 * frame(256) + 60;
    let store = RecordStore::create(temp_dir.path(), STORE_FILE, cap).unwrap();

    for _ in 0..6 {
        store.put(&[4u8; 256]).unwrap();
    }
    let full_size = store.file_size().unwrap();

    // Free the three oldest records. They sit at the front of the file, so
    // the file cannot shrink while newer records follow them.
    let mut iter = store.iter().unwrap();
    for _ in 0..3 {
        iter.next_record().unwrap().unwrap();
    }
    iter.remove_read_records().unwrap();
    assert_eq!(store.file_size().unwrap(), full_size);

    // Refills land in the holes; the file stays at its high-water mark.
    for _ in 0..3 {
        store.put(&[5u8; 256]).unwrap();
    }
    assert_eq!(store.file_size().unwrap(), full_size);
    assert_eq!(store.record_count().unwrap(), 6);
}
