//! Store Integrity Tests
//!
//! - Round-trip fidelity: a payload read back equals the payload written,
//!   byte for byte
//! - Corruption is never ignored: any checksum or framing failure is an
//!   explicit FATAL error
//! - Reopen rebuilds state: unread records, free space, and the sequence
//!   counter survive a clean restart

use std::fs;

use capstore::config::StoreConfig;
use capstore::store::{RecordStore, FILE_HEADER_SIZE, SLOT_HEADER_SIZE};
use tempfile::TempDir;

const STORE_FILE: &str = "records.dat";

fn open_store(dir: &std::path::Path, max_size: u64) -> RecordStore {
    RecordStore::create(dir, STORE_FILE, max_size).unwrap()
}

// =============================================================================
// Round-Trip Fidelity
// =============================================================================

#[test]
fn test_large_payload_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(temp_dir.path(), 1 << 20);

    // A multi-hundred-kilobyte record, the size class the store is built for.
    let payload: Vec<u8> = (0..400_000u32).map(|i| (i % 251) as u8).collect();
    let handle = store.put(&payload).unwrap();
    assert_eq!(handle.payload_len() as usize, payload.len());

    let mut iter = store.iter().unwrap();
    let read = iter.next_record().unwrap().unwrap();
    assert_eq!(read.len(), payload.len());
    assert_eq!(read, payload);
}

#[test]
fn test_many_records_round_trip_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(temp_dir.path(), 1 << 20);

    let payloads: Vec<Vec<u8>> = (0..20)
        .map(|i| format!("record number {} with body {}", i, "x".repeat(i * 37)).into_bytes())
        .collect();
    for payload in &payloads {
        store.put(payload).unwrap();
    }

    let mut iter = store.iter().unwrap();
    for expected in &payloads {
        let read = iter.next_record().unwrap().unwrap();
        assert_eq!(&read, expected);
    }
    assert!(iter.next_record().unwrap().is_none());
}

#[test]
fn test_empty_payload_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(temp_dir.path(), 1 << 16);

    store.put(b"").unwrap();

    let mut iter = store.iter().unwrap();
    assert_eq!(iter.next_record().unwrap().unwrap(), Vec::<u8>::new());
}

// =============================================================================
// Corruption Is Never Ignored
// =============================================================================

#[test]
fn test_corrupted_payload_detected_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(STORE_FILE);

    {
        let store = open_store(temp_dir.path(), 1 << 16);
        store.put(&[0x5Au8; 300]).unwrap();
    }

    // Flip a byte in the middle of the payload.
    let mut contents = fs::read(&path).unwrap();
    let target = (FILE_HEADER_SIZE + SLOT_HEADER_SIZE) as usize + 150;
    contents[target] ^= 0xFF;
    fs::write(&path, contents).unwrap();

    let config = StoreConfig::new(temp_dir.path(), STORE_FILE, 1 << 16);
    let err = RecordStore::open(&config).unwrap_err();
    assert!(err.is_fatal(), "corruption must be FATAL, got: {}", err);
    assert_eq!(err.code().code(), "CAPSTORE_CORRUPTION");
}

#[test]
fn test_bad_magic_detected_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(STORE_FILE);

    {
        let _store = open_store(temp_dir.path(), 1 << 16);
    }

    let mut contents = fs::read(&path).unwrap();
    contents[0] = b'X';
    fs::write(&path, contents).unwrap();

    let config = StoreConfig::new(temp_dir.path(), STORE_FILE, 1 << 16);
    let err = RecordStore::open(&config).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_torn_tail_detected_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(STORE_FILE);

    {
        let store = open_store(temp_dir.path(), 1 << 16);
        store.put(b"intact record").unwrap();
    }

    // A few garbage bytes at the end, too short to be a slot header.
    let mut contents = fs::read(&path).unwrap();
    contents.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00]);
    fs::write(&path, contents).unwrap();

    let config = StoreConfig::new(temp_dir.path(), STORE_FILE, 1 << 16);
    let err = RecordStore::open(&config).unwrap_err();
    assert!(err.is_fatal());
}

// =============================================================================
// Reopen Rebuilds State
// =============================================================================

#[test]
fn test_unread_records_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = open_store(temp_dir.path(), 1 << 16);
        store.put(b"one").unwrap();
        store.put(b"two").unwrap();
        store.put(b"three").unwrap();

        // Consume and reclaim the first record before shutting down.
        let mut iter = store.iter().unwrap();
        iter.next_record().unwrap().unwrap();
        iter.remove_read_records().unwrap();
        store.sync().unwrap();
    }

    let store = open_store(temp_dir.path(), 1 << 16);
    assert_eq!(store.record_count().unwrap(), 2);

    let mut iter = store.iter().unwrap();
    assert_eq!(iter.next_record().unwrap().unwrap(), b"two");
    assert_eq!(iter.next_record().unwrap().unwrap(), b"three");
}

#[test]
fn test_sequence_numbers_continue_after_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = open_store(temp_dir.path(), 1 << 16);
        let handle = store.put(b"first").unwrap();
        assert_eq!(handle.sequence(), 1);
        store.put(b"second").unwrap();
    }

    let store = open_store(temp_dir.path(), 1 << 16);
    let handle = store.put(b"third").unwrap();
    assert_eq!(handle.sequence(), 3);
}

#[test]
fn test_reopen_with_different_cap_rejected() {
    let temp_dir = TempDir::new().unwrap();

    {
        let _store = open_store(temp_dir.path(), 1 << 16);
    }

    let config = StoreConfig::new(temp_dir.path(), STORE_FILE, 1 << 17);
    let err = RecordStore::open(&config).unwrap_err();
    assert_eq!(err.code().code(), "CAPSTORE_CONFIG_MISMATCH");
    assert!(!err.is_fatal());
}

#[test]
fn test_free_space_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let size_before_restart;

    {
        let store = open_store(temp_dir.path(), 1 << 16);
        store.put(&[1u8; 500]).unwrap();
        store.put(&[2u8; 500]).unwrap();

        let mut iter = store.iter().unwrap();
        iter.next_record().unwrap().unwrap();
        iter.remove_read_records().unwrap();

        size_before_restart = store.file_size().unwrap();
        assert!(store.free_bytes().unwrap() > 0);
    }

    let store = open_store(temp_dir.path(), 1 << 16);
    assert_eq!(store.file_size().unwrap(), size_before_restart);

    // The freed slot is found again and reused: same-size put does not grow
    // the file.
    store.put(&[3u8; 500]).unwrap();
    assert_eq!(store.file_size().unwrap(), size_before_restart);
}
