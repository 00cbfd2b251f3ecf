//! Single-file slot engine
//!
//! `StoreCore` owns the backing file and all slot bookkeeping. It is not
//! thread-safe on its own; [`RecordStore`](super::RecordStore) wraps
//! it in one mutex that serializes every structural mutation (append, slot
//! reuse, reclamation, truncation).
//!
//! # Space reuse
//!
//! Slots freed by reclamation are tracked in the slot table and reused
//! first-fit by later puts. A free slot larger than needed is split, leaving
//! the remainder as a smaller free slot. Adjacent free slots are coalesced
//! during reclamation and trailing free space is truncated off the file, so
//! the file shrinks back once a backlog is drained.
//!
//! # Durability
//!
//! The payload is written before the committing slot header, and the header
//! rewrite that frees a slot is a single small write. A put that fails
//! midway leaves no live record; the in-memory slot table is only updated
//! after the write completes, so the store stays usable after a failed call.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::observability::{Logger, StoreMetrics};

use super::errors::{StoreError, StoreResult};
use super::record::{slot_len_for, FileHeader, SlotHeader, FILE_HEADER_SIZE, SLOT_HEADER_SIZE};

/// Disk operations tests can make fail once, to exercise error paths that
/// real I/O only hits on a dying disk.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FaultPoint {
    /// The next free-slot header rewrite fails.
    FreeHeader,
    /// The next tail truncation fails.
    Truncate,
}

/// In-memory view of one on-disk slot.
#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Total on-disk size including header and slack.
    slot_len: u64,
    /// Whether the slot holds an unread record.
    live: bool,
    /// Sequence number (0 for free slots).
    seq: u64,
}

/// The single-file slot engine. All access goes through the store mutex.
#[derive(Debug)]
pub(crate) struct StoreCore {
    path: PathBuf,
    file: File,
    max_size: u64,
    sync_writes: bool,
    /// Logical file length. Matches the physical length except transiently
    /// after a failed append, which is rolled back with set_len.
    file_len: u64,
    /// Next sequence number to assign (starts at 1, never reused).
    next_seq: u64,
    /// All slots, keyed by file offset.
    slots: BTreeMap<u64, Slot>,
    /// Live records: sequence number -> slot offset. Iteration in key order
    /// is FIFO write order.
    live_by_seq: BTreeMap<u64, u64>,
    metrics: Arc<StoreMetrics>,
    #[cfg(test)]
    fault: Option<FaultPoint>,
}

impl StoreCore {
    /// Opens or creates the backing file described by `config`.
    ///
    /// A fresh file gets the 16-byte file header. An existing file is
    /// scanned slot by slot to rebuild the slot table, the free space view,
    /// and the next sequence number; every header and live payload is
    /// checksum-verified during the scan.
    ///
    /// # Errors
    ///
    /// - `CAPSTORE_IO_ERROR` if the directory or file cannot be opened
    /// - `CAPSTORE_CONFIG_MISMATCH` if the file was created with a
    ///   different cap
    /// - `CAPSTORE_CORRUPTION` if the framing or a checksum is invalid
    pub(crate) fn open(config: &StoreConfig, metrics: Arc<StoreMetrics>) -> StoreResult<Self> {
        if !config.directory.exists() {
            fs::create_dir_all(&config.directory).map_err(|e| {
                StoreError::io_error(
                    format!(
                        "Failed to create store directory: {}",
                        config.directory.display()
                    ),
                    e,
                )
            })?;
        }

        let path = config.store_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                StoreError::io_error(
                    format!("Failed to open store file: {}", path.display()),
                    e,
                )
            })?;

        let file_len = file
            .metadata()
            .map_err(|e| StoreError::io_error("Failed to read store file metadata", e))?
            .len();

        let mut core = Self {
            path,
            file,
            max_size: config.max_size_bytes,
            sync_writes: config.sync_writes,
            file_len,
            next_seq: 1,
            slots: BTreeMap::new(),
            live_by_seq: BTreeMap::new(),
            metrics,
            #[cfg(test)]
            fault: None,
        };

        if core.file_len == 0 {
            let header = FileHeader {
                max_size: core.max_size,
            };
            core.write_all_at(0, &header.encode())
                .map_err(|e| StoreError::write_failed("Failed to write file header", e))?;
            core.file
                .sync_all()
                .map_err(|e| StoreError::write_failed("fsync failed after file header", e))?;
            core.file_len = FILE_HEADER_SIZE;
        } else {
            if core.file_len < FILE_HEADER_SIZE {
                return Err(StoreError::corruption_at_offset(
                    0,
                    format!("file shorter than file header: {} bytes", core.file_len),
                ));
            }
            let mut buf = [0u8; FILE_HEADER_SIZE as usize];
            core.read_exact_at(0, &mut buf)
                .map_err(|e| StoreError::read_failed("Failed to read file header", e))?;
            let header = FileHeader::decode(&buf)?;
            if header.max_size != core.max_size {
                return Err(StoreError::config_mismatch(format!(
                    "store was created with cap {} but opened with cap {}",
                    header.max_size, core.max_size
                )));
            }
            core.scan()?;
        }

        let path_field = core.path.display().to_string();
        let cap_field = core.max_size.to_string();
        let records_field = core.live_by_seq.len().to_string();
        let size_field = core.file_len.to_string();
        Logger::info(
            "STORE_OPEN",
            &[
                ("file_size", &size_field),
                ("max_size", &cap_field),
                ("path", &path_field),
                ("records", &records_field),
            ],
        );

        Ok(core)
    }

    /// Rebuilds the slot table by walking the file from the first slot.
    fn scan(&mut self) -> StoreResult<()> {
        let mut offset = FILE_HEADER_SIZE;
        while offset < self.file_len {
            if self.file_len - offset < SLOT_HEADER_SIZE {
                return Err(StoreError::corruption_at_offset(
                    offset,
                    format!(
                        "truncated slot header: {} bytes remain",
                        self.file_len - offset
                    ),
                ));
            }

            let mut buf = [0u8; SLOT_HEADER_SIZE as usize];
            self.read_exact_at(offset, &mut buf).map_err(|e| {
                StoreError::read_failed(
                    format!("Failed to read slot header at offset {}", offset),
                    e,
                )
            })?;
            let header = SlotHeader::decode(&buf, offset)?;
            let slot_len = header.slot_len as u64;

            if offset + slot_len > self.file_len {
                return Err(StoreError::corruption_at_offset(
                    offset,
                    format!(
                        "slot length {} overruns file size {}",
                        header.slot_len, self.file_len
                    ),
                ));
            }

            if header.is_live() {
                let mut payload = vec![0u8; header.payload_len as usize];
                self.read_exact_at(offset + SLOT_HEADER_SIZE, &mut payload)
                    .map_err(|e| {
                        StoreError::read_failed(
                            format!("Failed to read record payload at offset {}", offset),
                            e,
                        )
                    })?;
                if !header.verify(&payload) {
                    return Err(StoreError::corruption_at_offset(
                        offset,
                        "record checksum mismatch during scan",
                    ));
                }
                if self.live_by_seq.insert(header.seq, offset).is_some() {
                    return Err(StoreError::corruption_at_offset(
                        offset,
                        format!("duplicate sequence number {}", header.seq),
                    ));
                }
                if header.seq >= self.next_seq {
                    self.next_seq = header.seq + 1;
                }
            } else if !header.verify(&[]) {
                return Err(StoreError::corruption_at_offset(
                    offset,
                    "free slot checksum mismatch during scan",
                ));
            }

            self.slots.insert(
                offset,
                Slot {
                    slot_len,
                    live: header.is_live(),
                    seq: header.seq,
                },
            );
            offset += slot_len;
        }

        let slots_field = self.slots.len().to_string();
        let live_field = self.live_by_seq.len().to_string();
        Logger::trace(
            "STORE_SCAN_COMPLETE",
            &[("live", &live_field), ("slots", &slots_field)],
        );
        Ok(())
    }

    /// Writes a record into a reclaimed slot or appends it, within the cap.
    ///
    /// Returns the sequence number assigned to the record.
    ///
    /// # Errors
    ///
    /// - `CAPSTORE_CAPACITY_EXCEEDED` if no free slot fits and appending
    ///   would exceed the cap; the store is unchanged
    /// - `CAPSTORE_WRITE_FAILED` on I/O failure; no live record is left
    ///   behind (the committing header write is last)
    pub(crate) fn put(&mut self, payload: &[u8]) -> StoreResult<u64> {
        // Header plus payload must fit the u32 slot_len field.
        let needed = match slot_len_for(payload.len()) {
            Some(len) => u64::from(len),
            None => {
                self.metrics.record_capacity_rejection();
                return Err(StoreError::capacity_exceeded(
                    SLOT_HEADER_SIZE + payload.len() as u64,
                    self.max_size,
                ));
            }
        };

        let seq = self.next_seq;

        // First fit over reclaimed slots, by file offset.
        let reuse = self
            .slots
            .iter()
            .find(|(_, slot)| !slot.live && slot.slot_len >= needed)
            .map(|(&offset, slot)| (offset, slot.slot_len));

        let (offset, used_len, remainder) = match reuse {
            Some((offset, total)) => {
                if total - needed >= SLOT_HEADER_SIZE {
                    // Split: the tail of the slot stays free. Its header is
                    // written before the record commit so the file frames
                    // consistently at every step.
                    let rem_offset = offset + needed;
                    let rem_len = total - needed;
                    self.write_free_header(rem_offset, rem_len)?;
                    (offset, needed, Some((rem_offset, rem_len)))
                } else {
                    // Absorb the slack rather than leave an unframeable gap.
                    (offset, total, None)
                }
            }
            None => {
                if self.file_len + needed > self.max_size {
                    self.metrics.record_capacity_rejection();
                    return Err(StoreError::capacity_exceeded(needed, self.max_size));
                }
                (self.file_len, needed, None)
            }
        };

        let appended = offset == self.file_len;
        if let Err(e) = self.write_live_slot(offset, used_len, seq, payload) {
            if appended {
                // Discard partially appended bytes; the logical length never
                // moved, so the next put lands at the same offset.
                let _ = self.file.set_len(self.file_len);
            }
            return Err(e);
        }

        if appended {
            self.file_len += used_len;
        }
        if let Some((rem_offset, rem_len)) = remainder {
            self.slots.insert(
                rem_offset,
                Slot {
                    slot_len: rem_len,
                    live: false,
                    seq: 0,
                },
            );
        }
        self.slots.insert(
            offset,
            Slot {
                slot_len: used_len,
                live: true,
                seq,
            },
        );
        self.live_by_seq.insert(seq, offset);
        self.next_seq += 1;
        self.metrics.record_put(payload.len() as u64, !appended);

        Ok(seq)
    }

    /// Reads the payload of a live record, verifying its checksum.
    ///
    /// Returns `Ok(None)` if the sequence number no longer refers to a live
    /// record (already reclaimed).
    pub(crate) fn read_by_seq(&mut self, seq: u64) -> StoreResult<Option<Vec<u8>>> {
        let offset = match self.live_by_seq.get(&seq) {
            Some(&offset) => offset,
            None => return Ok(None),
        };

        let mut buf = [0u8; SLOT_HEADER_SIZE as usize];
        self.read_exact_at(offset, &mut buf).map_err(|e| {
            StoreError::read_failed(
                format!("Failed to read slot header at offset {}", offset),
                e,
            )
        })?;
        let header = SlotHeader::decode(&buf, offset)?;
        if !header.is_live() || header.seq != seq {
            return Err(StoreError::corruption_at_offset(
                offset,
                format!(
                    "slot table expects live sequence {} but disk holds sequence {} (state {:#04x})",
                    seq, header.seq, header.state
                ),
            ));
        }

        let mut payload = vec![0u8; header.payload_len as usize];
        self.read_exact_at(offset + SLOT_HEADER_SIZE, &mut payload)
            .map_err(|e| {
                StoreError::read_failed(
                    format!("Failed to read record payload at offset {}", offset),
                    e,
                )
            })?;
        if !header.verify(&payload) {
            return Err(StoreError::corruption_at_offset(
                offset,
                "record checksum mismatch on read",
            ));
        }

        Ok(Some(payload))
    }

    /// Reclaims the slots of the given sequence numbers.
    ///
    /// Sequence numbers that are no longer live are skipped, which is what
    /// makes reclamation idempotent. After marking, adjacent free slots are
    /// coalesced and trailing free space is truncated off the file.
    ///
    /// Returns the number of slot bytes returned to the free pool.
    pub(crate) fn reclaim(&mut self, seqs: &[u64]) -> StoreResult<u64> {
        let mut freed_bytes = 0u64;
        let mut freed_records = 0u64;
        for &seq in seqs {
            let bytes = self.free_by_seq(seq)?;
            if bytes > 0 {
                freed_bytes += bytes;
                freed_records += 1;
            }
        }
        if freed_bytes == 0 {
            return Ok(0);
        }

        self.coalesce_free_runs()?;
        self.truncate_trailing_free()?;

        if self.sync_writes {
            self.file
                .sync_all()
                .map_err(|e| StoreError::write_failed("fsync failed after reclamation", e))?;
        }

        let bytes_field = freed_bytes.to_string();
        let records_field = freed_records.to_string();
        Logger::trace(
            "STORE_RECLAIM",
            &[("bytes", &bytes_field), ("records", &records_field)],
        );

        Ok(freed_bytes)
    }

    /// Marks one record's slot free on disk. Returns 0 if the sequence
    /// number is not live (already reclaimed).
    fn free_by_seq(&mut self, seq: u64) -> StoreResult<u64> {
        let offset = match self.live_by_seq.get(&seq) {
            Some(&offset) => offset,
            None => return Ok(0),
        };

        let slot_len = match self.slots.get(&offset) {
            Some(slot) => slot.slot_len,
            None => {
                return Err(StoreError::corruption_at_offset(
                    offset,
                    format!("live sequence {} has no slot table entry", seq),
                ))
            }
        };

        // Table updates wait for the header rewrite, the same order put
        // uses: if the write fails the record stays fully live, readable,
        // and findable by a retried reclaim.
        self.write_free_header(offset, slot_len)?;
        self.live_by_seq.remove(&seq);
        self.slots.insert(
            offset,
            Slot {
                slot_len,
                live: false,
                seq: 0,
            },
        );
        self.metrics.record_reclaim(slot_len);

        Ok(slot_len)
    }

    /// Merges runs of adjacent free slots into single slots.
    ///
    /// The first header of a run is rewritten with the combined length; the
    /// swallowed headers become slack and are never read again. Runs stop at
    /// u32::MAX so the combined length still fits the header field.
    fn coalesce_free_runs(&mut self) -> StoreResult<()> {
        let entries: Vec<(u64, u64, bool)> = self
            .slots
            .iter()
            .map(|(&offset, slot)| (offset, slot.slot_len, slot.live))
            .collect();

        let mut i = 0;
        while i < entries.len() {
            let (start, first_len, live) = entries[i];
            if live {
                i += 1;
                continue;
            }
            let mut run_len = first_len;
            let mut j = i + 1;
            while j < entries.len() {
                let (offset, len, live) = entries[j];
                if live || offset != start + run_len || run_len + len > u32::MAX as u64 {
                    break;
                }
                run_len += len;
                j += 1;
            }
            if j > i + 1 {
                self.write_free_header(start, run_len)?;
                for entry in &entries[i + 1..j] {
                    self.slots.remove(&entry.0);
                }
                if let Some(slot) = self.slots.get_mut(&start) {
                    slot.slot_len = run_len;
                }
            }
            i = j;
        }
        Ok(())
    }

    /// Truncates free slots off the end of the file.
    fn truncate_trailing_free(&mut self) -> StoreResult<()> {
        let mut new_len = self.file_len;
        for (&offset, slot) in self.slots.iter().rev() {
            if slot.live || offset + slot.slot_len != new_len {
                break;
            }
            new_len = offset;
        }
        if new_len == self.file_len {
            return Ok(());
        }

        // Physical truncation goes first. If it fails, the in-memory view
        // still matches the file and the tail slots remain valid free
        // slots, so the store stays consistent and a later reclaim can
        // truncate them.
        #[cfg(test)]
        if self.take_fault(FaultPoint::Truncate) {
            return Err(StoreError::write_failed(
                "Failed to truncate trailing free space",
                io::Error::new(io::ErrorKind::Other, "injected fault"),
            ));
        }
        self.file.set_len(new_len).map_err(|e| {
            StoreError::write_failed("Failed to truncate trailing free space", e)
        })?;

        let original_len = self.file_len;
        self.file_len = new_len;
        self.slots.split_off(&new_len);
        self.metrics.record_truncation();

        let from_field = original_len.to_string();
        let to_field = new_len.to_string();
        Logger::trace(
            "STORE_TRUNCATE",
            &[("from", &from_field), ("to", &to_field)],
        );
        Ok(())
    }

    /// Live sequence numbers in FIFO (write) order.
    pub(crate) fn snapshot_live_seqs(&self) -> Vec<u64> {
        self.live_by_seq.keys().copied().collect()
    }

    /// Current logical file length in bytes.
    pub(crate) fn file_size(&self) -> u64 {
        self.file_len
    }

    /// Number of live (unread) records.
    pub(crate) fn record_count(&self) -> usize {
        self.live_by_seq.len()
    }

    /// Bytes held in reclaimed slots inside the file, reusable by puts.
    pub(crate) fn free_bytes(&self) -> u64 {
        self.slots
            .values()
            .filter(|slot| !slot.live)
            .map(|slot| slot.slot_len)
            .sum()
    }

    /// Flushes all file state to disk.
    pub(crate) fn sync(&mut self) -> StoreResult<()> {
        self.file
            .sync_all()
            .map_err(|e| StoreError::io_error("Explicit store fsync failed", e))
    }

    /// Writes the payload, then the committing live header, then fsyncs if
    /// configured. The header going in last is what makes a torn put
    /// invisible: without a valid live header the slot is never scanned as
    /// a record.
    fn write_live_slot(
        &mut self,
        offset: u64,
        slot_len: u64,
        seq: u64,
        payload: &[u8],
    ) -> StoreResult<()> {
        self.write_all_at(offset + SLOT_HEADER_SIZE, payload)
            .map_err(|e| {
                StoreError::write_failed(
                    format!("Failed to write record payload at offset {}", offset),
                    e,
                )
            })?;

        let header = SlotHeader::live(slot_len as u32, seq, payload);
        self.write_all_at(offset, &header.encode()).map_err(|e| {
            StoreError::write_failed(
                format!("Failed to commit record header at offset {}", offset),
                e,
            )
        })?;

        if self.sync_writes {
            self.file.sync_all().map_err(|e| {
                StoreError::write_failed(
                    format!("fsync failed after writing record {}", seq),
                    e,
                )
            })?;
        }
        Ok(())
    }

    fn write_free_header(&mut self, offset: u64, slot_len: u64) -> StoreResult<()> {
        #[cfg(test)]
        if self.take_fault(FaultPoint::FreeHeader) {
            return Err(StoreError::write_failed(
                format!("Failed to write free slot header at offset {}", offset),
                io::Error::new(io::ErrorKind::Other, "injected fault"),
            ));
        }
        let header = SlotHeader::free(slot_len as u32);
        self.write_all_at(offset, &header.encode()).map_err(|e| {
            StoreError::write_failed(
                format!("Failed to write free slot header at offset {}", offset),
                e,
            )
        })
    }

    #[cfg(test)]
    pub(crate) fn inject_fault(&mut self, point: FaultPoint) {
        self.fault = Some(point);
    }

    #[cfg(test)]
    fn take_fault(&mut self, point: FaultPoint) -> bool {
        if self.fault == Some(point) {
            self.fault = None;
            true
        } else {
            false
        }
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }
}
