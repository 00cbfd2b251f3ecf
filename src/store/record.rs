//! On-disk framing for the record store
//!
//! The backing file is one 16-byte file header followed by a sequence of
//! variable-length slots:
//!
//! ```text
//! +------------------+
//! | Magic            | (4 bytes: "CSR1")
//! +------------------+
//! | Format Version   | (u16 LE)
//! +------------------+
//! | Reserved         | (u16 LE, zero)
//! +------------------+
//! | Max Size         | (u64 LE, byte cap fixed at creation)
//! +------------------+
//! ```
//!
//! Each slot starts with a 21-byte header:
//!
//! ```text
//! +------------------+
//! | Slot Length      | (u32 LE, total on-disk size incl. header and slack)
//! +------------------+
//! | Payload Length   | (u32 LE, 0 for free slots)
//! +------------------+
//! | Sequence Number  | (u64 LE, 0 for free slots)
//! +------------------+
//! | State            | (u8: 0xA1 live, 0xD4 free)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 over the fields above + payload)
//! +------------------+
//! ```
//!
//! The payload follows the header; any remaining bytes up to Slot Length are
//! slack left behind by slot reuse and are never interpreted. State markers
//! are deliberately non-zero so a zeroed or torn header never parses as a
//! valid slot.

use super::checksum::compute_checksum_parts;
use super::errors::{StoreError, StoreResult};

/// File magic for the record store format.
pub const MAGIC: [u8; 4] = *b"CSR1";

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the file header in bytes.
pub const FILE_HEADER_SIZE: u64 = 16;

/// Size of a slot header in bytes.
pub const SLOT_HEADER_SIZE: u64 = 21;

/// State marker for a slot holding an unread record.
pub const STATE_LIVE: u8 = 0xA1;

/// State marker for a reclaimed slot whose space may be reused.
pub const STATE_FREE: u8 = 0xD4;

/// Total slot length for a payload of `payload_len` bytes, or `None` when
/// header plus payload would overflow the u32 slot length field.
pub fn slot_len_for(payload_len: usize) -> Option<u32> {
    u32::try_from(SLOT_HEADER_SIZE + payload_len as u64).ok()
}

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Byte cap for the whole file, fixed at creation.
    pub max_size: u64,
}

impl FileHeader {
    /// Serializes the file header to its 16-byte on-disk form.
    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE as usize] {
        let mut buf = [0u8; FILE_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        // bytes 6..8 reserved, zero
        buf[8..16].copy_from_slice(&self.max_size.to_le_bytes());
        buf
    }

    /// Parses and validates a file header.
    ///
    /// # Errors
    ///
    /// Returns `CAPSTORE_CORRUPTION` on bad magic or an unknown format
    /// version. No auto-repair is attempted.
    pub fn decode(buf: &[u8; FILE_HEADER_SIZE as usize]) -> StoreResult<Self> {
        if buf[0..4] != MAGIC {
            return Err(StoreError::corruption_at_offset(
                0,
                "bad magic, not a capstore file",
            ));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != FORMAT_VERSION {
            return Err(StoreError::corruption_at_offset(
                4,
                format!("unsupported format version: {}", version),
            ));
        }
        let mut cap_bytes = [0u8; 8];
        cap_bytes.copy_from_slice(&buf[8..16]);
        Ok(Self {
            max_size: u64::from_le_bytes(cap_bytes),
        })
    }
}

/// Parsed slot header.
///
/// `checksum` commits the record: a slot is only considered written once a
/// header with a valid checksum is on disk, which is why the header is
/// written after the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    /// Total on-disk size of the slot, including this header and slack.
    pub slot_len: u32,
    /// Length of the payload stored in this slot (0 when free).
    pub payload_len: u32,
    /// Monotonic sequence number assigned at put time (0 when free).
    pub seq: u64,
    /// `STATE_LIVE` or `STATE_FREE`.
    pub state: u8,
    /// CRC32 over the header fields above plus the payload.
    pub checksum: u32,
}

impl SlotHeader {
    /// Builds a header for a live record, computing the checksum over the
    /// header fields and the payload.
    pub fn live(slot_len: u32, seq: u64, payload: &[u8]) -> Self {
        let payload_len = payload.len() as u32;
        let checksum = Self::compute(slot_len, payload_len, seq, STATE_LIVE, payload);
        Self {
            slot_len,
            payload_len,
            seq,
            state: STATE_LIVE,
            checksum,
        }
    }

    /// Builds a header for a free slot of the given size.
    pub fn free(slot_len: u32) -> Self {
        let checksum = Self::compute(slot_len, 0, 0, STATE_FREE, &[]);
        Self {
            slot_len,
            payload_len: 0,
            seq: 0,
            state: STATE_FREE,
            checksum,
        }
    }

    fn compute(slot_len: u32, payload_len: u32, seq: u64, state: u8, payload: &[u8]) -> u32 {
        compute_checksum_parts(&[
            &slot_len.to_le_bytes(),
            &payload_len.to_le_bytes(),
            &seq.to_le_bytes(),
            &[state],
            payload,
        ])
    }

    /// Serializes the header to its 21-byte on-disk form.
    pub fn encode(&self) -> [u8; SLOT_HEADER_SIZE as usize] {
        let mut buf = [0u8; SLOT_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&self.slot_len.to_le_bytes());
        buf[4..8].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[8..16].copy_from_slice(&self.seq.to_le_bytes());
        buf[16] = self.state;
        buf[17..21].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parses a slot header without verifying the checksum.
    ///
    /// Structural validation only; call [`SlotHeader::verify`] with the
    /// payload before trusting the contents.
    ///
    /// # Errors
    ///
    /// Returns `CAPSTORE_CORRUPTION` if the state marker is unknown or the
    /// declared lengths are inconsistent.
    pub fn decode(buf: &[u8; SLOT_HEADER_SIZE as usize], offset: u64) -> StoreResult<Self> {
        let slot_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let payload_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let mut seq_bytes = [0u8; 8];
        seq_bytes.copy_from_slice(&buf[8..16]);
        let seq = u64::from_le_bytes(seq_bytes);
        let state = buf[16];
        let checksum = u32::from_le_bytes([buf[17], buf[18], buf[19], buf[20]]);

        if state != STATE_LIVE && state != STATE_FREE {
            return Err(StoreError::corruption_at_offset(
                offset,
                format!("unknown slot state marker: {:#04x}", state),
            ));
        }
        if (slot_len as u64) < SLOT_HEADER_SIZE + payload_len as u64 {
            return Err(StoreError::corruption_at_offset(
                offset,
                format!(
                    "slot length {} too small for payload length {}",
                    slot_len, payload_len
                ),
            ));
        }
        if state == STATE_FREE && (payload_len != 0 || seq != 0) {
            return Err(StoreError::corruption_at_offset(
                offset,
                "free slot with non-zero payload length or sequence",
            ));
        }

        Ok(Self {
            slot_len,
            payload_len,
            seq,
            state,
            checksum,
        })
    }

    /// Verifies the stored checksum against the header fields and payload.
    ///
    /// Free slots pass an empty payload.
    pub fn verify(&self, payload: &[u8]) -> bool {
        Self::compute(self.slot_len, self.payload_len, self.seq, self.state, payload)
            == self.checksum
    }

    /// Returns whether this slot holds an unread record.
    pub fn is_live(&self) -> bool {
        self.state == STATE_LIVE
    }
}
