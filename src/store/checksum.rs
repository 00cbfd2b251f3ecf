//! CRC32 checksum computation for slot frames
//!
//! Every slot header (and live payload) carries a CRC32 that is verified on
//! scan and on every read. A mismatch is FATAL: the store refuses to serve
//! data it cannot vouch for.

use crc32fast::Hasher;

/// Computes a CRC32 checksum over several byte slices in order.
///
/// Equivalent to hashing the concatenation of the slices, without the
/// allocation. Slot headers hash their fixed fields followed by the payload.
pub(crate) fn compute_checksum_parts(parts: &[&[u8]]) -> u32 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_deterministic() {
        let data: &[&[u8]] = &[b"record store ", b"test data"];
        assert_eq!(compute_checksum_parts(data), compute_checksum_parts(data));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut data = vec![0x00, 0x01, 0x02, 0x03, 0x04];
        let original = compute_checksum_parts(&[&data]);
        data[2] ^= 0x01;
        assert_ne!(original, compute_checksum_parts(&[&data]));
    }

    #[test]
    fn test_parts_equivalent_to_concat() {
        assert_eq!(
            compute_checksum_parts(&[b"hello ", b"world"]),
            compute_checksum_parts(&[b"hello world"])
        );
    }
}
