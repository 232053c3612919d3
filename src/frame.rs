//! Frame codec.
//!
//! Framing on disk:
//!   [length: u32le (= 4 + body len)] [crc: u32le] [body]
//!
//! The CRC is CRC32C (Castagnoli) over the body only, seeded with the
//! previous frame's CRC rather than zero. Each segment file starts with a
//! 4-byte header carrying the seed for its first frame, so the chain runs
//! unbroken across the whole log: one flipped bit invalidates every later
//! frame's CRC.

use crate::error::{Result, WalError};

/// Size of a segment's seed-CRC header.
pub(crate) const SEED_SIZE: usize = 4;

/// Size of the frame length field.
pub(crate) const LEN_SIZE: usize = 4;

/// Size of the frame CRC field.
pub(crate) const CRC_SIZE: usize = 4;

/// Continue the rolling CRC32C over `body`.
#[inline]
pub(crate) fn chain_crc(prev: u32, body: &[u8]) -> u32 {
    crc32c::crc32c_append(prev, body)
}

/// Length-field value for a frame carrying `body_len` body bytes, or
/// `EntryTooLarge` when the total does not fit the u32 field.
fn frame_length(body_len: usize) -> Result<u32> {
    body_len
        .checked_add(CRC_SIZE)
        .filter(|&n| n <= u32::MAX as usize)
        .map(|n| n as u32)
        .ok_or(WalError::EntryTooLarge(body_len))
}

/// Encode one frame. Returns the serialized frame and the new rolling CRC.
pub(crate) fn encode(prev_crc: u32, body: &[u8]) -> Result<(Vec<u8>, u32)> {
    let length = frame_length(body.len())?;
    let crc = chain_crc(prev_crc, body);
    let mut frame = Vec::with_capacity(LEN_SIZE + length as usize);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(body);
    Ok((frame, crc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let body = b"\x01\x00\x00\x00\x00\x00\x00\x00payload";
        let (frame, crc) = encode(0, body).unwrap();

        assert_eq!(frame.len(), LEN_SIZE + CRC_SIZE + body.len());
        let length = u32::from_le_bytes(frame[..4].try_into().unwrap());
        assert_eq!(length as usize, CRC_SIZE + body.len());
        let stored = u32::from_le_bytes(frame[4..8].try_into().unwrap());
        assert_eq!(stored, crc);
        assert_eq!(&frame[8..], body);
        assert_eq!(crc, crc32c::crc32c(body));
    }

    #[test]
    fn test_chaining_depends_on_seed() {
        let body = b"same body";
        let (_, a) = encode(0, body).unwrap();
        let (_, b) = encode(a, body).unwrap();
        assert_ne!(a, b);

        // Deterministic for equal inputs.
        let (_, a2) = encode(0, body).unwrap();
        assert_eq!(a, a2);
    }

    #[test]
    fn test_body_too_large_for_length_field() {
        // The largest body the u32 length field can describe, and one past it.
        let max_body = u32::MAX as usize - CRC_SIZE;
        assert_eq!(frame_length(max_body).unwrap(), u32::MAX);
        assert_eq!(frame_length(0).unwrap(), CRC_SIZE as u32);

        let err = frame_length(max_body + 1).unwrap_err();
        assert!(matches!(err, WalError::EntryTooLarge(n) if n == max_body + 1));
    }

    #[test]
    fn test_chain_matches_incremental_crc() {
        let first = b"first";
        let second = b"second";
        let (_, c1) = encode(0, first).unwrap();
        let (_, c2) = encode(c1, second).unwrap();
        assert_eq!(c1, crc32c::crc32c_append(0, first));
        assert_eq!(c2, crc32c::crc32c_append(c1, second));
    }
}
