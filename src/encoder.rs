//! Frame appender over the active segment.

use std::io::{Seek, Write};

use crate::error::Result;
use crate::frame;
use crate::segment::Segment;

/// Owns the segment being written and the rolling CRC. Sealed segments stay
/// with the facade so their locks remain held.
pub(crate) struct Encoder {
    segment: Segment,
    crc: u32,
}

impl Encoder {
    /// Wrap `segment`, whose cursor must sit at the write position, chaining
    /// new frames from `seed_crc`.
    pub fn new(segment: Segment, seed_crc: u32) -> Self {
        Encoder {
            segment,
            crc: seed_crc,
        }
    }

    /// Append one frame holding `body` and fsync it. Returns the cursor
    /// position after the write.
    ///
    /// The frame goes down in a single write so a crash tears at most one
    /// contiguous region, which replay then truncates.
    pub fn append(&mut self, body: &[u8]) -> Result<u64> {
        let (bytes, crc) = frame::encode(self.crc, body)?;
        self.segment.file.write_all(&bytes)?;
        self.segment.file.sync_all()?;
        self.crc = crc;
        Ok(self.segment.file.stream_position()?)
    }

    /// Rolling CRC after the most recent frame.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Sequence number of the segment being written.
    pub fn seq(&self) -> u64 {
        self.segment.seq
    }

    pub fn into_segment(self) -> Segment {
        self.segment
    }
}
