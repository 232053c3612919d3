//! Sequential replay over the ordered segments of a log.
//!
//! The decoder validates every frame against the rolling CRC and stops
//! cleanly at the first structural end: true end-of-file, the zero sentinel
//! inside a preallocated segment, or damage at the tail of the last segment.
//! Damage that is provably not at the tail (valid frames still follow, or a
//! non-last segment is affected) is surfaced as a hard error instead, so
//! committed records are never dropped silently.

use std::io::{Read, Seek, SeekFrom};

use crate::entry::Entry;
use crate::error::{Result, WalError};
use crate::frame::{self, CRC_SIZE, LEN_SIZE, SEED_SIZE};
use crate::segment::Segment;

#[derive(Debug)]
pub(crate) struct Decoder {
    segments: Vec<Segment>,
    file_index: usize,
    crc: u32,
    /// Tail damage tolerated as end-of-log, kept for the observer.
    tolerated: Option<WalError>,
}

impl Decoder {
    /// Build a decoder over the ordered segments (at least one), reading the
    /// first segment's seed CRC.
    pub fn new(mut segments: Vec<Segment>) -> Result<Self> {
        let seed = read_seed(&mut segments[0])?;
        Ok(Decoder {
            segments,
            file_index: 0,
            crc: seed,
            tolerated: None,
        })
    }

    /// Read the next entry.
    ///
    /// Returns `Ok(None)` at the clean end of the log. A torn or corrupt
    /// frame at the tail of the last segment, with no later valid frame
    /// reachable, also ends the log: the cursor is rewound to the start of
    /// the damaged frame so a subsequent appender overwrites it, and the
    /// tolerated condition is retained for `take_tolerated`.
    pub fn decode(&mut self) -> Result<Option<Entry>> {
        loop {
            let last = self.file_index + 1 == self.segments.len();
            let segment_len = self.segments[self.file_index].len;
            let frame_start = self.segments[self.file_index].file.stream_position()?;
            let remaining = segment_len.saturating_sub(frame_start);

            // End-of-file at the length boundary: a fully written segment.
            // The next segment's seed header must continue the chain.
            if remaining == 0 {
                if last {
                    return Ok(None);
                }
                self.file_index += 1;
                let segment = &mut self.segments[self.file_index];
                let seed = read_seed(segment)?;
                if seed != self.crc {
                    return Err(WalError::SegmentChainBroken {
                        segment: segment.name.clone(),
                        seed,
                        rolling: self.crc,
                    });
                }
                continue;
            }

            // A length field torn mid-write. Nothing can follow it in this
            // segment, so in the last segment it is tail damage.
            if remaining < LEN_SIZE as u64 {
                let err = self.truncated_at(frame_start);
                if !last {
                    return Err(err);
                }
                return self.tolerate(frame_start, err);
            }

            let mut len_buf = [0u8; LEN_SIZE];
            self.segments[self.file_index].file.read_exact(&mut len_buf)?;
            let length = u32::from_le_bytes(len_buf) as u64;

            // Zero sentinel: end of the written region of a preallocated
            // segment. Rewind so the next writer overwrites it. Data is
            // known to follow a non-last segment, so there the sentinel
            // means the segment was cut short.
            if length == 0 {
                self.segments[self.file_index]
                    .file
                    .seek(SeekFrom::Current(-(LEN_SIZE as i64)))?;
                if last {
                    return Ok(None);
                }
                return Err(self.truncated_at(frame_start));
            }

            // The frame claims more bytes than the segment holds: a write
            // torn after the length field went down.
            if length > remaining - LEN_SIZE as u64 {
                let err = self.truncated_at(frame_start);
                if !last {
                    return Err(err);
                }
                return self.tolerate(frame_start, err);
            }

            // A frame too small to carry its own CRC field is garbage; probe
            // past its claimed end to tell tail damage from mid-log damage.
            if length < CRC_SIZE as u64 {
                let err = self.truncated_at(frame_start);
                let boundary = frame_start + LEN_SIZE as u64 + length;
                if !last || self.valid_frame_ahead(boundary, &[self.crc])? {
                    return Err(err);
                }
                return self.tolerate(frame_start, err);
            }

            let mut buf = vec![0u8; length as usize];
            self.segments[self.file_index].file.read_exact(&mut buf)?;

            let stored = u32::from_le_bytes(buf[..CRC_SIZE].try_into().unwrap());
            let body = &buf[CRC_SIZE..];
            let computed = frame::chain_crc(self.crc, body);
            let boundary = frame_start + LEN_SIZE as u64 + length;

            if computed != stored {
                let err = WalError::CorruptFrame {
                    segment: self.segments[self.file_index].name.clone(),
                    offset: frame_start,
                    stored,
                    computed,
                };
                // Later frames chain from the stored CRC; if the stored
                // value itself took the damage, the recomputed one is the
                // true chain seed. Probe with both.
                if !last || self.valid_frame_ahead(boundary, &[stored, computed])? {
                    return Err(err);
                }
                return self.tolerate(frame_start, err);
            }

            let entry = match Entry::unmarshal(body) {
                Some(entry) => entry,
                None => {
                    let err = WalError::CorruptFrame {
                        segment: self.segments[self.file_index].name.clone(),
                        offset: frame_start,
                        stored,
                        computed,
                    };
                    if !last || self.valid_frame_ahead(boundary, &[stored])? {
                        return Err(err);
                    }
                    return self.tolerate(frame_start, err);
                }
            };

            self.crc = stored;
            return Ok(Some(entry));
        }
    }

    /// Current read cursor of the active segment; after the final `decode`
    /// this is exactly where the next frame belongs.
    pub fn offset(&mut self) -> Result<u64> {
        Ok(self.segments[self.file_index].file.stream_position()?)
    }

    /// Current rolling CRC value.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Tail damage that was recovered by truncation, if any.
    pub fn take_tolerated(&mut self) -> Option<WalError> {
        self.tolerated.take()
    }

    fn truncated_at(&self, offset: u64) -> WalError {
        WalError::Truncated {
            segment: self.segments[self.file_index].name.clone(),
            offset,
        }
    }

    fn tolerate(&mut self, frame_start: u64, err: WalError) -> Result<Option<Entry>> {
        self.segments[self.file_index]
            .file
            .seek(SeekFrom::Start(frame_start))?;
        self.tolerated = Some(err);
        Ok(None)
    }

    /// Whether any frame from `pos` onward validates against a chain seeded
    /// with one of `seeds`. Used to distinguish recoverable tail damage from
    /// mid-log corruption that must be surfaced.
    fn valid_frame_ahead(&mut self, pos: u64, seeds: &[u32]) -> Result<bool> {
        for &seed in seeds {
            if self.probe_chain(pos, seed)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Walk frames from `pos`, assuming each stored CRC is the writer's
    /// chain value, and report whether any frame checks out.
    fn probe_chain(&mut self, mut pos: u64, mut crc: u32) -> Result<bool> {
        let segment = &mut self.segments[self.file_index];
        loop {
            let remaining = segment.len.saturating_sub(pos);
            if remaining < LEN_SIZE as u64 {
                return Ok(false);
            }

            segment.file.seek(SeekFrom::Start(pos))?;
            let mut len_buf = [0u8; LEN_SIZE];
            segment.file.read_exact(&mut len_buf)?;
            let length = u64::from(u32::from_le_bytes(len_buf));
            if length < CRC_SIZE as u64 || length > remaining - LEN_SIZE as u64 {
                return Ok(false);
            }

            let mut buf = vec![0u8; length as usize];
            segment.file.read_exact(&mut buf)?;
            let stored = u32::from_le_bytes(buf[..CRC_SIZE].try_into().unwrap());
            let body = &buf[CRC_SIZE..];
            if body.len() >= 8 && frame::chain_crc(crc, body) == stored {
                return Ok(true);
            }

            crc = stored;
            pos += LEN_SIZE as u64 + length;
        }
    }
}

/// Read a segment's 4-byte seed-CRC header.
fn read_seed(segment: &mut Segment) -> Result<u32> {
    let mut buf = [0u8; SEED_SIZE];
    segment.file.seek(SeekFrom::Start(0))?;
    match segment.file.read_exact(&mut buf) {
        Ok(()) => Ok(u32::from_le_bytes(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(WalError::Truncated {
            segment: segment.name.clone(),
            offset: 0,
        }),
        Err(e) => Err(e.into()),
    }
}
