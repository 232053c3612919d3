//! Segment files: naming, enumeration, creation, locking.
//!
//! A log directory holds segment files named `%016x-%016x.wal`, where the
//! first field is the segment sequence number and the second is the index of
//! the first entry written to the segment. Every segment is preallocated to
//! `SEGMENT_SIZE` at creation and advisory-locked for as long as it is open.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs4::fs_std::FileExt;

use crate::error::{Result, WalError};

/// Preallocated size of every segment file.
pub const SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

const SEGMENT_SUFFIX: &str = ".wal";

/// One open, advisory-locked segment file.
///
/// The exclusive lock is held for the lifetime of the value and released on
/// drop, together with the file handle.
#[derive(Debug)]
pub(crate) struct Segment {
    pub file: File,
    pub seq: u64,
    pub start_index: u64,
    pub name: String,
    /// On-disk length at open time; the decoder treats it as the read bound.
    pub len: u64,
}

impl Drop for Segment {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Format a segment file name from its sequence number and the index of the
/// first entry it holds.
pub(crate) fn segment_name(seq: u64, index: u64) -> String {
    format!("{:016x}-{:016x}{}", seq, index, SEGMENT_SUFFIX)
}

/// Parse a segment file name. Returns None unless both fields are exactly
/// 16 lowercase hex digits.
pub(crate) fn parse_segment_name(name: &str) -> Option<(u64, u64)> {
    let stem = name.strip_suffix(SEGMENT_SUFFIX)?;
    let (seq, index) = stem.split_once('-')?;
    Some((parse_hex16(seq)?, parse_hex16(index)?))
}

fn parse_hex16(field: &str) -> Option<u64> {
    if field.len() != 16 || !field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    u64::from_str_radix(field, 16).ok()
}

/// Enumerate the segment files of a directory, sorted ascending by
/// (sequence, index).
///
/// Files without the `.wal` suffix and subdirectories are ignored. A `.wal`
/// file whose name does not parse is fatal, as are gaps in the sequence
/// numbers and decreasing start indices.
pub(crate) fn list_segments(dir: &Path) -> Result<Vec<(u64, u64, String)>> {
    let mut found = Vec::new();
    for dirent in fs::read_dir(dir)? {
        let dirent = dirent?;
        if !dirent.file_type()?.is_file() {
            continue;
        }
        let name = match dirent.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if !name.ends_with(SEGMENT_SUFFIX) {
            continue;
        }
        match parse_segment_name(&name) {
            Some((seq, index)) => found.push((seq, index, name)),
            None => return Err(WalError::BadSegmentName(name)),
        }
    }

    found.sort();
    for pair in found.windows(2) {
        let (prev_seq, prev_index, _) = &pair[0];
        let (seq, index, name) = &pair[1];
        if *seq != prev_seq + 1 || index < prev_index {
            return Err(WalError::BadSegmentName(name.clone()));
        }
    }
    Ok(found)
}

/// Acquire the whole-file exclusive advisory lock without blocking.
pub(crate) fn lock_segment(file: &File, name: &Path) -> Result<()> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            Err(WalError::Locked(name.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Create, lock, and preallocate a fresh segment, writing and fsyncing its
/// seed-CRC header. The caller fsyncs the directory so the new name becomes
/// durable.
pub(crate) fn create_segment(
    dir: &Path,
    seq: u64,
    start_index: u64,
    seed_crc: u32,
) -> Result<Segment> {
    let name = segment_name(seq, start_index);
    let path = dir.join(&name);

    let mut options = OpenOptions::new();
    options.read(true).write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o700);
    }
    let mut file = options.open(&path)?;

    lock_segment(&file, &path)?;
    file.set_len(SEGMENT_SIZE)?;
    file.write_all(&seed_crc.to_le_bytes())?;
    file.sync_all()?;

    Ok(Segment {
        file,
        seq,
        start_index,
        name,
        len: SEGMENT_SIZE,
    })
}

/// Open and lock an existing segment, read-only or read-write.
pub(crate) fn open_segment(
    dir: &Path,
    seq: u64,
    start_index: u64,
    name: &str,
    write: bool,
) -> Result<Segment> {
    let path = dir.join(name);
    let file = OpenOptions::new().read(true).write(write).open(&path)?;
    lock_segment(&file, &path)?;
    let len = file.metadata()?.len();

    Ok(Segment {
        file,
        seq,
        start_index,
        name: name.to_string(),
        len,
    })
}
