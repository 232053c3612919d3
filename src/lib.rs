//! seglog: segmented append-only write-ahead log.
//!
//! A directory of 64 MiB preallocated segment files with:
//! - length-prefixed frames carrying a CRC32C chained across the whole log
//! - per-entry fsync durability
//! - advisory-locked segments, single writer per directory
//! - crash recovery that truncates at the last valid frame
//!
//! A log handle is either in read mode or append mode, never both. A freshly
//! created log starts in append mode. An opened log starts in read mode and
//! becomes appendable once `read_all` has drained it.

pub mod entry;
pub mod error;
pub mod observer;

mod decoder;
mod encoder;
mod frame;
mod segment;

use std::fmt;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::segment::Segment;

pub use crate::entry::Entry;
pub use crate::error::{Result, WalError};
pub use crate::observer::{NoopObserver, WalObserver};
pub use crate::segment::SEGMENT_SIZE;

/// Operating mode of a log handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Append,
    Closed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Read => "read",
            Mode::Append => "append",
            Mode::Closed => "closed",
        })
    }
}

enum WalState {
    Reading(Decoder),
    Writing {
        sealed: Vec<Segment>,
        encoder: Encoder,
    },
    Closed,
}

impl WalState {
    fn mode(&self) -> Mode {
        match self {
            WalState::Reading(_) => Mode::Read,
            WalState::Writing { .. } => Mode::Append,
            WalState::Closed => Mode::Closed,
        }
    }
}

struct WalInner {
    dir: PathBuf,
    dir_file: File,
    state: WalState,
    last_index: u64,
}

/// A write-ahead log rooted at one directory.
///
/// All operations serialize on an internal mutex, so the handle can be
/// shared across threads behind an `Arc` and concurrent appends line up in
/// fsync order.
pub struct Wal {
    inner: Mutex<WalInner>,
    observer: Box<dyn WalObserver>,
}

impl Wal {
    /// Create a fresh log in append mode. `dir` must be absent (it is
    /// created with mode 0700) or an existing empty directory.
    pub fn create(dir: impl AsRef<Path>) -> Result<Wal> {
        Self::create_with_observer(dir, Box::new(NoopObserver))
    }

    pub fn create_with_observer(
        dir: impl AsRef<Path>,
        observer: Box<dyn WalObserver>,
    ) -> Result<Wal> {
        let dir = dir.as_ref();
        match fs::metadata(dir) {
            Ok(meta) if !meta.is_dir() => {
                return Err(WalError::NotADirectory(dir.to_path_buf()));
            }
            Ok(_) => {
                if fs::read_dir(dir)?.next().is_some() {
                    return Err(WalError::DirNotEmpty(dir.to_path_buf()));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                create_dir_0700(dir)?;
                // Best-effort parent fsync so the new directory name itself
                // survives a crash.
                if let Some(parent) = dir.parent() {
                    if let Ok(parent) = File::open(parent) {
                        let _ = parent.sync_all();
                    }
                }
            }
            Err(e) => return Err(e.into()),
        }

        let dir_file = File::open(dir)?;
        let first = segment::create_segment(dir, 0, 0, 0)?;
        dir_file.sync_all()?;

        observer.on_open(dir, 1);
        Ok(Wal {
            inner: Mutex::new(WalInner {
                dir: dir.to_path_buf(),
                dir_file,
                state: WalState::Writing {
                    sealed: Vec::new(),
                    encoder: Encoder::new(first, 0),
                },
                last_index: 0,
            }),
            observer,
        })
    }

    /// Open an existing log for replay. The handle starts in read mode;
    /// drain it with `read_all` before appending.
    pub fn open(dir: impl AsRef<Path>) -> Result<Wal> {
        Self::open_with_observer(dir, Box::new(NoopObserver))
    }

    pub fn open_with_observer(
        dir: impl AsRef<Path>,
        observer: Box<dyn WalObserver>,
    ) -> Result<Wal> {
        let dir = dir.as_ref();
        let names = segment::list_segments(dir)?;
        if names.is_empty() {
            return Err(WalError::NoSegments(dir.to_path_buf()));
        }

        let dir_file = File::open(dir)?;
        let mut segments = Vec::with_capacity(names.len());
        for (seq, start_index, name) in &names {
            segments.push(segment::open_segment(dir, *seq, *start_index, name, false)?);
        }
        let decoder = Decoder::new(segments)?;

        observer.on_open(dir, names.len());
        Ok(Wal {
            inner: Mutex::new(WalInner {
                dir: dir.to_path_buf(),
                dir_file,
                state: WalState::Reading(decoder),
                last_index: 0,
            }),
            observer,
        })
    }

    /// Replay the whole log and return every entry with `index >= start` in
    /// append order, then switch the handle to append mode positioned
    /// exactly after the last valid frame.
    ///
    /// Entries below `start` are still read and CRC-verified, they are just
    /// not returned.
    pub fn read_all(&self, start: u64) -> Result<Vec<Entry>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let decoder = match &mut inner.state {
            WalState::Reading(decoder) => decoder,
            other => {
                return Err(WalError::WrongMode {
                    required: Mode::Read,
                    actual: other.mode(),
                })
            }
        };

        let mut entries = Vec::new();
        let mut last_index = None;
        loop {
            match decoder.decode() {
                Ok(Some(entry)) => {
                    last_index = Some(entry.index);
                    if entry.index >= start {
                        entries.push(entry);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    self.observer.on_corruption(&err);
                    return Err(err);
                }
            }
        }
        if let Some(err) = decoder.take_tolerated() {
            self.observer.on_corruption(&err);
        }
        let offset = decoder.offset()?;
        let crc = decoder.crc();

        // Replay used read-only handles; appending needs write access. Drop
        // every read handle together with its lock, then reopen and re-lock
        // read-write, seeking the last segment to the recovered write point.
        inner.state = WalState::Closed;

        let names = segment::list_segments(&inner.dir)?;
        let mut segments = Vec::with_capacity(names.len());
        for (seq, start_index, name) in &names {
            segments.push(segment::open_segment(
                &inner.dir,
                *seq,
                *start_index,
                name,
                true,
            )?);
        }
        let mut active = match segments.pop() {
            Some(segment) => segment,
            None => return Err(WalError::NoSegments(inner.dir.clone())),
        };
        active.file.seek(SeekFrom::Start(offset))?;

        if let Some(index) = last_index {
            inner.last_index = index;
        }
        inner.state = WalState::Writing {
            sealed: segments,
            encoder: Encoder::new(active, crc),
        };
        Ok(entries)
    }

    /// Append one entry and fsync it. Durability is per entry: when this
    /// returns, the entry is on disk. Crossing the segment size bound cuts
    /// a new segment for subsequent appends.
    pub fn append(&self, entry: &Entry) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let encoder = match &mut inner.state {
            WalState::Writing { encoder, .. } => encoder,
            other => {
                return Err(WalError::WrongMode {
                    required: Mode::Append,
                    actual: other.mode(),
                })
            }
        };

        let body = entry.marshal();
        let offset = encoder.append(&body)?;
        inner.last_index = entry.index;

        if offset >= SEGMENT_SIZE {
            let (seq, start_index) = inner.cut()?;
            self.observer.on_rotate(&inner.dir, seq, start_index);
        }
        Ok(())
    }

    /// Release every segment lock and close all files. Later calls are
    /// no-ops.
    pub fn close(&self) -> Result<()> {
        self.inner.lock().state = WalState::Closed;
        Ok(())
    }

    /// Current mode of the handle.
    pub fn mode(&self) -> Mode {
        self.inner.lock().state.mode()
    }
}

impl WalInner {
    /// Seal the active segment and start the next one. The new segment's
    /// seed header carries the rolling CRC so replay can verify the chain
    /// across files, and its name records the index the next entry gets.
    fn cut(&mut self) -> Result<(u64, u64)> {
        let WalState::Writing { sealed, encoder } = &mut self.state else {
            return Err(WalError::WrongMode {
                required: Mode::Append,
                actual: self.state.mode(),
            });
        };

        let next_seq = encoder.seq() + 1;
        let next_index = self.last_index + 1;
        let crc = encoder.crc();

        let segment = segment::create_segment(&self.dir, next_seq, next_index, crc)?;
        self.dir_file.sync_all()?;

        let old = std::mem::replace(encoder, Encoder::new(segment, crc));
        sealed.push(old.into_segment());

        // The sealed segment stays open so its lock is held for the life of
        // the log, but it is never written again.
        Ok((next_seq, next_index))
    }
}

#[cfg(unix)]
fn create_dir_0700(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_dir_0700(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}
