use std::path::PathBuf;

use thiserror::Error;

use crate::Mode;

#[derive(Error, Debug)]
pub enum WalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("directory is not empty: {0}")]
    DirNotEmpty(PathBuf),

    #[error("no segment files in {0}")]
    NoSegments(PathBuf),

    #[error("segment locked by another process: {0}")]
    Locked(PathBuf),

    #[error("bad segment name: {0}")]
    BadSegmentName(String),

    #[error("segment {segment} truncated at offset {offset}")]
    Truncated { segment: String, offset: u64 },

    #[error(
        "CRC mismatch in {segment} at offset {offset} (stored={stored:#010x}, computed={computed:#010x})"
    )]
    CorruptFrame {
        segment: String,
        offset: u64,
        stored: u32,
        computed: u32,
    },

    #[error(
        "segment chain broken: {segment} seed CRC {seed:#010x} does not continue rolling CRC {rolling:#010x}"
    )]
    SegmentChainBroken {
        segment: String,
        seed: u32,
        rolling: u32,
    },

    #[error("operation requires {required} mode but the log is in {actual} mode")]
    WrongMode { required: Mode, actual: Mode },

    #[error("entry body of {0} bytes does not fit the frame length field")]
    EntryTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, WalError>;
