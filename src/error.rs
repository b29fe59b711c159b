//! Unified error taxonomy for the indexing and decompression engine.
//!
//! Mirrors the classification from the design doc: format errors let the
//! registry try the next probe, codec/integrity errors are reported to cache
//! waiters and logged with stream position, I/O errors are passed through.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Magic mismatch, truncated header, unknown version, or a block that
    /// exceeds the configured `max_block_size` cap.
    #[error("{path}: format error: {reason}")]
    Format { path: PathBuf, reason: String },

    /// Wraps an OS-level I/O failure; propagated to the caller unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A decoder returned a non-success status mid-stream.
    #[error("{format} codec error at compressed offset {position}: {reason}")]
    Codec {
        format: &'static str,
        position: u64,
        reason: String,
    },

    /// A checksum (lzop adler/crc, xz index CRC32) did not match.
    #[error("{format} integrity error: {reason}")]
    Integrity {
        format: &'static str,
        reason: String,
    },

    /// Sidecar index present but stale (archive size/mtime mismatch). Never
    /// escapes `IndexedArchive::open` — handled internally by rebuilding.
    #[error("index stale: {0}")]
    IndexStale(String),

    /// A virtual name collided with an already-mounted archive.
    #[error("virtual name {name:?} already used by {existing}; rejecting {rejected}")]
    DuplicateName {
        name: String,
        existing: PathBuf,
        rejected: PathBuf,
    },
}

impl Error {
    pub fn format(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Error::Format {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn codec(format: &'static str, position: u64, reason: impl fmt::Display) -> Self {
        Error::Codec {
            format,
            position,
            reason: reason.to_string(),
        }
    }

    pub fn integrity(format: &'static str, reason: impl fmt::Display) -> Self {
        Error::Integrity {
            format,
            reason: reason.to_string(),
        }
    }

    /// Maps to a POSIX-style errno the VFS layer can hand back to the kernel.
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::Format { .. } => libc::EINVAL,
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Error::Codec { .. } => libc::EIO,
            Error::Integrity { .. } => libc::EIO,
            Error::IndexStale(_) => libc::EIO,
            Error::DuplicateName { .. } => libc::EEXIST,
        }
    }
}
