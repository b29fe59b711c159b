//! Format probing and dispatch.
//!
//! Each compression format gets its own indexer module; this file is the
//! seam the registry (`crate::registry`) talks to, playing the role the
//! original implementation's `CompressedFile` subclass table (`FileList::add`
//! trying `GzipFile::open`, `Bzip2File::open`, ... in turn) played there.
//! A closed `Format` enum stands in for that virtual dispatch, since every
//! concrete format is known at compile time and nothing outside this crate
//! ever needs to add a fifth one.

pub mod bzip2;
pub mod gzip;
pub mod lzop;
pub mod xz;

use crate::block::Block;
use crate::config::Config;
use crate::error::Result;
use crate::handle::FileHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Lzop,
    Gzip,
    Bzip2,
    Xz,
}

impl Format {
    /// Probe order matters: lzop and xz have unambiguous multi-byte magic,
    /// gzip's is two bytes, and bzip2's `BZh` + digit is checked last since
    /// it is the least self-describing of the four.
    pub const PROBE_ORDER: [Format; 4] = [Format::Lzop, Format::Gzip, Format::Bzip2, Format::Xz];

    pub fn name(self) -> &'static str {
        match self {
            Format::Lzop => "lzop",
            Format::Gzip => "gzip",
            Format::Bzip2 => "bzip2",
            Format::Xz => "xz",
        }
    }

    /// Suffix stripped to derive the mounted (virtual) file name, e.g.
    /// `archive.tar.gz` -> `archive.tar`. Matches `PathUtils`' suffix table,
    /// extended with pixz's `.tpxz` alias for `.tar.xz`.
    pub fn strip_suffixes(self) -> &'static [&'static str] {
        match self {
            Format::Lzop => &[".lzo"],
            Format::Gzip => &[".gz", ".z"],
            Format::Bzip2 => &[".bz2", ".bz"],
            Format::Xz => &[".xz", ".tpxz", ".pxz"],
        }
    }

    pub fn probe(self, handle: &FileHandle) -> Result<bool> {
        match self {
            Format::Lzop => lzop::probe(handle),
            Format::Gzip => gzip::probe(handle),
            Format::Bzip2 => bzip2::probe(handle),
            Format::Xz => xz::probe(handle),
        }
    }

    pub fn build_index(self, handle: &FileHandle, config: &Config) -> Result<Vec<Block>> {
        match self {
            Format::Lzop => lzop::build_index(handle),
            Format::Gzip => gzip::build_index(handle, config),
            Format::Bzip2 => bzip2::build_index(handle),
            Format::Xz => xz::build_index(handle),
        }
    }

    pub fn decompress_block(self, handle: &FileHandle, block: &Block) -> Result<Vec<u8>> {
        match self {
            Format::Lzop => lzop::decompress_block(handle, block),
            Format::Gzip => gzip::decompress_block(handle, block),
            Format::Bzip2 => bzip2::decompress_block(handle, block),
            Format::Xz => xz::decompress_block(handle, block),
        }
    }
}

/// Tries every format in `Format::PROBE_ORDER`, returning the first whose
/// magic matches. `None` means the archive should be rejected at mount
/// time as an unrecognized file.
pub fn detect(handle: &FileHandle) -> Result<Option<Format>> {
    for format in Format::PROBE_ORDER {
        if format.probe(handle)? {
            return Ok(Some(format));
        }
    }
    Ok(None)
}
