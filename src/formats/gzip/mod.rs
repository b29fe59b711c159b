//! Gzip/zlib block indexing and decoding.
//!
//! The hard part: gzip was never designed for random access. Deflate's
//! LZ77 window means decoding block N can depend on up to 32 KiB of bytes
//! produced by block N-1. The original implementation's `SavingGzipReader`
//! solves this by inflating the whole stream once at index-build time,
//! snapshotting the trailing 32 KiB window at chosen block boundaries, and
//! storing that snapshot so later reads can `inflateSetDictionary` +
//! `inflatePrime` straight to a mid-stream bit offset without replaying
//! anything. This module is the Rust telling of that idea: `window.rs`
//! wraps the raw zlib calls it needs, and this file drives the scan and
//! the per-block decode.

mod window;

use std::cell::Cell;
use std::io::{self, Read};

use crate::block::{Block, BlockKind};
use crate::config::Config;
use crate::handle::FileHandle;
use crate::error::{Error, Result};

use window::{RawInflate, Wrapper, Z_OK, Z_STREAM_END};

/// `GzipFile::WindowSize`: deflate's maximum back-reference distance.
pub const WINDOW_SIZE: usize = 32 * 1024;

const CHUNK: usize = 64 * 1024;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn probe(handle: &FileHandle) -> Result<bool> {
    let mut magic = [0u8; 2];
    match handle.try_pread(0, &mut magic)? {
        2 => Ok(magic == GZIP_MAGIC),
        _ => Ok(false),
    }
}

fn push_window(window: &mut Vec<u8>, data: &[u8]) {
    window.extend_from_slice(data);
    if window.len() > WINDOW_SIZE {
        let excess = window.len() - WINDOW_SIZE;
        window.drain(0..excess);
    }
}

/// Scans the whole archive once, recording a block at every point the
/// accumulated uncompressed span since the last dictionary snapshot
/// reaches `config.gzip_min_dict_span()`. The very first block never
/// needs a dictionary (nothing precedes it).
///
/// `Z_BLOCK` stops inflate() right after the gzip header too, before any
/// deflate block has produced a single byte of output (that's the only
/// way to fish `inflateMark`'s post-header bit position back out). That
/// first stop carries `uoff == 0` and must only update
/// `block_start_coff`/`block_start_bits` for whichever real block comes
/// next — it must never itself become a `Block` entry, or the first
/// recorded block would point at the gzip header instead of the start
/// of the deflate stream.
pub fn build_index(handle: &FileHandle, config: &Config) -> Result<Vec<Block>> {
    let mut file = handle.buf_reader()?;
    let total_in = Cell::new(0u64);
    let mut more_data = |buf: &mut Vec<u8>| -> io::Result<()> {
        buf.resize(CHUNK, 0);
        let n = file.read(&mut buf[..])?;
        buf.truncate(n);
        total_in.set(total_in.get() + n as u64);
        Ok(())
    };

    let mut engine = RawInflate::new(Wrapper::Gzip);
    let mut window: Vec<u8> = Vec::with_capacity(WINDOW_SIZE);
    let mut scratch = vec![0u8; CHUNK];

    let mut blocks = Vec::new();
    let mut uoff: u64 = 0;
    let mut span_since_dict: u64 = 0;
    let mut block_start_coff: u64 = 0;
    let mut block_start_bits: u8 = 0;
    let mut first_block = true;

    loop {
        let mut pos = 0usize;
        let status = loop {
            if pos == scratch.len() {
                push_window(&mut window, &scratch[..pos]);
                uoff += pos as u64;
                span_since_dict += pos as u64;
                pos = 0;
            }
            let err = engine.step(&mut more_data, &mut scratch, &mut pos, window::Z_BLOCK)?;
            if err != Z_OK && err != Z_STREAM_END {
                return Err(Error::codec(
                    "gzip",
                    total_in.get(),
                    format!("inflate returned {err}"),
                ));
            }
            if engine.at_block_boundary() || err == Z_STREAM_END {
                break err;
            }
        };
        push_window(&mut window, &scratch[..pos]);
        uoff += pos as u64;
        span_since_dict += pos as u64;

        let coff = total_in.get() - engine.avail_in() as u64;
        let bits = engine.ibits();

        // The header-boundary stop (no output produced yet) only ever
        // updates block_start_coff/block_start_bits for the block that
        // follows it; it never gets an index entry of its own.
        if uoff == 0 {
            block_start_coff = coff;
            block_start_bits = bits;
            if status == Z_STREAM_END {
                break;
            }
            continue;
        }

        let dict = if first_block {
            Some(Vec::new())
        } else if span_since_dict >= config.gzip_min_dict_span() {
            Some(window.clone())
        } else {
            None
        };

        if let Some(d) = dict {
            blocks.push(Block {
                compressed_offset: block_start_coff,
                compressed_size: 0,
                uncompressed_offset: uoff - span_since_dict,
                uncompressed_size: 0,
                kind: BlockKind::Gzip {
                    bit_shift: block_start_bits,
                    dict: Some(d),
                },
            });
            span_since_dict = 0;
            first_block = false;
        }

        block_start_coff = coff;
        block_start_bits = bits;

        if status == Z_STREAM_END {
            break;
        }
    }

    // Fill in compressed_size/uncompressed_size now that every boundary is
    // known, and drop a trailing entry with zero size if the stream ended
    // exactly on a recorded boundary.
    finalize_spans(&mut blocks, uoff, total_in.get());
    Ok(blocks)
}

fn finalize_spans(blocks: &mut Vec<Block>, total_uncompressed: u64, total_compressed: u64) {
    let n = blocks.len();
    for i in 0..n {
        let uncompressed_end = if i + 1 < n {
            blocks[i + 1].uncompressed_offset
        } else {
            total_uncompressed
        };
        let compressed_end = if i + 1 < n {
            blocks[i + 1].compressed_offset
        } else {
            total_compressed
        };
        blocks[i].uncompressed_size = uncompressed_end - blocks[i].uncompressed_offset;
        blocks[i].compressed_size = compressed_end - blocks[i].compressed_offset;
    }
    blocks.retain(|b| b.uncompressed_size > 0);
}

/// Decodes `block` into exactly `block.uncompressed_size` bytes, resuming
/// directly at its stored bit offset via the saved dictionary, mirroring
/// `GzipBlockReader`.
pub fn decompress_block(handle: &FileHandle, block: &Block) -> Result<Vec<u8>> {
    let (bit_shift, dict) = match &block.kind {
        BlockKind::Gzip { bit_shift, dict } => (*bit_shift, dict),
        _ => unreachable!("gzip decoder received a non-gzip block"),
    };

    let mut engine = RawInflate::new(Wrapper::Raw);
    if let Some(dict) = dict {
        if !dict.is_empty() {
            engine.set_dictionary(dict)?;
        }
    }

    let mut pos = block.compressed_offset;
    if bit_shift != 0 {
        pos -= 1;
        let byte = handle.pread(pos, 1)?[0];
        pos += 1;
        engine.prime(byte, bit_shift)?;
    }

    let remaining_in_file = handle.size()?.saturating_sub(pos);
    let mut cursor = 0u64;
    let mut more_data = |buf: &mut Vec<u8>| -> io::Result<()> {
        let want = CHUNK.min((remaining_in_file - cursor) as usize);
        let data = handle.pread(pos + cursor, want)?;
        cursor += data.len() as u64;
        *buf = data;
        Ok(())
    };

    let mut out = vec![0u8; block.uncompressed_size as usize];
    let mut out_pos = 0usize;
    while out_pos < out.len() {
        let err = engine.step(&mut more_data, &mut out, &mut out_pos, window::Z_BLOCK)?;
        if err != Z_OK && err != Z_STREAM_END {
            return Err(Error::codec(
                "gzip",
                block.compressed_offset,
                format!("inflate returned {err}"),
            ));
        }
        if err == Z_STREAM_END {
            break;
        }
    }
    out.truncate(out_pos);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_gzip(data: &[u8]) -> NamedTempFile {
        let f = NamedTempFile::new().unwrap();
        {
            let mut enc = GzEncoder::new(f.reopen().unwrap(), Compression::default());
            enc.write_all(data).unwrap();
            enc.finish().unwrap();
        }
        f
    }

    #[test]
    fn probe_detects_gzip_magic() {
        let data = vec![b'a'; 1000];
        let f = make_gzip(&data);
        let handle = FileHandle::open(f.path()).unwrap();
        assert!(probe(&handle).unwrap());
    }

    #[test]
    fn index_then_decode_round_trips_small_payload() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let f = make_gzip(&data);
        let handle = FileHandle::open(f.path()).unwrap();
        let config = Config::default();
        let blocks = build_index(&handle, &config).unwrap();
        assert!(!blocks.is_empty());

        let total: u64 = blocks.iter().map(|b| b.uncompressed_size).sum();
        assert_eq!(total, data.len() as u64);

        let mut assembled = Vec::new();
        for b in &blocks {
            let decoded = decompress_block(&handle, b).unwrap();
            assert_eq!(decoded.len(), b.uncompressed_size as usize);
            assembled.extend_from_slice(&decoded);
        }
        assert_eq!(assembled, data);
    }
}
