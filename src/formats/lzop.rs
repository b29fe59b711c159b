//! Lzop block indexing and decoding.
//!
//! Lzop is the simplest of the four formats: every block already states
//! its own compressed and uncompressed length right in the stream, so
//! indexing is a single linear pass with no scanning or decode-at-index-time
//! needed, mirroring `LzopFile::findBlocks` in the original implementation.
//! Checksums (`F_ADLER32_*`/`F_CRC32_*`) are parsed to keep the block
//! layout correct but are not re-verified here; lzo1x decode failures
//! surface as `Error::Codec` regardless.

use crate::block::{Block, BlockKind};
use crate::error::{Error, Result};
use crate::handle::FileHandle;

const MAGIC: [u8; 9] = [0x89, b'L', b'Z', b'O', 0x00, 0x0d, 0x0a, 0x1a, 0x0a];
const VERSION_WITH_LEVEL: u16 = 0x0940;

const F_ADLER32_D: u32 = 1 << 0;
const F_ADLER32_C: u32 = 1 << 1;
const F_EXTRA_FIELD: u32 = 1 << 6;
const F_CRC32_D: u32 = 1 << 8;
const F_CRC32_C: u32 = 1 << 9;
const F_FILTER: u32 = 1 << 11;

pub fn probe(handle: &FileHandle) -> Result<bool> {
    let mut magic = [0u8; 9];
    match handle.try_pread(0, &mut magic)? {
        9 => Ok(magic == MAGIC),
        _ => Ok(false),
    }
}

fn read_u16(data: &[u8], pos: &mut usize) -> Result<u16> {
    let b = data
        .get(*pos..*pos + 2)
        .ok_or_else(|| Error::format("<lzop>", "truncated header"))?;
    *pos += 2;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32> {
    let b = data
        .get(*pos..*pos + 4)
        .ok_or_else(|| Error::format("<lzop>", "truncated header"))?;
    *pos += 4;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8> {
    let b = *data
        .get(*pos)
        .ok_or_else(|| Error::format("<lzop>", "truncated header"))?;
    *pos += 1;
    Ok(b)
}

/// Parses the fixed + variable-length header and returns `(flags, offset
/// of the first block)`.
fn read_header(data: &[u8]) -> Result<(u32, usize)> {
    if data.len() < MAGIC.len() || data[..MAGIC.len()] != MAGIC {
        return Err(Error::format("<lzop>", "bad magic"));
    }
    let mut pos = MAGIC.len();

    let version = read_u16(data, &mut pos)?;
    let _lib_version = read_u16(data, &mut pos)?;
    if version >= VERSION_WITH_LEVEL {
        let _version_needed = read_u16(data, &mut pos)?;
    }
    let _method = read_u8(data, &mut pos)?;
    if version >= VERSION_WITH_LEVEL {
        let _level = read_u8(data, &mut pos)?;
    }
    let flags = read_u32(data, &mut pos)?;
    if flags & F_FILTER != 0 {
        let _filter = read_u32(data, &mut pos)?;
    }
    let _mode = read_u32(data, &mut pos)?;
    let _mtime_low = read_u32(data, &mut pos)?;
    let _mtime_high = read_u32(data, &mut pos)?;
    let name_len = read_u8(data, &mut pos)? as usize;
    pos += name_len; // filename, not needed for block layout
    pos += 4; // header checksum (adler32 or crc32 depending on F_H_CRC32)

    if flags & F_EXTRA_FIELD != 0 {
        let extra_len = read_u32(data, &mut pos)? as usize;
        pos += extra_len;
        pos += 4; // extra field checksum
    }

    if pos > data.len() {
        return Err(Error::format("<lzop>", "header runs past end of file"));
    }
    Ok((flags, pos))
}

pub fn build_index(handle: &FileHandle) -> Result<Vec<Block>> {
    let size = handle.size()?;
    let data = handle.pread(0, size as usize)?;
    let (flags, mut pos) = read_header(&data)?;

    let mut blocks = Vec::new();
    let mut uoff = 0u64;
    loop {
        let usize_ = read_u32(&data, &mut pos)?;
        if usize_ == 0 {
            break; // end-of-blocks marker
        }
        let csize = read_u32(&data, &mut pos)?;

        if flags & (F_ADLER32_D | F_CRC32_D) != 0 {
            pos += 4;
        }
        if csize < usize_ && flags & (F_ADLER32_C | F_CRC32_C) != 0 {
            pos += 4;
        }

        let compressed_offset = pos as u64;
        if pos + csize as usize > data.len() {
            return Err(Error::format("<lzop>", "block runs past end of file"));
        }
        pos += csize as usize;

        blocks.push(Block {
            compressed_offset,
            compressed_size: csize as u64,
            uncompressed_offset: uoff,
            uncompressed_size: usize_ as u64,
            kind: BlockKind::Lzop,
        });
        uoff += usize_ as u64;
    }
    Ok(blocks)
}

pub fn decompress_block(handle: &FileHandle, block: &Block) -> Result<Vec<u8>> {
    debug_assert!(matches!(block.kind, BlockKind::Lzop));
    let compressed = handle.pread(block.compressed_offset, block.compressed_size as usize)?;

    if block.compressed_size == block.uncompressed_size {
        return Ok(compressed);
    }

    let mut out = vec![0u8; block.uncompressed_size as usize];
    let (written, error) = rust_lzo::LZOContext::decompress_to_slice(&compressed, &mut out);
    let written_len = written.len();
    if error != rust_lzo::LZOError::OK {
        return Err(Error::codec(
            "lzop",
            block.compressed_offset,
            format!("lzo1x decompress failed: {error:?}"),
        ));
    }
    out.truncate(written_len);
    if out.len() as u64 != block.uncompressed_size {
        return Err(Error::integrity(
            "lzop",
            format!(
                "block at {} decoded to {} bytes, index expected {}",
                block.compressed_offset,
                out.len(),
                block.uncompressed_size
            ),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_u32_be(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    /// Builds a minimal, unfiltered, unchecksummed lzop stream with one
    /// stored (not lzo-compressed) block, enough to exercise layout parsing.
    fn make_minimal_lzop(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&0x0930u16.to_be_bytes()); // version < VERSION_WITH_LEVEL
        out.extend_from_slice(&0x0940u16.to_be_bytes()); // lib version
        out.push(1); // method
        write_u32_be(&mut out, 0); // flags: no checksums, no filter, no extra field
        write_u32_be(&mut out, 0o100644); // mode
        write_u32_be(&mut out, 0); // mtime low
        write_u32_be(&mut out, 0); // mtime high
        out.push(0); // filename length
        write_u32_be(&mut out, 0); // header checksum placeholder

        write_u32_be(&mut out, data.len() as u32); // usize
        write_u32_be(&mut out, data.len() as u32); // csize == usize: stored
        out.extend_from_slice(data);

        write_u32_be(&mut out, 0); // end-of-blocks marker
        out
    }

    #[test]
    fn probe_and_index_stored_block() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let payload = b"hello lzop world".repeat(100);
        let bytes = make_minimal_lzop(&payload);
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();

        let handle = FileHandle::open(f.path()).unwrap();
        assert!(probe(&handle).unwrap());

        let blocks = build_index(&handle).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].uncompressed_size, payload.len() as u64);

        let decoded = decompress_block(&handle, &blocks[0]).unwrap();
        assert_eq!(decoded, payload);
    }
}
