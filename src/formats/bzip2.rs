//! Bzip2 block indexing and decoding.
//!
//! Bzip2 carries no block-length table: blocks are found only by scanning
//! the compressed bitstream for two 48-bit magic constants, exactly as
//! `Bzip2File::findBlockBoundaryCandidates` does in the original
//! implementation. Each match is re-aligned to a byte boundary and handed
//! to a real decoder by synthesizing a minimal standalone stream — the
//! same trick `parallel_bzip2`'s scanner uses (`BZh9` header + copied
//! block bits, tolerating the `UnexpectedEof` a truncated last block
//! produces).
//!
//! Unlike that scanner, a concatenated bzip2 file may mix compression
//! levels across its member streams (`BZh1` .. `BZh9`), so each block here
//! remembers the level of the stream header that preceded it.

use std::io::Read;

use bzip2::read::BzDecoder;

use crate::bitio::{BitReader, BitWriter};
use crate::block::{Block, BlockKind};
use crate::error::{Error, Result};
use crate::handle::FileHandle;

const BLOCK_MAGIC: u64 = 0x314159265359;
const EOS_MAGIC: u64 = 0x177245385090;
const MAGIC_BITS: u32 = 48;
const MAGIC_MASK: u64 = (1u64 << MAGIC_BITS) - 1;

fn get_bit(data: &[u8], pos: u64) -> u64 {
    let byte = data[(pos / 8) as usize];
    ((byte >> (7 - (pos % 8))) & 1) as u64
}

fn stream_header_level(data: &[u8], byte_offset: usize) -> Option<u8> {
    let hdr = data.get(byte_offset..byte_offset + 4)?;
    if &hdr[0..3] != b"BZh" {
        return None;
    }
    if !(b'1'..=b'9').contains(&hdr[3]) {
        return None;
    }
    Some(hdr[3] - b'0')
}

pub fn probe(handle: &FileHandle) -> Result<bool> {
    let mut buf = [0u8; 4];
    match handle.try_pread(0, &mut buf)? {
        4 => Ok(stream_header_level(&buf, 0).is_some()),
        _ => Ok(false),
    }
}

#[derive(Clone, Copy)]
enum Marker {
    Block,
    Eos,
}

fn scan_markers(data: &[u8], start_bit: u64) -> Vec<(u64, Marker)> {
    let total_bits = data.len() as u64 * 8;
    if start_bit + MAGIC_BITS as u64 > total_bits {
        return Vec::new();
    }

    let mut window: u64 = 0;
    for i in 0..MAGIC_BITS as u64 {
        window = (window << 1) | get_bit(data, start_bit + i);
    }

    let mut markers = Vec::new();
    let mut cur = start_bit + MAGIC_BITS as u64;
    loop {
        let masked = window & MAGIC_MASK;
        if masked == BLOCK_MAGIC {
            markers.push((cur - MAGIC_BITS as u64, Marker::Block));
        } else if masked == EOS_MAGIC {
            markers.push((cur - MAGIC_BITS as u64, Marker::Eos));
        }
        if cur >= total_bits {
            break;
        }
        window = ((window << 1) | get_bit(data, cur)) & MAGIC_MASK;
        cur += 1;
    }
    markers
}

struct RawBlock {
    start_bit: u64,
    end_bit: u64,
    level: u8,
}

fn find_raw_blocks(data: &[u8]) -> Result<Vec<RawBlock>> {
    let level = stream_header_level(data, 0)
        .ok_or_else(|| Error::format("<bzip2>", "missing BZh stream header"))?;
    let markers = scan_markers(data, 32);

    let mut level = level;
    let mut start: Option<u64> = None;
    let mut blocks = Vec::new();

    for (pos, kind) in markers {
        match kind {
            Marker::Block => {
                if let Some(s) = start.take() {
                    blocks.push(RawBlock {
                        start_bit: s,
                        end_bit: pos,
                        level,
                    });
                }
                start = Some(pos);
            }
            Marker::Eos => {
                if let Some(s) = start.take() {
                    blocks.push(RawBlock {
                        start_bit: s,
                        end_bit: pos,
                        level,
                    });
                }
                let crc_end_bit = pos + MAGIC_BITS as u64 + 32;
                let next_byte = ((crc_end_bit + 7) / 8) as usize;
                if let Some(new_level) = stream_header_level(data, next_byte) {
                    level = new_level;
                }
            }
        }
    }
    if let Some(s) = start.take() {
        blocks.push(RawBlock {
            start_bit: s,
            end_bit: data.len() as u64 * 8,
            level,
        });
    }
    Ok(blocks)
}

/// Builds a minimal standalone bzip2 stream containing just this one block,
/// re-aligned to a byte boundary, so the real `bzip2` crate can decode it.
fn synthesize_stream(data: &[u8], block: &RawBlock) -> Vec<u8> {
    let reader = BitReader::new(data);
    let mut out = Vec::with_capacity(4 + ((block.end_bit - block.start_bit) / 8) as usize + 1);
    out.extend_from_slice(b"BZh");
    out.push(b'0' + block.level);
    let mut writer = BitWriter::new();
    writer.copy_bits(&reader, block.start_bit, block.end_bit - block.start_bit);
    out.extend(writer.finish());
    out
}

fn decode_raw_block(data: &[u8], block: &RawBlock) -> Result<Vec<u8>> {
    let synthetic = synthesize_stream(data, block);
    let mut decoder = BzDecoder::new(&synthetic[..]);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => Ok(out),
        // The synthesized stream is missing its trailing CRC/EOS bits (we
        // only copied the block payload), so the decoder runs out of input
        // right after it has delivered everything it's going to.
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(out),
        Err(e) => Err(Error::codec("bzip2", block.start_bit / 8, e)),
    }
}

pub fn build_index(handle: &FileHandle) -> Result<Vec<Block>> {
    let size = handle.size()?;
    let data = handle.pread(0, size as usize)?;
    let raw_blocks = find_raw_blocks(&data)?;

    let mut blocks = Vec::with_capacity(raw_blocks.len());
    let mut uoff = 0u64;
    for rb in &raw_blocks {
        let decoded_len = decode_raw_block(&data, rb)?.len() as u64;
        let compressed_offset = rb.start_bit / 8;
        let compressed_end = (rb.end_bit + 7) / 8;
        blocks.push(Block {
            compressed_offset,
            compressed_size: compressed_end - compressed_offset,
            uncompressed_offset: uoff,
            uncompressed_size: decoded_len,
            kind: BlockKind::Bzip2 {
                start_bits: (rb.start_bit % 8) as u8,
                end_bits: (rb.end_bit % 8) as u8,
                level: rb.level,
            },
        });
        uoff += decoded_len;
    }
    Ok(blocks)
}

pub fn decompress_block(handle: &FileHandle, block: &Block) -> Result<Vec<u8>> {
    let (start_bits, end_bits, level) = match block.kind {
        BlockKind::Bzip2 {
            start_bits,
            end_bits,
            level,
        } => (start_bits, end_bits, level),
        _ => unreachable!("bzip2 decoder received a non-bzip2 block"),
    };
    let start_byte = block.compressed_offset;
    let end_byte = block.compressed_offset + block.compressed_size;
    let span = handle.pread(start_byte, (end_byte - start_byte) as usize)?;

    let rb = RawBlock {
        start_bit: start_bits as u64,
        end_bit: (span.len() as u64 * 8) - ((8 - end_bits as u64) % 8),
        level,
    };
    let decoded = decode_raw_block(&span, &rb)?;
    if decoded.len() as u64 != block.uncompressed_size {
        return Err(Error::integrity(
            "bzip2",
            format!(
                "block at {} decoded to {} bytes, index expected {}",
                block.compressed_offset,
                decoded.len(),
                block.uncompressed_size
            ),
        ));
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_bzip2(data: &[u8]) -> NamedTempFile {
        let f = NamedTempFile::new().unwrap();
        {
            let mut enc = BzEncoder::new(f.reopen().unwrap(), Compression::best());
            enc.write_all(data).unwrap();
            enc.finish().unwrap();
        }
        f
    }

    #[test]
    fn probe_detects_bzip2_magic() {
        let f = make_bzip2(&vec![b'x'; 5000]);
        let handle = FileHandle::open(f.path()).unwrap();
        assert!(probe(&handle).unwrap());
    }

    #[test]
    fn index_then_decode_round_trips() {
        let data: Vec<u8> = (0..500_000u32).map(|i| (i % 233) as u8).collect();
        let f = make_bzip2(&data);
        let handle = FileHandle::open(f.path()).unwrap();
        let blocks = build_index(&handle).unwrap();
        assert!(!blocks.is_empty());

        let mut assembled = Vec::new();
        for b in &blocks {
            assembled.extend_from_slice(&decompress_block(&handle, b).unwrap());
        }
        assert_eq!(assembled, data);
    }
}
