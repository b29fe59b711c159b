//! Types shared by every format indexer: a single compressed block's
//! location plus whatever format-specific state is needed to resume
//! decoding it without replaying the whole archive.
//!
//! Corresponds to the per-format `Block` subclasses in the original
//! implementation (`Block.h`'s base plus `GzipBlock`, `Bzip2Block`,
//! `LzopBlock`, `PixzBlock`), collapsed here into one struct with a format
//! tag, since Rust enums let every format share storage instead of each
//! needing its own vtable slot.

/// Per-format auxiliary data a block carries beyond its byte ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// A deflate block boundary. `dict` is `Some` only when this block was
    /// chosen as a dictionary-bearing restart point (see
    /// `Config::gzip_min_dict_span`); other blocks decode by replaying from
    /// the nearest earlier one that has one.
    Gzip {
        /// Bits already consumed from the byte at `compressed_offset - 1`
        /// that must be re-primed via `inflatePrime` before resuming; 0
        /// when this block starts on a byte boundary.
        bit_shift: u8,
        dict: Option<Vec<u8>>,
    },
    /// A bzip2 compressed-block boundary. `level` is the `BZh<level>` digit
    /// from this block's enclosing stream header, needed because a bzip2
    /// archive may be a concatenation of streams at different levels.
    /// `start_bits`/`end_bits` are the bit offsets within the bytes at
    /// `compressed_offset` and `compressed_offset + compressed_size`
    /// respectively, since bzip2's bitstream is not byte-aligned.
    Bzip2 {
        start_bits: u8,
        end_bits: u8,
        level: u8,
    },
    /// An lzop block; checksums are re-verified from the stored values at
    /// decode time rather than cached here.
    Lzop,
    /// An xz/pixz block, identified by its index within the stream's Index
    /// field.
    Xz { index_in_stream: u64 },
}

/// One randomly-addressable span of an archive: `compressed_offset` is
/// where the block's byte-aligned data begins (bzip2 bit offsets live in
/// `kind` instead, since they aren't byte-aligned), `uncompressed_offset`
/// is its position in the decompressed stream, and `uncompressed_size` is
/// how many decompressed bytes it yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub compressed_offset: u64,
    pub compressed_size: u64,
    pub uncompressed_offset: u64,
    pub uncompressed_size: u64,
    pub kind: BlockKind,
}

impl Block {
    pub fn uncompressed_end(&self) -> u64 {
        self.uncompressed_offset + self.uncompressed_size
    }

    pub fn contains(&self, uncompressed_pos: u64) -> bool {
        uncompressed_pos >= self.uncompressed_offset && uncompressed_pos < self.uncompressed_end()
    }
}

/// Locates the block covering `pos` in a list sorted by
/// `uncompressed_offset`, via binary search rather than linear scan since
/// archives can carry tens of thousands of blocks.
pub fn find_block(blocks: &[Block], pos: u64) -> Option<&Block> {
    if blocks.is_empty() {
        return None;
    }
    let idx = match blocks.binary_search_by(|b| b.uncompressed_offset.cmp(&pos)) {
        Ok(i) => i,
        Err(0) => return None,
        Err(i) => i - 1,
    };
    let block = &blocks[idx];
    if block.contains(pos) {
        Some(block)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(off: u64, size: u64) -> Block {
        Block {
            compressed_offset: 0,
            compressed_size: 0,
            uncompressed_offset: off,
            uncompressed_size: size,
            kind: BlockKind::Lzop,
        }
    }

    #[test]
    fn find_block_exact_and_interior() {
        let blocks = vec![b(0, 10), b(10, 10), b(20, 10)];
        assert_eq!(find_block(&blocks, 0).unwrap().uncompressed_offset, 0);
        assert_eq!(find_block(&blocks, 15).unwrap().uncompressed_offset, 10);
        assert_eq!(find_block(&blocks, 29).unwrap().uncompressed_offset, 20);
        assert!(find_block(&blocks, 30).is_none());
    }

    #[test]
    fn find_block_empty() {
        assert!(find_block(&[], 0).is_none());
    }
}
