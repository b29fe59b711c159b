//! Serves a single read request by walking the blocks it spans.
//!
//! One of these is constructed per FUSE `read` call (it's cheap: two
//! borrows, no state of its own) and torn down again when the read
//! returns, the same lightweight-per-request shape the original
//! implementation's `CompressedFile::read` has.

use std::sync::Arc;

use crate::archive::Archive;
use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::pool::Pool;

pub struct OpenFile<'a> {
    archive: &'a Archive,
    cache: Arc<Cache>,
    pool: &'a Pool,
}

impl<'a> OpenFile<'a> {
    pub fn new(archive: &'a Archive, cache: Arc<Cache>, pool: &'a Pool) -> Self {
        OpenFile { archive, cache, pool }
    }

    /// Reads up to `len` bytes starting at `offset`, short at EOF exactly
    /// like `pread(2)`. On the first block this read touches, also kicks
    /// off a non-blocking prefetch of the next sequential block, so a
    /// follow-up read that keeps walking forward through the archive
    /// finds it already decoded.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let total = self.archive.uncompressed_size();
        if offset >= total {
            return Ok(Vec::new());
        }
        let end = offset.saturating_add(len as u64).min(total);

        let mut out = Vec::with_capacity((end - offset) as usize);
        let mut pos = offset;
        let mut first_block = true;
        while pos < end {
            let block = self.archive.find_block(pos).ok_or_else(|| {
                Error::format(
                    &self.archive.source_path,
                    format!("no block covers uncompressed offset {pos}"),
                )
            })?;
            let handle = self.archive.try_clone_handle()?;
            let format = self.archive.format;
            let owned_block = block.clone();
            let data = self.cache.get_or_decode(
                &self.archive.virtual_name,
                block,
                self.pool,
                move || format.decompress_block(&handle, &owned_block),
            )?;

            if first_block {
                first_block = false;
                self.prefetch_next(block.uncompressed_end());
            }

            let block_rel = (pos - block.uncompressed_offset) as usize;
            let take = ((end - pos) as usize).min(data.len() - block_rel);
            out.extend_from_slice(&data[block_rel..block_rel + take]);
            pos += take as u64;
        }
        Ok(out)
    }

    fn prefetch_next(&self, next_uncompressed_offset: u64) {
        let Some(next) = self.archive.find_block(next_uncompressed_offset) else {
            return;
        };
        let Ok(handle) = self.archive.try_clone_handle() else {
            return;
        };
        let format = self.archive.format;
        let owned_block = next.clone();
        Cache::prefetch(
            &self.cache,
            &self.archive.virtual_name,
            next,
            self.pool,
            move || format.decompress_block(&handle, &owned_block),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn read_spans_multiple_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin.gz");
        let data: Vec<u8> = (0..500_000u32).map(|i| (i % 251) as u8).collect();
        {
            let f = std::fs::File::create(&path).unwrap();
            let mut enc = GzEncoder::new(f, Compression::fast());
            enc.write_all(&data).unwrap();
            enc.finish().unwrap();
        }

        let mut config = Config::default();
        config.gzip_block_factor = 1;
        let archive = Archive::open(&path, &config).unwrap();
        let cache = Arc::new(Cache::new(64 * 1024 * 1024));
        let pool = crate::pool::Pool::new(2);
        let file = OpenFile::new(&archive, cache, &pool);

        let chunk = file.read(100_000, 200_000).unwrap();
        assert_eq!(chunk, data[100_000..300_000]);

        let tail = file.read(data.len() as u64 - 10, 100).unwrap();
        assert_eq!(tail, data[data.len() - 10..]);

        let past_eof = file.read(data.len() as u64 + 10, 100).unwrap();
        assert!(past_eof.is_empty());
    }
}
