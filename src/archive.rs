//! A single mounted compressed archive: its block index, its format, and
//! the open file handle reads are served from.
//!
//! Corresponds to `CompressedFile`/`IndexedCompFile` in the original
//! implementation: `open` there tries each format opener in turn and
//! either loads a previously written index or builds one; this is the
//! same lifecycle, minus the virtual dispatch (see `formats::Format`).

use std::io;
use std::path::{Path, PathBuf};

use log::warn;

use crate::block::{find_block, Block};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::formats::{self, Format};
use crate::handle::FileHandle;
use crate::pathutil;
use crate::sidecar;

pub struct Archive {
    pub source_path: PathBuf,
    pub virtual_name: String,
    pub format: Format,
    handle: FileHandle,
    blocks: Vec<Block>,
    uncompressed_size: u64,
}

impl Archive {
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let handle = FileHandle::open(path)?;
        let format = formats::detect(&handle)?
            .ok_or_else(|| Error::format(path, "unrecognized archive format"))?;

        let sidecar_path = sidecar::sidecar_path(path);
        let key = sidecar::stat_key(path)?;

        let blocks = match sidecar::read_index(&sidecar_path, key) {
            Ok(blocks) => blocks,
            Err(Error::IndexStale(msg)) => {
                warn!("{msg}");
                Self::build_and_persist(&handle, format, config, &sidecar_path, key)?
            }
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                Self::build_and_persist(&handle, format, config, &sidecar_path, key)?
            }
            Err(e) => return Err(e),
        };

        if let Some(max) = config.max_block_size {
            if let Some(oversized) = blocks.iter().find(|b| b.uncompressed_size > max) {
                return Err(Error::format(
                    path,
                    format!(
                        "block of {} uncompressed bytes exceeds configured max_block_size {max}",
                        oversized.uncompressed_size
                    ),
                ));
            }
        }

        let uncompressed_size = blocks.last().map(Block::uncompressed_end).unwrap_or(0);
        let virtual_name = pathutil::virtual_name(path, format);

        Ok(Archive {
            source_path: path.to_path_buf(),
            virtual_name,
            format,
            handle,
            blocks,
            uncompressed_size,
        })
    }

    fn build_and_persist(
        handle: &FileHandle,
        format: Format,
        config: &Config,
        sidecar_path: &Path,
        key: (u64, u64, u32),
    ) -> Result<Vec<Block>> {
        let blocks = format.build_index(handle, config)?;
        if let Err(e) = sidecar::write_index(sidecar_path, key, &blocks) {
            warn!(
                "could not write index sidecar {}: {e}",
                sidecar_path.display()
            );
        }
        Ok(blocks)
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn find_block(&self, pos: u64) -> Option<&Block> {
        find_block(&self.blocks, pos)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn decompress_block(&self, block: &Block) -> Result<Vec<u8>> {
        self.format.decompress_block(&self.handle, block)
    }

    /// A cheap, independent handle onto the same archive file, for decode
    /// jobs that need to own their inputs so they can be sent to a pool
    /// worker rather than run on the caller's thread.
    pub fn try_clone_handle(&self) -> io::Result<FileHandle> {
        self.handle.try_clone()
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
    fn open_builds_and_reuses_sidecar_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt.gz");
        {
            let f = std::fs::File::create(&path).unwrap();
            let mut enc = GzEncoder::new(f, Compression::default());
            enc.write_all(&vec![b'q'; 100_000]).unwrap();
            enc.finish().unwrap();
        }
        let config = Config::default();
        let archive = Archive::open(&path, &config).unwrap();
        assert_eq!(archive.virtual_name, "data.txt");
        assert_eq!(archive.uncompressed_size(), 100_000);
        assert!(sidecar::sidecar_path(&path).exists());

        // Reopening should read the sidecar back rather than rebuild.
        let archive2 = Archive::open(&path, &config).unwrap();
        assert_eq!(archive2.block_count(), archive.block_count());
    }
}
