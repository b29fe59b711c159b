//! On-disk block index ("sidecar") format.
//!
//! One `<archive>.skzidx` file sits next to each mounted archive, binding
//! itself to the archive's size and mtime so a stale index (source file
//! replaced after the index was written) is detected and rebuilt rather
//! than trusted. Dense, little-endian, and versioned, in the spirit of the
//! teacher's `.gzi`/`.fai` sidecars (`src/gzi.rs`, `src/fai.rs`) but
//! carrying one record shape per compression format instead of one fixed
//! layout, since gzip blocks optionally carry a dictionary blob that the
//! other three formats never need.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::block::{Block, BlockKind};
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"SKZI";
const VERSION: u8 = 1;

const FORMAT_GZIP: u8 = 0;
const FORMAT_BZIP2: u8 = 1;
const FORMAT_XZ: u8 = 2;
const FORMAT_LZOP: u8 = 3;

fn format_tag(kind: &BlockKind) -> u8 {
    match kind {
        BlockKind::Gzip { .. } => FORMAT_GZIP,
        BlockKind::Bzip2 { .. } => FORMAT_BZIP2,
        BlockKind::Xz { .. } => FORMAT_XZ,
        BlockKind::Lzop => FORMAT_LZOP,
    }
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// `(size, mtime as seconds+nanos since UNIX_EPOCH)` binding key for the
/// archive this sidecar describes.
pub fn stat_key(path: &Path) -> io::Result<(u64, u64, u32)> {
    let meta = std::fs::metadata(path)?;
    let size = meta.len();
    let mtime = meta.modified()?;
    let dur = mtime
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    Ok((size, dur.as_secs(), dur.subsec_nanos()))
}

pub fn sidecar_path(archive_path: &Path) -> std::path::PathBuf {
    let mut s = archive_path.as_os_str().to_owned();
    s.push(".skzidx");
    std::path::PathBuf::from(s)
}

pub fn write_index(sidecar: &Path, key: (u64, u64, u32), blocks: &[Block]) -> Result<()> {
    let file = File::create(sidecar)?;
    let mut w = BufWriter::new(file);
    w.write_all(MAGIC)?;
    write_u8(&mut w, VERSION)?;
    write_u64(&mut w, key.0)?;
    write_u64(&mut w, key.1)?;
    write_u64(&mut w, key.2 as u64)?;
    write_u64(&mut w, blocks.len() as u64)?;

    for b in blocks {
        write_u8(&mut w, format_tag(&b.kind))?;
        write_u64(&mut w, b.compressed_offset)?;
        write_u64(&mut w, b.compressed_size)?;
        write_u64(&mut w, b.uncompressed_offset)?;
        write_u64(&mut w, b.uncompressed_size)?;
        match &b.kind {
            BlockKind::Gzip { bit_shift, dict } => {
                write_u8(&mut w, *bit_shift)?;
                match dict {
                    Some(d) => {
                        write_u64(&mut w, d.len() as u64)?;
                        w.write_all(d)?;
                    }
                    None => write_u64(&mut w, 0)?,
                }
            }
            BlockKind::Bzip2 {
                start_bits,
                end_bits,
                level,
            } => {
                write_u8(&mut w, *start_bits)?;
                write_u8(&mut w, *end_bits)?;
                write_u8(&mut w, *level)?;
            }
            BlockKind::Xz { index_in_stream } => {
                write_u64(&mut w, *index_in_stream)?;
            }
            BlockKind::Lzop => {}
        }
    }
    w.flush()?;
    Ok(())
}

/// Reads and validates a sidecar, returning `Err(Error::IndexStale)` if the
/// bound archive size/mtime no longer match — callers should treat that as
/// "rebuild", not a hard failure.
pub fn read_index(sidecar: &Path, key: (u64, u64, u32)) -> Result<Vec<Block>> {
    let file = File::open(sidecar)?;
    let mut r = BufReader::new(file);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::format(sidecar, "bad sidecar magic"));
    }
    let version = read_u8(&mut r)?;
    if version != VERSION {
        return Err(Error::format(
            sidecar,
            format!("unsupported sidecar version {version}"),
        ));
    }
    let size = read_u64(&mut r)?;
    let secs = read_u64(&mut r)?;
    let nanos = read_u64(&mut r)? as u32;
    if (size, secs, nanos) != key {
        return Err(Error::IndexStale(format!(
            "{}: archive changed since index was written",
            sidecar.display()
        )));
    }

    let count = read_u64(&mut r)?;
    let mut blocks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = read_u8(&mut r)?;
        let compressed_offset = read_u64(&mut r)?;
        let compressed_size = read_u64(&mut r)?;
        let uncompressed_offset = read_u64(&mut r)?;
        let uncompressed_size = read_u64(&mut r)?;
        let kind = match tag {
            FORMAT_GZIP => {
                let bit_shift = read_u8(&mut r)?;
                let dict_len = read_u64(&mut r)? as usize;
                let dict = if dict_len > 0 {
                    let mut buf = vec![0u8; dict_len];
                    r.read_exact(&mut buf)?;
                    Some(buf)
                } else {
                    None
                };
                BlockKind::Gzip { bit_shift, dict }
            }
            FORMAT_BZIP2 => {
                let start_bits = read_u8(&mut r)?;
                let end_bits = read_u8(&mut r)?;
                let level = read_u8(&mut r)?;
                BlockKind::Bzip2 {
                    start_bits,
                    end_bits,
                    level,
                }
            }
            FORMAT_XZ => {
                let index_in_stream = read_u64(&mut r)?;
                BlockKind::Xz { index_in_stream }
            }
            FORMAT_LZOP => BlockKind::Lzop,
            other => {
                return Err(Error::format(
                    sidecar,
                    format!("unknown block format tag {other}"),
                ))
            }
        };
        blocks.push(Block {
            compressed_offset,
            compressed_size,
            uncompressed_offset,
            uncompressed_size,
            kind,
        });
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_mixed_block_kinds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.gz.skzidx");
        let blocks = vec![
            Block {
                compressed_offset: 0,
                compressed_size: 100,
                uncompressed_offset: 0,
                uncompressed_size: 32768,
                kind: BlockKind::Gzip {
                    bit_shift: 3,
                    dict: Some(vec![1, 2, 3, 4]),
                },
            },
            Block {
                compressed_offset: 100,
                compressed_size: 90,
                uncompressed_offset: 32768,
                uncompressed_size: 32768,
                kind: BlockKind::Gzip {
                    bit_shift: 0,
                    dict: None,
                },
            },
        ];
        let key = (12345u64, 1000u64, 42u32);
        write_index(&path, key, &blocks).unwrap();
        let read_back = read_index(&path, key).unwrap();
        assert_eq!(read_back, blocks);
    }

    #[test]
    fn stale_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.bz2.skzidx");
        write_index(&path, (1, 2, 3), &[]).unwrap();
        let err = read_index(&path, (1, 2, 4)).unwrap_err();
        assert!(matches!(err, Error::IndexStale(_)));
    }
}
