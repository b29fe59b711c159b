//! Mount-free end-to-end coverage: build an archive on disk for each
//! supported format, open it through `Archive`/`Registry`, and read it back
//! through `OpenFile` the same way the FUSE `read` callback would.

use std::io::Write;
use std::sync::Arc;

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use tempfile::tempdir;
use xz2::write::XzEncoder;

use seekzip::archive::Archive;
use seekzip::cache::Cache;
use seekzip::config::Config;
use seekzip::error::Error;
use seekzip::openfile::OpenFile;
use seekzip::pool::Pool;
use seekzip::registry::Registry;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 239) as u8).collect()
}

fn assert_round_trips(path: &std::path::Path, data: &[u8], config: &Config) {
    let archive = Archive::open(path, config).unwrap();
    assert_eq!(archive.uncompressed_size(), data.len() as u64);

    let cache = Arc::new(Cache::new(16 * 1024 * 1024));
    let pool = Pool::new(2);
    let file = OpenFile::new(&archive, cache, &pool);

    assert_eq!(file.read(0, data.len()).unwrap(), data);

    let mid = data.len() / 2;
    assert_eq!(file.read(mid as u64, 1000).unwrap(), data[mid..mid + 1000]);

    let tail = file.read(data.len() as u64 - 5, 50).unwrap();
    assert_eq!(tail, data[data.len() - 5..]);

    assert!(file.read(data.len() as u64, 10).unwrap().is_empty());
}

#[test]
fn gzip_archive_reads_back_identically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.txt.gz");
    let data = payload(400_000);
    {
        let f = std::fs::File::create(&path).unwrap();
        let mut enc = GzEncoder::new(f, GzCompression::fast());
        enc.write_all(&data).unwrap();
        enc.finish().unwrap();
    }

    let mut config = Config::default();
    config.gzip_block_factor = 1;
    assert_round_trips(&path, &data, &config);
}

#[test]
fn bzip2_archive_reads_back_identically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.txt.bz2");
    let data = payload(300_000);
    {
        let f = std::fs::File::create(&path).unwrap();
        let mut enc = BzEncoder::new(f, bzip2::Compression::best());
        enc.write_all(&data).unwrap();
        enc.finish().unwrap();
    }

    let config = Config::default();
    assert_round_trips(&path, &data, &config);
}

#[test]
fn xz_archive_reads_back_identically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.txt.xz");
    let data = payload(200_000);
    {
        let f = std::fs::File::create(&path).unwrap();
        let mut enc = XzEncoder::new(f, 6);
        enc.write_all(&data).unwrap();
        enc.finish().unwrap();
    }

    let config = Config::default();
    assert_round_trips(&path, &data, &config);
}

#[test]
fn sidecar_index_is_reused_until_the_archive_changes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.gz");
    let data = payload(100_000);
    {
        let f = std::fs::File::create(&path).unwrap();
        let mut enc = GzEncoder::new(f, GzCompression::fast());
        enc.write_all(&data).unwrap();
        enc.finish().unwrap();
    }
    let config = Config::default();

    let first = Archive::open(&path, &config).unwrap();
    let sidecar = seekzip::sidecar::sidecar_path(&path);
    assert!(sidecar.exists());
    let written = std::fs::read(&sidecar).unwrap();

    // Reopening without touching the archive must not rewrite the sidecar.
    let _second = Archive::open(&path, &config).unwrap();
    assert_eq!(std::fs::read(&sidecar).unwrap(), written);

    // Replacing the archive's contents invalidates the bound size/mtime key,
    // so the next open has to rebuild rather than trust stale offsets.
    std::thread::sleep(std::time::Duration::from_millis(10));
    let bigger = payload(250_000);
    {
        let f = std::fs::File::create(&path).unwrap();
        let mut enc = GzEncoder::new(f, GzCompression::fast());
        enc.write_all(&bigger).unwrap();
        enc.finish().unwrap();
    }
    let rebuilt = Archive::open(&path, &config).unwrap();
    assert_eq!(rebuilt.uncompressed_size(), bigger.len() as u64);
    assert_eq!(first.uncompressed_size(), data.len() as u64);
}

#[test]
fn registry_exposes_archives_under_stripped_virtual_names() {
    let dir = tempdir().unwrap();
    let gz_path = dir.path().join("a.txt.gz");
    let bz2_path = dir.path().join("b.txt.bz2");
    {
        let f = std::fs::File::create(&gz_path).unwrap();
        let mut enc = GzEncoder::new(f, GzCompression::fast());
        enc.write_all(b"hello gzip").unwrap();
        enc.finish().unwrap();
    }
    {
        let f = std::fs::File::create(&bz2_path).unwrap();
        let mut enc = BzEncoder::new(f, bzip2::Compression::best());
        enc.write_all(b"hello bzip2").unwrap();
        enc.finish().unwrap();
    }

    let config = Config::default();
    let mut registry = Registry::new();
    registry.add(&gz_path, &config).unwrap();
    registry.add(&bz2_path, &config).unwrap();

    assert_eq!(registry.len(), 2);
    let mut names: Vec<&str> = registry.names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["a.txt", "b.txt"]);

    let cache = Arc::new(Cache::new(1024 * 1024));
    let pool = Pool::new(2);
    let a = registry.get("a.txt").unwrap();
    let file = OpenFile::new(a, cache, &pool);
    assert_eq!(file.read(0, 100).unwrap(), b"hello gzip");
}

#[test]
fn unrecognized_file_is_rejected_at_mount_time() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.txt");
    std::fs::write(&path, b"not a compressed archive").unwrap();

    let config = Config::default();
    let err = Archive::open(&path, &config).unwrap_err();
    assert!(matches!(err, Error::Format { .. }));
}
