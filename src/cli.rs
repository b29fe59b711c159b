//! Command-line front end.
//!
//! Narrower than the original's raw FUSE option parsing (`lf_opt_proc` in
//! `main.cpp`, which hand-rolls a `fuse_opt` table): `clap`'s derive API
//! covers the same positional-archives-plus-mountpoint shape and the
//! `--gzip-block-factor` flag with no hand-rolled parser. `-h`/`--help`
//! still comes for free from clap; `-H`/`--fuse-help` is the one flag
//! that needs special-casing, since it asks for the mount options `fuser`
//! understands rather than this binary's own flags.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, DEFAULT_CACHE_SIZE_BYTES, DEFAULT_GZIP_BLOCK_FACTOR};

/// Mounts compressed archives as a read-only virtual filesystem, allowing
/// random-access reads without fully decompressing them first.
///
/// Supported formats: gzip, bzip2, xz/pixz, lzop.
#[derive(Parser, Debug)]
#[command(name = "seekzip", version, about)]
pub struct Args {
    /// Archives to mount, followed by the mount point as the last argument.
    #[arg(num_args = 2.., required_unless_present = "fuse_help")]
    paths: Vec<PathBuf>,

    /// Minimum uncompressed span (as a multiple of 32 KiB) a gzip block
    /// must cover before it gets its own dictionary snapshot; larger
    /// values shrink the sidecar index at the cost of coarser seeking.
    #[arg(long, default_value_t = DEFAULT_GZIP_BLOCK_FACTOR)]
    gzip_block_factor: u64,

    /// Reject any archive whose indexer finds a block larger than this
    /// many uncompressed bytes.
    #[arg(long)]
    max_block_size: Option<u64>,

    /// Upper bound, in bytes, on decoded block data held in the cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE_BYTES)]
    cache_size: u64,

    /// Decompression worker threads; defaults to the number of CPUs.
    #[arg(long)]
    worker_threads: Option<usize>,

    /// Run in the foreground instead of daemonizing.
    #[arg(short, long)]
    foreground: bool,

    /// Print the mount options the underlying FUSE layer understands and
    /// exit, without requiring archives or a mount point.
    #[arg(short = 'H', long = "fuse-help", action = clap::ArgAction::SetTrue)]
    #[arg(required = false)]
    fuse_help: bool,
}

impl Args {
    pub fn archive_paths(&self) -> &[PathBuf] {
        &self.paths[..self.paths.len() - 1]
    }

    pub fn mount_point(&self) -> &PathBuf {
        &self.paths[self.paths.len() - 1]
    }

    pub fn foreground(&self) -> bool {
        self.foreground
    }

    pub fn fuse_help(&self) -> bool {
        self.fuse_help
    }

    pub fn to_config(&self) -> Config {
        Config {
            gzip_block_factor: self.gzip_block_factor,
            max_block_size: self.max_block_size,
            cache_size_bytes: self.cache_size,
            worker_threads: self.worker_threads,
        }
    }
}

/// Text for `-H`/`--fuse-help`: the mount options this binary actually
/// passes through to `fuser::mount2` (see `main.rs`), since this crate
/// always mounts read-only and has no other libfuse options to surface.
pub const FUSE_HELP_TEXT: &str = "\
mount options:
    ro                 mount read-only (always set; this filesystem never mounts rw)
    fsname=seekzip      filesystem name reported to the kernel
    auto_unmount        unmount automatically when the process exits (default unless --foreground)
";
