//! Binary entry point: parses CLI flags, mounts every archive into a
//! `Registry`, and (with the `fuse` feature) hands the result to the kernel.
//!
//! Where the original `main()` kept going after archives failed to open and
//! only bailed out if *none* of them mounted (`flist->size() == 0`), this
//! binary exits on the first failure: `Registry::add` already turns a
//! duplicate virtual name into a hard error (see `registry.rs`), so treating
//! every other open failure the same way keeps the behavior consistent
//! instead of silently dropping files.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use seekzip::cache::Cache;
use seekzip::cli::Args;
use seekzip::pool::Pool;
use seekzip::registry::Registry;

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if args.fuse_help() {
        print!("{}", seekzip::cli::FUSE_HELP_TEXT);
        return ExitCode::SUCCESS;
    }

    let config = args.to_config();

    let mut registry = Registry::new();
    for path in args.archive_paths() {
        if let Err(e) = registry.add(path, &config) {
            error!("{}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    }

    if registry.is_empty() {
        error!("no archives given; nothing to mount");
        return ExitCode::FAILURE;
    }

    info!("mounting {} archive(s) at {}", registry.len(), args.mount_point().display());
    run(registry, &config, args)
}

#[cfg(feature = "fuse")]
fn run(registry: Registry, config: &seekzip::config::Config, args: Args) -> ExitCode {
    use fuser::MountOption;
    use seekzip::vfs::SeekzipFs;

    let registry = Arc::new(registry);
    let cache = Arc::new(Cache::new(config.cache_size_bytes));
    let pool = Arc::new(Pool::sized_for(config));
    let fs = SeekzipFs::new(registry, cache, pool);

    let mut options = vec![MountOption::RO, MountOption::FSName("seekzip".to_string())];
    if !args.foreground() {
        options.push(MountOption::AutoUnmount);
    }

    match fuser::mount2(fs, args.mount_point(), &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("mount failed: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(feature = "fuse"))]
fn run(_registry: Registry, _config: &seekzip::config::Config, _args: Args) -> ExitCode {
    error!("built without the \"fuse\" feature; cannot mount");
    ExitCode::FAILURE
}
