//! `fuser` adapter: a thin translation from FUSE callbacks to
//! `Registry`/`OpenFile` lookups.
//!
//! The mount point is a flat, single-level directory — every archive
//! appears directly under the root, exactly like `lf_getattr`/`lf_readdir`
//! in the original `main.cpp`. There is no subdirectory nesting because
//! `Archive::virtual_name` is always a single path component.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, Request,
};
use log::error;

use crate::cache::Cache;
use crate::openfile::OpenFile;
use crate::pool::Pool;
use crate::registry::Registry;

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;

pub struct SeekzipFs {
    registry: Arc<Registry>,
    cache: Arc<Cache>,
    pool: Arc<Pool>,
    names_by_ino: Vec<String>,
    ino_by_name: HashMap<String, u64>,
}

impl SeekzipFs {
    pub fn new(registry: Arc<Registry>, cache: Arc<Cache>, pool: Arc<Pool>) -> Self {
        let mut names_by_ino = Vec::with_capacity(registry.len());
        let mut ino_by_name = HashMap::with_capacity(registry.len());
        let mut names: Vec<&str> = registry.names().collect();
        names.sort_unstable();
        for name in names {
            let ino = ROOT_INO + 1 + names_by_ino.len() as u64;
            names_by_ino.push(name.to_string());
            ino_by_name.insert(name.to_string(), ino);
        }
        SeekzipFs {
            registry,
            cache,
            pool,
            names_by_ino,
            ino_by_name,
        }
    }

    fn name_for_ino(&self, ino: u64) -> Option<&str> {
        if ino < ROOT_INO + 1 {
            return None;
        }
        self.names_by_ino
            .get((ino - ROOT_INO - 1) as usize)
            .map(String::as_str)
    }

    fn file_attr(&self, ino: u64, size: u64) -> FileAttr {
        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind: FileType::RegularFile,
            perm: 0o444,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }

    fn root_attr(&self) -> FileAttr {
        FileAttr {
            ino: ROOT_INO,
            size: 0,
            blocks: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind: FileType::Directory,
            perm: 0o755,
            nlink: 2,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }
}

impl Filesystem for SeekzipFs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(&ino) = self.ino_by_name.get(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(archive) = self.registry.get(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        reply.entry(&TTL, &self.file_attr(ino, archive.uncompressed_size()), 0);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        if ino == ROOT_INO {
            reply.attr(&TTL, &self.root_attr());
            return;
        }
        let Some(name) = self.name_for_ino(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.registry.get(&name) {
            Some(archive) => reply.attr(&TTL, &self.file_attr(ino, archive.uncompressed_size())),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ROOT_INO, FileType::Directory, ".".to_string()),
            (ROOT_INO, FileType::Directory, "..".to_string()),
        ];
        for (i, name) in self.names_by_ino.iter().enumerate() {
            entries.push((ROOT_INO + 1 + i as u64, FileType::RegularFile, name.clone()));
        }

        for (i, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        if self.name_for_ino(ino).is_none() {
            reply.error(libc::ENOENT);
            return;
        }
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(libc::EACCES);
            return;
        }
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(name) = self.name_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(archive) = self.registry.get(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let open_file = OpenFile::new(archive, Arc::clone(&self.cache), &self.pool);
        match open_file.read(offset.max(0) as u64, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                error!("read({name}, offset={offset}, size={size}) failed: {e}");
                reply.error(e.to_errno());
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }
}
