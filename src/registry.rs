//! Maps mounted archives to the virtual names they appear under.
//!
//! Plays the role of `FileList` in the original implementation, with one
//! deliberate behavior change: a virtual name collision is a hard error at
//! mount time here, rather than `FileList::add`'s warn-and-skip. Silently
//! dropping an archive the user asked to mount is surprising; refusing to
//! start the mount with a clear error is not.

use std::collections::HashMap;
use std::path::Path;

use crate::archive::Archive;
use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Default)]
pub struct Registry {
    archives: HashMap<String, Archive>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            archives: HashMap::new(),
        }
    }

    pub fn add(&mut self, path: impl AsRef<Path>, config: &Config) -> Result<()> {
        let archive = Archive::open(path, config)?;
        if let Some(existing) = self.archives.get(&archive.virtual_name) {
            return Err(Error::DuplicateName {
                name: archive.virtual_name.clone(),
                existing: existing.source_path.clone(),
                rejected: archive.source_path.clone(),
            });
        }
        self.archives.insert(archive.virtual_name.clone(), archive);
        Ok(())
    }

    pub fn get(&self, virtual_name: &str) -> Option<&Archive> {
        self.archives.get(virtual_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.archives.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }
}
