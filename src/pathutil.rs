//! Virtual filename derivation.
//!
//! Ground rule, from `PathUtils::basename`/`hasExtension`/`removeExtension`:
//! take the last path component, then strip the first format-specific
//! suffix that matches (`archive.tar.gz` -> `archive.tar`). A name with no
//! recognized suffix mounts verbatim, compressed bytes and all.

use std::path::Path;

use crate::formats::Format;

pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string())
}

/// Derives the name this archive should appear as under the mount point.
pub fn virtual_name(path: &Path, format: Format) -> String {
    let base = basename(path);
    for suffix in format.strip_suffixes() {
        if let Some(stripped) = base.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped.to_string();
            }
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn strips_known_suffix() {
        let p = PathBuf::from("/data/archive.tar.gz");
        assert_eq!(virtual_name(&p, Format::Gzip), "archive.tar");
    }

    #[test]
    fn keeps_name_without_known_suffix() {
        let p = PathBuf::from("/data/weird.blob");
        assert_eq!(virtual_name(&p, Format::Gzip), "weird.blob");
    }

    #[test]
    fn pixz_tpxz_alias() {
        let p = PathBuf::from("data.tpxz");
        assert_eq!(virtual_name(&p, Format::Xz), "data");
    }
}
