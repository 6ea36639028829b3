//! Collection of local source paths.
//!
//! Walks the source arguments into a flat set of regular files (with their
//! permission bits) and the directories that have no descendants at all.

use crate::error::{CoreError, CoreResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A regular file to transfer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileEntry {
    /// Local path, as reached from the source argument.
    pub path: PathBuf,
    /// Permission bits, when the platform exposes them.
    pub mode: Option<u32>,
}

/// Files and empty directories found under the source paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedPaths {
    /// Files, sorted by path, one entry per path.
    pub files: Vec<FileEntry>,
    /// Empty directories, sorted.
    pub empty_dirs: Vec<PathBuf>,
}

impl CollectedPaths {
    /// Returns the number of files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Returns true if there is nothing to transfer.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.empty_dirs.is_empty()
    }
}

/// Walks `sources` and returns every file and empty directory below them.
///
/// # Errors
///
/// Returns `CoreError::MissingSource` if a source argument does not exist.
/// Nothing is returned in that case, even if other sources were walked.
pub fn collect_paths(sources: &[PathBuf]) -> CoreResult<CollectedPaths> {
    let mut files = BTreeMap::new();
    let mut empty_dirs = BTreeSet::new();

    for source in sources {
        walk(source, true, &mut files, &mut empty_dirs)?;
    }

    Ok(CollectedPaths {
        files: files
            .into_iter()
            .map(|(path, mode)| FileEntry { path, mode })
            .collect(),
        empty_dirs: empty_dirs.into_iter().collect(),
    })
}

fn walk(
    path: &Path,
    top_level: bool,
    files: &mut BTreeMap<PathBuf, Option<u32>>,
    empty_dirs: &mut BTreeSet<PathBuf>,
) -> CoreResult<()> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if top_level {
                return Err(CoreError::MissingSource {
                    path: path.to_path_buf(),
                });
            }
            warn!("{} vanished while walking, skipping", path.display());
            return Ok(());
        }
        Err(err) => {
            warn!("cannot stat {}: {}, skipping", path.display(), err);
            return Ok(());
        }
    };

    if !metadata.is_dir() {
        files.insert(path.to_path_buf(), file_mode(path));
        return Ok(());
    }

    let listing = match fs::read_dir(path) {
        Ok(listing) => listing,
        Err(err) => {
            warn!("cannot list {}: {}, skipping", path.display(), err);
            return Ok(());
        }
    };
    let mut children = readable_entries(path, listing.map(|entry| entry.map(|e| e.path())));

    if children.is_empty() {
        empty_dirs.insert(path.to_path_buf());
        return Ok(());
    }

    children.sort();
    for child in children {
        walk(&child, false, files, empty_dirs)?;
    }
    Ok(())
}

fn readable_entries<I>(dir: &Path, listing: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut children = Vec::new();
    for entry in listing {
        match entry {
            Ok(child) => children.push(child),
            Err(err) => warn!("cannot read an entry of {}: {}, skipping", dir.display(), err),
        }
    }
    children
}

/// Returns the permission bits of `path`, or `None` where unavailable.
#[cfg(unix)]
pub fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .ok()
        .map(|metadata| metadata.permissions().mode() & 0o7777)
}

/// Returns the permission bits of `path`, or `None` where unavailable.
#[cfg(not(unix))]
pub fn file_mode(_path: &Path) -> Option<u32> {
    None
}
