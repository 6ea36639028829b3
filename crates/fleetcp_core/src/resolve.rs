//! Mapping of local paths to destination paths on the workers.

use crate::collect::CollectedPaths;
use crate::error::{CoreError, CoreResult};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Returns true if `dest` must be treated as a directory.
///
/// That is the case when more than one file is transferred, when any empty
/// directory is transferred, or when `dest` ends in a path separator.
pub fn dest_is_dir(dest: &str, file_count: usize, has_empty_dirs: bool) -> bool {
    has_empty_dirs || file_count > 1 || dest.ends_with('/') || dest.ends_with('\\')
}

/// Resolves remote paths for one operation.
///
/// Whether the destination is a directory is decided once, at construction,
/// so every file of the operation is placed consistently.
#[derive(Debug, Clone)]
pub struct RemotePathResolver {
    sources: Vec<PathBuf>,
    dest: String,
    dest_is_dir: bool,
}

impl RemotePathResolver {
    /// Creates a resolver for the collected paths of an operation.
    pub fn new(sources: &[PathBuf], dest: impl Into<String>, collected: &CollectedPaths) -> Self {
        Self::with_counts(
            sources,
            dest,
            collected.file_count(),
            !collected.empty_dirs.is_empty(),
        )
    }

    /// Creates a resolver from explicit counts.
    pub fn with_counts(
        sources: &[PathBuf],
        dest: impl Into<String>,
        file_count: usize,
        has_empty_dirs: bool,
    ) -> Self {
        let dest = dest.into();
        let dest_is_dir = dest_is_dir(&dest, file_count, has_empty_dirs);
        Self {
            sources: sources.to_vec(),
            dest,
            dest_is_dir,
        }
    }

    /// Returns true if the destination is treated as a directory.
    pub fn dest_is_dir(&self) -> bool {
        self.dest_is_dir
    }

    /// Returns the remote path for `path`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnattributedPath` if `path` is neither a source
    /// argument nor nested below one.
    pub fn resolve(&self, path: &Path) -> CoreResult<String> {
        if self.sources.iter().any(|source| source == path) {
            return Ok(if self.dest_is_dir {
                join_remote(&self.dest, root_name(path))
            } else {
                self.dest.clone()
            });
        }

        for root in &self.sources {
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            if rel.components().any(|c| matches!(c, Component::ParentDir)) {
                debug!(
                    "{} escapes source root {}, not using it",
                    path.display(),
                    root.display()
                );
                continue;
            }
            let parts = root_name(root).into_iter().chain(
                rel.components()
                    .filter_map(|c| match c {
                        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                        _ => None,
                    }),
            );
            return Ok(join_remote(&self.dest, parts));
        }

        Err(CoreError::UnattributedPath {
            path: path.to_path_buf(),
        })
    }
}

// `.` and `/` have no final component and contribute nothing.
fn base_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

// A source written with a trailing separator stands for its contents.
fn root_name(source: &Path) -> Option<String> {
    let raw = source.as_os_str().to_string_lossy();
    if raw.ends_with('/') || raw.ends_with('\\') {
        return None;
    }
    base_name(source)
}

fn join_remote<I>(base: &str, parts: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut joined = base.to_string();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        if !joined.is_empty() && !joined.ends_with('/') && !joined.ends_with('\\') {
            joined.push('/');
        }
        joined.push_str(&part);
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(paths: &[&str]) -> Vec<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn dest_is_dir_rules() {
        assert!(dest_is_dir("/out/", 1, false));
        assert!(dest_is_dir("C:\\out\\", 1, false));
        assert!(dest_is_dir("/out", 2, false));
        assert!(dest_is_dir("/out", 0, true));
        assert!(!dest_is_dir("/out", 1, false));
    }

    #[test]
    fn nested_file_keeps_root_name() {
        let resolver = RemotePathResolver::with_counts(&sources(&["/a", "/b/c"]), "/out/", 3, false);
        assert!(resolver.dest_is_dir());
        assert_eq!(resolver.resolve(Path::new("/b/c/x/y")).unwrap(), "/out/c/x/y");
        assert_eq!(resolver.resolve(Path::new("/a/f")).unwrap(), "/out/a/f");
    }

    #[test]
    fn explicit_file_to_file_destination() {
        let resolver =
            RemotePathResolver::with_counts(&sources(&["/tmp/a.txt"]), "/etc/a.txt", 1, false);
        assert!(!resolver.dest_is_dir());
        assert_eq!(resolver.resolve(Path::new("/tmp/a.txt")).unwrap(), "/etc/a.txt");
    }

    #[test]
    fn explicit_file_into_directory() {
        let resolver =
            RemotePathResolver::with_counts(&sources(&["/tmp/a.txt", "/tmp/b.txt"]), "/etc", 2, false);
        assert_eq!(resolver.resolve(Path::new("/tmp/b.txt")).unwrap(), "/etc/b.txt");
    }

    #[test]
    fn empty_dir_source_lands_under_dest() {
        let resolver = RemotePathResolver::with_counts(&sources(&["/srv/empty"]), "/opt", 0, true);
        assert_eq!(resolver.resolve(Path::new("/srv/empty")).unwrap(), "/opt/empty");
    }

    #[test]
    fn unattributed_path_is_an_error() {
        let resolver = RemotePathResolver::with_counts(&sources(&["/a"]), "/out/", 2, false);
        assert!(matches!(
            resolver.resolve(Path::new("/elsewhere/f")),
            Err(CoreError::UnattributedPath { .. })
        ));
    }

    #[test]
    fn prefix_match_is_component_wise() {
        let resolver = RemotePathResolver::with_counts(&sources(&["/a"]), "/out/", 2, false);
        assert!(resolver.resolve(Path::new("/ab/f")).is_err());
    }

    #[test]
    fn trailing_separator_copies_contents() {
        let resolver =
            RemotePathResolver::with_counts(&sources(&["/src/conf/"]), "/etc/app", 2, false);
        assert_eq!(resolver.resolve(Path::new("/src/conf/x.ini")).unwrap(), "/etc/app/x.ini");
        assert_eq!(
            resolver.resolve(Path::new("/src/conf/sub/y.ini")).unwrap(),
            "/etc/app/sub/y.ini"
        );

        let plain = RemotePathResolver::with_counts(&sources(&["/src/conf"]), "/etc/app", 2, false);
        assert_eq!(plain.resolve(Path::new("/src/conf/x.ini")).unwrap(), "/etc/app/conf/x.ini");
    }

    #[test]
    fn trailing_separator_empty_dir_is_dest() {
        let resolver = RemotePathResolver::with_counts(&sources(&["/srv/empty/"]), "/opt", 0, true);
        assert_eq!(resolver.resolve(Path::new("/srv/empty")).unwrap(), "/opt");
    }

    #[test]
    fn relative_sources() {
        let resolver = RemotePathResolver::with_counts(&sources(&["conf"]), "/etc/app", 2, false);
        assert_eq!(
            resolver.resolve(Path::new("conf/sub/app.toml")).unwrap(),
            "/etc/app/conf/sub/app.toml"
        );
    }
}
