//! Target lists and target resolution.
//!
//! The controller's real resolution engine lives outside this crate; it is
//! modelled by the `TargetResolver` trait. `StaticResolver` resolves against
//! a fixed roster and backs the loopback fleet.

use crate::error::{CoreError, CoreResult};
use fleetcp_protocol::{Selection, TargetExpr};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Concrete worker ids addressed by one operation.
pub type TargetSet = BTreeSet<String>;

/// Turns a target expression into concrete worker ids.
pub trait TargetResolver: Send + Sync {
    /// Resolves `expr` to the set of matching workers.
    fn resolve(&self, expr: &TargetExpr) -> TargetSet;
}

/// Reads a target list from a file.
///
/// The file holds worker ids separated by commas or by newlines. Surrounding
/// whitespace is ignored, as are empty entries.
///
/// # Errors
///
/// `CoreError::TargetList` if the file cannot be read,
/// `CoreError::EmptyTargetList` if it names no worker.
pub fn load_target_file(path: &Path) -> CoreResult<TargetExpr> {
    let contents = fs::read_to_string(path).map_err(|source| CoreError::TargetList {
        path: path.to_path_buf(),
        source,
    })?;
    let contents = contents.trim();

    let separator = if contents.contains(',') { ',' } else { '\n' };
    let ids: Vec<String> = contents
        .split(separator)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    if ids.is_empty() {
        return Err(CoreError::EmptyTargetList {
            path: path.to_path_buf(),
        });
    }
    Ok(TargetExpr::list(ids))
}

/// Resolves targets against a fixed roster of worker ids.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    roster: Vec<String>,
}

impl StaticResolver {
    /// Creates a resolver over `roster`.
    pub fn new<I, S>(roster: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roster: roster.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the roster.
    pub fn roster(&self) -> &[String] {
        &self.roster
    }
}

impl TargetResolver for StaticResolver {
    fn resolve(&self, expr: &TargetExpr) -> TargetSet {
        self.roster
            .iter()
            .filter(|id| match expr.selection {
                Selection::Glob => expr.targets.iter().any(|p| wildcard_match(p, id)),
                Selection::List => expr.targets.iter().any(|t| t == *id),
            })
            .cloned()
            .collect()
    }
}

/// Matches `name` against a pattern supporting `*` and `?`.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = name.chars().collect();
    let (mut pi, mut si) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while si < s.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == s[si]) {
            pi += 1;
            si += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            pi += 1;
            mark = si;
        } else if let Some(star_at) = star {
            pi = star_at + 1;
            mark += 1;
            si = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("targets");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn comma_separated_file() {
        let dir = TempDir::new().unwrap();
        let expr = load_target_file(&write(&dir, " web1, web2 ,\n")).unwrap();
        assert_eq!(expr, TargetExpr::list(["web1", "web2"]));
    }

    #[test]
    fn newline_separated_file() {
        let dir = TempDir::new().unwrap();
        let expr = load_target_file(&write(&dir, "db1\ndb2\n\ndb3\n")).unwrap();
        assert_eq!(expr.targets, vec!["db1", "db2", "db3"]);
        assert_eq!(expr.selection, Selection::List);
    }

    #[test]
    fn single_entry_file() {
        let dir = TempDir::new().unwrap();
        let expr = load_target_file(&write(&dir, "only\n")).unwrap();
        assert_eq!(expr.targets, vec!["only"]);
    }

    #[test]
    fn empty_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = load_target_file(&write(&dir, " \n\n")).unwrap_err();
        assert_eq!(err.exit_code(), 42);
    }

    #[test]
    fn unreadable_file_is_io_error() {
        let err = load_target_file(Path::new("/no/such/targets")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn wildcard() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("web*", "web12"));
        assert!(wildcard_match("w?b*", "web1"));
        assert!(!wildcard_match("db*", "web1"));
        assert!(wildcard_match("*.example.com", "a.example.com"));
    }

    #[test]
    fn static_resolution() {
        let resolver = StaticResolver::new(["web1", "web2", "db1"]);
        let glob = resolver.resolve(&TargetExpr::glob("web*"));
        assert_eq!(glob.into_iter().collect::<Vec<_>>(), vec!["web1", "web2"]);

        let list = resolver.resolve(&TargetExpr::list(["db1", "ghost"]));
        assert_eq!(list.into_iter().collect::<Vec<_>>(), vec!["db1"]);
    }
}
