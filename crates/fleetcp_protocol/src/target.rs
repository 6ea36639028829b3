//! Target expressions addressed by a remote call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a target expression selects workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// Shell-style wildcard over worker ids.
    #[default]
    Glob,
    /// Explicit list of worker ids.
    List,
}

impl Selection {
    /// Returns the selection mode name as sent to the executor.
    pub fn as_str(&self) -> &'static str {
        match self {
            Selection::Glob => "glob",
            Selection::List => "list",
        }
    }
}

/// An unresolved target specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetExpr {
    /// The pattern (one element) or the explicit ids.
    pub targets: Vec<String>,
    /// Selection mode.
    pub selection: Selection,
}

impl TargetExpr {
    /// Creates a glob expression.
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            targets: vec![pattern.into()],
            selection: Selection::Glob,
        }
    }

    /// Creates an explicit list expression.
    pub fn list<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: ids.into_iter().map(Into::into).collect(),
            selection: Selection::List,
        }
    }
}

impl fmt::Display for TargetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.targets.join(","))
    }
}
