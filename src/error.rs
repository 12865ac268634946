use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Why a requested move was rejected before any scanning started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathErrorReason {
    /// Old and new path are identical.
    NoOp,
    /// The path lies outside the project root (or is the root itself).
    OutsideRoot(PathBuf),
    /// A directory cannot be moved into its own subtree.
    IntoItself,
    /// Barrel files are maintained, not promoted.
    BarrelFile,
    /// Spec files travel with their unit and cannot be promoted on their own.
    SpecFile,
    /// Something already exists at the destination.
    DestinationExists(PathBuf),
    /// The file extension has no scanner.
    UnsupportedFile(PathBuf),
    /// Nothing exists at the path to be moved.
    NotFound(PathBuf),
}

impl fmt::Display for PathErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathErrorReason::NoOp => write!(f, "old and new path are the same"),
            PathErrorReason::OutsideRoot(p) => {
                write!(f, "{} is outside the project root", p.display())
            }
            PathErrorReason::IntoItself => write!(f, "cannot move a directory into itself"),
            PathErrorReason::BarrelFile => write!(f, "cannot promote a barrel file"),
            PathErrorReason::SpecFile => write!(f, "cannot promote a spec file"),
            PathErrorReason::DestinationExists(p) => {
                write!(f, "destination already exists: {}", p.display())
            }
            PathErrorReason::UnsupportedFile(p) => {
                write!(f, "not a supported source file: {}", p.display())
            }
            PathErrorReason::NotFound(p) => write!(f, "no such file or directory: {}", p.display()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PromoteError {
    #[error("{}:{line}:{column}: parse error: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: stale edit at offset {offset}: expected {expected:?}, found {found:?}", path.display())]
    StaleEdit {
        path: PathBuf,
        offset: usize,
        expected: String,
        found: String,
    },

    #[error("{}: overlapping edits at offsets {first} and {second}", path.display())]
    OverlappingEdits {
        path: PathBuf,
        first: usize,
        second: usize,
    },

    #[error("invalid move: {reason}")]
    Path { reason: PathErrorReason },
}

impl PromoteError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        PromoteError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn parse(path: &Path, line: usize, column: usize, message: impl Into<String>) -> Self {
        PromoteError::Parse {
            path: path.to_path_buf(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn path(reason: PathErrorReason) -> Self {
        PromoteError::Path { reason }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, PromoteError::Parse { .. })
    }

    /// Stale and overlapping edits both mean the plan no longer matches the file.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            PromoteError::StaleEdit { .. } | PromoteError::OverlappingEdits { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PromoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_has_location() {
        let err = PromoteError::parse(Path::new("src/a.ts"), 3, 7, "unexpected `}`");
        assert_eq!(err.to_string(), "src/a.ts:3:7: parse error: unexpected `}`");
        assert!(err.is_parse());
        assert!(!err.is_stale());
    }

    #[test]
    fn test_stale_classification() {
        let stale = PromoteError::StaleEdit {
            path: PathBuf::from("a.ts"),
            offset: 4,
            expected: "./x".to_string(),
            found: "./y".to_string(),
        };
        let overlap = PromoteError::OverlappingEdits {
            path: PathBuf::from("a.ts"),
            first: 1,
            second: 2,
        };
        assert!(stale.is_stale());
        assert!(overlap.is_stale());
    }

    #[test]
    fn test_path_error_display() {
        let err = PromoteError::path(PathErrorReason::NoOp);
        assert_eq!(err.to_string(), "invalid move: old and new path are the same");
    }
}
