use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PathErrorReason, PromoteError, Result};
use crate::resolver::normalize_path;

/// How the moved unit's parent directory changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Same parent directory; at most the name changes.
    NoMove,
    /// The new parent is an ancestor of the old one.
    MoveUp,
    /// The new parent is a descendant of the old one.
    MoveDown,
    /// Neither: climb `levels` directories, then descend into `added`.
    Across,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::NoMove => "no-move",
            Direction::MoveUp => "move-up",
            Direction::MoveDown => "move-down",
            Direction::Across => "across",
        };
        write!(f, "{}", s)
    }
}

/// Directory-level difference between a unit's old and new location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathDelta {
    /// `NoMove`: the new basename. `MoveUp`: the removed segments.
    /// `MoveDown` and `Across`: the added segments. Joined with `/`.
    pub text: String,
    pub direction: Direction,
    /// Directory hops: removed segments for `MoveUp`/`Across`, added for `MoveDown`.
    pub levels: usize,
    /// Old-parent segments below the longest common prefix.
    pub removed: Vec<String>,
    /// New-parent segments below the longest common prefix.
    pub added: Vec<String>,
}

impl PathDelta {
    /// Compute the delta for moving `old` to `new` inside `root`.
    pub fn compute(old: &Path, new: &Path, root: &Path) -> Result<PathDelta> {
        let root = normalize_path(root);
        let old = normalize_path(old);
        let new = normalize_path(new);

        if old == new {
            return Err(PromoteError::path(PathErrorReason::NoOp));
        }
        for path in [&old, &new] {
            if !path.starts_with(&root) || *path == root {
                return Err(PromoteError::path(PathErrorReason::OutsideRoot(
                    path.to_path_buf(),
                )));
            }
        }

        let old_parent = old.parent().unwrap_or(root.as_path());
        let new_parent = new.parent().unwrap_or(root.as_path());

        if old_parent == new_parent {
            let text = new
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Ok(PathDelta {
                text,
                direction: Direction::NoMove,
                levels: 0,
                removed: Vec::new(),
                added: Vec::new(),
            });
        }

        let old_segments = segments_below(old_parent, &root);
        let new_segments = segments_below(new_parent, &root);
        let lcp = old_segments
            .iter()
            .zip(new_segments.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let removed = old_segments[lcp..].to_vec();
        let added = new_segments[lcp..].to_vec();

        let (direction, text, levels) = match (removed.is_empty(), added.is_empty()) {
            (true, _) => (Direction::MoveDown, added.join("/"), added.len()),
            (false, true) => (Direction::MoveUp, removed.join("/"), removed.len()),
            (false, false) => (Direction::Across, added.join("/"), removed.len()),
        };

        Ok(PathDelta {
            text,
            direction,
            levels,
            removed,
            added,
        })
    }

    /// The delta as a relative path fragment from the old parent to the new one
    /// (`../../shared/ui`, `bar`, `..`, or `.` when the parent is unchanged).
    pub fn relative_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.removed.len() + self.added.len());
        parts.extend(self.removed.iter().map(|_| ".."));
        parts.extend(self.added.iter().map(|s| s.as_str()));
        if parts.is_empty() {
            ".".to_string()
        } else {
            parts.join("/")
        }
    }

    /// Apply the delta to a directory: climb out of the removed segments, then
    /// descend into the added ones.
    pub fn apply_to(&self, dir: &Path) -> PathBuf {
        let mut out = dir.to_path_buf();
        for _ in &self.removed {
            out.pop();
        }
        for segment in &self.added {
            out.push(segment);
        }
        out
    }
}

impl fmt::Display for PathDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::NoMove => write!(f, "{} as {}", self.direction, self.text),
            _ => write!(f, "{} {}", self.direction, self.relative_text()),
        }
    }
}

fn segments_below(dir: &Path, root: &Path) -> Vec<String> {
    dir.strip_prefix(root)
        .unwrap_or(dir)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect()
}
