//! Positional text edits and their per-file application.
//!
//! All offsets in one batch refer to the file as it was scanned. A batch is
//! applied in memory from the highest offset down, so no edit shifts the
//! position of one still waiting, and the file is then replaced in one
//! atomic write.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{PromoteError, Result};
use crate::model::Span;
use crate::pool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditOp {
    Insert { text: String },
    /// Delete `expected`, which must be present at the offset.
    Remove { expected: String },
    /// Swap `old` for `new`; `old` must be present at the offset.
    Replace { old: String, new: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edit {
    pub target: PathBuf,
    /// Byte offset into the file as scanned.
    pub offset: usize,
    pub op: EditOp,
}

impl Edit {
    pub fn insert(target: &Path, offset: usize, text: impl Into<String>) -> Self {
        Edit {
            target: target.to_path_buf(),
            offset,
            op: EditOp::Insert { text: text.into() },
        }
    }

    pub fn remove(target: &Path, offset: usize, expected: impl Into<String>) -> Self {
        Edit {
            target: target.to_path_buf(),
            offset,
            op: EditOp::Remove {
                expected: expected.into(),
            },
        }
    }

    pub fn replace(
        target: &Path,
        offset: usize,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        Edit {
            target: target.to_path_buf(),
            offset,
            op: EditOp::Replace {
                old: old.into(),
                new: new.into(),
            },
        }
    }

    /// The original text this edit consumes; empty for inserts.
    pub fn span(&self) -> Span {
        let len = match &self.op {
            EditOp::Insert { .. } => 0,
            EditOp::Remove { expected } => expected.len(),
            EditOp::Replace { old, .. } => old.len(),
        };
        Span::new(self.offset, self.offset + len)
    }

    pub fn is_insert(&self) -> bool {
        matches!(self.op, EditOp::Insert { .. })
    }

    pub fn describe(&self) -> String {
        let path = self.target.display();
        match &self.op {
            EditOp::Insert { text } => format!("{}@{}: insert {:?}", path, self.offset, text),
            EditOp::Remove { expected } => {
                format!("{}@{}: remove {:?}", path, self.offset, expected)
            }
            EditOp::Replace { old, new } => {
                format!("{}@{}: {:?} -> {:?}", path, self.offset, old, new)
            }
        }
    }

    /// Apply to `content` in place, returning a description of the change.
    ///
    /// Remove and Replace check the expected text first; on mismatch the
    /// content is left untouched and a `StaleEdit` error is returned.
    pub fn apply_to(&self, content: &mut String) -> Result<String> {
        match &self.op {
            EditOp::Insert { text } => {
                if !content.is_char_boundary(self.offset) {
                    return Err(self.stale(content, ""));
                }
                content.insert_str(self.offset, text);
            }
            EditOp::Remove { expected } => {
                self.verify(content, expected)?;
                content.replace_range(self.offset..self.offset + expected.len(), "");
            }
            EditOp::Replace { old, new } => {
                self.verify(content, old)?;
                content.replace_range(self.offset..self.offset + old.len(), new);
            }
        }
        Ok(self.describe())
    }

    fn verify(&self, content: &str, expected: &str) -> Result<()> {
        match content.get(self.offset..self.offset + expected.len()) {
            Some(found) if found == expected => Ok(()),
            _ => Err(self.stale(content, expected)),
        }
    }

    fn stale(&self, content: &str, expected: &str) -> PromoteError {
        let found = content
            .get(self.offset..)
            .map(|rest| rest.chars().take(expected.chars().count().max(1)).collect())
            .unwrap_or_default();
        PromoteError::StaleEdit {
            path: self.target.clone(),
            offset: self.offset,
            expected: expected.to_string(),
            found,
        }
    }
}

/// Whether two edits against the same text cannot both be applied.
///
/// Inserts at the boundary of a removed range are fine; inserts strictly
/// inside one are not.
fn conflicts(a: &Edit, b: &Edit) -> bool {
    let (sa, sb) = (a.span(), b.span());
    match (a.is_insert(), b.is_insert()) {
        (true, true) => false,
        (true, false) => sb.start < a.offset && a.offset < sb.end,
        (false, true) => sa.start < b.offset && b.offset < sa.end,
        (false, false) => sa.overlaps(&sb),
    }
}

/// Apply a batch of edits for one file's content, in memory.
///
/// Edits are ordered by descending offset. At the same offset, removals and
/// replacements go before inserts, and inserts go last-created first so they
/// end up in creation order.
pub fn apply_edits(path: &Path, content: &str, edits: &[&Edit]) -> Result<(String, Vec<String>)> {
    for (i, a) in edits.iter().enumerate() {
        for b in &edits[i + 1..] {
            if conflicts(a, b) {
                return Err(PromoteError::OverlappingEdits {
                    path: path.to_path_buf(),
                    first: a.offset.min(b.offset),
                    second: a.offset.max(b.offset),
                });
            }
        }
    }

    let mut ordered: Vec<(usize, &Edit)> = edits.iter().copied().enumerate().collect();
    ordered.sort_by(|(ia, a), (ib, b)| {
        b.offset
            .cmp(&a.offset)
            .then_with(|| a.is_insert().cmp(&b.is_insert()))
            .then_with(|| ib.cmp(ia))
    });

    let mut updated = content.to_string();
    let mut descriptions = Vec::with_capacity(ordered.len());
    for (_, edit) in ordered {
        descriptions.push(edit.apply_to(&mut updated)?);
    }
    Ok((updated, descriptions))
}

/// Replace `path`'s content via a temp file in the same directory.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PromoteError::io(path, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| PromoteError::io(path, e))?;
    if let Ok(meta) = fs::metadata(path) {
        // Otherwise the replacement keeps the temp file's 0600.
        if let Err(e) = tmp.as_file().set_permissions(meta.permissions()) {
            warn!(path = %path.display(), error = %e, "could not carry permissions over");
        }
    }
    tmp.persist(path)
        .map_err(|e| PromoteError::io(path, e.error))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Succeeded,
    /// The file no longer matches the plan; nothing was written.
    StaleEdit(String),
    /// Reading or writing failed; nothing was written.
    Io(String),
}

/// What happened to one targeted file.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
    /// One line per applied edit, empty unless the file succeeded.
    pub descriptions: Vec<String>,
    pub edits: usize,
}

impl FileOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == FileStatus::Succeeded
    }
}

/// Read, edit and atomically rewrite one file.
pub fn apply_file(path: &Path, edits: &[&Edit]) -> FileOutcome {
    let result = fs::read_to_string(path)
        .map_err(|e| PromoteError::io(path, e))
        .and_then(|content| apply_edits(path, &content, edits))
        .and_then(|(updated, descriptions)| {
            atomic_write(path, &updated)?;
            Ok(descriptions)
        });

    let (status, descriptions) = match result {
        Ok(descriptions) => {
            debug!(path = %path.display(), edits = edits.len(), "applied edits");
            (FileStatus::Succeeded, descriptions)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "edit batch abandoned");
            let status = if e.is_stale() {
                FileStatus::StaleEdit(e.to_string())
            } else {
                FileStatus::Io(e.to_string())
            };
            (status, Vec::new())
        }
    };

    FileOutcome {
        path: path.to_path_buf(),
        status,
        descriptions,
        edits: edits.len(),
    }
}

/// Apply edits grouped by file, files in parallel. A failure in one file
/// leaves the others unaffected. Outcomes are sorted by path.
pub fn apply_all(edits: &[Edit], jobs: Option<usize>) -> Vec<FileOutcome> {
    let mut by_file: BTreeMap<&Path, Vec<&Edit>> = BTreeMap::new();
    for edit in edits {
        by_file.entry(edit.target.as_path()).or_default().push(edit);
    }
    let groups: Vec<(&Path, Vec<&Edit>)> = by_file.into_iter().collect();

    pool::install(jobs, || {
        groups
            .par_iter()
            .map(|(path, file_edits)| apply_file(path, file_edits))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn p() -> &'static Path {
        Path::new("a.ts")
    }

    #[test]
    fn test_insert_remove_replace() {
        let mut text = "import { A } from './baz';".to_string();
        Edit::insert(p(), 21, "bar/").apply_to(&mut text).unwrap();
        assert_eq!(text, "import { A } from './bar/baz';");

        let mut text = "import { A } from '../bar/baz';".to_string();
        Edit::remove(p(), 22, "bar/").apply_to(&mut text).unwrap();
        assert_eq!(text, "import { A } from '../baz';");

        let mut text = "import { A } from './baz';".to_string();
        let desc = Edit::replace(p(), 19, ".", "..").apply_to(&mut text).unwrap();
        assert_eq!(text, "import { A } from '../baz';");
        assert!(desc.contains("\"..\""), "description should mention the new text: {}", desc);
    }

    #[test]
    fn test_stale_replace_leaves_content_unchanged() {
        let original = "import { A } from './qux';".to_string();
        let mut text = original.clone();
        let err = Edit::replace(p(), 19, "./baz", "../baz")
            .apply_to(&mut text)
            .unwrap_err();
        assert!(err.is_stale());
        assert_eq!(text, original);
        match err {
            PromoteError::StaleEdit { expected, found, .. } => {
                assert_eq!(expected, "./baz");
                assert_eq!(found, "./qux");
            }
            other => panic!("expected stale edit, got {:?}", other),
        }
    }

    #[test]
    fn test_offset_past_end_is_stale() {
        let mut text = "short".to_string();
        assert!(Edit::remove(p(), 3, "too long").apply_to(&mut text).is_err());
        assert!(Edit::insert(p(), 99, "x").apply_to(&mut text).is_err());
        assert_eq!(text, "short");
    }

    #[test]
    fn test_non_char_boundary_is_stale() {
        let mut text = "é".to_string();
        assert!(Edit::insert(p(), 1, "x").apply_to(&mut text).is_err());
    }

    #[test]
    fn test_batch_applies_in_descending_order_regardless_of_input_order() {
        let content = "import a from './a';\nimport b from './b';\n";
        let first = Edit::replace(p(), 15, "./a", "../a");
        let second = Edit::replace(p(), 36, "./b", "../lib/b");
        let (out, descriptions) = apply_edits(p(), content, &[&first, &second]).unwrap();
        assert_eq!(out, "import a from '../a';\nimport b from '../lib/b';\n");
        assert_eq!(descriptions.len(), 2);
        assert!(descriptions[0].contains("@36"), "highest offset applies first");
    }

    #[test]
    fn test_removal_before_insert_at_same_offset() {
        let content = "export * from './a';\n";
        let remove = Edit::remove(p(), 0, "export * from './a';\n");
        let insert = Edit::insert(p(), 0, "export * from './b';\n");
        let (out, _) = apply_edits(p(), content, &[&insert, &remove]).unwrap();
        assert_eq!(out, "export * from './b';\n");
    }

    #[test]
    fn test_inserts_at_same_offset_keep_creation_order() {
        let one = Edit::insert(p(), 0, "1");
        let two = Edit::insert(p(), 0, "2");
        let three = Edit::insert(p(), 0, "3");
        let (out, _) = apply_edits(p(), "x", &[&one, &two, &three]).unwrap();
        assert_eq!(out, "123x");
    }

    #[test]
    fn test_overlapping_edits_rejected() {
        let a = Edit::replace(p(), 2, "cde", "X");
        let b = Edit::remove(p(), 4, "ef");
        let err = apply_edits(p(), "abcdefg", &[&a, &b]).unwrap_err();
        assert!(matches!(err, PromoteError::OverlappingEdits { first: 2, second: 4, .. }));

        let inside = Edit::insert(p(), 3, "!");
        assert!(apply_edits(p(), "abcdefg", &[&a, &inside]).is_err());

        let boundary = Edit::insert(p(), 5, "!");
        let (out, _) = apply_edits(p(), "abcdefg", &[&a, &boundary]).unwrap();
        assert_eq!(out, "abX!fg");
    }

    #[test]
    fn test_apply_all_is_file_atomic_and_best_effort() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.ts");
        let stale = dir.path().join("stale.ts");
        fs::write(&good, "import { A } from './baz';\n").unwrap();
        fs::write(&stale, "import { A } from './qux';\nimport { B } from './baz';\n").unwrap();

        let edits = vec![
            Edit::replace(&good, 19, ".", ".."),
            Edit::replace(&stale, 46, ".", ".."),
            // No longer matches: the first specifier changed after scanning.
            Edit::replace(&stale, 19, "./baz", "../baz"),
        ];
        let outcomes = apply_all(&edits, Some(2));

        assert_eq!(outcomes.len(), 2);
        let good_outcome = outcomes.iter().find(|o| o.path == good).unwrap();
        assert!(good_outcome.succeeded());
        assert_eq!(fs::read_to_string(&good).unwrap(), "import { A } from '../baz';\n");

        let stale_outcome = outcomes.iter().find(|o| o.path == stale).unwrap();
        assert!(matches!(stale_outcome.status, FileStatus::StaleEdit(_)));
        assert_eq!(
            fs::read_to_string(&stale).unwrap(),
            "import { A } from './qux';\nimport { B } from './baz';\n",
            "a failed batch must not write anything"
        );
    }

    #[test]
    fn test_missing_file_is_io_outcome() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.ts");
        let edit = Edit::insert(&missing, 0, "x");
        let outcome = apply_file(&missing, &[&edit]);
        assert!(matches!(outcome.status, FileStatus::Io(_)));
        assert!(!missing.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("x.ts");
        fs::write(&file, "old").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();

        atomic_write(&file, "new").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "new");
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
