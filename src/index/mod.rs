//! Dependency index: which files reference the unit being moved.
//!
//! Matching is by name, not by module resolution. A reference is a candidate
//! when the final segment of its specifier (extension stripped) equals the
//! unit's name; for directory units a specifier that passes through the
//! directory (`../baz/baz.component`) also counts. Candidates are resolved
//! against the unit's actual location later, in the rewriter.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::discovery::discover_files;
use crate::error::{PromoteError, Result};
use crate::model::{DependencyMap, Direction, PathDelta, Reference, SourceUnit};
use crate::parser::ScannerRegistry;
use crate::pool;
use crate::resolver::{strip_source_extension, ProjectContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitStyle {
    /// A single source file, travelling with its spec companion.
    File,
    /// A directory and everything inside it.
    Directory,
}

/// The unit being promoted, with its old and new location.
#[derive(Debug, Clone)]
pub struct MovedUnit {
    pub old: PathBuf,
    pub new: PathBuf,
    pub style: UnitStyle,
    /// Name used for matching specifiers: the directory name, or the file
    /// name without its source extension.
    pub name: String,
    pub new_name: String,
    old_parent: PathBuf,
    new_parent: PathBuf,
    extensions: Vec<String>,
    spec_suffixes: Vec<String>,
}

impl MovedUnit {
    /// `old` and `new` must be absolute and normalized; the new parent is
    /// derived from `delta` rather than from `new` directly.
    pub fn new(ctx: &ProjectContext, old: &Path, new: &Path, delta: &PathDelta) -> Self {
        let style = if old.is_dir() {
            UnitStyle::Directory
        } else {
            UnitStyle::File
        };
        let extensions = ctx.extensions().to_vec();
        let unit_name = |path: &Path| {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match style {
                UnitStyle::File => strip_source_extension(&file_name, &extensions).to_string(),
                UnitStyle::Directory => file_name,
            }
        };
        let name = unit_name(old);
        let new_name = unit_name(new);
        let old_parent = old.parent().unwrap_or(ctx.root.as_path()).to_path_buf();
        let new_parent = delta.apply_to(&old_parent);

        MovedUnit {
            old: old.to_path_buf(),
            new: new.to_path_buf(),
            style,
            name,
            new_name,
            old_parent,
            new_parent,
            extensions,
            spec_suffixes: ctx.config.spec.suffixes.clone(),
        }
    }

    /// A unit that stays where it is, for listing its dependents.
    pub fn stationary(ctx: &ProjectContext, path: &Path) -> Self {
        let delta = PathDelta {
            text: String::new(),
            direction: Direction::NoMove,
            levels: 0,
            removed: Vec::new(),
            added: Vec::new(),
        };
        Self::new(ctx, path, path, &delta)
    }

    pub fn old_parent(&self) -> &Path {
        &self.old_parent
    }

    pub fn new_parent(&self) -> &Path {
        &self.new_parent
    }

    /// The path an extensionless specifier would name, after the move.
    pub fn new_module(&self) -> PathBuf {
        self.new_parent.join(&self.new_name)
    }

    /// Whether a specifier names this unit by the name-matching rule.
    pub fn matches_specifier(&self, specifier: &str) -> bool {
        let mut segments = specifier.rsplit('/');
        let Some(last) = segments.next() else {
            return false;
        };
        let stem = strip_source_extension(last, &self.extensions);
        if stem == self.name {
            return true;
        }
        // `./foo.component.spec` names the companion, which moves too.
        let is_companion = stem
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|infix| self.spec_suffixes.iter().any(|s| s == infix));
        if is_companion {
            return true;
        }
        self.style == UnitStyle::Directory && segments.any(|s| s == self.name)
    }

    /// Where `path` ends up after the move, if the move carries it along.
    ///
    /// Works for scanned files and for extensionless module paths alike.
    pub fn relocate(&self, path: &Path) -> Option<PathBuf> {
        match self.style {
            UnitStyle::Directory => {
                let rest = path.strip_prefix(&self.old).ok()?;
                let base = self.new_parent.join(&self.new_name);
                if rest.as_os_str().is_empty() {
                    Some(base)
                } else {
                    Some(base.join(rest))
                }
            }
            UnitStyle::File => {
                if path.parent() != Some(self.old_parent.as_path()) {
                    return None;
                }
                let file_name = path.file_name()?.to_str()?;
                let renamed = self.relocated_file_name(file_name)?;
                Some(self.new_parent.join(renamed))
            }
        }
    }

    /// Whether a file moves together with the unit.
    pub fn travels(&self, path: &Path) -> bool {
        self.relocate(path).is_some()
    }

    /// `foo.component.ts` and `foo.component.spec.ts` both rename with
    /// `foo.component`; anything else in the directory stays put.
    fn relocated_file_name(&self, file_name: &str) -> Option<String> {
        let stem = strip_source_extension(file_name, &self.extensions);
        let rest = stem.strip_prefix(self.name.as_str())?;
        let is_unit = rest.is_empty()
            || rest
                .strip_prefix('.')
                .is_some_and(|infix| self.spec_suffixes.iter().any(|s| s == infix));
        if !is_unit {
            return None;
        }
        Some(format!("{}{}", self.new_name, &file_name[self.name.len()..]))
    }

    /// Renames that physically relocate the unit.
    ///
    /// A directory moves as a whole. A file moves with its same-stem siblings
    /// (`foo.component.html`, `foo.component.scss`, `foo.component.spec.ts`).
    pub fn file_moves(&self) -> std::io::Result<Vec<(PathBuf, PathBuf)>> {
        if self.style == UnitStyle::Directory {
            return Ok(vec![(self.old.clone(), self.new_parent.join(&self.new_name))]);
        }

        let mut moves = Vec::new();
        for entry in std::fs::read_dir(&self.old_parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let renamed = self
                .relocated_file_name(file_name)
                .or_else(|| self.sibling_file_name(file_name));
            if let Some(renamed) = renamed {
                moves.push((entry.path(), self.new_parent.join(renamed)));
            }
        }
        moves.sort();
        Ok(moves)
    }

    fn sibling_file_name(&self, file_name: &str) -> Option<String> {
        let (stem, _ext) = file_name.rsplit_once('.')?;
        let rest = stem.strip_prefix(self.name.as_str())?;
        let is_sibling = rest.is_empty()
            || rest
                .strip_prefix('.')
                .is_some_and(|infix| self.spec_suffixes.iter().any(|s| s == infix));
        is_sibling.then(|| format!("{}{}", self.new_name, &file_name[self.name.len()..]))
    }
}

/// Result of scanning the project for one move.
#[derive(Debug, Default)]
pub struct IndexResult {
    /// Files outside the travelling set with references naming the unit.
    pub dependents: DependencyMap,
    /// Every successfully scanned file.
    pub units: HashMap<PathBuf, SourceUnit>,
    /// Files that move with the unit, sorted.
    pub travelling: Vec<PathBuf>,
    /// Files that could not be read or parsed.
    pub failures: BTreeMap<PathBuf, PromoteError>,
    pub files_scanned: usize,
    pub duration_ms: u128,
}

impl IndexResult {
    pub fn unit(&self, path: &Path) -> Option<&SourceUnit> {
        self.units.get(path)
    }
}

/// Scan the project in parallel and collect the references naming `unit`.
///
/// Unreadable or unparseable files are skipped and reported in `failures`;
/// whether that is fatal is for the caller to decide.
pub fn build_dependency_map(
    ctx: &ProjectContext,
    unit: &MovedUnit,
    registry: &ScannerRegistry,
) -> Result<IndexResult> {
    let start = Instant::now();

    let discovery = discover_files(&ctx.root, &ctx.config.discovery)?;
    let discovered = discovery.files;
    debug!(
        root = %ctx.root.display(),
        files = discovered.len(),
        skipped = discovery.skipped.len(),
        "discovered source files"
    );

    let scanned: Vec<(PathBuf, Result<SourceUnit>)> = pool::install(ctx.config.apply.jobs, || {
        discovered
            .par_iter()
            .map(|df| {
                let result = registry.read_and_scan(&df.path).map(|(_, unit)| unit);
                (df.path.clone(), result)
            })
            .collect()
    });

    let mut result = IndexResult {
        files_scanned: scanned.len(),
        failures: discovery.skipped.into_iter().collect(),
        ..Default::default()
    };

    for (path, scan) in scanned {
        let travels = unit.travels(&path);
        if travels {
            result.travelling.push(path.clone());
        }
        match scan {
            Ok(source_unit) => {
                if !travels {
                    let hits: Vec<Reference> = source_unit
                        .relative_references()
                        .filter(|r| unit.matches_specifier(&r.specifier))
                        .cloned()
                        .collect();
                    result.dependents.insert(path.clone(), hits);
                }
                result.units.insert(path, source_unit);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file that could not be scanned");
                result.failures.insert(path, e);
            }
        }
    }

    result.travelling.sort();
    result.duration_ms = start.elapsed().as_millis();
    info!(
        unit = %unit.old.display(),
        dependents = result.dependents.len(),
        references = result.dependents.reference_count(),
        travelling = result.travelling.len(),
        failures = result.failures.len(),
        duration_ms = result.duration_ms,
        "built dependency map"
    );

    Ok(result)
}
