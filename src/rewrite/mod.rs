//! Reference rewriting for a promote operation.
//!
//! A promotion scans the project once, plans every edit up front, and only
//! then writes. Anything that goes wrong before the apply phase leaves the
//! tree untouched.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::edit::{apply_all, Edit, EditOp, FileOutcome};
use crate::error::{PathErrorReason, PromoteError, Result};
use crate::index::{build_dependency_map, IndexResult, MovedUnit, UnitStyle};
use crate::model::{Language, PathDelta, RefKind, Reference, Warning};
use crate::parser::ScannerRegistry;
use crate::resolver::{respecify, resolve_specifier, strip_source_extension, ProjectContext};

pub mod barrel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Scanning,
    Planning,
    Applying,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Scanning => "scanning",
            Phase::Planning => "planning",
            Phase::Applying => "applying",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Tracks the phase of one promotion for logging and the final report.
#[derive(Debug)]
struct Promotion {
    phase: Phase,
}

impl Promotion {
    fn new() -> Self {
        Promotion { phase: Phase::Idle }
    }

    fn enter(&mut self, next: Phase) {
        debug!(from = %self.phase, to = %next, "promotion phase");
        self.phase = next;
    }

    fn fail(&mut self, err: PromoteError) -> PromoteError {
        warn!(phase = %self.phase, error = %err, "promotion failed");
        self.phase = Phase::Failed;
        err
    }
}

/// Edits from one resolve step, with the warnings it raised.
#[derive(Debug, Default, Serialize)]
pub struct EditSet {
    pub edits: Vec<Edit>,
    pub warnings: Vec<Warning>,
}

/// Everything a promotion will do, computed without writing.
#[derive(Debug, Serialize)]
pub struct PromotePlan {
    pub old: PathBuf,
    pub new: PathBuf,
    pub style: UnitStyle,
    pub delta: PathDelta,
    /// Files whose references to the unit get rewritten.
    pub dependents: Vec<PathBuf>,
    /// Files that move with the unit and get their own references rewritten.
    pub travelling: Vec<PathBuf>,
    pub edits: Vec<Edit>,
    pub warnings: Vec<Warning>,
    pub files_scanned: usize,
    /// Renames the caller performs after the edits are written.
    pub moves: Vec<(PathBuf, PathBuf)>,
}

#[derive(Debug, Serialize)]
pub struct PromoteReport {
    pub plan: PromotePlan,
    pub dry_run: bool,
    pub outcomes: Vec<FileOutcome>,
    pub phase: Phase,
}

impl PromoteReport {
    pub fn no_dependents(&self) -> bool {
        self.plan.dependents.is_empty()
    }

    pub fn failed(&self) -> Vec<&FileOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded()).collect()
    }

    pub fn summary(&self) -> String {
        if self.plan.edits.is_empty() {
            return "No dependent files to resolve.".to_string();
        }
        if self.dry_run {
            return format!(
                "Would apply {} edit(s) across {} file(s).",
                self.plan.edits.len(),
                count_files(&self.plan.edits)
            );
        }
        let failed = self.failed().len();
        format!(
            "Updated {} of {} file(s){}.",
            self.outcomes.len() - failed,
            self.outcomes.len(),
            if failed > 0 {
                format!(", {} failed", failed)
            } else {
                String::new()
            }
        )
    }
}

fn count_files(edits: &[Edit]) -> usize {
    let mut files: Vec<&Path> = edits.iter().map(|e| e.target.as_path()).collect();
    files.sort();
    files.dedup();
    files.len()
}

/// Resolve `path` against the root, accepting `foo/bar` for `foo/bar.ts`.
/// Returns the path and the extension that had to be added, if any.
fn locate(ctx: &ProjectContext, path: &Path) -> Result<(PathBuf, Option<String>)> {
    let path = ctx.absolutize(path);
    if path.exists() {
        return Ok((path, None));
    }
    let found = ctx.extensions().iter().find_map(|ext| {
        let candidate = PathBuf::from(format!("{}.{}", path.display(), ext));
        candidate.is_file().then(|| (candidate, ext.clone()))
    });
    match found {
        Some((file, ext)) => Ok((file, Some(ext))),
        None => Err(PromoteError::path(PathErrorReason::NotFound(path))),
    }
}

/// Normalize and check a move request before anything is scanned.
fn validate(ctx: &ProjectContext, old: &Path, new: &Path) -> Result<(PathBuf, PathBuf, PathDelta)> {
    let (old, added_ext) = locate(ctx, old)?;
    let mut new = ctx.absolutize(new);

    // `foo/bar` named `foo/bar.ts`; carry the extension over to the target.
    if let Some(ext) = added_ext {
        let new_name = new
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if strip_source_extension(&new_name, ctx.extensions()) == new_name {
            new = PathBuf::from(format!("{}.{}", new.display(), ext));
        }
    }

    let delta = PathDelta::compute(&old, &new, &ctx.root)?;

    if old.is_dir() {
        if new.starts_with(&old) {
            return Err(PromoteError::path(PathErrorReason::IntoItself));
        }
    } else {
        if Language::from_path(&old).is_none() {
            return Err(PromoteError::path(PathErrorReason::UnsupportedFile(old)));
        }
        if ctx.is_barrel_file(&old) {
            return Err(PromoteError::path(PathErrorReason::BarrelFile));
        }
        if ctx.is_spec_file(&old) {
            return Err(PromoteError::path(PathErrorReason::SpecFile));
        }
    }
    if new.exists() {
        return Err(PromoteError::path(PathErrorReason::DestinationExists(new)));
    }

    Ok((old, new, delta))
}

/// Every file that would move must have a free destination, companions and
/// same-stem siblings included.
fn check_destinations(unit: &MovedUnit) -> Result<()> {
    let moves = unit
        .file_moves()
        .map_err(|e| PromoteError::io(unit.old_parent(), e))?;
    match moves.into_iter().find(|(_, to)| to.exists()) {
        Some((_, to)) => Err(PromoteError::path(PathErrorReason::DestinationExists(to))),
        None => Ok(()),
    }
}

/// Scanned project state for one move, shared by the resolve steps.
struct Planner<'a> {
    ctx: &'a ProjectContext,
    unit: MovedUnit,
    delta: PathDelta,
    index: IndexResult,
    warnings: Vec<Warning>,
}

impl<'a> Planner<'a> {
    /// Validate, then scan. A travelling file that cannot be scanned is fatal;
    /// any other unscannable file becomes a warning.
    fn prepare(
        ctx: &'a ProjectContext,
        old: &Path,
        new: &Path,
        promotion: &mut Promotion,
    ) -> Result<Self> {
        let (old, new, delta) = validate(ctx, old, new).map_err(|e| promotion.fail(e))?;
        debug!(direction = %delta.direction, levels = delta.levels, text = %delta.text, "path delta");

        let unit = MovedUnit::new(ctx, &old, &new, &delta);
        check_destinations(&unit).map_err(|e| promotion.fail(e))?;

        promotion.enter(Phase::Scanning);
        let registry = ScannerRegistry::with_defaults();
        let mut index =
            build_dependency_map(ctx, &unit, &registry).map_err(|e| promotion.fail(e))?;

        let fatal = index
            .travelling
            .iter()
            .find(|path| index.failures.contains_key(*path))
            .cloned();
        if let Some(path) = fatal {
            if let Some(err) = index.failures.remove(&path) {
                return Err(promotion.fail(err));
            }
        }

        let warnings = index
            .failures
            .iter()
            .map(|(path, err)| Warning::new(path, format!("skipped: {}", err)))
            .collect();

        Ok(Planner {
            ctx,
            unit,
            delta,
            index,
            warnings,
        })
    }

    /// Rewrite every dependent reference so it names the unit's new location.
    fn dependent_edits(&mut self) -> Vec<Edit> {
        let root = &self.ctx.root;
        let mut edits = Vec::new();
        for (path, references) in self.index.dependents.iter() {
            let dir = path.parent().unwrap_or(root.as_path());
            for reference in references {
                let target = resolve_specifier(&reference.specifier, dir, root);
                let Some(moved) = self.unit.relocate(&target) else {
                    self.warnings.push(Warning::new(
                        path,
                        format!(
                            "line {}: '{}' names `{}` but resolves to {}; left unchanged",
                            reference.line,
                            reference.specifier,
                            self.unit.name,
                            target.display()
                        ),
                    ));
                    continue;
                };
                let rewritten = respecify(&reference.specifier, dir, &moved, root);
                if let Some(edit) = specifier_edit(path, reference, &rewritten) {
                    edits.push(edit);
                }
            }
        }
        edits
    }

    /// Re-derive the relative references of every travelling file from its
    /// new directory. Targets that travel too are taken at their new location.
    ///
    /// Edits address the files at their current paths; the caller moves them
    /// afterwards.
    fn own_reference_edits(&self) -> Vec<Edit> {
        let root = &self.ctx.root;
        let mut edits = Vec::new();
        for file in &self.index.travelling {
            let (Some(scanned), Some(relocated)) = (self.index.unit(file), self.unit.relocate(file))
            else {
                continue;
            };
            let old_dir = file.parent().unwrap_or(root.as_path());
            let new_dir = relocated.parent().unwrap_or(root.as_path());
            for reference in scanned.relative_references() {
                let target = resolve_specifier(&reference.specifier, old_dir, root);
                let target = self.unit.relocate(&target).unwrap_or(target);
                let rewritten = respecify(&reference.specifier, new_dir, &target, root);
                if rewritten != reference.specifier {
                    edits.push(Edit::replace(
                        file,
                        reference.span.start,
                        reference.specifier.as_str(),
                        rewritten,
                    ));
                }
            }
        }
        edits
    }

    fn aggregator_edits(&mut self) -> Vec<Edit> {
        barrel::aggregator_edits(self.ctx, &self.unit, &self.index, &mut self.warnings)
    }

    fn into_plan(self, edits: Vec<Edit>) -> PromotePlan {
        let moves = match self.unit.file_moves() {
            Ok(moves) => moves,
            Err(e) => {
                warn!(unit = %self.unit.old.display(), error = %e, "could not list files to move");
                Vec::new()
            }
        };
        PromotePlan {
            old: self.unit.old.clone(),
            new: self.unit.new.clone(),
            style: self.unit.style,
            delta: self.delta,
            dependents: self.index.dependents.files().map(Path::to_path_buf).collect(),
            travelling: self.index.travelling,
            edits,
            warnings: self.warnings,
            files_scanned: self.index.files_scanned,
            moves,
        }
    }
}

/// Smallest edit turning `reference`'s specifier into `rewritten`, at the
/// granularity of `/`-separated segments.
///
/// `./baz` -> `../baz` replaces the leading marker, `../../foo` ->
/// `../../bar/foo` inserts `bar/`, `../bar/baz` -> `../baz` removes `bar/`.
fn specifier_edit(path: &Path, reference: &Reference, rewritten: &str) -> Option<Edit> {
    let original = reference.specifier.as_str();
    if original == rewritten {
        return None;
    }
    let old: Vec<&str> = original.split('/').collect();
    let new: Vec<&str> = rewritten.split('/').collect();

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = old[prefix..old.len() - suffix].join("/");
    let new_mid = new[prefix..new.len() - suffix].join("/");
    let start = reference.span.start + old[..prefix].iter().map(|s| s.len() + 1).sum::<usize>();

    let edit = match (old_mid.is_empty(), new_mid.is_empty()) {
        (true, true) => return None,
        (true, false) if suffix == 0 => {
            Edit::insert(path, reference.span.end, format!("/{}", new_mid))
        }
        (true, false) => Edit::insert(path, start, format!("{}/", new_mid)),
        (false, true) if suffix == 0 => Edit::remove(path, start - 1, format!("/{}", old_mid)),
        (false, true) => Edit::remove(path, start, format!("{}/", old_mid)),
        (false, false) => Edit::replace(path, start, old_mid, new_mid),
    };
    Some(edit)
}

fn with_planner(
    ctx: &ProjectContext,
    old: &Path,
    new: &Path,
    step: impl FnOnce(&mut Planner<'_>) -> Vec<Edit>,
) -> Result<EditSet> {
    let mut promotion = Promotion::new();
    let mut planner = Planner::prepare(ctx, old, new, &mut promotion)?;
    promotion.enter(Phase::Planning);
    let edits = step(&mut planner);
    Ok(EditSet {
        edits,
        warnings: planner.warnings,
    })
}

/// Edits to every file outside the moved unit that references it.
pub fn resolve_dependents(ctx: &ProjectContext, old: &Path, new: &Path) -> Result<EditSet> {
    with_planner(ctx, old, new, |p| p.dependent_edits())
}

/// Edits to the moved unit's own relative references.
pub fn resolve_own_references(ctx: &ProjectContext, old: &Path, new: &Path) -> Result<EditSet> {
    with_planner(ctx, old, new, |p| p.own_reference_edits())
}

/// Barrel edits: drop the unit from the old directory's barrel and add it to
/// the new directory's.
pub fn resolve_aggregators(ctx: &ProjectContext, old: &Path, new: &Path) -> Result<EditSet> {
    with_planner(ctx, old, new, |p| p.aggregator_edits())
}

/// One reference to a unit, as reported by [`find_dependents`].
#[derive(Debug, Clone, Serialize)]
pub struct DependentRef {
    pub file: PathBuf,
    pub line: usize,
    pub specifier: String,
    pub kind: RefKind,
    /// False when the specifier only shares the unit's name.
    pub resolves: bool,
}

#[derive(Debug, Serialize)]
pub struct DependentsReport {
    pub unit: PathBuf,
    pub style: UnitStyle,
    pub references: Vec<DependentRef>,
    pub travelling: Vec<PathBuf>,
    pub warnings: Vec<Warning>,
    pub files_scanned: usize,
}

/// List the references to a unit without planning a move.
pub fn find_dependents(ctx: &ProjectContext, path: &Path) -> Result<DependentsReport> {
    let (path, _) = locate(ctx, path)?;
    if !ctx.contains(&path) || path == ctx.root {
        return Err(PromoteError::path(PathErrorReason::OutsideRoot(path)));
    }
    let unit = MovedUnit::stationary(ctx, &path);
    let index = build_dependency_map(ctx, &unit, &ScannerRegistry::with_defaults())?;

    let mut references = Vec::new();
    for (file, refs) in index.dependents.iter() {
        let dir = file.parent().unwrap_or(ctx.root.as_path());
        for r in refs {
            let target = resolve_specifier(&r.specifier, dir, &ctx.root);
            references.push(DependentRef {
                file: file.to_path_buf(),
                line: r.line,
                specifier: r.specifier.clone(),
                kind: r.kind,
                resolves: unit.travels(&target),
            });
        }
    }

    Ok(DependentsReport {
        unit: path,
        style: unit.style,
        references,
        travelling: index.travelling,
        warnings: index
            .failures
            .iter()
            .map(|(file, err)| Warning::new(file, format!("skipped: {}", err)))
            .collect(),
        files_scanned: index.files_scanned,
    })
}

fn plan_with(ctx: &ProjectContext, old: &Path, new: &Path, promotion: &mut Promotion) -> Result<PromotePlan> {
    let mut planner = Planner::prepare(ctx, old, new, promotion)?;

    promotion.enter(Phase::Planning);
    let aggregator = planner.aggregator_edits();
    let mut edits = planner.dependent_edits();
    // A barrel line that is dropped needs no rewriting.
    edits.retain(|edit| {
        !aggregator.iter().any(|removal| {
            matches!(removal.op, EditOp::Remove { .. })
                && removal.target == edit.target
                && removal.span().contains(&edit.span())
        })
    });
    edits.extend(planner.own_reference_edits());
    edits.extend(aggregator);

    for warning in &planner.warnings {
        warn!(path = %warning.path.display(), "{}", warning.message);
    }
    info!(
        edits = edits.len(),
        dependents = planner.index.dependents.len(),
        warnings = planner.warnings.len(),
        "planned promotion"
    );
    Ok(planner.into_plan(edits))
}

/// Plan a promotion without writing anything.
pub fn plan(ctx: &ProjectContext, old: &Path, new: &Path) -> Result<PromotePlan> {
    let _span = info_span!("plan", old = %old.display(), new = %new.display()).entered();
    let mut promotion = Promotion::new();
    plan_with(ctx, old, new, &mut promotion)
}

/// Plan, then apply every edit file by file. Honours `apply.dry_run`.
///
/// Files are rewritten in place; moving them is left to the caller (see
/// [`PromotePlan::moves`]).
pub fn promote(ctx: &ProjectContext, old: &Path, new: &Path) -> Result<PromoteReport> {
    let _span = info_span!("promote", old = %old.display(), new = %new.display()).entered();
    let mut promotion = Promotion::new();
    let plan = plan_with(ctx, old, new, &mut promotion)?;

    let dry_run = ctx.config.apply.dry_run;
    let outcomes = if dry_run || plan.edits.is_empty() {
        Vec::new()
    } else {
        promotion.enter(Phase::Applying);
        apply_all(&plan.edits, ctx.config.apply.jobs)
    };
    promotion.enter(Phase::Done);

    let report = PromoteReport {
        plan,
        dry_run,
        outcomes,
        phase: promotion.phase,
    };
    info!(summary = %report.summary(), "promotion finished");
    Ok(report)
}
