use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::load_project_config;
use crate::model::PathDelta;
use crate::resolver::{normalize_path, ProjectContext};
use crate::rewrite::{find_dependents, promote};

use super::output::{format_delta, format_dependents, format_report};
use super::{Cli, OutputFormat};

/// Load the config under `--root` and fold the command-line overrides into it.
pub fn load_context(cli: &Cli) -> Result<ProjectContext> {
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("project root not found: {}", cli.root.display()))?;
    let mut config = load_project_config(&root, cli.config.as_deref())?;

    config.discovery.include.extend(cli.include.iter().cloned());
    config.discovery.exclude.extend(cli.exclude.iter().cloned());
    if cli.jobs.is_some() {
        config.apply.jobs = cli.jobs;
    }

    debug!(root = %root.display(), "loaded project context");
    Ok(ProjectContext::new(root, config))
}

/// Command-line paths are relative to the working directory, not the root.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }
    let cwd = std::env::current_dir().context("cannot read the working directory")?;
    Ok(normalize_path(&cwd.join(path)))
}

/// Rename each `(from, to)` pair, creating parent directories as needed.
///
/// Every destination is checked before anything is renamed; an existing
/// destination aborts the whole batch.
pub fn move_files(moves: &[(PathBuf, PathBuf)]) -> Result<Vec<(PathBuf, PathBuf)>> {
    if let Some((_, to)) = moves.iter().find(|(_, to)| to.exists()) {
        anyhow::bail!("destination already exists: {}", to.display());
    }

    let mut moved = Vec::with_capacity(moves.len());
    for (from, to) in moves {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        fs::rename(from, to)
            .with_context(|| format!("cannot move {} to {}", from.display(), to.display()))?;
        debug!(from = %from.display(), to = %to.display(), "moved");
        moved.push((from.clone(), to.clone()));
    }
    Ok(moved)
}

/// Run a promotion. Returns the output and whether any file failed to update.
pub fn run_move(
    ctx: &ProjectContext,
    old: &Path,
    new: &Path,
    dry_run: bool,
    no_move: bool,
    format: &OutputFormat,
) -> Result<(String, bool)> {
    let mut ctx = ctx.clone();
    ctx.config.apply.dry_run |= dry_run;

    let old = absolute(old)?;
    let new = absolute(new)?;
    let report = promote(&ctx, &old, &new)
        .with_context(|| format!("cannot move {} to {}", old.display(), new.display()))?;

    let moved = if report.dry_run || no_move {
        Vec::new()
    } else {
        move_files(&report.plan.moves)?
    };
    if !moved.is_empty() {
        info!(count = moved.len(), "moved files");
    }

    let has_failures = !report.failed().is_empty();
    Ok((format_report(&report, &moved, &ctx.root, format), has_failures))
}

pub fn run_deps(ctx: &ProjectContext, path: &Path, format: &OutputFormat) -> Result<String> {
    let path = absolute(path)?;
    let report = find_dependents(ctx, &path)
        .with_context(|| format!("cannot list dependents of {}", path.display()))?;
    Ok(format_dependents(&report, &ctx.root, format))
}

pub fn run_delta(
    ctx: &ProjectContext,
    old: &Path,
    new: &Path,
    format: &OutputFormat,
) -> Result<String> {
    let old = absolute(old)?;
    let new = absolute(new)?;
    let delta = PathDelta::compute(&old, &new, &ctx.root)?;
    Ok(format_delta(&delta, format))
}
