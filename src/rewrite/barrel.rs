//! Directory barrel (`index.ts`) maintenance.
//!
//! Moving a unit out of a directory drops its `export * from` line from that
//! directory's barrel; moving it into a directory with a barrel appends one.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::edit::Edit;
use crate::index::{IndexResult, MovedUnit, UnitStyle};
use crate::model::{RefKind, Reference, Warning};
use crate::resolver::{
    probe_module, relative_specifier, resolve_specifier, same_module, ProjectContext,
};

/// The barrel file of `dir`, if it has one.
pub fn find_barrel(ctx: &ProjectContext, dir: &Path) -> Option<PathBuf> {
    ctx.config.barrel.names.iter().find_map(|name| {
        ctx.extensions()
            .iter()
            .map(|ext| dir.join(format!("{}.{}", name, ext)))
            .find(|candidate| candidate.is_file())
    })
}

/// Barrel edits for one move, plus any warnings raised while planning them.
pub fn aggregator_edits(
    ctx: &ProjectContext,
    unit: &MovedUnit,
    index: &IndexResult,
    warnings: &mut Vec<Warning>,
) -> Vec<Edit> {
    let old_barrel = find_barrel(ctx, unit.old_parent());
    let new_barrel = find_barrel(ctx, unit.new_parent());

    // Same directory: the existing line is renamed along with other dependents.
    if old_barrel.is_some() && old_barrel == new_barrel {
        return Vec::new();
    }

    let mut edits = Vec::new();
    if let Some(barrel) = &old_barrel {
        edits.extend(removal_edits(ctx, unit, index, barrel, warnings));
    }
    if let Some(barrel) = &new_barrel {
        edits.extend(insertion_edit(ctx, unit, index, barrel, warnings));
    }
    edits
}

/// A scanned barrel: its text, its relative re-exports, and the end of its
/// last `export` statement of any kind.
struct BarrelExports<'a> {
    content: String,
    exports: Vec<&'a Reference>,
    last_export_end: Option<usize>,
}

fn barrel_exports<'a>(
    index: &'a IndexResult,
    barrel: &Path,
    warnings: &mut Vec<Warning>,
) -> Option<BarrelExports<'a>> {
    let Some(scanned) = index.unit(barrel) else {
        warnings.push(Warning::new(barrel, "barrel could not be scanned; left unchanged"));
        return None;
    };
    let content = match fs::read_to_string(barrel) {
        Ok(content) => content,
        Err(e) => {
            warnings.push(Warning::new(barrel, format!("barrel could not be read: {}", e)));
            return None;
        }
    };
    let exports = scanned
        .references
        .iter()
        .filter(|r| r.kind == RefKind::Export && r.is_relative())
        .collect();
    let last_export_end = scanned
        .export_statements
        .iter()
        .chain(scanned.exports().map(|r| &r.statement))
        .map(|span| span.end)
        .max();
    Some(BarrelExports {
        content,
        exports,
        last_export_end,
    })
}

/// Remove every export line in the old barrel that points at the unit,
/// together with its line terminator.
fn removal_edits(
    ctx: &ProjectContext,
    unit: &MovedUnit,
    index: &IndexResult,
    barrel: &Path,
    warnings: &mut Vec<Warning>,
) -> Vec<Edit> {
    let Some(BarrelExports {
        content, exports, ..
    }) = barrel_exports(index, barrel, warnings)
    else {
        return Vec::new();
    };

    let mut edits = Vec::new();
    for export in exports {
        let target = resolve_specifier(&export.specifier, unit.old_parent(), &ctx.root);
        if unit.relocate(&target).is_none() {
            continue;
        }
        let start = export.statement.start;
        let mut end = export.statement.end;
        let rest = content.get(end..).unwrap_or("");
        if rest.starts_with("\r\n") {
            end += 2;
        } else if rest.starts_with('\n') {
            end += 1;
        }
        let Some(line) = content.get(start..end) else {
            continue;
        };
        debug!(barrel = %barrel.display(), specifier = %export.specifier, "dropping barrel export");
        edits.push(Edit::remove(barrel, start, line));
    }
    edits
}

/// Append `export * from './<unit>';` to the new barrel unless it already
/// exports the unit, under its new or its old path.
fn insertion_edit(
    ctx: &ProjectContext,
    unit: &MovedUnit,
    index: &IndexResult,
    barrel: &Path,
    warnings: &mut Vec<Warning>,
) -> Option<Edit> {
    let BarrelExports {
        content,
        exports,
        last_export_end,
    } = barrel_exports(index, barrel, warnings)?;
    let exts = ctx.extensions();
    let new_module = unit.new_module();

    let already_exported = exports.iter().any(|export| {
        let target = resolve_specifier(&export.specifier, unit.new_parent(), &ctx.root);
        same_module(&target, &new_module, exts) || unit.relocate(&target).is_some()
    });
    if already_exported {
        debug!(barrel = %barrel.display(), "barrel already exports the unit");
        return None;
    }

    let specifier = relative_specifier(unit.new_parent(), &new_module);
    let quote = exports
        .last()
        .and_then(|r| r.span.start.checked_sub(1))
        .and_then(|i| content.get(i..i + 1))
        .filter(|q| *q == "\"" || *q == "'")
        .unwrap_or("'");
    let line = format!("export * from {q}{}{q};", specifier, q = quote);

    if let Some(collisions) = symbol_collisions(ctx, unit, index, barrel, &exports) {
        warnings.push(Warning::new(
            barrel,
            format!(
                "`{}` re-exports names the barrel already exports: {}",
                line, collisions
            ),
        ));
    }

    let edit = match last_export_end {
        Some(end) => Edit::insert(barrel, end, format!("\n{}", line)),
        None => Edit::insert(barrel, 0, format!("{}\n", line)),
    };
    Some(edit)
}

/// Names visible through a module: its declarations and its re-exports,
/// following `export *` one level into the referenced files.
fn module_symbols(ctx: &ProjectContext, index: &IndexResult, file: &Path) -> BTreeSet<String> {
    let mut symbols = BTreeSet::new();
    let Some(scanned) = index.unit(file) else {
        return symbols;
    };
    symbols.extend(scanned.declared_symbols.iter().cloned());

    let dir = file.parent().unwrap_or(ctx.root.as_path());
    for export in scanned.exports() {
        if !export.is_wildcard() {
            symbols.extend(export.exported_symbols.iter().cloned());
            continue;
        }
        if !export.is_relative() {
            continue;
        }
        let target = resolve_specifier(&export.specifier, dir, &ctx.root);
        if let Some(next) = probe_module(&target, ctx.extensions()).and_then(|p| index.unit(&p)) {
            symbols.extend(next.declared_symbols.iter().cloned());
        }
    }
    symbols
}

fn symbol_collisions(
    ctx: &ProjectContext,
    unit: &MovedUnit,
    index: &IndexResult,
    barrel: &Path,
    exports: &[&Reference],
) -> Option<String> {
    let unit_file = match unit.style {
        UnitStyle::File => Some(unit.old.clone()),
        UnitStyle::Directory => probe_module(&unit.old, ctx.extensions()),
    }?;
    let unit_symbols = module_symbols(ctx, index, &unit_file);
    if unit_symbols.is_empty() {
        return None;
    }

    let dir = barrel.parent().unwrap_or(ctx.root.as_path());
    let mut barrel_symbols = BTreeSet::new();
    for export in exports {
        if export.is_wildcard() {
            let target = resolve_specifier(&export.specifier, dir, &ctx.root);
            if let Some(file) = probe_module(&target, ctx.extensions()) {
                barrel_symbols.extend(module_symbols(ctx, index, &file));
            }
        } else {
            barrel_symbols.extend(export.exported_symbols.iter().cloned());
        }
    }

    let clashing: Vec<&str> = unit_symbols
        .intersection(&barrel_symbols)
        .map(|s| s.as_str())
        .collect();
    (!clashing.is_empty()).then(|| clashing.join(", "))
}
