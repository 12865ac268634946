use std::path::{Path, PathBuf};

use serde::Serialize;

use super::OutputFormat;
use crate::edit::{EditOp, FileStatus};
use crate::model::PathDelta;
use crate::rewrite::{DependentsReport, PromoteReport};

/// `path` relative to `root` when it lives under it.
fn display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Format any serializable value as JSON.
pub fn format_json<T: Serialize>(value: &T, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Compact => serde_json::to_string(value).unwrap_or_default(),
        OutputFormat::Json | OutputFormat::Text => {
            serde_json::to_string_pretty(value).unwrap_or_default()
        }
    }
}

#[derive(Serialize)]
struct MoveOutput<'a> {
    summary: String,
    #[serde(flatten)]
    report: &'a PromoteReport,
    moved: &'a [(PathBuf, PathBuf)],
}

/// Format the result of a `move`, including the renames that were performed.
pub fn format_report(
    report: &PromoteReport,
    moved: &[(PathBuf, PathBuf)],
    root: &Path,
    format: &OutputFormat,
) -> String {
    if !matches!(format, OutputFormat::Text) {
        let output = MoveOutput {
            summary: report.summary(),
            report,
            moved,
        };
        return format_json(&output, format);
    }

    let plan = &report.plan;
    let mut output = format!(
        "{} -> {} ({})\n",
        display(root, &plan.old),
        display(root, &plan.new),
        plan.delta
    );

    if !plan.edits.is_empty() {
        output.push_str(if report.dry_run {
            "\nPlanned edits:\n"
        } else {
            "\nEdits:\n"
        });
        let mut current: Option<&Path> = None;
        for edit in &plan.edits {
            if current != Some(edit.target.as_path()) {
                output.push_str(&format!("  {}\n", display(root, &edit.target)));
                current = Some(edit.target.as_path());
            }
            let line = match &edit.op {
                EditOp::Insert { text } => format!("insert {:?}", text),
                EditOp::Remove { expected } => format!("remove {:?}", expected),
                EditOp::Replace { old, new } => format!("{:?} -> {:?}", old, new),
            };
            output.push_str(&format!("    @{:<6} {}\n", edit.offset, line));
        }
    }

    let failed = report.failed();
    if !failed.is_empty() {
        output.push_str("\nFailed:\n");
        for outcome in failed {
            let reason = match &outcome.status {
                FileStatus::StaleEdit(msg) | FileStatus::Io(msg) => msg.as_str(),
                FileStatus::Succeeded => "",
            };
            output.push_str(&format!("  {}: {}\n", display(root, &outcome.path), reason));
        }
    }

    if !plan.warnings.is_empty() {
        output.push_str("\nWarnings:\n");
        for warning in &plan.warnings {
            output.push_str(&format!(
                "  {}: {}\n",
                display(root, &warning.path),
                warning.message
            ));
        }
    }

    if !moved.is_empty() {
        output.push_str("\nMoved:\n");
        for (from, to) in moved {
            output.push_str(&format!(
                "  {} -> {}\n",
                display(root, from),
                display(root, to)
            ));
        }
    }

    output.push('\n');
    output.push_str(&report.summary());
    output
}

/// Format the references to a unit.
pub fn format_dependents(report: &DependentsReport, root: &Path, format: &OutputFormat) -> String {
    if !matches!(format, OutputFormat::Text) {
        return format_json(report, format);
    }

    let mut output = String::new();
    for r in &report.references {
        output.push_str(&format!(
            "{}:{}  {:<6}  {}{}\n",
            display(root, &r.file),
            r.line,
            r.kind,
            r.specifier,
            if r.resolves { "" } else { "  (name only)" }
        ));
    }
    for warning in &report.warnings {
        output.push_str(&format!(
            "warning: {}: {}\n",
            display(root, &warning.path),
            warning.message
        ));
    }

    let resolving = report.references.iter().filter(|r| r.resolves).count();
    output.push_str(&format!(
        "{} reference(s) to {} ({} resolve), {} file(s) scanned",
        report.references.len(),
        display(root, &report.unit),
        resolving,
        report.files_scanned
    ));
    output
}

/// Format a path delta.
pub fn format_delta(delta: &PathDelta, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json | OutputFormat::Compact => format_json(delta, format),
        OutputFormat::Text => format!(
            "{:<10} levels={} text={:?} relative={}",
            delta.direction.to_string(),
            delta.levels,
            delta.text,
            delta.relative_text()
        ),
    }
}
