use std::path::Path;

use crate::error::{PathErrorReason, PromoteError, Result};
use crate::model::{Language, SourceUnit};

pub mod typescript;

/// Syntax node categories the scanner cares about.
///
/// Grammar-specific kind strings are mapped onto this enum once, so the
/// visitor logic matches on a closed set instead of scattered string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Program,
    ImportStatement,
    /// `import x = require('./x')`
    ImportRequireClause,
    ExportStatement,
    ExportClause,
    ExportSpecifier,
    /// `export * as ns from './x'`
    NamespaceExport,
    /// The `*` token of `export * from './x'`.
    Wildcard,
    CallExpression,
    /// The `import` keyword in callee position of `import('./x')`.
    ImportKeyword,
    StringLiteral,
    /// Named top-level declarations: functions, classes, interfaces, types, enums.
    Declaration,
    VariableDeclaration,
    VariableDeclarator,
    Identifier,
    ObjectPattern,
    ArrayPattern,
    PairPattern,
    AssignmentPattern,
    RestPattern,
    ShorthandPattern,
    Other,
}

impl NodeKind {
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "program" => NodeKind::Program,
            "import_statement" => NodeKind::ImportStatement,
            "import_require_clause" => NodeKind::ImportRequireClause,
            "export_statement" => NodeKind::ExportStatement,
            "export_clause" => NodeKind::ExportClause,
            "export_specifier" => NodeKind::ExportSpecifier,
            "namespace_export" => NodeKind::NamespaceExport,
            "*" => NodeKind::Wildcard,
            "call_expression" => NodeKind::CallExpression,
            "import" => NodeKind::ImportKeyword,
            "string" => NodeKind::StringLiteral,
            "function_declaration"
            | "generator_function_declaration"
            | "class_declaration"
            | "abstract_class_declaration"
            | "interface_declaration"
            | "type_alias_declaration"
            | "enum_declaration" => NodeKind::Declaration,
            "lexical_declaration" | "variable_declaration" => NodeKind::VariableDeclaration,
            "variable_declarator" => NodeKind::VariableDeclarator,
            "identifier" => NodeKind::Identifier,
            "object_pattern" => NodeKind::ObjectPattern,
            "array_pattern" => NodeKind::ArrayPattern,
            "pair_pattern" => NodeKind::PairPattern,
            "assignment_pattern" | "object_assignment_pattern" => NodeKind::AssignmentPattern,
            "rest_pattern" => NodeKind::RestPattern,
            "shorthand_property_identifier_pattern" => NodeKind::ShorthandPattern,
            _ => NodeKind::Other,
        }
    }

    /// Nodes whose children may hold top-level declarations.
    pub fn passes_top_level(&self) -> bool {
        matches!(self, NodeKind::Program | NodeKind::ExportStatement)
    }
}

/// Turns one file's text into its located module references.
pub trait SourceScanner: Send + Sync {
    fn scan(&self, path: &Path, source: &str) -> Result<SourceUnit>;

    fn supported_languages(&self) -> &[Language];
}

/// Registry of source scanners, keyed by language.
pub struct ScannerRegistry {
    scanners: Vec<Box<dyn SourceScanner>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self {
            scanners: Vec::new(),
        }
    }

    /// Create a registry with all built-in scanners.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(typescript::TypeScriptScanner::new()));
        registry
    }

    pub fn register(&mut self, scanner: Box<dyn SourceScanner>) {
        self.scanners.push(scanner);
    }

    pub fn scanner_for(&self, language: Language) -> Option<&dyn SourceScanner> {
        self.scanners
            .iter()
            .find(|s| s.supported_languages().contains(&language))
            .map(|s| s.as_ref())
    }

    /// Scan already-loaded text with the scanner for the path's language.
    pub fn scan(&self, path: &Path, source: &str) -> Result<SourceUnit> {
        let scanner = Language::from_path(path)
            .and_then(|language| self.scanner_for(language))
            .ok_or_else(|| {
                PromoteError::path(PathErrorReason::UnsupportedFile(path.to_path_buf()))
            })?;
        scanner.scan(path, source)
    }

    /// Read a file and scan it, returning the text the offsets refer to.
    pub fn read_and_scan(&self, path: &Path) -> Result<(String, SourceUnit)> {
        let source = std::fs::read_to_string(path).map_err(|e| PromoteError::io(path, e))?;
        let unit = self.scan(path, &source)?;
        Ok((source, unit))
    }
}

impl Default for ScannerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
