use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::error::{PathErrorReason, PromoteError, Result};
use crate::model::{Language, RefKind, Reference, SourceUnit, Span};

use super::{NodeKind, SourceScanner};

/// Scans `.ts`, `.tsx` and the JavaScript family. Holds no parser: one is
/// built per scan so the scanner can be shared across rayon workers.
#[derive(Default)]
pub struct TypeScriptScanner;

impl TypeScriptScanner {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_parser(path: &Path, language: Language) -> Result<Parser> {
        let mut parser = Parser::new();
        let grammar: tree_sitter::Language = match language {
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        };
        parser
            .set_language(&grammar)
            .map_err(|e| PromoteError::parse(path, 0, 0, format!("failed to load grammar: {}", e)))?;
        Ok(parser)
    }
}

impl SourceScanner for TypeScriptScanner {
    fn scan(&self, path: &Path, source: &str) -> Result<SourceUnit> {
        let language = Language::from_path(path).ok_or_else(|| {
            PromoteError::path(PathErrorReason::UnsupportedFile(path.to_path_buf()))
        })?;
        let mut parser = Self::create_parser(path, language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| PromoteError::parse(path, 0, 0, "tree-sitter failed to parse"))?;

        if let Some(err) = first_syntax_error(path, &tree) {
            return Err(err);
        }

        let mut scanner = Scanner::new(path, source);
        scanner.walk(tree.root_node());

        Ok(SourceUnit {
            path: path.to_path_buf(),
            language,
            references: scanner.references,
            declared_symbols: scanner.declared_symbols,
            export_statements: scanner.export_statements,
        })
    }

    fn supported_languages(&self) -> &[Language] {
        &[Language::TypeScript, Language::Tsx, Language::JavaScript]
    }
}

/// Locate the first ERROR or MISSING node in document order.
fn first_syntax_error(path: &Path, tree: &Tree) -> Option<PromoteError> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            let message = if node.is_missing() {
                format!("missing `{}`", node.kind())
            } else {
                "unexpected syntax".to_string()
            };
            return Some(PromoteError::parse(path, pos.row + 1, pos.column + 1, message));
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    Some(PromoteError::parse(path, 1, 1, "unexpected syntax"))
}

/// Walks a tree-sitter CST and collects module references and top-level names.
struct Scanner<'a> {
    path: &'a Path,
    source: &'a str,
    references: Vec<Reference>,
    declared_symbols: Vec<String>,
    export_statements: Vec<Span>,
}

impl<'a> Scanner<'a> {
    fn new(path: &'a Path, source: &'a str) -> Self {
        Self {
            path,
            source,
            references: Vec::new(),
            declared_symbols: Vec::new(),
            export_statements: Vec::new(),
        }
    }

    fn node_text(&self, node: Node) -> &'a str {
        self.source
            .get(node.start_byte()..node.end_byte())
            .unwrap_or("")
    }

    /// Depth-first, pre-order, with an explicit stack. Children are pushed in
    /// reverse so references come out in source order.
    fn walk(&mut self, root: Node) {
        let mut stack = vec![(root, false)];
        while let Some((node, top_level)) = stack.pop() {
            let kind = NodeKind::from_kind(node.kind());
            let descend = match kind {
                NodeKind::ImportStatement => {
                    self.visit_import(node);
                    false
                }
                NodeKind::ExportStatement => {
                    if top_level {
                        self.export_statements
                            .push(Span::new(node.start_byte(), node.end_byte()));
                    }
                    self.visit_export(node)
                }
                NodeKind::CallExpression => {
                    self.visit_call(node);
                    true
                }
                NodeKind::Declaration => {
                    if top_level {
                        self.declare_name(node);
                    }
                    true
                }
                NodeKind::VariableDeclaration => {
                    if top_level {
                        self.declare_variables(node);
                    }
                    true
                }
                _ => true,
            };
            if !descend {
                continue;
            }

            let children_top_level = match kind {
                NodeKind::Program => true,
                other => other.passes_top_level() && top_level,
            };
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev().map(|c| (c, children_top_level)));
        }
    }

    /// `import ... from './x'`, `import './x'` and `import x = require('./x')`.
    fn visit_import(&mut self, node: Node) {
        let source = node.child_by_field_name("source").or_else(|| {
            child_of_kind(node, NodeKind::ImportRequireClause)
                .and_then(|clause| clause.child_by_field_name("source"))
        });
        if let Some(source) = source {
            self.push_reference(source, node, RefKind::Import, Vec::new());
        }
    }

    /// Records re-exports; returns whether the statement's children still need
    /// visiting (local declarations, nested calls).
    fn visit_export(&mut self, node: Node) -> bool {
        let Some(source) = node.child_by_field_name("source") else {
            return true;
        };

        let mut symbols = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match NodeKind::from_kind(child.kind()) {
                NodeKind::Wildcard => symbols.push("*".to_string()),
                NodeKind::NamespaceExport => {
                    let count = child.named_child_count();
                    if let Some(name) = count.checked_sub(1).and_then(|i| child.named_child(i)) {
                        symbols.push(self.node_text(name).to_string());
                    }
                }
                NodeKind::ExportClause => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if NodeKind::from_kind(spec.kind()) != NodeKind::ExportSpecifier {
                            continue;
                        }
                        let exported = spec
                            .child_by_field_name("alias")
                            .or_else(|| spec.child_by_field_name("name"));
                        if let Some(exported) = exported {
                            symbols.push(self.node_text(exported).to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        self.push_reference(source, node, RefKind::Export, symbols);
        false
    }

    /// `import('./x')` and `require('./x')` with a string-literal argument.
    fn visit_call(&mut self, node: Node) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let is_loader = match NodeKind::from_kind(function.kind()) {
            NodeKind::ImportKeyword => true,
            NodeKind::Identifier => self.node_text(function) == "require",
            _ => false,
        };
        if !is_loader {
            return;
        }
        let Some(first_arg) = node
            .child_by_field_name("arguments")
            .and_then(|args| args.named_child(0))
        else {
            return;
        };
        self.push_reference(first_arg, node, RefKind::Import, Vec::new());
    }

    fn push_reference(
        &mut self,
        string: Node,
        statement: Node,
        kind: RefKind,
        exported_symbols: Vec<String>,
    ) {
        // Template strings and computed specifiers can't be rewritten statically.
        if NodeKind::from_kind(string.kind()) != NodeKind::StringLiteral {
            return;
        }
        let start = string.start_byte() + 1;
        let end = string.end_byte().saturating_sub(1);
        if end < start {
            return;
        }
        let Some(specifier) = self.source.get(start..end) else {
            return;
        };

        self.references.push(Reference {
            owner: self.path.to_path_buf(),
            specifier: specifier.to_string(),
            span: Span::new(start, end),
            statement: Span::new(statement.start_byte(), statement.end_byte()),
            kind,
            exported_symbols,
            line: string.start_position().row + 1,
        });
    }

    fn declare(&mut self, name: &str) {
        if !name.is_empty() && !self.declared_symbols.iter().any(|s| s == name) {
            self.declared_symbols.push(name.to_string());
        }
    }

    fn declare_name(&mut self, node: Node) {
        if let Some(name) = node.child_by_field_name("name") {
            let text = self.node_text(name);
            self.declare(text);
        }
    }

    fn declare_variables(&mut self, node: Node) {
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| NodeKind::from_kind(c.kind()) == NodeKind::VariableDeclarator)
            .collect();
        for declarator in declarators {
            if let Some(pattern) = declarator.child_by_field_name("name") {
                self.declare_pattern(pattern);
            }
        }
    }

    /// Binding names in a declarator target, including destructuring patterns.
    fn declare_pattern(&mut self, pattern: Node) {
        let mut stack = vec![pattern];
        while let Some(node) = stack.pop() {
            match NodeKind::from_kind(node.kind()) {
                NodeKind::Identifier | NodeKind::ShorthandPattern => {
                    let text = self.node_text(node);
                    self.declare(text);
                }
                NodeKind::PairPattern => {
                    if let Some(value) = node.child_by_field_name("value") {
                        stack.push(value);
                    }
                }
                NodeKind::AssignmentPattern => {
                    if let Some(left) = node.child_by_field_name("left") {
                        stack.push(left);
                    }
                }
                NodeKind::ObjectPattern | NodeKind::ArrayPattern | NodeKind::RestPattern => {
                    let mut cursor = node.walk();
                    let children: Vec<Node> = node.named_children(&mut cursor).collect();
                    stack.extend(children.into_iter().rev());
                }
                _ => {}
            }
        }
    }
}

fn child_of_kind<'t>(node: Node<'t>, kind: NodeKind) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if NodeKind::from_kind(child.kind()) == kind {
            return Some(child);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_ts(source: &str) -> SourceUnit {
        TypeScriptScanner::new()
            .scan(Path::new("test.ts"), source)
            .unwrap()
    }

    fn scan_js(source: &str) -> SourceUnit {
        TypeScriptScanner::new()
            .scan(Path::new("test.js"), source)
            .unwrap()
    }

    fn specifiers(unit: &SourceUnit) -> Vec<&str> {
        unit.references.iter().map(|r| r.specifier.as_str()).collect()
    }

    #[test]
    fn test_import_specifier_offsets() {
        let source = "import { BazComponent } from '../bar/baz';\n";
        let unit = scan_ts(source);
        assert_eq!(unit.references.len(), 1);
        let r = &unit.references[0];
        assert_eq!(r.kind, RefKind::Import);
        assert_eq!(r.specifier, "../bar/baz");
        assert_eq!(&source[r.span.start..r.span.end], "../bar/baz");
        assert_eq!(r.statement.start, 0);
        assert_eq!(&source[r.statement.end - 1..r.statement.end], ";");
        assert_eq!(r.line, 1);
    }

    #[test]
    fn test_import_forms() {
        let unit = scan_ts(
            r#"
import Default from './a';
import * as ns from "./b";
import './polyfill';
import type { T } from './types';
import { x, y as z } from '@angular/core';
"#,
        );
        assert_eq!(
            specifiers(&unit),
            vec!["./a", "./b", "./polyfill", "./types", "@angular/core"]
        );
        assert_eq!(unit.references[1].line, 3);
        assert!(unit.references.iter().all(|r| r.kind == RefKind::Import));
    }

    #[test]
    fn test_export_wildcard_and_named() {
        let source = "export * from './baz';\nexport { A, B as C } from './qux';\nexport * as ns from './ns';\n";
        let unit = scan_ts(source);
        assert_eq!(unit.references.len(), 3);

        let star = &unit.references[0];
        assert_eq!(star.kind, RefKind::Export);
        assert_eq!(star.exported_symbols, vec!["*"]);
        assert!(star.is_wildcard());
        assert_eq!(
            &source[star.statement.start..star.statement.end],
            "export * from './baz';"
        );

        assert_eq!(unit.references[1].exported_symbols, vec!["A", "C"]);
        assert_eq!(unit.references[2].exported_symbols, vec!["ns"]);
        assert!(!unit.references[2].is_wildcard());
    }

    #[test]
    fn test_local_exports_are_declarations_not_references() {
        let unit = scan_ts(
            r#"
export class FooComponent {}
export function helper() {}
export const a = 1, b = 2;
export interface Shape {}
export type Id = string;
export enum Color { Red }
const local = 3;
export { local };
"#,
        );
        assert!(unit.references.is_empty());
        assert_eq!(unit.export_statements.len(), 7);
        for name in ["FooComponent", "helper", "a", "b", "Shape", "Id", "Color", "local"] {
            assert!(
                unit.declared_symbols.iter().any(|s| s == name),
                "missing declared symbol {}",
                name
            );
        }
    }

    #[test]
    fn test_destructured_declarations() {
        let unit = scan_ts("const { a, b: renamed, c = 1, ...rest } = obj;\nlet [x, , y] = arr;\n");
        for name in ["a", "renamed", "c", "rest", "x", "y"] {
            assert!(
                unit.declared_symbols.iter().any(|s| s == name),
                "missing {}",
                name
            );
        }
        assert!(!unit.declared_symbols.iter().any(|s| s == "b"));
    }

    #[test]
    fn test_nested_declarations_are_not_top_level() {
        let unit = scan_ts("function outer() { const inner = 1; function nested() {} }\n");
        assert_eq!(unit.declared_symbols, vec!["outer"]);
    }

    #[test]
    fn test_require_and_dynamic_import() {
        let unit = scan_js(
            r#"
const fs = require('fs');
const util = require('./util');
async function load() {
    const m = await import('../lazy/module');
    return require(`./tpl`);
}
"#,
        );
        assert_eq!(specifiers(&unit), vec!["fs", "./util", "../lazy/module"]);
        assert!(unit.references.iter().all(|r| r.kind == RefKind::Import));
    }

    #[test]
    fn test_import_equals_require() {
        let source = "import legacy = require('./legacy');\n";
        let unit = scan_ts(source);
        assert_eq!(specifiers(&unit), vec!["./legacy"]);
        let r = &unit.references[0];
        assert_eq!(&source[r.span.start..r.span.end], "./legacy");
    }

    #[test]
    fn test_offsets_are_bytes_after_multibyte_text() {
        let source = "// héllo wörld\nimport { a } from './a';\n";
        let unit = scan_ts(source);
        let r = &unit.references[0];
        assert_eq!(&source[r.span.start..r.span.end], "./a");
        assert_eq!(r.line, 2);
    }

    #[test]
    fn test_references_in_source_order() {
        let unit = scan_ts(
            "import './one';\nexport * from './two';\nconst x = require('./three');\nimport './four';\n",
        );
        assert_eq!(specifiers(&unit), vec!["./one", "./two", "./three", "./four"]);
    }

    #[test]
    fn test_tsx_file() {
        let unit = TypeScriptScanner::new()
            .scan(
                Path::new("view.tsx"),
                "import { Card } from './card';\nexport const View = () => <Card title=\"x\" />;\n",
            )
            .unwrap();
        assert_eq!(specifiers(&unit), vec!["./card"]);
        assert_eq!(unit.declared_symbols, vec!["View"]);
    }

    #[test]
    fn test_parse_error_reports_location() {
        let err = TypeScriptScanner::new()
            .scan(Path::new("broken.ts"), "import { a } from './a';\nconst = 5;\n")
            .unwrap_err();
        match err {
            PromoteError::Parse { line, path, .. } => {
                assert_eq!(line, 2);
                assert_eq!(path, Path::new("broken.ts"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_file() {
        let unit = scan_ts("");
        assert!(unit.references.is_empty());
        assert!(unit.declared_symbols.is_empty());
    }
}
