use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub mod delta;

pub use delta::{Direction, PathDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Import,
    Export,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Import => "import",
            RefKind::Export => "export",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Half-open byte range `[start, end)` into the scanned source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Adjacent spans do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A module specifier located in a source file.
///
/// `span` covers the specifier text between the quotes; `statement` covers the
/// whole import/export statement (or the call expression for `import()` and
/// `require()`). Both are only valid against the text the file had when it
/// was scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub owner: PathBuf,
    pub specifier: String,
    pub span: Span,
    pub statement: Span,
    pub kind: RefKind,
    /// Names re-exported by an export reference; `"*"` marks `export *`.
    pub exported_symbols: Vec<String>,
    /// 1-based line of the specifier.
    pub line: usize,
}

impl Reference {
    pub fn is_relative(&self) -> bool {
        is_relative_specifier(&self.specifier)
    }

    pub fn is_wildcard(&self) -> bool {
        self.exported_symbols.iter().any(|s| s == "*")
    }
}

/// True for `./x`, `../x`, `.` and root-anchored `/x` specifiers.
pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with('.') || specifier.starts_with('/')
}

/// A scanned file: its references in source order plus its top-level names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub language: Language,
    pub references: Vec<Reference>,
    pub declared_symbols: Vec<String>,
    /// Every top-level `export` statement, with or without a module specifier.
    #[serde(default)]
    pub export_statements: Vec<Span>,
}

impl SourceUnit {
    pub fn exports(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(|r| r.kind == RefKind::Export)
    }

    pub fn relative_references(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(|r| r.is_relative())
    }
}

/// Dependent file -> the references in it that name the moved unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyMap {
    entries: BTreeMap<PathBuf, Vec<Reference>>,
}

impl DependencyMap {
    pub fn insert(&mut self, file: PathBuf, references: Vec<Reference>) {
        if references.is_empty() {
            return;
        }
        self.entries.entry(file).or_default().extend(references);
    }

    pub fn get(&self, file: &Path) -> Option<&[Reference]> {
        self.entries.get(file).map(|v| v.as_slice())
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(|p| p.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[Reference])> {
        self.entries
            .iter()
            .map(|(path, refs)| (path.as_path(), refs.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reference_count(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }
}

/// A non-fatal problem found while scanning or planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub path: PathBuf,
    pub message: String,
}

impl Warning {
    pub fn new(path: &Path, message: impl Into<String>) -> Self {
        Warning {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(owner: &str, specifier: &str) -> Reference {
        Reference {
            owner: PathBuf::from(owner),
            specifier: specifier.to_string(),
            span: Span::new(10, 10 + specifier.len()),
            statement: Span::new(0, 12 + specifier.len()),
            kind: RefKind::Import,
            exported_symbols: Vec::new(),
            line: 1,
        }
    }

    #[test]
    fn test_relative_specifiers() {
        assert!(is_relative_specifier("./baz"));
        assert!(is_relative_specifier("../bar/baz"));
        assert!(is_relative_specifier("/app/baz"));
        assert!(is_relative_specifier("."));
        assert!(!is_relative_specifier("@angular/core"));
        assert!(!is_relative_specifier("rxjs/operators"));
    }

    #[test]
    fn test_span_overlap_and_containment() {
        let a = Span::new(0, 5);
        let b = Span::new(5, 9);
        let c = Span::new(3, 6);
        assert!(!a.overlaps(&b), "adjacent spans must not overlap");
        assert!(a.overlaps(&c));
        assert!(Span::new(0, 10).contains(&c));
        assert!(!c.contains(&a));
        assert_eq!(c.len(), 3);
        assert!(Span::new(4, 4).is_empty());
    }

    #[test]
    fn test_wildcard_detection() {
        let mut r = reference("index.ts", "./baz");
        assert!(!r.is_wildcard());
        r.exported_symbols = vec!["*".to_string()];
        assert!(r.is_wildcard());
    }

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_extension("ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("tsx"), Some(Language::Tsx));
        assert_eq!(Language::from_extension("mjs"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("css"), None);
        assert_eq!(
            Language::from_path(Path::new("a/b.component.ts")),
            Some(Language::TypeScript)
        );
    }

    #[test]
    fn test_dependency_map_ignores_empty_insertions() {
        let mut map = DependencyMap::default();
        map.insert(PathBuf::from("a.ts"), Vec::new());
        assert!(map.is_empty());

        map.insert(PathBuf::from("b.ts"), vec![reference("b.ts", "./x")]);
        map.insert(PathBuf::from("b.ts"), vec![reference("b.ts", "../x")]);
        map.insert(PathBuf::from("a.ts"), vec![reference("a.ts", "./x")]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.reference_count(), 3);

        let files: Vec<_> = map.files().collect();
        assert_eq!(files, vec![Path::new("a.ts"), Path::new("b.ts")]);
        assert_eq!(map.get(Path::new("b.ts")).map(|r| r.len()), Some(2));
    }
}
