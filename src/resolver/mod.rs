//! Lexical path algebra for relative module specifiers.
//!
//! Nothing here consults `tsconfig.json` or `node_modules`: a specifier is
//! resolved by joining it onto the directory of the file that contains it and
//! normalizing `.`/`..` components. Root-anchored specifiers (`/app/x`) are
//! joined onto the project root.

use std::path::{Component, Path, PathBuf};

use crate::config::PromoteConfig;

/// Everything a promote operation needs to know about the project.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// The root directory of the project; nothing outside it is scanned or moved.
    pub root: PathBuf,
    pub config: PromoteConfig,
}

impl ProjectContext {
    pub fn new(root: impl Into<PathBuf>, config: PromoteConfig) -> Self {
        ProjectContext {
            root: normalize_path(&root.into()),
            config,
        }
    }

    /// Source extensions (without the dot) the project is scanned for.
    pub fn extensions(&self) -> &[String] {
        &self.config.discovery.extensions
    }

    /// Make `path` absolute against the root and normalize it.
    pub fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.root.join(path))
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    fn source_stem<'a>(&self, path: &'a Path) -> Option<&'a str> {
        let name = path.file_name()?.to_str()?;
        let stem = strip_source_extension(name, self.extensions());
        (stem.len() < name.len()).then_some(stem)
    }

    /// `index.ts` and friends, per the configured barrel names.
    pub fn is_barrel_file(&self, path: &Path) -> bool {
        self.source_stem(path)
            .is_some_and(|stem| self.config.barrel.names.iter().any(|n| n == stem))
    }

    /// `foo.component.spec.ts` and friends, per the configured spec suffixes.
    pub fn is_spec_file(&self, path: &Path) -> bool {
        self.source_stem(path).is_some_and(|stem| {
            self.config.spec.suffixes.iter().any(|suffix| {
                stem.strip_suffix(suffix.as_str())
                    .is_some_and(|rest| rest.len() > 1 && rest.ends_with('.'))
            })
        })
    }
}

/// Normalize a path by resolving `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if components
                    .last()
                    .is_some_and(|c| matches!(c, Component::Normal(_)))
                {
                    components.pop();
                } else if !components
                    .last()
                    .is_some_and(|c| matches!(c, Component::RootDir | Component::Prefix(_)))
                {
                    components.push(component);
                }
            }
            Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Absolute target of `specifier` as seen from a file in `from_dir`.
pub fn resolve_specifier(specifier: &str, from_dir: &Path, root: &Path) -> PathBuf {
    if let Some(anchored) = specifier.strip_prefix('/') {
        normalize_path(&root.join(anchored))
    } else {
        normalize_path(&from_dir.join(specifier))
    }
}

/// Relative specifier from `from_dir` to `to`, always starting with `.`.
///
/// Both paths must be absolute and normalized.
pub fn relative_specifier(from_dir: &Path, to: &Path) -> String {
    let from: Vec<_> = from_dir.components().collect();
    let target: Vec<_> = to.components().collect();
    let common = from
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let ups = from.len() - common;
    let mut segments: Vec<String> = Vec::with_capacity(ups + target.len() - common + 1);
    if ups == 0 {
        segments.push(".".to_string());
    }
    segments.extend((0..ups).map(|_| "..".to_string()));
    segments.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    segments.join("/")
}

/// Root-anchored specifier (`/app/x`) for `to`.
pub fn anchored_specifier(root: &Path, to: &Path) -> String {
    let rel = to.strip_prefix(root).unwrap_or(to);
    let segments: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("/{}", segments.join("/"))
}

/// Re-derive `specifier`'s target relative to a new directory, keeping its
/// anchoring style.
pub fn respecify(original: &str, from_dir: &Path, target: &Path, root: &Path) -> String {
    if original.starts_with('/') {
        anchored_specifier(root, target)
    } else {
        relative_specifier(from_dir, target)
    }
}

/// Strip a known source extension from a file name (`baz.component.ts` -> `baz.component`).
pub fn strip_source_extension<'a>(name: &'a str, extensions: &[String]) -> &'a str {
    for ext in extensions {
        if let Some(stem) = name.strip_suffix(ext.as_str()) {
            if let Some(stem) = stem.strip_suffix('.') {
                if !stem.is_empty() {
                    return stem;
                }
            }
        }
    }
    name
}

/// `path` with a known source extension removed from its final component.
pub fn strip_extension(path: &Path, extensions: &[String]) -> PathBuf {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => {
            let stem = strip_source_extension(name, extensions);
            if stem.len() == name.len() {
                path.to_path_buf()
            } else {
                path.with_file_name(stem)
            }
        }
        None => path.to_path_buf(),
    }
}

/// Whether two paths name the same module once source extensions are ignored.
pub fn same_module(a: &Path, b: &Path, extensions: &[String]) -> bool {
    strip_extension(a, extensions) == strip_extension(b, extensions)
}

/// Find the file a module path refers to: the path itself, the path plus a
/// source extension, or an `index` file inside it.
pub fn probe_module(base: &Path, extensions: &[String]) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }

    for ext in extensions {
        let with_ext = PathBuf::from(format!("{}.{}", base.display(), ext));
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }

    for ext in extensions {
        let index = base.join(format!("index.{}", ext));
        if index.is_file() {
            return Some(index);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn exts() -> Vec<String> {
        ["ts", "tsx", "js"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/app/bar/../foo/./x")),
            PathBuf::from("/app/foo/x")
        );
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[test]
    fn test_resolve_relative_and_anchored() {
        let root = Path::new("/proj/src/app");
        let dir = Path::new("/proj/src/app/foo");
        assert_eq!(
            resolve_specifier("../bar/baz", dir, root),
            PathBuf::from("/proj/src/app/bar/baz")
        );
        assert_eq!(
            resolve_specifier("./qux", dir, root),
            PathBuf::from("/proj/src/app/foo/qux")
        );
        assert_eq!(
            resolve_specifier("/bar/baz", dir, root),
            PathBuf::from("/proj/src/app/bar/baz")
        );
    }

    #[test]
    fn test_relative_specifier_shapes() {
        let app = Path::new("/p/app");
        assert_eq!(
            relative_specifier(Path::new("/p/app/bar"), Path::new("/p/app/bar/foo")),
            "./foo"
        );
        assert_eq!(
            relative_specifier(Path::new("/p/app/foo"), Path::new("/p/app/baz")),
            "../baz"
        );
        assert_eq!(
            relative_specifier(Path::new("/p/app/a/b/c/d"), Path::new("/p/app/bar/foo")),
            "../../../../bar/foo"
        );
        assert_eq!(relative_specifier(app, app), ".");
        assert_eq!(relative_specifier(Path::new("/p/app/a/b"), app), "../..");
    }

    #[test]
    fn test_anchored_specifier_keeps_style() {
        let root = Path::new("/p/app");
        assert_eq!(
            respecify("/bar/baz", Path::new("/p/app/x"), Path::new("/p/app/baz"), root),
            "/baz"
        );
        assert_eq!(
            respecify("../bar/baz", Path::new("/p/app/x"), Path::new("/p/app/baz"), root),
            "../baz"
        );
    }

    #[test]
    fn test_strip_source_extension() {
        let exts = exts();
        assert_eq!(strip_source_extension("baz.component.ts", &exts), "baz.component");
        assert_eq!(strip_source_extension("baz.component", &exts), "baz.component");
        assert_eq!(strip_source_extension("index.tsx", &exts), "index");
        assert_eq!(strip_source_extension(".ts", &exts), ".ts");
        assert!(same_module(
            Path::new("/a/b.component.ts"),
            Path::new("/a/b.component"),
            &exts
        ));
        assert!(!same_module(Path::new("/a/b.ts"), Path::new("/a/c"), &exts));
    }

    #[test]
    fn test_probe_module() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("util.ts"), "").unwrap();
        fs::write(root.join("lib/index.ts"), "").unwrap();

        let exts = exts();
        assert_eq!(probe_module(&root.join("util"), &exts), Some(root.join("util.ts")));
        assert_eq!(
            probe_module(&root.join("lib"), &exts),
            Some(root.join("lib/index.ts"))
        );
        assert_eq!(probe_module(&root.join("missing"), &exts), None);
    }

    #[test]
    fn test_context_absolutize() {
        let ctx = ProjectContext::new("/p/app/", PromoteConfig::default());
        assert_eq!(ctx.absolutize(Path::new("bar/../baz")), PathBuf::from("/p/app/baz"));
        assert!(ctx.contains(Path::new("/p/app/baz")));
        assert!(!ctx.contains(Path::new("/p/other")));
    }

    #[test]
    fn test_barrel_and_spec_classification() {
        let ctx = ProjectContext::new("/p/app", PromoteConfig::default());
        assert!(ctx.is_barrel_file(Path::new("/p/app/bar/index.ts")));
        assert!(ctx.is_barrel_file(Path::new("/p/app/bar/index.js")));
        assert!(!ctx.is_barrel_file(Path::new("/p/app/bar/index")));
        assert!(!ctx.is_barrel_file(Path::new("/p/app/bar/indexer.ts")));

        assert!(ctx.is_spec_file(Path::new("/p/app/foo/foo.component.spec.ts")));
        assert!(!ctx.is_spec_file(Path::new("/p/app/foo/foo.component.ts")));
        assert!(!ctx.is_spec_file(Path::new("/p/app/spec.ts")));
        assert!(!ctx.is_spec_file(Path::new("/p/app/inspec.ts")));
    }
}
