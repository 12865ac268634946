use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};

use tracing::warn;

use crate::error::{PromoteError, Result};
use crate::model::Language;

/// A discovered source file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub language: Language,
}

/// Configuration for file discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Glob patterns to include (empty means include all).
    pub include: Vec<String>,
    /// Glob patterns to exclude.
    pub exclude: Vec<String>,
    /// Source extensions to scan, without the leading dot.
    pub extensions: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            include: Vec::new(),
            exclude: Vec::new(),
            extensions: ["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Build output and dependency directories that never hold project sources.
const DEFAULT_EXCLUDE_PATTERNS: &[&str] =
    &["node_modules/", "dist/", "out-tsc/", "coverage/", ".git/"];

/// Source files found under a root, plus the entries the walk could not read.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    pub skipped: Vec<(PathBuf, PromoteError)>,
}

/// Discover source files under `root`, respecting .gitignore.
///
/// An unreadable entry is skipped and reported; only a missing root or a bad
/// glob fails the whole walk.
pub fn discover_files(root: &Path, config: &DiscoveryConfig) -> Result<Discovery> {
    if !root.is_dir() {
        return Err(PromoteError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "project root is not a directory"),
        ));
    }

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .parents(true);

    let mut overrides = ignore::overrides::OverrideBuilder::new(root);
    let patterns = DEFAULT_EXCLUDE_PATTERNS
        .iter()
        .map(|p| format!("!{}", p))
        .chain(config.exclude.iter().map(|p| format!("!{}", p)))
        .chain(config.include.iter().cloned());
    for pattern in patterns {
        overrides
            .add(&pattern)
            .map_err(|e| walk_error(root, e))?;
    }
    builder.overrides(overrides.build().map_err(|e| walk_error(root, e))?);

    let mut discovery = Discovery::default();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = error_path(&e).unwrap_or(root).to_path_buf();
                warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                discovery.skipped.push((path.clone(), walk_error(&path, e)));
                continue;
            }
        };

        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !config.extensions.iter().any(|e| e == ext) {
            continue;
        }
        let Some(language) = Language::from_extension(ext) else {
            continue;
        };

        discovery.files.push(DiscoveredFile {
            path: path.to_path_buf(),
            language,
        });
    }

    discovery.files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(discovery)
}

/// The path an `ignore` error is about, when it names one.
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path),
        ignore::Error::Loop { child, .. } => Some(child),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

fn walk_error(root: &Path, err: ignore::Error) -> PromoteError {
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other(message));
    PromoteError::io(root, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_test_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("app/foo")).unwrap();
        fs::write(root.join("app/foo/foo.component.ts"), "export class Foo {}").unwrap();
        fs::write(root.join("app/foo/foo.component.html"), "<p></p>").unwrap();
        fs::write(root.join("app/foo/foo.component.css"), "p {}").unwrap();
        fs::write(root.join("app/main.js"), "console.log('hello');").unwrap();

        fs::create_dir(root.join(".git")).unwrap();
        fs::write(root.join(".gitignore"), "generated/\n").unwrap();

        fs::create_dir_all(root.join("generated")).unwrap();
        fs::write(root.join("generated/api.ts"), "// ignored").unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("node_modules/pkg/index.ts"), "// ignored").unwrap();

        dir
    }

    #[test]
    fn test_discovers_source_files_only() {
        let dir = setup_test_project();
        let files = discover_files(dir.path(), &DiscoveryConfig::default()).unwrap().files;
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();

        assert!(paths.iter().any(|p| p.ends_with("app/foo/foo.component.ts")));
        assert!(paths.iter().any(|p| p.ends_with("app/main.js")));
        assert!(!paths.iter().any(|p| p.ends_with("foo.component.html")));
        assert!(!paths.iter().any(|p| p.ends_with("foo.component.css")));
    }

    #[test]
    fn test_skips_gitignored_and_node_modules() {
        let dir = setup_test_project();
        let files = discover_files(dir.path(), &DiscoveryConfig::default()).unwrap().files;
        assert!(!files
            .iter()
            .any(|f| f.path.to_string_lossy().contains("node_modules")));
        assert!(!files
            .iter()
            .any(|f| f.path.to_string_lossy().contains("generated")));
    }

    #[test]
    fn test_language_detection() {
        let dir = setup_test_project();
        let files = discover_files(dir.path(), &DiscoveryConfig::default()).unwrap().files;
        let ts = files
            .iter()
            .find(|f| f.path.ends_with("foo.component.ts"))
            .unwrap();
        assert_eq!(ts.language, Language::TypeScript);
        let js = files.iter().find(|f| f.path.ends_with("main.js")).unwrap();
        assert_eq!(js.language, Language::JavaScript);
    }

    #[test]
    fn test_extension_filter() {
        let dir = setup_test_project();
        let config = DiscoveryConfig {
            extensions: vec!["ts".to_string()],
            ..Default::default()
        };
        let files = discover_files(dir.path(), &config).unwrap().files;
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("foo.component.ts"));
    }

    #[test]
    fn test_exclude_pattern_filters_files() {
        let dir = setup_test_project();
        let config = DiscoveryConfig {
            exclude: vec!["*.js".to_string()],
            ..Default::default()
        };
        let files = discover_files(dir.path(), &config).unwrap().files;
        assert!(!files
            .iter()
            .any(|f| f.path.to_string_lossy().ends_with(".js")));
        assert!(files.iter().any(|f| f.path.ends_with("foo.component.ts")));
    }

    #[test]
    fn test_deeply_nested_files_are_discovered() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("foo-baz/qux/quux/foobar");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("foobar.component.ts"), "export const x = 1;").unwrap();

        let files = discover_files(dir.path(), &DiscoveryConfig::default()).unwrap().files;
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("foobar.component.ts"));
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("empty-dir")).unwrap();
        let files = discover_files(dir.path(), &DiscoveryConfig::default()).unwrap().files;
        assert!(files.is_empty());
    }

    #[test]
    fn test_results_are_sorted_by_path() {
        let dir = setup_test_project();
        let files = discover_files(dir.path(), &DiscoveryConfig::default()).unwrap().files;
        for window in files.windows(2) {
            assert!(window[0].path <= window[1].path, "files should be sorted by path");
        }
    }

    #[test]
    fn test_nonexistent_directory_returns_error() {
        let result = discover_files(
            Path::new("/nonexistent/path/that/surely/doesnt/exist"),
            &DiscoveryConfig::default(),
        );
        assert!(result.is_err(), "should error on nonexistent directory");
    }

    #[test]
    fn test_walk_error_path_is_found_through_wrappers() {
        let io = ignore::Error::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        let err = ignore::Error::WithDepth {
            depth: 2,
            err: Box::new(ignore::Error::WithPath {
                path: PathBuf::from("/p/app/locked"),
                err: Box::new(io),
            }),
        };
        assert_eq!(error_path(&err), Some(Path::new("/p/app/locked")));
        assert_eq!(error_path(&ignore::Error::UnrecognizedFileType("x".into())), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_does_not_abort_the_walk() {
        use std::os::unix::fs::PermissionsExt;

        let dir = setup_test_project();
        let locked = dir.path().join("app/locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("hidden.ts"), "export const h = 1;").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let result = discover_files(dir.path(), &DiscoveryConfig::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let discovery = result.unwrap();
        assert!(discovery
            .files
            .iter()
            .any(|f| f.path.ends_with("app/foo/foo.component.ts")));
        // Privileged runs can still read the directory; then nothing is skipped.
        for (path, err) in &discovery.skipped {
            assert!(path.starts_with(dir.path()), "skipped {} ({})", path.display(), err);
        }
    }
}
