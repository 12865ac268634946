use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryConfig;

/// Project configuration, read from `.promote/config.toml` or `promote.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromoteConfig {
    pub discovery: DiscoveryConfig,
    pub barrel: BarrelConfig,
    pub apply: ApplyConfig,
    pub spec: SpecConfig,
}

/// Which files count as directory barrels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BarrelConfig {
    /// File stems that identify a barrel (`index` matches `index.ts`, `index.js`, ...).
    pub names: Vec<String>,
}

impl Default for BarrelConfig {
    fn default() -> Self {
        BarrelConfig {
            names: vec!["index".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    /// Worker threads for scanning and applying. `None` uses rayon's default.
    pub jobs: Option<usize>,
    /// Plan only; never write.
    pub dry_run: bool,
}

/// Companion test files that travel with a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecConfig {
    /// Infixes before the extension: `spec` matches `foo.component.spec.ts`.
    pub suffixes: Vec<String>,
}

impl Default for SpecConfig {
    fn default() -> Self {
        SpecConfig {
            suffixes: vec!["spec".to_string()],
        }
    }
}

/// Default config file names, searched in order.
const CONFIG_FILENAMES: &[&str] = &[".promote/config.toml", "promote.toml"];

/// Find the config file for a project.
///
/// If `config_override` is provided, use that path directly.
/// Otherwise, search for config files in the project root.
pub fn find_config_path(project_root: &Path, config_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(override_path) = config_override {
        if override_path.exists() {
            return Some(override_path.to_path_buf());
        }
        return None;
    }

    CONFIG_FILENAMES
        .iter()
        .map(|name| project_root.join(name))
        .find(|path| path.exists())
}

pub fn load_config(path: &Path) -> Result<PromoteConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_config(toml_str: &str) -> Result<PromoteConfig> {
    let config: PromoteConfig = toml::from_str(toml_str)?;
    Ok(config)
}

/// Load the project's config, falling back to defaults when none exists.
///
/// An explicit override that does not exist is an error.
pub fn load_project_config(
    project_root: &Path,
    config_override: Option<&Path>,
) -> Result<PromoteConfig> {
    match find_config_path(project_root, config_override) {
        Some(path) => load_config(&path),
        None => match config_override {
            Some(missing) => anyhow::bail!("config file not found: {}", missing.display()),
            None => Ok(PromoteConfig::default()),
        },
    }
}
