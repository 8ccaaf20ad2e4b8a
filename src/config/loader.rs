//! Configuration loading and discovery for `bundle.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::{BuildConfig, BuiltinConfig, BundleConfig, Compression, ProjectConfig};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file.
pub const CONFIG_FILENAME: &str = "bundle.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse bundle.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override output directory
    pub out: Option<PathBuf>,
    /// Override content database path
    pub content: Option<PathBuf>,
    /// Override temp directory
    pub temp: Option<PathBuf>,
    /// Override compression
    pub compression: Option<Compression>,
    /// Force the cache on or off
    pub use_cache: Option<bool>,
    /// Override hash suffixing
    pub append_hash: Option<bool>,
}

/// Find bundle.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for bundle.toml
/// 2. Check XDG_CONFIG_HOME/bundlesmith/bundle.toml (or ~/.config/bundlesmith/bundle.toml)
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

/// Find bundle.toml in the XDG config directory.
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("bundlesmith").join(CONFIG_FILENAME);
    if config_path.exists() {
        Some(config_path)
    } else {
        None
    }
}

/// Find bundle.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a bundle.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns a default
/// configuration.
///
/// # Example
/// ```ignore
/// let config = load_config(Some(Path::new("my-game/bundle.toml")))?;
/// ```
pub fn load_config(path: Option<&Path>) -> Result<BundleConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Load configuration from a specific file path.
fn load_config_file(path: &Path) -> Result<BundleConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: BundleConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Create a default configuration when no bundle.toml is found.
///
/// The project name is taken from the current directory name.
pub fn default_config() -> BundleConfig {
    let project_name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unnamed".to_string());

    BundleConfig {
        project: ProjectConfig {
            name: project_name,
            version: "0.1.0".to_string(),
            content: PathBuf::from("content.json"),
            out: PathBuf::from("build/bundles"),
            temp: PathBuf::from("build/tmp"),
        },
        build: BuildConfig::default(),
        builtin: BuiltinConfig::default(),
        layout: BTreeMap::new(),
    }
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut BundleConfig, overrides: &CliOverrides) {
    if let Some(ref out) = overrides.out {
        config.project.out = out.clone();
    }

    if let Some(ref content) = overrides.content {
        config.project.content = content.clone();
    }

    if let Some(ref temp) = overrides.temp {
        config.project.temp = temp.clone();
    }

    if let Some(compression) = overrides.compression {
        config.build.compression = compression;
    }

    if let Some(use_cache) = overrides.use_cache {
        config.build.use_cache = use_cache;
    }

    if let Some(append_hash) = overrides.append_hash {
        config.build.append_hash = append_hash;
    }
}

/// Get the project root directory from a config file path.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}

/// Resolve a path relative to the project root.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project root.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}
