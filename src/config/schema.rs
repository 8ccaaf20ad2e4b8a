//! Configuration schema types for `bundle.toml`
//!
//! Defines the structure and validation rules for a bundle build project.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::build::layout::bundle_path;

/// Archive compression applied to each bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Store files uncompressed
    None,
    /// LZ4 block compression
    #[default]
    Lz4,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Lz4 => write!(f, "lz4"),
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "lz4" => Ok(Compression::Lz4),
            other => Err(format!("unknown compression '{}' (expected none or lz4)", other)),
        }
    }
}

/// Strategy used to derive serialization indices and internal file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierStrategy {
    /// Asset hash in the high bits, local id in the low bits
    #[default]
    Prefab,
    /// Full hash of asset and local id
    Unity5,
}

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Project version
    #[serde(default = "default_version")]
    pub version: String,
    /// Content database file
    #[serde(default = "default_content")]
    pub content: PathBuf,
    /// Bundle output directory
    #[serde(default = "default_out")]
    pub out: PathBuf,
    /// Scratch directory for intermediate files
    #[serde(default = "default_temp")]
    pub temp: PathBuf,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_content() -> PathBuf {
    PathBuf::from("content.json")
}

fn default_out() -> PathBuf {
    PathBuf::from("build/bundles")
}

fn default_temp() -> PathBuf {
    PathBuf::from("build/tmp")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("build/cache")
}

fn default_true() -> bool {
    true
}

/// Build behaviour section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Archive compression
    #[serde(default)]
    pub compression: Compression,
    /// Reuse results from the build cache
    #[serde(default = "default_true")]
    pub use_cache: bool,
    /// Build cache directory
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Append the bundle content hash to output file names
    #[serde(default)]
    pub append_hash: bool,
    /// Serialization identifier strategy
    #[serde(default)]
    pub identifiers: IdentifierStrategy,
    /// Look up cache entries on a thread pool
    #[serde(default)]
    pub parallel_cache_lookups: bool,
    /// Free-form target settings folded into every write cache key
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            use_cache: true,
            cache_dir: default_cache_dir(),
            append_hash: false,
            identifiers: IdentifierStrategy::default(),
            parallel_cache_lookups: false,
            settings: BTreeMap::new(),
        }
    }
}

/// Built-in resources section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuiltinConfig {
    /// Bundle that receives every referenced built-in object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
}

/// Complete bundle.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,
    /// Built-in resources handling
    #[serde(default)]
    pub builtin: BuiltinConfig,
    /// Explicit bundle layout: bundle name to asset paths.
    /// When empty, bundles are derived automatically.
    #[serde(default)]
    pub layout: BTreeMap<String, Vec<String>>,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "layout.characters")
    pub field: String,
    /// Error message
    pub message: String,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bundle.toml: '{}' {}", self.field, self.message)
    }
}

impl BundleConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        if self.project.out == self.project.temp {
            errors.push(ConfigValidationError {
                field: "project.temp".to_string(),
                message: "must differ from project.out".to_string(),
            });
        }

        if self.build.use_cache && self.build.cache_dir == self.project.out {
            errors.push(ConfigValidationError {
                field: "build.cache_dir".to_string(),
                message: "must differ from project.out".to_string(),
            });
        }

        for (name, assets) in &self.layout {
            if name.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: "layout".to_string(),
                    message: "bundle names must be non-empty".to_string(),
                });
            } else if bundle_path(name).is_err() {
                errors.push(ConfigValidationError {
                    field: format!("layout.{}", name),
                    message: "bundle name must be a relative path without '..'".to_string(),
                });
            }
            if assets.is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("layout.{}", name),
                    message: "must list at least one asset".to_string(),
                });
            }
        }

        if let Some(bundle) = &self.builtin.bundle {
            if bundle.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: "builtin.bundle".to_string(),
                    message: "must be a non-empty string".to_string(),
                });
            } else if bundle_path(bundle).is_err() {
                errors.push(ConfigValidationError {
                    field: "builtin.bundle".to_string(),
                    message: "must be a relative path without '..'".to_string(),
                });
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Whether the project declares an explicit bundle layout
    pub fn has_explicit_layout(&self) -> bool {
        !self.layout.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let toml = r#"
[project]
name = "my-game"
"#;
        let config: BundleConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.project.name, "my-game");
        assert_eq!(config.project.version, "0.1.0");
        assert_eq!(config.project.content, PathBuf::from("content.json"));
        assert_eq!(config.project.out, PathBuf::from("build/bundles"));
        assert_eq!(config.build.compression, Compression::Lz4);
        assert!(config.build.use_cache);
        assert!(!config.build.append_hash);
        assert_eq!(config.build.identifiers, IdentifierStrategy::Prefab);
        assert!(!config.has_explicit_layout());
        assert!(config.is_valid());
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[project]
name = "full-project"
version = "1.0.0"
content = "data/content.json"
out = "dist"
temp = "tmp"

[build]
compression = "none"
use_cache = false
cache_dir = ".cache"
append_hash = true
identifiers = "unity5"
parallel_cache_lookups = true

[build.settings]
target = "standalone"
quality = "high"

[builtin]
bundle = "builtin"

[layout]
characters = ["Assets/hero.prefab", "Assets/villain.prefab"]
levels = ["Assets/level1.scene"]
"#;
        let config: BundleConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.project.version, "1.0.0");
        assert_eq!(config.project.content, PathBuf::from("data/content.json"));
        assert_eq!(config.build.compression, Compression::None);
        assert!(!config.build.use_cache);
        assert!(config.build.append_hash);
        assert_eq!(config.build.identifiers, IdentifierStrategy::Unity5);
        assert!(config.build.parallel_cache_lookups);
        assert_eq!(config.build.settings.get("target").map(String::as_str), Some("standalone"));
        assert_eq!(config.builtin.bundle.as_deref(), Some("builtin"));
        assert_eq!(config.layout["characters"].len(), 2);
        assert!(config.is_valid());
    }

    #[test]
    fn test_validation_empty_name() {
        let toml = r#"
[project]
name = ""
"#;
        let config: BundleConfig = toml::from_str(toml).unwrap();
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "project.name");
    }

    #[test]
    fn test_validation_empty_bundle() {
        let toml = r#"
[project]
name = "p"

[layout]
empty = []
"#;
        let config: BundleConfig = toml::from_str(toml).unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "layout.empty"));
    }

    #[test]
    fn test_validation_escaping_bundle_names() {
        let toml = r#"
[project]
name = "p"

[builtin]
bundle = "/builtin"

[layout]
"../props" = ["Assets/a.prefab"]
"#;
        let config: BundleConfig = toml::from_str(toml).unwrap();
        let fields: Vec<_> = config.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"layout.../props".to_string()));
        assert!(fields.contains(&"builtin.bundle".to_string()));
    }

    #[test]
    fn test_validation_out_equals_temp() {
        let toml = r#"
[project]
name = "p"
out = "build"
temp = "build"
"#;
        let config: BundleConfig = toml::from_str(toml).unwrap();
        assert!(!config.is_valid());
    }

    #[test]
    fn test_validation_error_display() {
        let error = ConfigValidationError {
            field: "builtin.bundle".to_string(),
            message: "must be a non-empty string".to_string(),
        };
        assert_eq!(error.to_string(), "bundle.toml: 'builtin.bundle' must be a non-empty string");
    }

    #[test]
    fn test_unknown_compression_rejected() {
        let toml = r#"
[project]
name = "p"

[build]
compression = "zip"
"#;
        assert!(toml::from_str::<BundleConfig>(toml).is_err());
        assert_eq!("LZ4".parse::<Compression>(), Ok(Compression::Lz4));
        assert!("zip".parse::<Compression>().is_err());
    }
}
