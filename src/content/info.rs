//! Per-asset and per-scene dependency records.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ids::{AssetId, ObjectId};
use super::usage::GlobalUsage;

/// Dependency record of a single non-scene asset.
///
/// `included_objects` are the objects the asset itself contains and
/// `referenced_objects` the transitive set of objects they reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLoadInfo {
    pub asset: AssetId,
    pub included_objects: Vec<ObjectId>,
    pub referenced_objects: Vec<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl AssetLoadInfo {
    pub fn new(asset: AssetId) -> Self {
        Self {
            asset,
            included_objects: Vec::new(),
            referenced_objects: Vec::new(),
            address: None,
        }
    }

    /// Whether any referenced object belongs to `asset`.
    pub fn references_asset(&self, asset: &AssetId) -> bool {
        self.referenced_objects.iter().any(|object| object.asset == *asset)
    }
}

/// Dependency record of a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDependencyInfo {
    pub scene: AssetId,
    /// Handle of the processed scene produced by the content service.
    pub processed_scene: PathBuf,
    pub referenced_objects: Vec<ObjectId>,
    #[serde(default)]
    pub global_usage: GlobalUsage,
}

impl SceneDependencyInfo {
    pub fn new(scene: AssetId, processed_scene: impl Into<PathBuf>) -> Self {
        Self {
            scene,
            processed_scene: processed_scene.into(),
            referenced_objects: Vec::new(),
            global_usage: GlobalUsage::empty(),
        }
    }
}
