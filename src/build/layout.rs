//! Explicit bundle layouts.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::content::ids::{AssetId, ObjectId};
use crate::content::service::ContentService;

/// What a bundle holds. A bundle never mixes both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Assets,
    Scenes,
}

/// Problem found while validating a layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("bundle name must not be empty")]
    EmptyName,
    #[error("bundle name '{bundle}' must be a relative path inside the output folder")]
    UnsafeName { bundle: String },
    #[error("bundle '{bundle}' lists no assets")]
    EmptyBundle { bundle: String },
    #[error("bundle '{bundle}' mixes scenes and assets")]
    MixedContent { bundle: String },
    #[error("asset {asset} is listed in both '{first}' and '{second}'")]
    DuplicateAsset { asset: AssetId, first: String, second: String },
}

/// Bundle name to ordered asset list, as requested by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleLayout {
    bundles: BTreeMap<String, Vec<AssetId>>,
}

impl BundleLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bundle, replacing any bundle of the same name.
    pub fn with_bundle(mut self, name: impl Into<String>, assets: Vec<AssetId>) -> Self {
        self.add_bundle(name, assets);
        self
    }

    pub fn add_bundle(&mut self, name: impl Into<String>, assets: Vec<AssetId>) {
        self.bundles.insert(name.into(), assets);
    }

    pub fn get(&self, name: &str) -> Option<&[AssetId]> {
        self.bundles.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AssetId])> {
        self.bundles.iter().map(|(name, assets)| (name.as_str(), assets.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Check that every bundle is non-empty, homogeneous, and that no asset
    /// appears twice. Returns the kind of each bundle.
    pub fn validate(&self, content: &dyn ContentService) -> Result<BTreeMap<String, BundleKind>, LayoutError> {
        let mut owners: BTreeMap<AssetId, &str> = BTreeMap::new();
        let mut kinds = BTreeMap::new();

        for (name, assets) in &self.bundles {
            if name.trim().is_empty() {
                return Err(LayoutError::EmptyName);
            }
            bundle_path(name)?;
            let Some(first) = assets.first() else {
                return Err(LayoutError::EmptyBundle { bundle: name.clone() });
            };

            let scenes = content.is_scene(first);
            for asset in assets {
                if content.is_scene(asset) != scenes {
                    return Err(LayoutError::MixedContent { bundle: name.clone() });
                }
                if let Some(previous) = owners.insert(*asset, name) {
                    return Err(LayoutError::DuplicateAsset {
                        asset: *asset,
                        first: previous.to_string(),
                        second: name.clone(),
                    });
                }
            }

            let kind = if scenes { BundleKind::Scenes } else { BundleKind::Assets };
            kinds.insert(name.clone(), kind);
        }

        Ok(kinds)
    }
}

/// Relative output path for a bundle name. Absolute names, drive prefixes and
/// `..` components are rejected; `.` components are dropped.
pub fn bundle_path(name: &str) -> Result<PathBuf, LayoutError> {
    let unsafe_name = || LayoutError::UnsafeName { bundle: name.to_string() };
    let mut path = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return Err(unsafe_name()),
        }
    }
    if path.as_os_str().is_empty() {
        return Err(unsafe_name());
    }
    Ok(path)
}

/// Objects explicitly placed into bundles, overriding automatic placement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectLayout {
    bundles: BTreeMap<String, Vec<ObjectId>>,
}

impl ObjectLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, bundle: &str, object: ObjectId) {
        let objects = self.bundles.entry(bundle.to_string()).or_default();
        if !objects.contains(&object) {
            objects.push(object);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ObjectId])> {
        self.bundles.iter().map(|(name, objects)| (name.as_str(), objects.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.values().all(Vec::is_empty)
    }
}
