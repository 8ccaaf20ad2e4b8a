//! Dependency information gathered for every asset and scene in a build.

use std::collections::{BTreeMap, BTreeSet};

use super::filter::FilteredReferences;
use crate::content::ids::{AssetId, ObjectId};
use crate::content::info::{AssetLoadInfo, SceneDependencyInfo};
use crate::content::usage::{GlobalUsage, UsageTagSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyData {
    pub asset_info: BTreeMap<AssetId, AssetLoadInfo>,
    pub asset_usage: BTreeMap<AssetId, UsageTagSet>,
    pub scene_info: BTreeMap<AssetId, SceneDependencyInfo>,
    pub scene_usage: BTreeMap<AssetId, UsageTagSet>,
    /// Union of the global usage of every scene
    pub global_usage: GlobalUsage,
    /// Reference lists after filtering, written by the packing step.
    /// The unfiltered lists above are never modified.
    pub filtered: BTreeMap<AssetId, FilteredReferences>,
}

impl DependencyData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Usage tags of an asset or scene.
    pub fn usage_of(&self, asset: &AssetId) -> Option<&UsageTagSet> {
        self.asset_usage.get(asset).or_else(|| self.scene_usage.get(asset))
    }

    /// Unfiltered referenced objects of an asset or scene.
    pub fn references_of(&self, asset: &AssetId) -> Option<&[ObjectId]> {
        self.asset_info
            .get(asset)
            .map(|info| info.referenced_objects.as_slice())
            .or_else(|| self.scene_info.get(asset).map(|info| info.referenced_objects.as_slice()))
    }

    /// Assets and scenes that include or reference `object`, in id order.
    pub fn users_of(&self, object: &ObjectId) -> impl Iterator<Item = AssetId> {
        let assets = self
            .asset_info
            .values()
            .filter(|info| info.included_objects.contains(object) || info.referenced_objects.contains(object))
            .map(|info| info.asset);
        let scenes =
            self.scene_info.values().filter(|info| info.referenced_objects.contains(object)).map(|info| info.scene);
        assets.chain(scenes).collect::<BTreeSet<_>>().into_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.asset_info.is_empty() && self.scene_info.is_empty()
    }
}
