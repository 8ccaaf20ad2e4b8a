//! Reference filtering.
//!
//! Decides which referenced objects an asset carries in its own file and
//! which it reaches by depending on another tracked asset. Applied to one
//! asset at a time:
//!
//! 1. Built-in objects and objects the asset itself includes are dropped.
//! 2. An object belonging to another tracked asset is dropped and that asset
//!    is recorded as a dependency.
//! 3. For each recorded dependency `R` that does not reference the asset
//!    back, every object `R` references is dropped: loading `R` brings them.
//! 4. If `R` does reference the asset back, only the side with the greater
//!    [`AssetId`] drops `R`'s objects, so exactly one side of the cycle keeps
//!    the shared objects.
//!
//! Step 3 and 4 compare against `R`'s unfiltered reference list so the
//! result does not depend on the order assets are processed in.

use std::collections::{BTreeMap, BTreeSet};

use crate::content::ids::{AssetId, ObjectId};
use crate::content::info::AssetLoadInfo;

/// Result of filtering one asset's references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredReferences {
    /// Objects the asset must carry, in the original reference order
    pub objects: Vec<ObjectId>,
    /// Tracked assets the asset depends on, sorted
    pub referenced_assets: Vec<AssetId>,
}

/// Filter over the dependency records of every tracked asset.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceFilter<'a> {
    tracked: &'a BTreeMap<AssetId, AssetLoadInfo>,
}

impl<'a> ReferenceFilter<'a> {
    pub fn new(tracked: &'a BTreeMap<AssetId, AssetLoadInfo>) -> Self {
        Self { tracked }
    }

    /// Whether an object may be placed in a bundle at all.
    pub fn is_packable(object: &ObjectId) -> bool {
        !object.is_builtin()
    }

    /// Whether `asset` is one of the tracked assets.
    pub fn is_tracked(&self, asset: &AssetId) -> bool {
        self.tracked.contains_key(asset)
    }

    /// Filter the references of `owner`.
    pub fn filter(&self, owner: &AssetId, included: &[ObjectId], referenced: &[ObjectId]) -> FilteredReferences {
        let own: BTreeSet<&ObjectId> = included.iter().collect();
        let mut referenced_assets = BTreeSet::new();
        let mut kept: Vec<&ObjectId> = Vec::new();
        let mut seen: BTreeSet<&ObjectId> = BTreeSet::new();

        for object in referenced {
            if !Self::is_packable(object) || own.contains(object) || !seen.insert(object) {
                continue;
            }
            if object.asset != *owner && self.is_tracked(&object.asset) {
                referenced_assets.insert(object.asset);
                continue;
            }
            kept.push(object);
        }

        for dependency in &referenced_assets {
            let Some(info) = self.tracked.get(dependency) else {
                continue;
            };
            let cycle = info.references_asset(owner);
            if !cycle || owner > dependency {
                let carried: BTreeSet<&ObjectId> = info.referenced_objects.iter().collect();
                kept.retain(|object| !carried.contains(object));
            }
        }

        FilteredReferences {
            objects: kept.into_iter().cloned().collect(),
            referenced_assets: referenced_assets.into_iter().collect(),
        }
    }

    /// Filter an asset's own dependency record.
    pub fn filter_asset(&self, info: &AssetLoadInfo) -> FilteredReferences {
        self.filter(&info.asset, &info.included_objects, &info.referenced_objects)
    }
}
