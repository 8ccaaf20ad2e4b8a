//! Packing for an explicit bundle layout.
//!
//! Asset bundles get a single destination file holding every object the
//! member assets include, plus the referenced objects left after reference
//! filtering. Scene bundles get one file per scene and one `.sharedAssets`
//! file, owned by the first scene, for objects referenced by more than one
//! scene of the bundle.
//!
//! Objects are claimed in two passes: first every included object, then
//! referenced objects in bundle order. The first claimant keeps an object;
//! a later claimant instead gains a load-time dependency on the owner's file.

use std::collections::BTreeMap;
use tracing::debug;

use crate::build::context::{BuildContext, ContextObject};
use crate::build::dependency_data::DependencyData;
use crate::build::filter::{FilteredReferences, ReferenceFilter};
use crate::build::identifiers::DeterministicIdentifiers;
use crate::build::layout::{BundleKind, BundleLayout};
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::ReturnCode;
use crate::build::write_data::{internal_file_name, SceneWriteInfo, WriteData};
use crate::content::ids::{AssetId, ObjectId};
use crate::content::info::AssetLoadInfo;
use crate::content::service::ContentService;

/// Suffix of the file carrying objects shared by the scenes of a bundle.
pub const SHARED_ASSETS_SUFFIX: &str = ".sharedAssets";

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateBundlePacking;

impl BuildStep for GenerateBundlePacking {
    fn name(&self) -> &'static str {
        "generate-bundle-packing"
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::DependencyData]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let Some(layout) = context.layout() else {
            return Ok(ReturnCode::SuccessNotRun);
        };
        let services = context.services();
        let packer = ExplicitPacker {
            content: services.content.as_ref(),
            identifiers: services.identifiers.as_ref(),
        };
        let packed = packer.pack(layout, context.dependency_data()?)?;

        debug!(
            files = packed.write_data.file_to_objects.len(),
            bundles = packed.write_data.bundles().len(),
            "explicit layout packed"
        );
        context.dependency_data_mut()?.filtered = packed.filtered;
        context.set_write_data(packed.write_data);
        Ok(ReturnCode::Success)
    }
}

/// Output of explicit packing.
#[derive(Debug, Clone, Default)]
pub struct Packed {
    pub filtered: BTreeMap<AssetId, FilteredReferences>,
    pub write_data: WriteData,
}

/// An object a file wants to hold, on behalf of `owner`.
struct Claim {
    file: String,
    owner: AssetId,
    object: ObjectId,
}

/// Packs dependency data according to a bundle layout.
pub struct ExplicitPacker<'a> {
    pub content: &'a dyn ContentService,
    pub identifiers: &'a dyn DeterministicIdentifiers,
}

impl ExplicitPacker<'_> {
    pub fn pack(&self, layout: &BundleLayout, data: &DependencyData) -> Result<Packed, BuildError> {
        let kinds = layout.validate(self.content)?;

        let mut tracked: BTreeMap<AssetId, AssetLoadInfo> = BTreeMap::new();
        for (name, assets) in layout.iter() {
            if kinds.get(name) != Some(&BundleKind::Assets) {
                continue;
            }
            for asset in assets {
                let info = data.asset_info.get(asset).ok_or(BuildError::MissingDependency(*asset))?;
                tracked.insert(*asset, info.clone());
            }
        }
        let filter = ReferenceFilter::new(&tracked);

        let mut packed = Packed::default();
        let mut own_file: BTreeMap<AssetId, String> = BTreeMap::new();
        let mut included = Vec::new();
        let mut referenced = Vec::new();

        for (name, assets) in layout.iter() {
            match kinds.get(name) {
                Some(BundleKind::Scenes) => {
                    self.pack_scenes(name, assets, data, &filter, &mut packed, &mut referenced)?;
                }
                _ => {
                    let file = internal_file_name(&self.identifiers.generate_internal_file_name(name));
                    packed.write_data.add_file(&file, name);
                    for asset in assets {
                        let info = &tracked[asset];
                        let result = filter.filter_asset(info);
                        own_file.insert(*asset, file.clone());
                        packed.write_data.add_asset_file(*asset, &file);
                        for object in info.included_objects.iter().filter(|o| ReferenceFilter::is_packable(o)) {
                            included.push(Claim { file: file.clone(), owner: *asset, object: object.clone() });
                        }
                        for object in &result.objects {
                            referenced.push(Claim { file: file.clone(), owner: *asset, object: object.clone() });
                        }
                        packed.filtered.insert(*asset, result);
                    }
                }
            }
        }

        for (asset, result) in &packed.filtered {
            for dependency in &result.referenced_assets {
                if let Some(file) = own_file.get(dependency) {
                    packed.write_data.add_asset_file(*asset, file);
                }
            }
        }

        let mut owners: BTreeMap<ObjectId, String> = BTreeMap::new();
        for claim in included.into_iter().chain(referenced) {
            match owners.get(&claim.object) {
                Some(owner) => {
                    if *owner != claim.file {
                        packed.write_data.add_asset_file(claim.owner, owner);
                    }
                }
                None => {
                    owners.insert(claim.object.clone(), claim.file.clone());
                    packed.write_data.add_object(&claim.file, claim.object);
                }
            }
        }

        Ok(packed)
    }

    fn pack_scenes(
        &self,
        bundle: &str,
        scenes: &[AssetId],
        data: &DependencyData,
        filter: &ReferenceFilter<'_>,
        packed: &mut Packed,
        claims: &mut Vec<Claim>,
    ) -> Result<(), BuildError> {
        let mut files = Vec::with_capacity(scenes.len());
        let mut results = Vec::with_capacity(scenes.len());
        let mut counts: BTreeMap<ObjectId, usize> = BTreeMap::new();

        for scene in scenes {
            let info = data.scene_info.get(scene).ok_or(BuildError::MissingDependency(*scene))?;
            let path = self.content.asset_path(scene)?;
            let file = internal_file_name(&self.identifiers.generate_internal_file_name(&path));

            packed.write_data.add_file(&file, bundle);
            packed.write_data.add_asset_file(*scene, &file);
            packed.write_data.scene_files.insert(
                file.clone(),
                SceneWriteInfo { scene: *scene, processed_scene: info.processed_scene.clone() },
            );

            let result = filter.filter(scene, &[], &info.referenced_objects);
            for object in &result.objects {
                *counts.entry(object.clone()).or_default() += 1;
            }
            files.push(file);
            results.push(result);
        }

        let Some(first) = files.first() else {
            return Ok(());
        };
        let shared = format!("{}{}", first, SHARED_ASSETS_SUFFIX);
        packed.write_data.add_file(&shared, bundle);

        for ((scene, file), result) in scenes.iter().zip(&files).zip(results) {
            packed.write_data.add_asset_file(*scene, &shared);
            for object in &result.objects {
                let target = if counts[object] > 1 { &shared } else { file };
                claims.push(Claim { file: target.clone(), owner: *scene, object: object.clone() });
            }
            packed.filtered.insert(*scene, result);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::identifiers::PrefabPackedIdentifiers;
    use crate::build::steps::dependency::{CalculateAssetDependencyData, CalculateSceneDependencyData};
    use crate::build::steps::test_support::context_for;
    use crate::content::database::{AssetRecord, ContentManifest, ObjectRecord};
    use std::collections::BTreeSet;

    fn id(path: &str) -> AssetId {
        AssetId::from_path(path)
    }

    fn resolved(manifest: ContentManifest, layout: BundleLayout) -> (tempfile::TempDir, BuildContext) {
        let (temp, ctx) = context_for(manifest);
        let mut ctx = ctx.with_layout(layout);
        CalculateSceneDependencyData.run(&mut ctx).unwrap();
        CalculateAssetDependencyData.run(&mut ctx).unwrap();
        (temp, ctx)
    }

    fn props() -> ContentManifest {
        ContentManifest::new()
            .asset(AssetRecord::new("Assets/a.prefab").object(ObjectRecord::new(1).reference("Assets/t.png", 1)))
            .asset(AssetRecord::new("Assets/b.prefab").object(ObjectRecord::new(1).reference("Assets/t.png", 1)))
            .asset(AssetRecord::new("Assets/t.png").object(ObjectRecord::new(1)))
    }

    fn all_objects(write: &WriteData) -> Vec<&ObjectId> {
        write.file_to_objects.values().flatten().collect()
    }

    #[test]
    fn test_no_layout_not_run() {
        let (_temp, mut ctx) = context_for(props());
        ctx.set_dependency_data(DependencyData::new());
        assert_eq!(GenerateBundlePacking.run(&mut ctx).unwrap(), ReturnCode::SuccessNotRun);
    }

    #[test]
    fn test_untracked_reference_claimed_once() {
        let layout = BundleLayout::new()
            .with_bundle("alpha", vec![id("Assets/a.prefab")])
            .with_bundle("beta", vec![id("Assets/b.prefab")]);
        let (_temp, mut ctx) = resolved(props(), layout);
        assert_eq!(GenerateBundlePacking.run(&mut ctx).unwrap(), ReturnCode::Success);

        let write = ctx.write_data().unwrap();
        let objects = all_objects(write);
        let unique: BTreeSet<_> = objects.iter().collect();
        assert_eq!(objects.len(), unique.len());
        assert_eq!(objects.len(), 3);

        let texture = ObjectId::new(id("Assets/t.png"), 1, "Assets/t.png");
        let owner = write.file_of(&texture).unwrap().to_string();
        assert_eq!(write.file_to_bundle[&owner], "alpha");
        assert!(write.asset_to_files[&id("Assets/b.prefab")].contains(&owner));
    }

    #[test]
    fn test_tracked_reference_becomes_file_dependency() {
        let layout = BundleLayout::new()
            .with_bundle("alpha", vec![id("Assets/a.prefab")])
            .with_bundle("textures", vec![id("Assets/t.png")]);
        let (_temp, mut ctx) = resolved(props(), layout);
        GenerateBundlePacking.run(&mut ctx).unwrap();

        let write = ctx.write_data().unwrap();
        let texture = ObjectId::new(id("Assets/t.png"), 1, "Assets/t.png");
        let texture_file = write.file_of(&texture).unwrap();
        assert_eq!(write.file_to_bundle[texture_file], "textures");
        let a_files = &write.asset_to_files[&id("Assets/a.prefab")];
        assert_eq!(a_files.len(), 2);
        assert_eq!(a_files[1], texture_file);

        let filtered = &ctx.dependency_data().unwrap().filtered[&id("Assets/a.prefab")];
        assert_eq!(filtered.referenced_assets, vec![id("Assets/t.png")]);
        assert!(filtered.objects.is_empty());
    }

    #[test]
    fn test_scene_bundle_shared_assets() {
        let manifest = ContentManifest::new()
            .asset(
                AssetRecord::scene("Assets/one.scene")
                    .object(ObjectRecord::new(1).reference("Assets/shared.mat", 1).reference("Assets/one.png", 1)),
            )
            .asset(AssetRecord::scene("Assets/two.scene").object(ObjectRecord::new(1).reference("Assets/shared.mat", 1)))
            .asset(AssetRecord::new("Assets/shared.mat").object(ObjectRecord::new(1)))
            .asset(AssetRecord::new("Assets/one.png").object(ObjectRecord::new(1)));
        let layout = BundleLayout::new().with_bundle("levels", vec![id("Assets/one.scene"), id("Assets/two.scene")]);
        let (_temp, mut ctx) = resolved(manifest, layout);
        GenerateBundlePacking.run(&mut ctx).unwrap();

        let write = ctx.write_data().unwrap();
        assert_eq!(write.scene_files.len(), 2);
        assert_eq!(write.files_in_bundle("levels").len(), 3);

        let one_file = internal_file_name(&PrefabPackedIdentifiers.generate_internal_file_name("Assets/one.scene"));
        let shared = format!("{}{}", one_file, SHARED_ASSETS_SUFFIX);
        let shared_mat = ObjectId::new(id("Assets/shared.mat"), 1, "Assets/shared.mat");
        let one_png = ObjectId::new(id("Assets/one.png"), 1, "Assets/one.png");
        assert_eq!(write.file_of(&shared_mat), Some(shared.as_str()));
        assert_eq!(write.file_of(&one_png), Some(one_file.as_str()));
        assert!(write.asset_to_files[&id("Assets/two.scene")].contains(&shared));
    }

    #[test]
    fn test_mixed_layout_produces_no_write_data() {
        let manifest = props().asset(AssetRecord::scene("Assets/level.scene").object(ObjectRecord::new(1)));
        let layout = BundleLayout::new().with_bundle("mixed", vec![id("Assets/a.prefab"), id("Assets/level.scene")]);
        let (_temp, ctx) = context_for(manifest);
        let mut ctx = ctx.with_layout(layout);
        ctx.set_dependency_data(DependencyData::new());
        assert!(matches!(GenerateBundlePacking.run(&mut ctx), Err(BuildError::Layout(_))));
        assert!(ctx.write_data().is_err());
    }
}
