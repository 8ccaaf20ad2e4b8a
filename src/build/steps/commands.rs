//! Write commands and the maps the serializer needs.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::build::context::{BuildContext, ContextObject};
use crate::build::dependency_data::DependencyData;
use crate::build::identifiers::DeterministicIdentifiers;
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::ReturnCode;
use crate::build::write_data::{file_name_of, ReferenceMap, SerializationInfo, WriteCommand, WriteData};
use crate::content::ids::ObjectId;
use crate::content::usage::UsageTagSet;

/// Build one command per destination file.
pub fn generate_commands(
    write: &WriteData,
    identifiers: &dyn DeterministicIdentifiers,
) -> Result<Vec<WriteCommand>, BuildError> {
    let mut commands = Vec::with_capacity(write.file_to_objects.len());
    for (file, objects) in &write.file_to_objects {
        let mut indices: BTreeMap<i64, &ObjectId> = BTreeMap::new();
        for object in objects {
            let index = identifiers.serialization_index_from_object(object);
            if let Some(previous) = indices.insert(index, object) {
                return Err(BuildError::IndexCollision {
                    file: file.clone(),
                    index,
                    first: previous.to_string(),
                    second: object.to_string(),
                });
            }
        }

        commands.push(WriteCommand {
            internal_name: file.clone(),
            file_name: file_name_of(file).to_string(),
            bundle_name: write.file_to_bundle.get(file).cloned().unwrap_or_default(),
            serialize_objects: indices
                .into_iter()
                .map(|(serialization_index, object)| SerializationInfo { object: object.clone(), serialization_index })
                .collect(),
            scene: write.scene_files.get(file).cloned(),
        });
    }
    Ok(commands)
}

/// Emits a [`WriteCommand`] for every destination file, objects sorted by
/// serialization index. Two objects of one file sharing an index is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateBundleCommands;

impl BuildStep for GenerateBundleCommands {
    fn name(&self) -> &'static str {
        "generate-bundle-commands"
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::WriteData]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let identifiers = context.services().identifiers.clone();
        let commands = generate_commands(context.write_data()?, identifiers.as_ref())?;
        debug!(commands = commands.len(), "write commands generated");

        let mut write = context.take_write_data()?;
        write.write_commands = commands;
        context.set_write_data(write);
        Ok(ReturnCode::Success)
    }
}

/// Builds the reference map, per-file usage, and scene preload lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateBundleMaps;

impl BuildStep for GenerateBundleMaps {
    fn name(&self) -> &'static str {
        "generate-bundle-maps"
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::DependencyData, ContextObject::WriteData]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let mut write = context.take_write_data()?;
        let data = context.dependency_data()?;

        write.reference_map = reference_map(&write.write_commands);
        write.file_to_usage = file_usage(&write, data);
        write.preload_info = preload_info(&write, data);
        debug!(
            objects = write.reference_map.len(),
            preload_files = write.preload_info.len(),
            "bundle maps generated"
        );

        context.set_write_data(write);
        Ok(ReturnCode::Success)
    }
}

fn reference_map(commands: &[WriteCommand]) -> ReferenceMap {
    let mut map = ReferenceMap::default();
    for command in commands {
        map.add_mappings(command);
    }
    map
}

/// Union of the usage of every asset or scene that contributed objects to a
/// file. A scene also contributes to its own scene file.
fn file_usage(write: &WriteData, data: &DependencyData) -> BTreeMap<String, UsageTagSet> {
    let mut usage: BTreeMap<String, UsageTagSet> =
        write.file_to_objects.keys().map(|file| (file.clone(), UsageTagSet::new())).collect();

    for info in data.asset_info.values() {
        let objects = info.included_objects.iter().chain(&info.referenced_objects);
        contribute(&mut usage, write, data.usage_of(&info.asset), objects);
    }
    for info in data.scene_info.values() {
        contribute(&mut usage, write, data.usage_of(&info.scene), info.referenced_objects.iter());
    }
    for (file, scene) in &write.scene_files {
        if let Some(tags) = data.usage_of(&scene.scene) {
            usage.entry(file.clone()).or_default().union_with(tags);
        }
    }
    usage
}

fn contribute<'a>(
    usage: &mut BTreeMap<String, UsageTagSet>,
    write: &WriteData,
    tags: Option<&UsageTagSet>,
    objects: impl Iterator<Item = &'a ObjectId>,
) {
    let Some(tags) = tags else {
        return;
    };
    let files: BTreeSet<&str> = objects
        .filter_map(|object| write.reference_map.get(object))
        .map(|location| location.file.as_str())
        .collect();
    for file in files {
        usage.entry(file.to_string()).or_default().union_with(tags);
    }
}

/// Objects each scene file references but does not hold itself.
fn preload_info(write: &WriteData, data: &DependencyData) -> BTreeMap<String, Vec<ObjectId>> {
    let mut preload = BTreeMap::new();
    for (file, scene) in &write.scene_files {
        let Some(info) = data.scene_info.get(&scene.scene) else {
            continue;
        };
        let own: BTreeSet<&ObjectId> = write.file_to_objects.get(file).into_iter().flatten().collect();
        let objects: Vec<ObjectId> = info
            .referenced_objects
            .iter()
            .filter(|object| !own.contains(object))
            .cloned()
            .collect();
        preload.insert(file.clone(), objects);
    }
    preload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::identifiers::{PrefabPackedIdentifiers, Unity5PackedIdentifiers};
    use crate::build::layout::BundleLayout;
    use crate::build::steps::auto_packing::AutoBundlePacking;
    use crate::build::steps::dependency::{CalculateAssetDependencyData, CalculateSceneDependencyData};
    use crate::build::steps::packing::GenerateBundlePacking;
    use crate::build::steps::test_support::context_for;
    use crate::content::database::{AssetRecord, ContentManifest, ObjectRecord};
    use crate::content::ids::AssetId;

    fn manifest() -> ContentManifest {
        ContentManifest::new()
            .asset(
                AssetRecord::new("Assets/hero.prefab")
                    .object(ObjectRecord::new(1).reference("Assets/hero.mat", 1).usage("skinned"))
                    .object(ObjectRecord::new(2)),
            )
            .asset(AssetRecord::new("Assets/hero.mat").object(ObjectRecord::new(1).usage("lit")))
            .asset(
                AssetRecord::scene("Assets/level.scene")
                    .object(ObjectRecord::new(1).reference("Assets/hero.prefab", 1)),
            )
    }

    fn packed_context() -> (tempfile::TempDir, BuildContext) {
        let (temp, mut ctx) = context_for(manifest());
        CalculateSceneDependencyData.run(&mut ctx).unwrap();
        CalculateAssetDependencyData.run(&mut ctx).unwrap();
        AutoBundlePacking.run(&mut ctx).unwrap();
        (temp, ctx)
    }

    #[test]
    fn test_commands_sorted_by_index() {
        let (_temp, mut ctx) = packed_context();
        assert_eq!(GenerateBundleCommands.run(&mut ctx).unwrap(), ReturnCode::Success);

        let write = ctx.write_data().unwrap();
        assert_eq!(write.write_commands.len(), write.file_to_objects.len());
        for command in &write.write_commands {
            let indices: Vec<i64> = command.serialize_objects.iter().map(|info| info.serialization_index).collect();
            let mut sorted = indices.clone();
            sorted.sort_unstable();
            assert_eq!(indices, sorted);
            assert!(command.internal_name.ends_with(&command.file_name));
        }
        assert_eq!(write.write_commands.iter().filter(|command| command.scene.is_some()).count(), 1);
    }

    #[test]
    fn test_commands_deterministic() {
        let (_a, mut first) = packed_context();
        let (_b, mut second) = packed_context();
        GenerateBundleCommands.run(&mut first).unwrap();
        GenerateBundleCommands.run(&mut second).unwrap();
        let strip = |ctx: &BuildContext| {
            ctx.write_data()
                .unwrap()
                .write_commands
                .iter()
                .map(|c| (c.internal_name.clone(), c.serialize_objects.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&first), strip(&second));
    }

    #[test]
    fn test_index_collision_is_error() {
        let asset = AssetId::from_path("Assets/wide");
        let mut write = WriteData::new();
        write.add_file("archive:/f/f", "b");
        write.add_object("archive:/f/f", ObjectId::new(asset, 1, "Assets/wide"));
        write.add_object("archive:/f/f", ObjectId::new(asset, 1 + (1 << 32), "Assets/wide"));

        let result = generate_commands(&write, &PrefabPackedIdentifiers);
        assert!(matches!(result, Err(BuildError::IndexCollision { ref file, .. }) if file == "archive:/f/f"));
        assert!(generate_commands(&write, &Unity5PackedIdentifiers).is_ok());
    }

    #[test]
    fn test_maps() {
        let (_temp, mut ctx) = packed_context();
        GenerateBundleCommands.run(&mut ctx).unwrap();
        assert_eq!(GenerateBundleMaps.run(&mut ctx).unwrap(), ReturnCode::Success);

        let write = ctx.write_data().unwrap();
        let mat = ObjectId::new(AssetId::from_path("Assets/hero.mat"), 1, "Assets/hero.mat");
        let location = write.reference_map.get(&mat).unwrap();
        assert_eq!(Some(location.file.as_str()), write.file_of(&mat));

        // hero.mat is used by the prefab, the scene and itself, so its file
        // carries the prefab's tags as well as its own.
        let tags = &write.file_to_usage[&location.file];
        assert!(tags.contains("lit"));
        assert!(tags.contains("skinned"));

        let (scene_file, _) = write.scene_files.iter().next().unwrap();
        let preload = &write.preload_info[scene_file];
        assert!(preload.contains(&mat));
    }

    #[test]
    fn test_scene_preload_skips_own_objects() {
        let manifest = ContentManifest::new()
            .asset(AssetRecord::scene("Assets/a.scene").object(ObjectRecord::new(1).reference("Assets/only_a.png", 1)))
            .asset(AssetRecord::new("Assets/only_a.png").object(ObjectRecord::new(1)));
        let (_temp, ctx) = context_for(manifest);
        let layout = BundleLayout::new().with_bundle("levels", vec![AssetId::from_path("Assets/a.scene")]);
        let mut ctx = ctx.with_layout(layout);
        CalculateSceneDependencyData.run(&mut ctx).unwrap();
        CalculateAssetDependencyData.run(&mut ctx).unwrap();
        GenerateBundlePacking.run(&mut ctx).unwrap();
        GenerateBundleCommands.run(&mut ctx).unwrap();
        GenerateBundleMaps.run(&mut ctx).unwrap();

        let write = ctx.write_data().unwrap();
        let (scene_file, _) = write.scene_files.iter().next().unwrap();
        assert!(write.preload_info[scene_file].is_empty());
    }
}
