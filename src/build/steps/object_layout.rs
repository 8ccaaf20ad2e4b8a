//! Explicit per-object placement applied on top of packing.

use tracing::debug;

use crate::build::context::{BuildContext, ContextObject};
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::ReturnCode;
use crate::build::write_data::internal_file_name;

/// Moves every object listed in the object layout into its bundle's file,
/// creating the file on demand. Assets and scenes using a moved object gain a
/// load-time dependency on that file.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateBundleObjectLayout;

impl BuildStep for UpdateBundleObjectLayout {
    fn name(&self) -> &'static str {
        "update-bundle-object-layout"
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::DependencyData, ContextObject::WriteData]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let Some(layout) = context.object_layout().filter(|layout| !layout.is_empty()).cloned() else {
            return Ok(ReturnCode::SuccessNotRun);
        };
        let identifiers = context.services().identifiers.clone();
        let mut write = context.take_write_data()?;
        let data = context.dependency_data()?;

        for (bundle, objects) in layout.iter() {
            let file = internal_file_name(&identifiers.generate_internal_file_name(bundle));
            write.add_file(&file, bundle);
            for object in objects {
                write.remove_object(object);
                write.add_object(&file, object.clone());
                for user in data.users_of(object) {
                    write.add_asset_file(user, &file);
                }
            }
            debug!(bundle = %bundle, objects = objects.len(), "object layout applied");
        }

        context.set_write_data(write);
        Ok(ReturnCode::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::layout::ObjectLayout;
    use crate::build::steps::auto_packing::AutoBundlePacking;
    use crate::build::steps::builtin::CreateBuiltInResourcesBundle;
    use crate::build::steps::dependency::CalculateAssetDependencyData;
    use crate::build::steps::test_support::context_for;
    use crate::content::database::{AssetRecord, ContentManifest, ObjectRecord};
    use crate::content::ids::{AssetId, ObjectId};

    fn manifest() -> ContentManifest {
        ContentManifest::new()
            .asset(
                AssetRecord::new("Assets/x.prefab").object(
                    ObjectRecord::new(1)
                        .reference("builtin/default_resources", 10)
                        .reference("Assets/t.png", 1),
                ),
            )
            .asset(AssetRecord::new("Assets/t.png").object(ObjectRecord::new(1)))
            .builtin("builtin/default_resources", ObjectRecord::new(10))
    }

    #[test]
    fn test_no_object_layout_not_run() {
        let (_temp, mut ctx) = context_for(manifest());
        CalculateAssetDependencyData.run(&mut ctx).unwrap();
        AutoBundlePacking.run(&mut ctx).unwrap();
        assert_eq!(UpdateBundleObjectLayout.run(&mut ctx).unwrap(), ReturnCode::SuccessNotRun);
    }

    #[test]
    fn test_builtin_relocated_into_bundle() {
        let (_temp, ctx) = context_for(manifest());
        let mut ctx = ctx.with_builtin_bundle("builtin");
        CalculateAssetDependencyData.run(&mut ctx).unwrap();
        CreateBuiltInResourcesBundle.run(&mut ctx).unwrap();
        AutoBundlePacking.run(&mut ctx).unwrap();
        assert_eq!(UpdateBundleObjectLayout.run(&mut ctx).unwrap(), ReturnCode::Success);

        let write = ctx.write_data().unwrap();
        let builtin = ObjectId::builtin("builtin/default_resources", 10);
        let file = write.file_of(&builtin).unwrap();
        assert_eq!(write.file_to_bundle[file], "builtin");
        assert!(write.asset_to_files[&AssetId::from_path("Assets/x.prefab")].iter().any(|f| f == file));
    }

    #[test]
    fn test_moved_object_leaves_previous_file() {
        let (_temp, mut ctx) = context_for(manifest());
        CalculateAssetDependencyData.run(&mut ctx).unwrap();
        AutoBundlePacking.run(&mut ctx).unwrap();

        let texture = ObjectId::new(AssetId::from_path("Assets/t.png"), 1, "Assets/t.png");
        let mut layout = ObjectLayout::new();
        layout.add_object("textures", texture.clone());
        ctx.set_object_layout(layout);
        UpdateBundleObjectLayout.run(&mut ctx).unwrap();

        let write = ctx.write_data().unwrap();
        let holders = write.file_to_objects.values().filter(|objects| objects.contains(&texture)).count();
        assert_eq!(holders, 1);
        assert_eq!(write.file_to_bundle[write.file_of(&texture).unwrap()], "textures");
    }
}
