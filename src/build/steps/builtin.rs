//! Relocation of built-in resources into a dedicated bundle.

use std::collections::BTreeSet;
use tracing::info;

use crate::build::context::{BuildContext, ContextObject};
use crate::build::layout::ObjectLayout;
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::ReturnCode;
use crate::content::ids::ObjectId;

/// When a built-in bundle is configured, places every built-in object that
/// any asset or scene references into the object layout under that bundle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateBuiltInResourcesBundle;

impl BuildStep for CreateBuiltInResourcesBundle {
    fn name(&self) -> &'static str {
        "create-builtin-resources-bundle"
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::DependencyData]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let Some(bundle) = context.builtin_bundle().map(str::to_string) else {
            return Ok(ReturnCode::SuccessNotRun);
        };

        let data = context.dependency_data()?;
        let builtin: BTreeSet<&ObjectId> = data
            .asset_info
            .values()
            .flat_map(|info| info.referenced_objects.iter())
            .chain(data.scene_info.values().flat_map(|info| info.referenced_objects.iter()))
            .filter(|object| object.is_builtin())
            .collect();
        if builtin.is_empty() {
            return Ok(ReturnCode::SuccessNotRun);
        }

        let mut layout = context.object_layout().cloned().unwrap_or_else(ObjectLayout::new);
        for object in &builtin {
            layout.add_object(&bundle, (*object).clone());
        }
        info!(bundle = %bundle, objects = builtin.len(), "relocating built-in resources");
        context.set_object_layout(layout);
        Ok(ReturnCode::Success)
    }
}
