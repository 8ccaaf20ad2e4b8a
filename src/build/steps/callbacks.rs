//! User hooks run between the major phases of a build.

use std::fmt;

use crate::build::context::{BuildContext, BuildParameters, ContextObject};
use crate::build::dependency_data::DependencyData;
use crate::build::pipeline::{BuildError, BuildStep};
use crate::build::result::{BuildResults, ReturnCode};
use crate::build::write_data::WriteData;

type DependencyHook = Box<dyn Fn(&BuildParameters, &DependencyData) -> ReturnCode + Send + Sync>;
type PackingHook = Box<dyn Fn(&BuildParameters, &DependencyData, &WriteData) -> ReturnCode + Send + Sync>;
type WritingHook =
    Box<dyn Fn(&BuildParameters, &DependencyData, &WriteData, &BuildResults) -> ReturnCode + Send + Sync>;

/// Optional callbacks. A callback returning a non-success code stops the
/// build with that code.
#[derive(Default)]
pub struct BuildCallbacks {
    post_dependency: Option<DependencyHook>,
    post_packing: Option<PackingHook>,
    post_writing: Option<WritingHook>,
}

impl fmt::Debug for BuildCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildCallbacks")
            .field("post_dependency", &self.post_dependency.is_some())
            .field("post_packing", &self.post_packing.is_some())
            .field("post_writing", &self.post_writing.is_some())
            .finish()
    }
}

impl BuildCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_post_dependency<F>(mut self, hook: F) -> Self
    where
        F: Fn(&BuildParameters, &DependencyData) -> ReturnCode + Send + Sync + 'static,
    {
        self.post_dependency = Some(Box::new(hook));
        self
    }

    pub fn with_post_packing<F>(mut self, hook: F) -> Self
    where
        F: Fn(&BuildParameters, &DependencyData, &WriteData) -> ReturnCode + Send + Sync + 'static,
    {
        self.post_packing = Some(Box::new(hook));
        self
    }

    pub fn with_post_writing<F>(mut self, hook: F) -> Self
    where
        F: Fn(&BuildParameters, &DependencyData, &WriteData, &BuildResults) -> ReturnCode + Send + Sync + 'static,
    {
        self.post_writing = Some(Box::new(hook));
        self
    }
}

fn not_run() -> Result<ReturnCode, BuildError> {
    Ok(ReturnCode::SuccessNotRun)
}

/// Runs the post-dependency callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostDependencyCallback;

impl BuildStep for PostDependencyCallback {
    fn name(&self) -> &'static str {
        "post-dependency-callback"
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::DependencyData]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let Some(callbacks) = context.callbacks() else {
            return not_run();
        };
        match &callbacks.post_dependency {
            Some(hook) => Ok(hook(context.parameters(), context.dependency_data()?)),
            None => not_run(),
        }
    }
}

/// Runs the post-packing callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostPackingCallback;

impl BuildStep for PostPackingCallback {
    fn name(&self) -> &'static str {
        "post-packing-callback"
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::DependencyData, ContextObject::WriteData]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let Some(callbacks) = context.callbacks() else {
            return not_run();
        };
        match &callbacks.post_packing {
            Some(hook) => Ok(hook(context.parameters(), context.dependency_data()?, context.write_data()?)),
            None => not_run(),
        }
    }
}

/// Runs the post-writing callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostWritingCallback;

impl BuildStep for PostWritingCallback {
    fn name(&self) -> &'static str {
        "post-writing-callback"
    }

    fn requires(&self) -> &'static [ContextObject] {
        &[ContextObject::DependencyData, ContextObject::WriteData, ContextObject::Results]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError> {
        let Some(callbacks) = context.callbacks() else {
            return not_run();
        };
        match &callbacks.post_writing {
            Some(hook) => Ok(hook(
                context.parameters(),
                context.dependency_data()?,
                context.write_data()?,
                context.results()?,
            )),
            None => not_run(),
        }
    }
}
