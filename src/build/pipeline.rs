//! Build pipeline orchestration.
//!
//! A pipeline is an ordered list of [`BuildStep`]s run against one
//! [`BuildContext`]. The runner stops at the first step whose return code is
//! not a success code; a step returning `Err` is recorded as
//! [`ReturnCode::Error`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use super::cache::{BuildCache, CacheError, CacheStats};
use super::context::{BuildContent, BuildContext, BuildParameters, BuildServices, ContextObject};
use super::layout::{BundleLayout, LayoutError};
use super::manifest::{BuildManifest, ManifestError};
use super::progress::{BuildProgress, ProgressEvent};
use super::result::{BuildResults, PipelineReport, ReturnCode, StepResult};
use super::steps::callbacks::BuildCallbacks;
use super::steps::default_steps;
use crate::config::{resolve_path, BundleConfig, ConfigError};
use crate::content::database::ContentDatabase;
use crate::content::ids::{AssetId, Hash128, HashBuilder};
use crate::content::service::{ContentError, ContentService};

/// Version of the on-disk cache layout. Bumping it invalidates every record.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Error during build execution.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("missing context object: {0}")]
    MissingContext(ContextObject),
    #[error("content error: {0}")]
    Content(#[from] ContentError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("invalid layout: {0}")]
    Layout(#[from] LayoutError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("no dependency data for asset {0}")]
    MissingDependency(AssetId),
    #[error("serialization index {index} is used by both {first} and {second} in '{file}'")]
    IndexCollision { file: String, index: i64, first: String, second: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("build error: {0}")]
    Build(String),
}

/// A single stage of the pipeline.
pub trait BuildStep: Send + Sync {
    /// Name used in reports and logs.
    fn name(&self) -> &'static str;

    /// Version folded into this step's cache keys.
    fn version(&self) -> u32 {
        1
    }

    /// Optional context objects that must be present before running.
    fn requires(&self) -> &'static [ContextObject] {
        &[]
    }

    fn run(&self, context: &mut BuildContext) -> Result<ReturnCode, BuildError>;
}

/// Ordered list of steps.
#[derive(Default)]
pub struct BuildPipeline {
    steps: Vec<Box<dyn BuildStep>>,
}

impl BuildPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard bundle build.
    pub fn default_pipeline() -> Self {
        Self { steps: default_steps() }
    }

    /// Append a step.
    pub fn with_step<S: BuildStep + 'static>(mut self, step: S) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order against `context`.
    pub fn run(&self, context: &mut BuildContext) -> PipelineReport {
        let start = Instant::now();
        let progress = context.progress().clone();
        let mut report = PipelineReport::new();

        info!(steps = self.steps.len(), "build started");
        progress.report(ProgressEvent::BuildStarted { total_steps: self.steps.len() });

        for step in &self.steps {
            let name = step.name();
            if progress.is_canceled() {
                report.add_result(StepResult::new(name, ReturnCode::Canceled, Default::default()));
                report.code = ReturnCode::Canceled;
                break;
            }

            progress.report(ProgressEvent::StepStarted { step: name.to_string() });
            let result = Self::run_step(step.as_ref(), context);

            progress.report(ProgressEvent::StepCompleted {
                step: name.to_string(),
                code: result.code,
                duration_ms: result.duration.as_millis() as u64,
                message: result.message.clone(),
            });

            let code = result.code;
            report.add_result(result);
            if !code.is_success() {
                report.code = code;
                break;
            }
        }

        let report = report.with_duration(start.elapsed());
        info!(code = %report.code, duration_ms = report.total_duration.as_millis() as u64, "build finished");
        progress.report(ProgressEvent::BuildCompleted {
            code: report.code,
            duration_ms: report.total_duration.as_millis() as u64,
            steps_run: report.steps.len(),
        });
        report
    }

    fn run_step(step: &dyn BuildStep, context: &mut BuildContext) -> StepResult {
        let name = step.name();
        let start = Instant::now();

        let missing = context.missing(step.requires());
        let outcome = match missing.first() {
            Some(object) => Err(BuildError::MissingContext(*object)),
            None => step.run(context),
        };

        match outcome {
            Ok(code) => {
                debug!(step = name, %code, "step finished");
                StepResult::new(name, code, start.elapsed())
            }
            Err(err) => {
                error!(step = name, error = %err, "step failed");
                let message = err.to_string();
                context
                    .progress()
                    .report(ProgressEvent::Error { step: Some(name.to_string()), message: message.clone() });
                StepResult::failed(name, message, start.elapsed())
            }
        }
    }
}

/// Everything a finished build hands back.
#[derive(Debug)]
pub struct BuildOutcome {
    pub report: PipelineReport,
    pub results: Option<BuildResults>,
    pub cache_stats: Option<CacheStats>,
}

/// Builder that assembles a context from a project configuration and runs
/// the default pipeline.
pub struct Build {
    config: BundleConfig,
    project_root: PathBuf,
    progress: BuildProgress,
    callbacks: Option<BuildCallbacks>,
}

impl Build {
    /// Create a build for the project rooted at `project_root`.
    pub fn new(config: BundleConfig, project_root: impl Into<PathBuf>) -> Self {
        Self { config, project_root: project_root.into(), progress: BuildProgress::silent(), callbacks: None }
    }

    /// Set the progress handle.
    pub fn progress(mut self, progress: BuildProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Install user callbacks.
    pub fn callbacks(mut self, callbacks: BuildCallbacks) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Load the content database named by the configuration.
    pub fn load_content(&self) -> Result<ContentDatabase, BuildError> {
        let path = resolve_path(&self.project_root, &self.config.project.content);
        Ok(ContentDatabase::load(&path)?)
    }

    /// Resolve the configured layout to asset ids. `None` when the project
    /// relies on automatic layout.
    pub fn resolve_layout(&self, content: &ContentDatabase) -> Result<Option<BundleLayout>, BuildError> {
        if !self.config.has_explicit_layout() {
            return Ok(None);
        }
        let mut layout = BundleLayout::new();
        for (name, paths) in &self.config.layout {
            let assets = paths
                .iter()
                .map(|path| content.asset_id(path).ok_or_else(|| ContentError::UnknownPath(path.clone())))
                .collect::<Result<Vec<_>, _>>()?;
            layout.add_bundle(name.clone(), assets);
        }
        Ok(Some(layout))
    }

    /// Assemble the build context.
    pub fn context(self) -> Result<BuildContext, BuildError> {
        let database = self.load_content()?;
        let layout = self.resolve_layout(&database)?;

        let mut content = match &layout {
            Some(layout) => BuildContent::from_layout(layout, &database),
            None => BuildContent::from_assets(database.asset_ids(), &database),
        };
        for asset in content.assets.iter().chain(content.scenes.iter()) {
            if let Some(address) = database.address(asset) {
                content.addresses.insert(*asset, address.to_string());
            }
        }

        let parameters = BuildParameters::from_config(&self.config, &self.project_root);
        let content_service: Arc<dyn ContentService> = Arc::new(database);
        let services = BuildServices::from_config(content_service, &self.config);

        let mut context = BuildContext::new(parameters, content, services).with_progress(self.progress);
        if self.config.build.use_cache {
            let root = resolve_path(&self.project_root, &self.config.build.cache_dir);
            context = context.with_cache(BuildCache::new(root).with_global_hash(global_cache_hash()));
        }
        if let Some(layout) = layout {
            context = context.with_layout(layout);
        }
        if let Some(bundle) = &self.config.builtin.bundle {
            context = context.with_builtin_bundle(bundle.clone());
        }
        if let Some(callbacks) = self.callbacks {
            context = context.with_callbacks(callbacks);
        }
        Ok(context)
    }

    /// Run the default pipeline.
    pub fn run(self) -> Result<BuildOutcome, BuildError> {
        let mut context = self.context()?;
        let report = BuildPipeline::default_pipeline().run(&mut context);
        if report.is_success() {
            record_report(&context.parameters().output_folder, &report)?;
        }
        Ok(BuildOutcome {
            report,
            cache_stats: context.cache().map(|cache| cache.stats()),
            results: context.take_results(),
        })
    }
}

/// Add the finished pipeline's step timings to the published manifest.
fn record_report(output_folder: &Path, report: &PipelineReport) -> Result<(), BuildError> {
    if let Some(mut manifest) = BuildManifest::load_from_dir(output_folder)? {
        manifest.record_report(report);
        manifest.save_to_dir(output_folder)?;
    }
    Ok(())
}

/// Global hash mixed into every cache record location.
pub fn global_cache_hash() -> Hash128 {
    let mut builder = HashBuilder::new();
    builder.str(env!("CARGO_PKG_NAME")).str(env!("CARGO_PKG_VERSION")).u32(CACHE_FORMAT_VERSION);
    builder.finish()
}
