//! Build context shared by every step of a pipeline run.
//!
//! The context is a plain struct with one field per kind of state. Inputs
//! (parameters, content, services) are fixed when the context is built;
//! intermediate data (dependency data, write data, results) is filled in by
//! the steps as the pipeline advances. Steps declare which optional objects
//! they need through [`ContextObject`], and the runner checks for them
//! before invoking a step.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::cache::BuildCache;
use super::dependency_data::DependencyData;
use super::identifiers::{identifiers_for, DeterministicIdentifiers, PrefabPackedIdentifiers};
use super::layout::{BundleLayout, ObjectLayout};
use super::pipeline::BuildError;
use super::progress::BuildProgress;
use super::result::BuildResults;
use super::steps::callbacks::BuildCallbacks;
use super::write_data::WriteData;
use crate::config::{resolve_path, BundleConfig, Compression};
use crate::content::ids::{AssetId, Hash128, HashBuilder};
use crate::content::service::{ContentArchiver, ContentSerializer, ContentService};
use crate::content::{FileArchiver, JsonFileSerializer};

/// Optional objects a step may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextObject {
    Layout,
    ObjectLayout,
    Cache,
    Callbacks,
    DependencyData,
    WriteData,
    Results,
}

impl fmt::Display for ContextObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextObject::Layout => "bundle layout",
            ContextObject::ObjectLayout => "object layout",
            ContextObject::Cache => "build cache",
            ContextObject::Callbacks => "build callbacks",
            ContextObject::DependencyData => "dependency data",
            ContextObject::WriteData => "write data",
            ContextObject::Results => "build results",
        };
        write!(f, "{}", name)
    }
}

/// Where and how a build writes its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildParameters {
    /// Folder receiving the final bundles
    pub output_folder: PathBuf,
    /// Scratch folder for serialized files
    pub temp_output_folder: PathBuf,
    pub compression: Compression,
    /// Append the bundle hash to output file names
    pub append_hash: bool,
    /// Run cache lookups on the rayon pool
    pub parallel_cache_lookups: bool,
    /// Target settings folded into every write cache key
    pub settings: BTreeMap<String, String>,
}

impl BuildParameters {
    pub fn new(output_folder: impl Into<PathBuf>, temp_output_folder: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
            temp_output_folder: temp_output_folder.into(),
            compression: Compression::default(),
            append_hash: false,
            parallel_cache_lookups: false,
            settings: BTreeMap::new(),
        }
    }

    /// Derive parameters from a project configuration.
    pub fn from_config(config: &BundleConfig, project_root: &Path) -> Self {
        Self {
            output_folder: resolve_path(project_root, &config.project.out),
            temp_output_folder: resolve_path(project_root, &config.project.temp),
            compression: config.build.compression,
            append_hash: config.build.append_hash,
            parallel_cache_lookups: config.build.parallel_cache_lookups,
            settings: config.build.settings.clone(),
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_append_hash(mut self, append_hash: bool) -> Self {
        self.append_hash = append_hash;
        self
    }

    pub fn with_parallel_cache_lookups(mut self, parallel: bool) -> Self {
        self.parallel_cache_lookups = parallel;
        self
    }

    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.settings.insert(key.to_string(), value.to_string());
        self
    }

    /// Hash of the target settings, used in write cache keys.
    pub fn settings_hash(&self) -> Hash128 {
        let mut builder = HashBuilder::new();
        for (key, value) in &self.settings {
            builder.str(key).str(value);
        }
        builder.finish()
    }
}

/// Assets and scenes taking part in a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildContent {
    pub assets: Vec<AssetId>,
    pub scenes: Vec<AssetId>,
    /// Optional load addresses, used to name automatic bundles
    pub addresses: BTreeMap<AssetId, String>,
}

impl BuildContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, asset: AssetId) -> Self {
        self.assets.push(asset);
        self
    }

    pub fn with_scene(mut self, scene: AssetId) -> Self {
        self.scenes.push(scene);
        self
    }

    pub fn with_address(mut self, asset: AssetId, address: impl Into<String>) -> Self {
        self.addresses.insert(asset, address.into());
        self
    }

    /// Split a list of assets into scenes and non-scene assets.
    pub fn from_assets<I>(assets: I, content: &dyn ContentService) -> Self
    where
        I: IntoIterator<Item = AssetId>,
    {
        let mut result = Self::new();
        for asset in assets {
            if content.is_scene(&asset) {
                result.scenes.push(asset);
            } else {
                result.assets.push(asset);
            }
        }
        result
    }

    /// Every asset and scene named by a layout, in bundle order.
    pub fn from_layout(layout: &BundleLayout, content: &dyn ContentService) -> Self {
        Self::from_assets(layout.iter().flat_map(|(_, assets)| assets.iter().copied()), content)
    }

    pub fn len(&self) -> usize {
        self.assets.len() + self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.scenes.is_empty()
    }
}

/// External collaborators used by the steps.
#[derive(Clone)]
pub struct BuildServices {
    pub content: Arc<dyn ContentService>,
    pub serializer: Arc<dyn ContentSerializer>,
    pub archiver: Arc<dyn ContentArchiver>,
    pub identifiers: Arc<dyn DeterministicIdentifiers>,
}

impl fmt::Debug for BuildServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildServices").finish_non_exhaustive()
    }
}

impl BuildServices {
    /// Services around `content` with the reference serializer, archiver,
    /// and prefab-packed identifiers.
    pub fn new(content: Arc<dyn ContentService>) -> Self {
        Self {
            content,
            serializer: Arc::new(JsonFileSerializer::new()),
            archiver: Arc::new(FileArchiver::new()),
            identifiers: Arc::new(PrefabPackedIdentifiers),
        }
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn ContentSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn ContentArchiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_identifiers(mut self, identifiers: Arc<dyn DeterministicIdentifiers>) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Services configured from a project configuration.
    pub fn from_config(content: Arc<dyn ContentService>, config: &BundleConfig) -> Self {
        Self::new(content).with_identifiers(identifiers_for(config.build.identifiers))
    }
}

/// State of one pipeline run.
#[derive(Debug)]
pub struct BuildContext {
    parameters: BuildParameters,
    content: BuildContent,
    services: BuildServices,
    progress: BuildProgress,
    cache: Option<Arc<BuildCache>>,
    layout: Option<BundleLayout>,
    object_layout: Option<ObjectLayout>,
    callbacks: Option<Arc<BuildCallbacks>>,
    builtin_bundle: Option<String>,
    dependency_data: Option<DependencyData>,
    write_data: Option<WriteData>,
    results: Option<BuildResults>,
}

impl BuildContext {
    pub fn new(parameters: BuildParameters, content: BuildContent, services: BuildServices) -> Self {
        Self {
            parameters,
            content,
            services,
            progress: BuildProgress::silent(),
            cache: None,
            layout: None,
            object_layout: None,
            callbacks: None,
            builtin_bundle: None,
            dependency_data: None,
            write_data: None,
            results: None,
        }
    }

    pub fn with_cache(mut self, cache: BuildCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn with_layout(mut self, layout: BundleLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_object_layout(mut self, layout: ObjectLayout) -> Self {
        self.object_layout = Some(layout);
        self
    }

    pub fn with_callbacks(mut self, callbacks: BuildCallbacks) -> Self {
        self.callbacks = Some(Arc::new(callbacks));
        self
    }

    pub fn with_progress(mut self, progress: BuildProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Relocate every referenced built-in object into `bundle`.
    pub fn with_builtin_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.builtin_bundle = Some(bundle.into());
        self
    }

    pub fn parameters(&self) -> &BuildParameters {
        &self.parameters
    }

    pub fn content(&self) -> &BuildContent {
        &self.content
    }

    pub fn services(&self) -> &BuildServices {
        &self.services
    }

    pub fn progress(&self) -> &BuildProgress {
        &self.progress
    }

    pub fn cache(&self) -> Option<Arc<BuildCache>> {
        self.cache.clone()
    }

    pub fn layout(&self) -> Option<&BundleLayout> {
        self.layout.as_ref()
    }

    pub fn object_layout(&self) -> Option<&ObjectLayout> {
        self.object_layout.as_ref()
    }

    pub fn set_object_layout(&mut self, layout: ObjectLayout) {
        self.object_layout = Some(layout);
    }

    pub fn callbacks(&self) -> Option<Arc<BuildCallbacks>> {
        self.callbacks.clone()
    }

    pub fn builtin_bundle(&self) -> Option<&str> {
        self.builtin_bundle.as_deref()
    }

    pub fn dependency_data(&self) -> Result<&DependencyData, BuildError> {
        self.dependency_data
            .as_ref()
            .ok_or(BuildError::MissingContext(ContextObject::DependencyData))
    }

    pub fn dependency_data_mut(&mut self) -> Result<&mut DependencyData, BuildError> {
        self.dependency_data
            .as_mut()
            .ok_or(BuildError::MissingContext(ContextObject::DependencyData))
    }

    pub fn set_dependency_data(&mut self, data: DependencyData) {
        self.dependency_data = Some(data);
    }

    pub fn take_dependency_data(&mut self) -> Option<DependencyData> {
        self.dependency_data.take()
    }

    pub fn write_data(&self) -> Result<&WriteData, BuildError> {
        self.write_data.as_ref().ok_or(BuildError::MissingContext(ContextObject::WriteData))
    }

    pub fn set_write_data(&mut self, data: WriteData) {
        self.write_data = Some(data);
    }

    pub fn take_write_data(&mut self) -> Result<WriteData, BuildError> {
        self.write_data.take().ok_or(BuildError::MissingContext(ContextObject::WriteData))
    }

    pub fn results(&self) -> Result<&BuildResults, BuildError> {
        self.results.as_ref().ok_or(BuildError::MissingContext(ContextObject::Results))
    }

    pub fn results_mut(&mut self) -> &mut BuildResults {
        self.results.get_or_insert_with(BuildResults::default)
    }

    pub fn take_results(&mut self) -> Option<BuildResults> {
        self.results.take()
    }

    /// Whether the optional object is present.
    pub fn contains(&self, object: ContextObject) -> bool {
        match object {
            ContextObject::Layout => self.layout.is_some(),
            ContextObject::ObjectLayout => self.object_layout.is_some(),
            ContextObject::Cache => self.cache.is_some(),
            ContextObject::Callbacks => self.callbacks.is_some(),
            ContextObject::DependencyData => self.dependency_data.is_some(),
            ContextObject::WriteData => self.write_data.is_some(),
            ContextObject::Results => self.results.is_some(),
        }
    }

    /// The subset of `required` that is absent.
    pub fn missing(&self, required: &[ContextObject]) -> Vec<ContextObject> {
        required.iter().copied().filter(|object| !self.contains(*object)).collect()
    }
}
