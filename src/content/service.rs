//! Seams to the content backend.
//!
//! The build pipeline never reads project content directly. It asks a
//! [`ContentService`] about assets and objects, hands finished write commands
//! to a [`ContentSerializer`], and packs the resulting files with a
//! [`ContentArchiver`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::ids::{AssetId, Hash128, ObjectId};
use super::usage::{GlobalUsage, UsageTagSet};
use crate::build::result::{ResourceFile, WriteResult};
use crate::build::write_data::{ReferenceMap, WriteCommand};
use crate::config::Compression;

/// Error raised by a content backend.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ContentError {
    #[error("unknown asset {0}")]
    UnknownAsset(AssetId),
    #[error("unknown asset path '{0}'")]
    UnknownPath(String),
    #[error("object {object} references missing object {missing}")]
    DanglingReference { object: String, missing: String },
    #[error("duplicate asset path '{0}'")]
    DuplicatePath(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("archive error: {0}")]
    Archive(String),
}

/// Result of processing a scene for inclusion in a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedScene {
    pub processed_scene: PathBuf,
    pub referenced_objects: Vec<ObjectId>,
    pub global_usage: GlobalUsage,
}

/// Read access to project content.
pub trait ContentService: Send + Sync {
    /// Project path of an asset.
    fn asset_path(&self, asset: &AssetId) -> Result<String, ContentError>;

    /// Whether the asset is a scene.
    fn is_scene(&self, asset: &AssetId) -> bool;

    /// Hash of the asset's own source content.
    fn asset_hash(&self, asset: &AssetId) -> Result<Hash128, ContentError>;

    /// Assets directly referenced by this asset, sorted.
    fn asset_dependencies(&self, asset: &AssetId) -> Result<Vec<AssetId>, ContentError>;

    /// Objects contained in a non-scene asset, sorted.
    fn objects_in_asset(&self, asset: &AssetId) -> Result<Vec<ObjectId>, ContentError>;

    /// Transitive closure of objects referenced by `objects`, sorted and
    /// excluding `objects` themselves.
    fn referenced_objects(&self, objects: &[ObjectId]) -> Result<Vec<ObjectId>, ContentError>;

    /// Prepare a scene for writing and report what it references.
    fn process_scene(&self, scene: &AssetId, temp_folder: &Path) -> Result<ProcessedScene, ContentError>;

    /// Usage tags needed by `objects` under the given global settings.
    fn usage_tags(&self, objects: &[ObjectId], global: GlobalUsage) -> Result<UsageTagSet, ContentError>;

    /// Size of the streamed side data of an object, if it has any.
    fn stream_data_size(&self, _object: &ObjectId) -> u64 {
        0
    }

    /// Whether the project has modifications not yet persisted.
    fn has_unsaved_changes(&self) -> bool {
        false
    }
}

/// Everything a serializer needs besides the command itself.
pub struct WriteRequest<'a> {
    pub settings: &'a BTreeMap<String, String>,
    pub usage: &'a UsageTagSet,
    pub reference_map: &'a ReferenceMap,
    pub preload: &'a [ObjectId],
    pub content: &'a dyn ContentService,
    pub output_folder: &'a Path,
}

/// Writes one destination file and its side resources.
pub trait ContentSerializer: Send + Sync {
    fn write(&self, command: &WriteCommand, request: &WriteRequest<'_>) -> Result<WriteResult, ContentError>;
}

/// Packs written resource files into a single bundle archive.
pub trait ContentArchiver: Send + Sync {
    /// Write the archive to `output` and return its checksum.
    fn archive(&self, resources: &[ResourceFile], output: &Path, compression: Compression) -> Result<u32, ContentError>;
}
