//! Content model and the reference content backend.
//!
//! - [`ids`]: asset and object identifiers
//! - [`usage`]: usage tags and scene-wide settings
//! - [`info`]: dependency records for assets and scenes
//! - [`service`]: traits the build pipeline talks to
//! - [`database`], [`writer`], [`archive`]: file-based implementations

pub mod archive;
pub mod database;
pub mod ids;
pub mod info;
pub mod service;
pub mod usage;
pub mod writer;

pub use archive::FileArchiver;
pub use database::{AssetRecord, ContentDatabase, ContentManifest, ObjectRecord};
pub use ids::{AssetId, FileType, Hash128, HashBuilder, ObjectId};
pub use info::{AssetLoadInfo, SceneDependencyInfo};
pub use service::{ContentArchiver, ContentError, ContentSerializer, ContentService, ProcessedScene, WriteRequest};
pub use usage::{GlobalUsage, UsageTagSet};
pub use writer::JsonFileSerializer;
