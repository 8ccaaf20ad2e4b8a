//! Bundle build pipeline.
//!
//! Turns a set of assets and an optional bundle layout into archived bundles:
//!
//! - **Dependency calculation**: resolve the objects each asset and scene
//!   contains and references, with usage tags
//! - **Packing**: assign every object to exactly one destination file,
//!   either from an explicit layout or from the set of assets using it
//! - **Writing**: serialize each file, then archive each bundle's files
//!
//! Every expensive step is backed by a content-addressed [`BuildCache`], and
//! all intermediate maps are ordered so identical inputs give identical
//! output bytes.
//!
//! # Example
//!
//! ```ignore
//! use bundlesmith::build::Build;
//! use bundlesmith::config::load_config;
//!
//! let config = load_config(None)?;
//! let outcome = Build::new(config, project_root).run()?;
//! println!("{}", outcome.report.summary());
//! ```

pub mod cache;
pub mod context;
pub mod dependency_data;
pub mod filter;
pub mod identifiers;
pub mod layout;
pub mod manifest;
pub mod pipeline;
pub mod progress;
pub mod result;
pub mod steps;
pub mod write_data;

pub use cache::{BuildCache, CacheEntry, CacheError, CacheStats};
pub use context::{BuildContent, BuildContext, BuildParameters, BuildServices, ContextObject};
pub use dependency_data::DependencyData;
pub use filter::ReferenceFilter;
pub use identifiers::{DeterministicIdentifiers, PrefabPackedIdentifiers, Unity5PackedIdentifiers};
pub use layout::{BundleLayout, LayoutError, ObjectLayout};
pub use manifest::{BuildManifest, ManifestError, MANIFEST_FILENAME};
pub use pipeline::{Build, BuildError, BuildOutcome, BuildPipeline, BuildStep};
pub use progress::{
    BuildProgress, CancelToken, ConsoleProgress, JsonProgress, NullProgress, ProgressEvent, ProgressReporter,
};
pub use result::{BuildResults, BundleDetails, PipelineReport, ReturnCode, StepResult, WriteResult};
pub use steps::callbacks::BuildCallbacks;
pub use write_data::{ReferenceMap, WriteCommand, WriteData};
