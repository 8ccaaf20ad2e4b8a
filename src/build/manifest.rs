//! Build report written next to the published bundles.
//!
//! The report is stored as JSON in `.bundlesmith-manifest.json` in the output
//! directory:
//!
//! ```json
//! {
//!   "version": 1,
//!   "created_at": "2026-01-15T10:30:00Z",
//!   "code": "success",
//!   "bundles": {
//!     "props": {
//!       "file": "build/bundles/props",
//!       "hash": "4f2c...",
//!       "checksum": 305419896,
//!       "size": 4096,
//!       "dependencies": ["SHARED-91ab..."]
//!     }
//!   },
//!   "steps": [
//!     { "step": "write-serialized-files", "code": "cached", "duration_ms": 3 }
//!   ],
//!   "stats": { "bundle_count": 1, "total_size": 4096, "total_duration_ms": 12 },
//!   "metadata": { "builder_version": "0.2.0", "compression": "lz4" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::result::{BuildResults, PipelineReport, ReturnCode};
use crate::content::archive::checksum;
use crate::content::ids::Hash128;

/// Current report format version.
const MANIFEST_VERSION: u32 = 1;

/// Default report filename.
pub const MANIFEST_FILENAME: &str = ".bundlesmith-manifest.json";

/// Error during manifest operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Manifest version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Report of one build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Report format version
    pub version: u32,
    /// When the report was written
    pub created_at: String,
    /// Overall result code
    pub code: ReturnCode,
    /// Published bundles by name
    pub bundles: BTreeMap<String, BundleEntry>,
    /// Step timings in run order
    #[serde(default)]
    pub steps: Vec<StepEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<BuildStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BuildMetadata>,
}

/// Report entry of one published bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub file: PathBuf,
    pub hash: Hash128,
    pub checksum: u32,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Timing of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEntry {
    pub step: String,
    pub code: ReturnCode,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregate statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub bundle_count: usize,
    pub total_size: u64,
    pub total_duration_ms: u64,
}

impl BuildStats {
    /// Format the total size as a human-readable string.
    pub fn size_string(&self) -> String {
        format_size(self.total_size)
    }
}

/// Tool and settings information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub builder_version: String,
    pub compression: String,
    #[serde(default)]
    pub append_hash: bool,
}

impl BuildManifest {
    /// Create an empty report.
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            created_at: format_timestamp(SystemTime::now()),
            code: ReturnCode::Success,
            bundles: BTreeMap::new(),
            steps: Vec::new(),
            stats: None,
            metadata: None,
        }
    }

    /// Build a report from accumulated results.
    pub fn from_results(results: &BuildResults) -> Self {
        let mut manifest = Self::new();
        for (name, details) in &results.bundle_details {
            manifest.bundles.insert(
                name.clone(),
                BundleEntry {
                    file: details.file_name.clone(),
                    hash: details.hash,
                    checksum: details.checksum,
                    size: details.size,
                    dependencies: details.dependencies.clone(),
                },
            );
        }
        manifest.compute_stats();
        manifest
    }

    /// Copy step timings and the overall code from a pipeline report.
    pub fn record_report(&mut self, report: &PipelineReport) {
        self.code = report.code;
        self.steps = report
            .steps
            .iter()
            .map(|step| StepEntry {
                step: step.step.clone(),
                code: step.code,
                duration_ms: step.duration.as_millis() as u64,
                message: step.message.clone(),
            })
            .collect();
        self.compute_stats();
    }

    pub fn set_metadata(&mut self, metadata: BuildMetadata) {
        self.metadata = Some(metadata);
    }

    /// Recompute aggregate stats from the bundle entries and step timings.
    pub fn compute_stats(&mut self) {
        self.stats = Some(BuildStats {
            bundle_count: self.bundles.len(),
            total_size: self.bundles.values().map(|b| b.size).sum(),
            total_duration_ms: self.steps.iter().map(|s| s.duration_ms).sum(),
        });
    }

    /// Load a report from a file.
    ///
    /// Returns `Ok(None)` if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ManifestError> {
        if !path.exists() {
            return Ok(None);
        }

        let reader = BufReader::new(File::open(path)?);
        let manifest: BuildManifest = serde_json::from_reader(reader)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::VersionMismatch { expected: MANIFEST_VERSION, found: manifest.version });
        }
        Ok(Some(manifest))
    }

    pub fn load_from_dir(out_dir: &Path) -> Result<Option<Self>, ManifestError> {
        Self::load(&out_dir.join(MANIFEST_FILENAME))
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn save_to_dir(&self, out_dir: &Path) -> Result<(), ManifestError> {
        self.save(&out_dir.join(MANIFEST_FILENAME))
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Re-check every published bundle against its recorded checksum.
    ///
    /// Returns the names of bundles that are missing or changed.
    pub fn verify_outputs(&self) -> Result<Vec<String>, ManifestError> {
        let mut changed = Vec::new();
        for (name, entry) in &self.bundles {
            if !entry.file.exists() {
                changed.push(name.clone());
                continue;
            }
            let bytes = fs::read(&entry.file)?;
            if checksum(&bytes) != entry.checksum {
                changed.push(name.clone());
            }
        }
        Ok(changed)
    }
}

impl Default for BuildManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a byte size as a human-readable string.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    }
}

/// Format a SystemTime as an ISO 8601 UTC timestamp.
pub fn format_timestamp(time: SystemTime) -> String {
    let secs = time.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs();
    let (year, month, day) = days_to_ymd((secs / 86400) as i64);
    let remaining = secs % 86400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        remaining / 3600,
        (remaining % 3600) / 60,
        remaining % 60
    )
}

/// Convert days since the Unix epoch to year/month/day.
fn days_to_ymd(days: i64) -> (i32, u32, u32) {
    let mut remaining = days;
    let mut year = 1970i32;
    loop {
        let length = if is_leap_year(year) { 366 } else { 365 };
        if remaining < length {
            break;
        }
        remaining -= length;
        year += 1;
    }

    let february = if is_leap_year(year) { 29 } else { 28 };
    let months: [i64; 12] = [31, february, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 1u32;
    for length in months {
        if remaining < length {
            break;
        }
        remaining -= length;
        month += 1;
    }
    (year, month, remaining as u32 + 1)
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
