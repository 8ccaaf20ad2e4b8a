//! Build result types.
//!
//! Contains the step return codes, per-step outcomes, the report of a whole
//! pipeline run, and the artifacts a build produces.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::content::ids::Hash128;

/// Outcome of a single build step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCode {
    /// Step ran and did its work
    Success,
    /// Step's work was served entirely from the cache
    SuccessCached,
    /// Step had nothing to do
    SuccessNotRun,
    /// Build was canceled
    Canceled,
    /// Project has unsaved modifications
    UnsavedChanges,
    /// Step failed
    Error,
}

impl ReturnCode {
    /// Whether the pipeline may continue after this code.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ReturnCode::Success | ReturnCode::SuccessCached | ReturnCode::SuccessNotRun
        )
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ReturnCode::Success => "success",
            ReturnCode::SuccessCached => "cached",
            ReturnCode::SuccessNotRun => "not run",
            ReturnCode::Canceled => "canceled",
            ReturnCode::UnsavedChanges => "unsaved changes",
            ReturnCode::Error => "error",
        };
        write!(f, "{}", text)
    }
}

/// Result of running a single step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Step name
    pub step: String,
    /// Return code
    pub code: ReturnCode,
    /// Time spent in the step
    pub duration: Duration,
    /// Error message for failed steps
    pub message: Option<String>,
}

impl StepResult {
    /// Create a result from a return code.
    pub fn new(step: impl Into<String>, code: ReturnCode, duration: Duration) -> Self {
        Self { step: step.into(), code, duration, message: None }
    }

    /// Create a failed result.
    pub fn failed(step: impl Into<String>, message: String, duration: Duration) -> Self {
        Self { step: step.into(), code: ReturnCode::Error, duration, message: Some(message) }
    }

    /// Check if this result lets the build continue.
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

/// Report of a complete pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Final return code
    pub code: ReturnCode,
    /// Results for each step that ran
    pub steps: Vec<StepResult>,
    /// Total run duration
    pub total_duration: Duration,
}

impl Default for PipelineReport {
    fn default() -> Self {
        Self { code: ReturnCode::Success, steps: Vec::new(), total_duration: Duration::ZERO }
    }
}

impl PipelineReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step result.
    pub fn add_result(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Check if the pipeline finished successfully.
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// The step that stopped the pipeline, if any.
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|r| !r.is_success())
    }

    /// Number of steps with the given code.
    pub fn count(&self, code: ReturnCode) -> usize {
        self.steps.iter().filter(|r| r.code == code).count()
    }

    /// Format a summary of the run.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        let ran = self.count(ReturnCode::Success);
        let cached = self.count(ReturnCode::SuccessCached);
        let skipped = self.count(ReturnCode::SuccessNotRun);

        match self.failed_step() {
            Some(failed) => {
                lines.push(format!(
                    "Build {}: stopped at '{}' after {} steps",
                    self.code,
                    failed.step,
                    self.steps.len()
                ));
                if let Some(message) = &failed.message {
                    lines.push(format!("  - {}", message));
                }
            }
            None => lines.push(format!(
                "Build succeeded: {} ran, {} cached, {} not run in {:?}",
                ran, cached, skipped, self.total_duration
            )),
        }

        lines.join("\n")
    }
}

/// A single file produced by the serializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFile {
    /// Name the file is addressed by inside the archive
    pub file_alias: String,
    /// Location on disk
    pub path: PathBuf,
    /// Whether this is a serialized object file (vs. streamed side data)
    pub serialized: bool,
}

/// Output of writing one destination file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub internal_name: String,
    pub resource_files: Vec<ResourceFile>,
    pub object_count: usize,
}

/// Information about one archived bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDetails {
    /// Path of the bundle in the output folder
    pub file_name: PathBuf,
    /// Content hash of the archive
    pub hash: Hash128,
    /// Archive checksum reported by the archiver
    pub checksum: u32,
    /// Archive size in bytes
    pub size: u64,
    /// Bundles that must be loaded before this one
    pub dependencies: Vec<String>,
}

/// Artifacts accumulated over a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResults {
    /// Write results keyed by internal file name
    pub write_results: BTreeMap<String, WriteResult>,
    /// Archived bundles keyed by bundle name
    pub bundle_details: BTreeMap<String, BundleDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_display() {
        assert_eq!(ReturnCode::Success.to_string(), "success");
        assert_eq!(ReturnCode::SuccessCached.to_string(), "cached");
        assert_eq!(ReturnCode::UnsavedChanges.to_string(), "unsaved changes");
    }

    #[test]
    fn test_return_code_is_success() {
        assert!(ReturnCode::Success.is_success());
        assert!(ReturnCode::SuccessCached.is_success());
        assert!(ReturnCode::SuccessNotRun.is_success());
        assert!(!ReturnCode::Canceled.is_success());
        assert!(!ReturnCode::UnsavedChanges.is_success());
        assert!(!ReturnCode::Error.is_success());
    }

    #[test]
    fn test_step_result_failed() {
        let result = StepResult::failed("write", "disk full".to_string(), Duration::from_millis(5));
        assert!(!result.is_success());
        assert_eq!(result.message.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_report_counts_and_failure() {
        let mut report = PipelineReport::new();
        report.add_result(StepResult::new("a", ReturnCode::Success, Duration::ZERO));
        report.add_result(StepResult::new("b", ReturnCode::SuccessCached, Duration::ZERO));
        report.add_result(StepResult::failed("c", "boom".to_string(), Duration::ZERO));
        report.code = ReturnCode::Error;

        assert_eq!(report.count(ReturnCode::Success), 1);
        assert_eq!(report.count(ReturnCode::SuccessCached), 1);
        assert_eq!(report.failed_step().map(|r| r.step.as_str()), Some("c"));

        let summary = report.summary();
        assert!(summary.contains("stopped at 'c'"));
        assert!(summary.contains("boom"));
    }

    #[test]
    fn test_report_summary_success() {
        let mut report = PipelineReport::new();
        report.add_result(StepResult::new("a", ReturnCode::Success, Duration::ZERO));
        report.add_result(StepResult::new("b", ReturnCode::SuccessNotRun, Duration::ZERO));

        let summary = report.with_duration(Duration::from_millis(10)).summary();
        assert!(summary.contains("Build succeeded"));
        assert!(summary.contains("1 ran"));
        assert!(summary.contains("1 not run"));
    }
}
