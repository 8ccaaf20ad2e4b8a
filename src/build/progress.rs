//! Build progress reporting and cooperative cancellation.
//!
//! Reporters receive [`ProgressEvent`]s from the pipeline runner and from
//! steps as they work through items. Steps hold a [`BuildProgress`] handle;
//! [`BuildProgress::update`] returns `false` once the build has been
//! canceled, and the step then stops with [`ReturnCode::Canceled`].
//!
//! # Example
//!
//! ```ignore
//! use bundlesmith::build::progress::{BuildProgress, ConsoleProgress};
//!
//! let progress = BuildProgress::new(Arc::new(ConsoleProgress::new()));
//! let cancel = progress.cancel_token();
//! // hand `cancel` to another thread; `cancel.cancel()` stops the build
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::result::ReturnCode;

/// Events that can be reported during a build.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Pipeline started
    BuildStarted {
        /// Number of steps in the pipeline
        total_steps: usize,
    },
    /// A step started
    StepStarted { step: String },
    /// A step finished
    StepCompleted {
        step: String,
        code: ReturnCode,
        duration_ms: u64,
        /// Error message for failed steps
        message: Option<String>,
    },
    /// A step began work on one item
    ItemProgress { step: String, item: String, index: usize, total: usize },
    /// Pipeline finished
    BuildCompleted { code: ReturnCode, duration_ms: u64, steps_run: usize },
    /// A warning was generated
    Warning { step: Option<String>, message: String },
    /// An error occurred
    Error { step: Option<String>, message: String },
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    /// Create a new null progress reporter.
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Console progress reporter with optional colors.
pub struct ConsoleProgress {
    use_colors: bool,
    verbose: bool,
    current: AtomicUsize,
    total: AtomicUsize,
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .field("current", &self.current)
            .field("total", &self.total)
            .finish()
    }
}

impl ConsoleProgress {
    /// Create a new console progress reporter writing to stderr.
    pub fn new() -> Self {
        Self {
            use_colors: true,
            verbose: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Create a console progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self {
            use_colors: false,
            verbose: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(output)),
        }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn writeln(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", line);
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BuildStarted { total_steps } => {
                self.total.store(total_steps, Ordering::SeqCst);
                self.current.store(0, Ordering::SeqCst);
                self.writeln(&format!("{} Running {} steps...", self.cyan("[build]"), total_steps));
            }
            ProgressEvent::StepStarted { step } => {
                if self.verbose {
                    let current = self.current.load(Ordering::SeqCst) + 1;
                    let total = self.total.load(Ordering::SeqCst);
                    self.writeln(&format!("{} [{}/{}] {}...", self.cyan("[build]"), current, total, step));
                }
            }
            ProgressEvent::StepCompleted { step, code, duration_ms, message } => {
                let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                let total = self.total.load(Ordering::SeqCst);

                let status = match code {
                    ReturnCode::Success => self.green("ok"),
                    ReturnCode::SuccessCached => self.green("cached"),
                    ReturnCode::SuccessNotRun => self.yellow("skipped"),
                    ReturnCode::Canceled => self.yellow("CANCELED"),
                    ReturnCode::UnsavedChanges | ReturnCode::Error => self.red("FAILED"),
                };

                if self.verbose || code != ReturnCode::SuccessNotRun {
                    self.writeln(&format!(
                        "{} [{}/{}] {} {} ({})",
                        self.cyan("[build]"),
                        current,
                        total,
                        status,
                        step,
                        format_duration(duration_ms)
                    ));
                }
                if let Some(message) = message {
                    self.writeln(&format!("        {}", self.red(&message)));
                }
            }
            ProgressEvent::ItemProgress { step, item, index, total } => {
                if self.verbose {
                    self.writeln(&format!("        {} [{}/{}] {}", step, index + 1, total, item));
                }
            }
            ProgressEvent::BuildCompleted { code, duration_ms, steps_run } => {
                if code.is_success() {
                    self.writeln(&format!(
                        "\n{} {} steps in {}",
                        self.green("[done]"),
                        steps_run,
                        format_duration(duration_ms)
                    ));
                } else {
                    self.writeln(&format!(
                        "\n{} Build {} after {} steps in {}",
                        self.red("[error]"),
                        code,
                        steps_run,
                        format_duration(duration_ms)
                    ));
                }
            }
            ProgressEvent::Warning { step, message } => {
                let prefix = step.map(|s| format!("{}: ", s)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.yellow("[warn]"), prefix, message));
            }
            ProgressEvent::Error { step, message } => {
                let prefix = step.map(|s| format!("{}: ", s)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.red("[error]"), prefix, message));
            }
        }
    }
}

/// JSON progress reporter for machine-readable output, one object per line.
pub struct JsonProgress {
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonProgress").finish()
    }
}

impl JsonProgress {
    /// Create a new JSON progress reporter writing to stderr.
    pub fn new() -> Self {
        Self { output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a JSON progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }

    fn write_json(&self, value: serde_json::Value) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", value);
        }
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        use serde_json::json;

        let value = match event {
            ProgressEvent::BuildStarted { total_steps } => {
                json!({ "event": "build_started", "total_steps": total_steps })
            }
            ProgressEvent::StepStarted { step } => json!({ "event": "step_started", "step": step }),
            ProgressEvent::StepCompleted { step, code, duration_ms, message } => json!({
                "event": "step_completed",
                "step": step,
                "code": code,
                "duration_ms": duration_ms,
                "error": message,
            }),
            ProgressEvent::ItemProgress { step, item, index, total } => json!({
                "event": "item",
                "step": step,
                "item": item,
                "index": index,
                "total": total,
            }),
            ProgressEvent::BuildCompleted { code, duration_ms, steps_run } => json!({
                "event": "build_completed",
                "code": code,
                "success": code.is_success(),
                "duration_ms": duration_ms,
                "steps_run": steps_run,
            }),
            ProgressEvent::Warning { step, message } => {
                json!({ "event": "warning", "step": step, "message": message })
            }
            ProgressEvent::Error { step, message } => {
                json!({ "event": "error", "step": step, "message": message })
            }
        };
        self.write_json(value);
    }
}

/// Shared flag that requests cancellation of a running build.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress handle held by the build context.
#[derive(Clone)]
pub struct BuildProgress {
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancelToken,
}

impl std::fmt::Debug for BuildProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildProgress").field("canceled", &self.cancel.is_canceled()).finish()
    }
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self::silent()
    }
}

impl BuildProgress {
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self { reporter, cancel: CancelToken::new() }
    }

    /// A handle that reports nothing.
    pub fn silent() -> Self {
        Self::new(Arc::new(NullProgress))
    }

    /// Share an existing cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    pub fn report(&self, event: ProgressEvent) {
        self.reporter.report(event);
    }

    /// Announce work on an item. Returns `false` if the build was canceled.
    pub fn update(&self, step: &str, item: &str, index: usize, total: usize) -> bool {
        if self.cancel.is_canceled() {
            return false;
        }
        self.reporter.report(ProgressEvent::ItemProgress {
            step: step.to_string(),
            item: item.to_string(),
            index,
            total,
        });
        !self.cancel.is_canceled()
    }

    pub fn warn(&self, step: &str, message: impl Into<String>) {
        self.reporter.report(ProgressEvent::Warning {
            step: Some(step.to_string()),
            message: message.into(),
        });
    }
}

/// Format a duration in milliseconds to a human-readable string.
fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}
