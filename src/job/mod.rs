//! Job contract: the unit of executable installation work.
//!
//! A [`Job`] is one discrete step of the installation pipeline (regenerate
//! the initramfs, install the bootloader, ...). Jobs are created from the
//! installation descriptor, configured exactly once with their slice of the
//! configuration document, and executed exactly once by the pipeline. All
//! failures are reported through [`JobResult`]; `execute` never panics or
//! propagates an error past its boundary.

use crate::config::JobConfig;
use crate::target::TargetRoot;

pub mod initramfs;
pub mod registry;

/// The three failure classes a job can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobErrorKind {
    /// A required configuration value was absent or invalid after defaulting.
    Configuration,
    /// The underlying tool could not be launched at all (missing binary,
    /// permission denied, inaccessible target root).
    Execution,
    /// The underlying tool launched but exited unsuccessfully.
    ToolFailure,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::Configuration => "configuration_error",
            JobErrorKind::Execution => "execution_error",
            JobErrorKind::ToolFailure => "tool_failure",
        }
    }
}

/// A job failure: kind, a short user-facing summary, and an optional
/// long-form details blob (typically captured tool output).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{summary}")]
pub struct JobError {
    kind: JobErrorKind,
    summary: String,
    details: String,
}

impl JobError {
    pub fn configuration(summary: impl Into<String>) -> Self {
        Self {
            kind: JobErrorKind::Configuration,
            summary: summary.into(),
            details: String::new(),
        }
    }

    pub fn execution(summary: impl Into<String>) -> Self {
        Self {
            kind: JobErrorKind::Execution,
            summary: summary.into(),
            details: String::new(),
        }
    }

    pub fn tool_failure(summary: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind: JobErrorKind::ToolFailure,
            summary: summary.into(),
            details: details.into(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn kind(&self) -> JobErrorKind {
        self.kind
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn details(&self) -> &str {
        &self.details
    }
}

/// The outcome of one job execution.
///
/// Invariant: `summary()` is `Some` iff the result is a failure. `details()`
/// may be non-empty either way (a succeeding tool's output is kept for
/// diagnostics).
#[derive(Debug, Clone)]
pub struct JobResult {
    error_kind: Option<JobErrorKind>,
    summary: Option<String>,
    details: String,
}

impl JobResult {
    pub fn success() -> Self {
        Self {
            error_kind: None,
            summary: None,
            details: String::new(),
        }
    }

    pub fn success_with_details(details: impl Into<String>) -> Self {
        Self {
            error_kind: None,
            summary: None,
            details: details.into(),
        }
    }

    pub fn failure(error: JobError) -> Self {
        Self {
            error_kind: Some(error.kind),
            summary: Some(error.summary),
            details: error.details,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }

    pub fn error_kind(&self) -> Option<JobErrorKind> {
        self.error_kind
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    /// Report status string: `ok` or the failing kind.
    pub fn status_str(&self) -> &'static str {
        match self.error_kind {
            None => "ok",
            Some(kind) => kind.as_str(),
        }
    }
}

impl From<JobError> for JobResult {
    fn from(error: JobError) -> Self {
        JobResult::failure(error)
    }
}

/// Lifecycle of a job inside the pipeline. No transition is reversible;
/// `Running` is entered at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Finished,
}

/// One installation step.
///
/// Implementations bind a specific system operation (initramfs regeneration,
/// bootloader setup, ...) to this contract. The pipeline owns each job for
/// its whole lifetime and serializes all calls; no locking is needed inside
/// an implementation.
pub trait Job {
    /// Stable identifier for logging and the registry ("initramfs").
    fn name(&self) -> &'static str;

    /// Human-readable, display-only description. May embed configured
    /// parameters. Pure: no side effects, callable before or after
    /// execution, never empty.
    fn pretty_name(&self) -> String;

    /// Inject the job's configuration slice.
    ///
    /// Validates presence and type of the keys this job consumes; unknown
    /// keys are ignored. Calling this again replaces all previously
    /// configured state (last write wins, no partial state). An `Err` here
    /// is turned into a Configuration failure result by the pipeline.
    fn configure(&mut self, config: &JobConfig) -> Result<(), JobError>;

    /// Perform the system operation.
    ///
    /// The only operation allowed external side effects. Blocks until the
    /// operation completes and returns the outcome; never panics and never
    /// propagates an error past this boundary.
    fn execute(&mut self, target: &TargetRoot) -> JobResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_has_no_summary() {
        let result = JobResult::success();
        assert!(result.is_success());
        assert_eq!(result.summary(), None);
        assert_eq!(result.error_kind(), None);
        assert_eq!(result.status_str(), "ok");
    }

    #[test]
    fn success_keeps_tool_output() {
        let result = JobResult::success_with_details("done");
        assert!(result.is_success());
        assert_eq!(result.summary(), None);
        assert_eq!(result.details(), "done");
    }

    #[test]
    fn failure_carries_kind_summary_details() {
        let result =
            JobResult::failure(JobError::tool_failure("tool failed", "stderr output here"));
        assert!(!result.is_success());
        assert_eq!(result.error_kind(), Some(JobErrorKind::ToolFailure));
        assert_eq!(result.summary(), Some("tool failed"));
        assert_eq!(result.details(), "stderr output here");
        assert_eq!(result.status_str(), "tool_failure");
    }

    #[test]
    fn error_display_is_the_summary() {
        let err = JobError::configuration("missing kernel");
        assert_eq!(err.to_string(), "missing kernel");
        assert_eq!(err.kind(), JobErrorKind::Configuration);
    }

    #[test]
    fn with_details_attaches_blob() {
        let err = JobError::execution("could not start tool").with_details("ENOENT");
        assert_eq!(err.details(), "ENOENT");
        assert_eq!(err.kind(), JobErrorKind::Execution);
    }
}
