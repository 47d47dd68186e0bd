//! Sequential job pipeline.
//!
//! Holds the ordered jobs of one installation run and executes them one at
//! a time: a job's `configure` is only called after the previous job's
//! `execute` has returned, so system side effects have a total order
//! (bootloader setup may rely on the initramfs already being on disk).
//! Results are aggregated into a [`PipelineReport`] that can be written as
//! JSON for diagnostics.
//!
//! An abort request never interrupts a job mid-execute (partial
//! system-state corruption risk); it only prevents the next queued job
//! from starting.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::JobConfig;
use crate::job::{Job, JobError, JobResult, JobState};
use crate::target::TargetRoot;

/// What the pipeline does after a job fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the run at the first failure (default).
    #[default]
    Halt,
    /// Record the failure and keep going.
    Continue,
}

struct JobSlot {
    job: Box<dyn Job>,
    config: JobConfig,
    state: JobState,
    configured: bool,
    config_error: Option<JobError>,
    result: Option<JobResult>,
}

/// Handle for requesting an abort from outside the run loop (e.g. a signal
/// handler). Checked only between jobs.
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn request_abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Ordered sequence of jobs plus the target root they operate on. The
/// pipeline exclusively owns each job for its whole lifetime.
pub struct Pipeline {
    target: TargetRoot,
    policy: FailurePolicy,
    slots: Vec<JobSlot>,
    aborted: Arc<AtomicBool>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("target", &self.target)
            .field("policy", &self.policy)
            .field("jobs", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(target: TargetRoot, policy: FailurePolicy) -> Self {
        Self {
            target,
            policy,
            slots: Vec::new(),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Append a job and its configuration slice to the end of the queue.
    pub fn push(&mut self, job: Box<dyn Job>, config: JobConfig) {
        self.slots.push(JobSlot {
            job,
            config,
            state: JobState::Pending,
            configured: false,
            config_error: None,
            result: None,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn target(&self) -> &TargetRoot {
        &self.target
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Arc::clone(&self.aborted))
    }

    pub fn pretty_name_of(&self, index: usize) -> Option<String> {
        self.slots.get(index).map(|slot| slot.job.pretty_name())
    }

    pub fn state_of(&self, index: usize) -> Option<JobState> {
        self.slots.get(index).map(|slot| slot.state)
    }

    /// Inject the slot's configuration slice exactly once. A rejection is
    /// recorded and surfaced as the slot's failure result when it runs;
    /// after injection `pretty_name()` reflects the configured parameters.
    fn configure_slot(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if slot.configured || slot.result.is_some() {
            return;
        }
        slot.configured = true;
        if let Err(error) = slot.job.configure(&slot.config) {
            warn!(job = slot.job.name(), error = %error, "job rejected its configuration");
            slot.config_error = Some(error);
        }
    }

    /// Run one slot to completion.
    ///
    /// A finished slot is not re-entered: its recorded result is returned
    /// again. Returns `None` for an out-of-range index.
    pub fn run_job(&mut self, index: usize) -> Option<JobResult> {
        if index >= self.slots.len() {
            return None;
        }
        self.configure_slot(index);
        let target = self.target.clone();
        let slot = &mut self.slots[index];
        if let Some(result) = &slot.result {
            return Some(result.clone());
        }

        slot.state = JobState::Running;
        let result = match slot.config_error.take() {
            None => slot.job.execute(&target),
            Some(error) => JobResult::failure(error),
        };
        slot.state = JobState::Finished;
        slot.result = Some(result.clone());
        Some(result)
    }

    /// Execute all jobs in order and aggregate their results.
    pub fn run(&mut self) -> PipelineReport {
        self.run_with_progress(|_, _, _| {})
    }

    /// Like [`run`](Self::run), invoking `on_start(index, total, pretty_name)`
    /// before each job begins.
    pub fn run_with_progress<F>(&mut self, mut on_start: F) -> PipelineReport
    where
        F: FnMut(usize, usize, &str),
    {
        let total = self.slots.len();
        let started_at_utc = utc_now_string();
        let mut jobs = Vec::with_capacity(total);
        let mut aborted = false;

        for index in 0..total {
            if self.aborted.load(Ordering::Relaxed) {
                info!(remaining = total - index, "abort requested, not starting next job");
                aborted = true;
                break;
            }

            // Configure before announcing the job so progress lines and the
            // report show the parameterized pretty name, not the default
            // template of an unconfigured instance.
            self.configure_slot(index);
            let pretty_name = self.slots[index].job.pretty_name();
            let name = self.slots[index].job.name().to_string();
            on_start(index, total, &pretty_name);
            info!(job = %name, "job started");

            let start = Instant::now();
            let result = self.run_job(index).unwrap_or_else(JobResult::success);
            let duration_ms = start.elapsed().as_millis();

            info!(job = %name, status = result.status_str(), "job finished");
            let failed = !result.is_success();
            jobs.push(JobReport::new(name, pretty_name, &result, duration_ms));

            if failed && self.policy == FailurePolicy::Halt {
                break;
            }
        }

        PipelineReport {
            started_at_utc,
            finished_at_utc: utc_now_string(),
            aborted,
            jobs,
        }
    }
}

/// One job's line in the run report.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub name: String,
    pub pretty_name: String,
    /// `ok`, `configuration_error`, `execution_error`, or `tool_failure`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub details: String,
    pub duration_ms: u128,
}

impl JobReport {
    fn new(name: String, pretty_name: String, result: &JobResult, duration_ms: u128) -> Self {
        Self {
            name,
            pretty_name,
            status: result.status_str().to_string(),
            summary: result.summary().map(str::to_owned),
            details: result.details().to_string(),
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "ok"
    }
}

/// Aggregated outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub started_at_utc: String,
    pub finished_at_utc: String,
    pub aborted: bool,
    pub jobs: Vec<JobReport>,
}

impl PipelineReport {
    /// True when every queued job ran and succeeded.
    pub fn succeeded(&self) -> bool {
        !self.aborted && self.jobs.iter().all(JobReport::is_success)
    }

    pub fn first_failure(&self) -> Option<&JobReport> {
        self.jobs.iter().find(|job| !job.is_success())
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).context("serializing run report")?;
        fs::write(path, bytes)
            .with_context(|| format!("writing run report '{}'", path.display()))?;
        Ok(())
    }
}

fn utc_now_string() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
