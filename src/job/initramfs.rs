//! Initramfs regeneration job.
//!
//! Rebuilds the initial RAM filesystem for the kernel selected during
//! installation, by running the target system's own initramfs tool inside
//! the target root. Configuration keys:
//!
//! - `kernel` (string, optional): kernel version to build for. Absent,
//!   empty, or `$uname` means "newest kernel detected in the target".
//! - `tool` (string, optional): force a specific tool instead of probing
//!   `update-initramfs`, `dracut`, `mkinitcpio` in that order.
//! - `timeout_seconds` (integer, optional): kill the tool after this much
//!   wall-clock time. No timeout by default.

use tracing::{info, warn};

use crate::config::JobConfig;
use crate::job::{Job, JobError, JobResult};
use std::time::Duration;

use crate::kernel::resolve_kernel;
use crate::target::command::{run_in_target, LaunchError, RunOptions};
use crate::target::TargetRoot;

/// Initramfs generators this job knows how to drive, in probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitramfsTool {
    UpdateInitramfs,
    Dracut,
    Mkinitcpio,
}

impl InitramfsTool {
    const PROBE_ORDER: &'static [InitramfsTool] = &[
        InitramfsTool::UpdateInitramfs,
        InitramfsTool::Dracut,
        InitramfsTool::Mkinitcpio,
    ];

    pub fn binary_name(&self) -> &'static str {
        match self {
            InitramfsTool::UpdateInitramfs => "update-initramfs",
            InitramfsTool::Dracut => "dracut",
            InitramfsTool::Mkinitcpio => "mkinitcpio",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::PROBE_ORDER
            .iter()
            .copied()
            .find(|tool| tool.binary_name() == name)
    }

    /// Argument list for regenerating the initramfs of `kernel`.
    fn args(&self, kernel: &str) -> Vec<String> {
        match self {
            InitramfsTool::UpdateInitramfs => {
                vec![
                    "-k".to_string(),
                    kernel.to_string(),
                    "-c".to_string(),
                    "-t".to_string(),
                ]
            }
            InitramfsTool::Dracut => vec![
                "--force".to_string(),
                "--kver".to_string(),
                kernel.to_string(),
            ],
            InitramfsTool::Mkinitcpio => vec!["-p".to_string(), kernel.to_string()],
        }
    }
}

/// Regenerates the initramfs for the selected kernel inside the target root.
#[derive(Debug, Default)]
pub struct InitramfsJob {
    kernel: Option<String>,
    tool: Option<InitramfsTool>,
    timeout: Option<Duration>,
}

impl InitramfsJob {
    pub fn new() -> Self {
        Self::default()
    }

    fn locate_tool(&self, target: &TargetRoot) -> Result<(InitramfsTool, String), JobError> {
        let candidates: &[InitramfsTool] = match &self.tool {
            Some(tool) => std::slice::from_ref(tool),
            None => InitramfsTool::PROBE_ORDER,
        };
        for tool in candidates {
            if let Some(path) = target.locate_tool(tool.binary_name()) {
                return Ok((*tool, path));
            }
        }
        let looked_for = candidates
            .iter()
            .map(|tool| tool.binary_name())
            .collect::<Vec<_>>()
            .join(", ");
        Err(JobError::execution(format!(
            "could not start initramfs generation: no tool found in target root '{}' (looked for {})",
            target.path().display(),
            looked_for
        )))
    }

    fn run(&self, target: &TargetRoot) -> Result<JobResult, JobError> {
        let kernel = resolve_kernel(self.kernel.as_deref(), target)?;
        let (tool, tool_path) = self.locate_tool(target)?;
        let args = tool.args(&kernel);

        info!(
            tool = tool.binary_name(),
            kernel = %kernel,
            "regenerating initramfs in target root"
        );

        let opts = RunOptions {
            timeout: self.timeout,
            ..Default::default()
        };
        let run = match run_in_target(target, &tool_path, &args, &opts) {
            Ok(run) => run,
            // The tool did start in this case; say so instead of
            // "could not start".
            Err(LaunchError::Timeout { timeout, .. }) => {
                return Err(JobError::execution(format!(
                    "{} for kernel {} ran for more than {:?} and was killed",
                    tool.binary_name(),
                    kernel,
                    timeout
                )));
            }
            Err(launch) => {
                return Err(JobError::execution(format!(
                    "could not start {} for kernel {}: {}",
                    tool.binary_name(),
                    kernel,
                    launch
                )));
            }
        };

        let mut details = run.output.clone();
        if run.truncated {
            details.push_str("\n[output truncated]");
        }

        if run.success() {
            return Ok(JobResult::success_with_details(details));
        }

        let status = match run.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        warn!(
            tool = tool.binary_name(),
            kernel = %kernel,
            status = %status,
            "initramfs generation failed"
        );
        Err(JobError::tool_failure(
            format!(
                "initramfs generation failed for kernel {} ({} reported {})",
                kernel,
                tool.binary_name(),
                status
            ),
            details,
        ))
    }
}

impl Job for InitramfsJob {
    fn name(&self) -> &'static str {
        "initramfs"
    }

    fn pretty_name(&self) -> String {
        match &self.kernel {
            Some(kernel) => format!("Creating initramfs for kernel {}.", kernel),
            None => "Creating initramfs for the target kernel.".to_string(),
        }
    }

    fn configure(&mut self, config: &JobConfig) -> Result<(), JobError> {
        let kernel = config
            .str_value("kernel")?
            .filter(|value| !value.is_empty())
            .map(str::to_owned);
        let tool = match config.str_value("tool")? {
            None => None,
            Some(name) => Some(InitramfsTool::from_name(name).ok_or_else(|| {
                JobError::configuration(format!(
                    "unknown initramfs tool '{}' (expected update-initramfs, dracut, or mkinitcpio)",
                    name
                ))
            })?),
        };
        let timeout = config.u64_value("timeout_seconds")?.map(Duration::from_secs);
        // Last write wins: replace all configured state at once.
        self.kernel = kernel;
        self.tool = tool;
        self.timeout = timeout;
        Ok(())
    }

    fn execute(&mut self, target: &TargetRoot) -> JobResult {
        match self.run(target) {
            Ok(result) => result,
            Err(error) => JobResult::failure(error),
        }
    }
}
