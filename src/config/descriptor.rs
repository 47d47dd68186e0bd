//! Installation descriptor: the declarative file a run is assembled from.
//!
//! The descriptor names the target root, the failure policy, and the
//! ordered list of jobs with their configuration slices:
//!
//! ```yaml
//! target_root: /mnt/install
//! on_failure: halt
//! jobs:
//!   - type: initramfs
//!     config:
//!       kernel: 5.15.0-generic
//! ```
//!
//! Unknown keys at the descriptor level are rejected; unknown keys inside
//! a job's `config` slice are the job's business (and ignored there).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::config::JobConfig;
use crate::job::registry::JobRegistry;
use crate::pipeline::{FailurePolicy, Pipeline};
use crate::target::TargetRoot;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorYaml {
    target_root: Option<PathBuf>,
    chroot: Option<bool>,
    on_failure: Option<String>,
    jobs: Vec<JobEntryYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobEntryYaml {
    #[serde(rename = "type")]
    job_type: String,
    config: Option<serde_yaml::Mapping>,
}

/// One declared job: its registry type name and configuration slice.
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub job_type: String,
    pub config: JobConfig,
}

/// Parsed and validated installation descriptor.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub target_root: PathBuf,
    /// Explicit chroot override; `None` keeps the [`TargetRoot`] default
    /// (chroot whenever the root is not `/`).
    pub chroot: Option<bool>,
    pub policy: FailurePolicy,
    pub jobs: Vec<JobEntry>,
}

impl Descriptor {
    pub fn target(&self) -> TargetRoot {
        let target = TargetRoot::new(&self.target_root);
        match self.chroot {
            Some(false) => target.without_chroot(),
            _ => target,
        }
    }

    /// Instantiate every declared job from `registry` and queue them in
    /// declaration order.
    pub fn assemble(&self, registry: &JobRegistry) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new(self.target(), self.policy);
        for entry in &self.jobs {
            let Some(job) = registry.create(&entry.job_type) else {
                let registered = registry.job_types().collect::<Vec<_>>().join(", ");
                bail!(
                    "unknown job type '{}'; registered types: {}",
                    entry.job_type,
                    registered
                );
            };
            pipeline.push(job, entry.config.clone());
        }
        Ok(pipeline)
    }
}

pub fn load_descriptor(path: &Path) -> Result<Descriptor> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading installation descriptor '{}'", path.display()))?;
    parse_descriptor(&text)
        .with_context(|| format!("parsing installation descriptor '{}'", path.display()))
}

pub fn parse_descriptor(text: &str) -> Result<Descriptor> {
    let parsed: DescriptorYaml = serde_yaml::from_str(text)?;
    if parsed.jobs.is_empty() {
        bail!("descriptor declares no jobs");
    }
    let policy = parse_failure_policy(parsed.on_failure.as_deref())?;
    let jobs = parsed
        .jobs
        .into_iter()
        .map(|entry| JobEntry {
            job_type: entry.job_type,
            config: entry
                .config
                .map(JobConfig::from_mapping)
                .unwrap_or_default(),
        })
        .collect();

    Ok(Descriptor {
        target_root: parsed.target_root.unwrap_or_else(|| PathBuf::from("/")),
        chroot: parsed.chroot,
        policy,
        jobs,
    })
}

fn parse_failure_policy(value: Option<&str>) -> Result<FailurePolicy> {
    match value.unwrap_or("halt") {
        "halt" => Ok(FailurePolicy::Halt),
        "continue" => Ok(FailurePolicy::Continue),
        other => bail!(
            "unsupported on_failure '{}' (expected 'halt' or 'continue')",
            other
        ),
    }
}
