//! Job pipeline core for system installation.
//!
//! An installation is an ordered sequence of heterogeneous, partially
//! failing system operations (partitioning, filesystem creation, package
//! installation, bootloader setup, initramfs generation, ...). This crate
//! provides the contract that lets them be composed, configured from a
//! declarative descriptor, executed in sequence, and reported on
//! uniformly:
//!
//! - **Job contract** - the [`job::Job`] trait plus [`job::JobResult`],
//!   implemented by one type per concrete operation
//! - **Pipeline** - sequential execution with total side-effect order,
//!   failure policy, abort-between-jobs, JSON run reports
//! - **Configuration** - YAML descriptor parsing and per-job config slices
//! - **Target root** - chroot-scoped subprocess execution against the
//!   system being installed
//!
//! # Architecture
//!
//! ```text
//! descriptor.yaml ──▶ config::descriptor ──▶ JobRegistry ──▶ Pipeline
//!                                                               │
//!                          per-job JobConfig ──▶ Job::configure │
//!                                                Job::execute ◀─┘
//!                                                     │
//!                              target::command (chroot subprocess)
//!                                                     │
//!                                JobResult ──▶ PipelineReport
//! ```
//!
//! One concrete job ships with the crate: [`job::initramfs::InitramfsJob`],
//! which regenerates the initramfs for the kernel selected during
//! installation. Other job types register through
//! [`job::registry::JobRegistry`].

pub mod config;
pub mod job;
pub mod kernel;
pub mod pipeline;
pub mod target;

pub use config::descriptor::{load_descriptor, parse_descriptor, Descriptor};
pub use config::JobConfig;
pub use job::initramfs::InitramfsJob;
pub use job::registry::JobRegistry;
pub use job::{Job, JobError, JobErrorKind, JobResult, JobState};
pub use pipeline::{FailurePolicy, Pipeline, PipelineReport};
pub use target::TargetRoot;
