use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use install_pipeline::{load_descriptor, JobRegistry};

fn usage() -> &'static str {
    "Usage:\n  install-pipeline run <descriptor.yaml> [--target-root <path>] [--report <path>] [--no-chroot]\n  install-pipeline jobs"
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.split_first() {
        Some((cmd, rest)) if cmd == "run" => cmd_run(rest),
        Some((cmd, rest)) if cmd == "jobs" && rest.is_empty() => cmd_jobs(),
        _ => bail!(usage()),
    }
}

struct RunArgs {
    descriptor: PathBuf,
    target_root: Option<PathBuf>,
    report: Option<PathBuf>,
    no_chroot: bool,
}

fn parse_run_args(args: &[String]) -> Result<RunArgs> {
    let mut descriptor = None;
    let mut target_root = None;
    let mut report = None;
    let mut no_chroot = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--target-root" => {
                let value = iter.next().context("--target-root requires a path")?;
                target_root = Some(PathBuf::from(value));
            }
            "--report" => {
                let value = iter.next().context("--report requires a path")?;
                report = Some(PathBuf::from(value));
            }
            "--no-chroot" => no_chroot = true,
            other if !other.starts_with('-') && descriptor.is_none() => {
                descriptor = Some(PathBuf::from(other));
            }
            other => bail!("unexpected argument '{}'\n{}", other, usage()),
        }
    }

    let Some(descriptor) = descriptor else {
        bail!(usage());
    };
    Ok(RunArgs {
        descriptor,
        target_root,
        report,
        no_chroot,
    })
}

fn cmd_run(args: &[String]) -> Result<()> {
    let args = parse_run_args(args)?;

    let mut descriptor = load_descriptor(&args.descriptor)?;
    if let Some(target_root) = args.target_root {
        descriptor.target_root = target_root;
    }
    if args.no_chroot {
        descriptor.chroot = Some(false);
    }

    let registry = JobRegistry::builtin();
    let mut pipeline = descriptor.assemble(&registry)?;

    println!(
        "Running {} job(s) against target root '{}'",
        pipeline.len(),
        pipeline.target().path().display()
    );
    let report = pipeline.run_with_progress(|index, total, pretty_name| {
        println!("[{}/{}] {}", index + 1, total, pretty_name);
    });

    for job in &report.jobs {
        match &job.summary {
            None => println!("  ok: {} ({} ms)", job.name, job.duration_ms),
            Some(summary) => println!("  FAILED: {} - {}", job.name, summary),
        }
    }

    if let Some(path) = &args.report {
        report.write_to(path)?;
        println!("Run report written to '{}'", path.display());
    }

    if report.aborted {
        bail!("installation aborted before all jobs ran");
    }
    if let Some(failed) = report.first_failure() {
        let details = failed.details.trim();
        if !details.is_empty() {
            eprintln!("--- {} output ---\n{}", failed.name, details);
        }
        bail!(
            "installation failed at job '{}': {}",
            failed.name,
            failed.summary.as_deref().unwrap_or("unknown failure")
        );
    }

    println!("Installation pipeline finished successfully");
    Ok(())
}

fn cmd_jobs() -> Result<()> {
    let registry = JobRegistry::builtin();
    println!("Registered job types:");
    for name in registry.job_types() {
        println!("  {}", name);
    }
    Ok(())
}
