//! Kernel introspection for the target root.
//!
//! Installed kernels are enumerated from the target's module directories;
//! when a job is not told which kernel to operate on it takes the newest
//! one found there. Version order is component-wise: numeric runs compare
//! numerically ("5.10.0" is newer than "5.9.0"), textual runs fall back to
//! lexicographic order.

use std::cmp::Ordering;
use std::fs;

use crate::job::JobError;
use crate::target::TargetRoot;

/// Module directories probed relative to the target root, merged-usr layout
/// first.
const MODULE_DIRS: &[&str] = &["usr/lib/modules", "lib/modules"];

/// Sentinel meaning "use the detected target kernel" (installer descriptor
/// convention).
const KERNEL_AUTODETECT: &str = "$uname";

/// All kernel versions with a module tree inside the target.
pub fn installed_kernels(target: &TargetRoot) -> Vec<String> {
    let mut kernels = Vec::new();
    for dir in MODULE_DIRS {
        let Ok(entries) = fs::read_dir(target.path().join(dir)) else {
            continue;
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with('.') || kernels.contains(&name) {
                continue;
            }
            kernels.push(name);
        }
    }
    kernels
}

/// The newest kernel installed in the target, if any.
pub fn newest_kernel(target: &TargetRoot) -> Option<String> {
    installed_kernels(target)
        .into_iter()
        .max_by(|a, b| compare_versions(a, b))
}

/// Apply the configured-vs-detected kernel policy.
///
/// A non-empty configured identifier other than `$uname` is passed through
/// as-is (the tool's own failure reports a bogus value). Absent, empty, or
/// `$uname` means auto-detect; if detection also fails this is a
/// configuration error.
pub fn resolve_kernel(configured: Option<&str>, target: &TargetRoot) -> Result<String, JobError> {
    match configured {
        Some(kernel) if !kernel.is_empty() && kernel != KERNEL_AUTODETECT => {
            Ok(kernel.to_string())
        }
        _ => newest_kernel(target).ok_or_else(|| {
            JobError::configuration(format!(
                "no kernel configured and none detected in target root '{}'",
                target.path().display()
            ))
        }),
    }
}

/// Component-wise version comparison: split into numeric and textual runs,
/// compare numerics as integers.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    version_key(a).cmp(&version_key(b))
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum VersionPart {
    Number(u64),
    Text(String),
}

fn version_key(version: &str) -> Vec<VersionPart> {
    let mut parts = Vec::new();
    let mut chars = version.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut run = String::new();
            while let Some(&d) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                run.push(d);
                chars.next();
            }
            // Overflow-proof: absurdly long digit runs compare as text.
            match run.parse::<u64>() {
                Ok(n) => parts.push(VersionPart::Number(n)),
                Err(_) => parts.push(VersionPart::Text(run)),
            }
        } else if c.is_alphanumeric() {
            let mut run = String::new();
            while let Some(&d) = chars.peek() {
                if !d.is_alphanumeric() || d.is_ascii_digit() {
                    break;
                }
                run.push(d);
                chars.next();
            }
            parts.push(VersionPart::Text(run));
        } else {
            chars.next();
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target_with_kernels(kernels: &[&str]) -> (TempDir, TargetRoot) {
        let tmp = TempDir::new().unwrap();
        for kernel in kernels {
            fs::create_dir_all(tmp.path().join("lib/modules").join(kernel)).unwrap();
        }
        let target = TargetRoot::new(tmp.path()).without_chroot();
        (tmp, target)
    }

    #[test]
    fn numeric_components_compare_numerically() {
        assert_eq!(compare_versions("5.10.0", "5.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("5.9.0", "5.10.0"), Ordering::Less);
        assert_eq!(compare_versions("5.15.0", "5.15.0"), Ordering::Equal);
        assert_eq!(
            compare_versions("6.1.0-arch1", "6.1.0-zen1"),
            Ordering::Less
        );
    }

    #[test]
    fn newest_kernel_wins() {
        let (_tmp, target) = target_with_kernels(&["5.9.0", "5.15.0-generic", "5.10.0"]);
        assert_eq!(newest_kernel(&target).as_deref(), Some("5.15.0-generic"));
    }

    #[test]
    fn no_modules_means_no_kernel() {
        let (_tmp, target) = target_with_kernels(&[]);
        assert_eq!(newest_kernel(&target), None);
    }

    #[test]
    fn configured_kernel_passes_through_unvalidated() {
        let (_tmp, target) = target_with_kernels(&[]);
        assert_eq!(resolve_kernel(Some("bogus"), &target).unwrap(), "bogus");
    }

    #[test]
    fn uname_sentinel_means_autodetect() {
        let (_tmp, target) = target_with_kernels(&["5.15.0-generic"]);
        assert_eq!(
            resolve_kernel(Some("$uname"), &target).unwrap(),
            "5.15.0-generic"
        );
        assert_eq!(resolve_kernel(None, &target).unwrap(), "5.15.0-generic");
        assert_eq!(resolve_kernel(Some(""), &target).unwrap(), "5.15.0-generic");
    }

    #[test]
    fn detection_failure_is_a_configuration_error() {
        let (_tmp, target) = target_with_kernels(&[]);
        let err = resolve_kernel(None, &target).unwrap_err();
        assert_eq!(err.kind(), crate::job::JobErrorKind::Configuration);
        assert!(err.summary().contains("no kernel"), "{}", err.summary());
    }

    #[test]
    fn both_module_layouts_are_probed() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("usr/lib/modules/6.2.0")).unwrap();
        let target = TargetRoot::new(tmp.path()).without_chroot();
        assert_eq!(newest_kernel(&target).as_deref(), Some("6.2.0"));
    }
}
