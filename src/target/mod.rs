//! Target root: the filesystem tree of the system being installed.
//!
//! The installer usually operates on a not-yet-booted target filesystem, so
//! tools that must observe the target's own binaries and configuration run
//! through `chroot`. Direct (non-chroot) mode exists for OEM-style runs on
//! the live system and for unprivileged tests; there the target-internal
//! path is mapped back onto the host filesystem before spawning.

use std::path::{Path, PathBuf};

pub mod command;

/// Binary directories probed when locating a tool inside the target.
const TARGET_BIN_DIRS: &[&str] = &[
    "usr/sbin",
    "usr/bin",
    "sbin",
    "bin",
    "usr/local/sbin",
    "usr/local/bin",
];

/// Handle to the target system's root directory plus the execution mode
/// used for commands scoped to it. The pipeline owns one of these and
/// serializes all access to it.
#[derive(Debug, Clone)]
pub struct TargetRoot {
    root: PathBuf,
    use_chroot: bool,
}

impl TargetRoot {
    /// Target rooted at `root`; commands run through `chroot` unless the
    /// root is `/`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let use_chroot = root != Path::new("/");
        Self { root, use_chroot }
    }

    /// The live system itself is the target (root `/`, no chroot).
    pub fn host() -> Self {
        Self::new("/")
    }

    /// Disable chroot: commands are spawned on the host with target-internal
    /// paths mapped under the root. Mirrors the installer's OEM mode.
    pub fn without_chroot(mut self) -> Self {
        self.use_chroot = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn is_host(&self) -> bool {
        self.root == Path::new("/")
    }

    pub fn use_chroot(&self) -> bool {
        self.use_chroot
    }

    /// Map a target-internal absolute path onto the host filesystem.
    pub fn host_path(&self, target_internal: &str) -> PathBuf {
        if self.is_host() {
            PathBuf::from(target_internal)
        } else {
            self.root.join(target_internal.trim_start_matches('/'))
        }
    }

    /// Locate `name` in the target's usual binary directories.
    ///
    /// Returns the path as seen from inside the target (e.g.
    /// `/usr/sbin/update-initramfs`), suitable for [`command::run_in_target`].
    /// On a host target the search falls back to `PATH`.
    pub fn locate_tool(&self, name: &str) -> Option<String> {
        for dir in TARGET_BIN_DIRS {
            let host_side = self.root.join(dir).join(name);
            if host_side.is_file() {
                return Some(format!("/{}/{}", dir, name));
            }
        }
        if self.is_host() {
            if let Ok(found) = which::which(name) {
                return Some(found.to_string_lossy().into_owned());
            }
        }
        None
    }
}
