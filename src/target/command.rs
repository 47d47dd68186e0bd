//! Run a command scoped to the target root and capture its output.
//!
//! The runner spawns the tool (prefixed with `chroot <root>` when the
//! target uses chroot mode), drains stdout and stderr on reader threads
//! merged into a single captured buffer, and enforces an optional
//! wall-clock timeout. Capture is bounded so a runaway tool cannot grow
//! memory without limit; the captured prefix stays byte-exact up to the
//! bound.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use super::TargetRoot;

/// Default bound on captured combined output.
pub const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Knobs of the execution helper, not of the Job contract.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Kill the subprocess after this much wall-clock time.
    pub timeout: Option<Duration>,
    /// Override the capture bound (default [`MAX_CAPTURED_OUTPUT`]).
    pub capture_limit: Option<usize>,
}

/// Exit status plus captured combined output of a tool that ran to
/// completion (successfully or not).
#[derive(Debug)]
pub struct RunOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Merged stdout + stderr, truncated at the capture bound.
    pub output: String,
    /// Whether the capture bound was hit.
    pub truncated: bool,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The tool never ran to completion under our supervision.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' did not finish within {timeout:?} and was killed")]
    Timeout { program: String, timeout: Duration },
    #[error("'chroot' not found on the installer host: {0}")]
    ChrootMissing(#[source] which::Error),
}

/// Run `program` (a target-internal absolute path) with `args` inside the
/// target root, blocking until it exits or times out.
pub fn run_in_target(
    target: &TargetRoot,
    program: &str,
    args: &[String],
    opts: &RunOptions,
) -> Result<RunOutput, LaunchError> {
    let mut cmd = build_command(target, program)?;
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(program, ?args, root = %target.path().display(), chroot = target.use_chroot(), "spawning target command");

    let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let mut readers: Vec<JoinHandle<()>> = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, tx.clone()));
    }
    drop(tx);

    let limit = opts.capture_limit.unwrap_or(MAX_CAPTURED_OUTPUT);
    let mut captured = Vec::new();
    let mut truncated = false;
    let deadline = opts.timeout.map(|timeout| Instant::now() + timeout);

    let status = loop {
        drain_pending(&rx, &mut captured, limit, &mut truncated);

        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                reap(&mut child);
                return Err(LaunchError::Wait {
                    program: program.to_string(),
                    source,
                });
            }
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                reap(&mut child);
                return Err(LaunchError::Timeout {
                    program: program.to_string(),
                    timeout: opts.timeout.unwrap_or_default(),
                });
            }
        }

        thread::sleep(WAIT_POLL_INTERVAL);
    };

    for reader in readers {
        let _ = reader.join();
    }
    drain_pending(&rx, &mut captured, limit, &mut truncated);

    if truncated {
        trim_incomplete_utf8_tail(&mut captured);
    }
    let output = String::from_utf8_lossy(&captured).into_owned();
    debug!(program, code = ?status.code(), truncated, "target command finished");

    Ok(RunOutput {
        exit_code: status.code(),
        output,
        truncated,
    })
}

fn build_command(target: &TargetRoot, program: &str) -> Result<Command, LaunchError> {
    if target.use_chroot() {
        let chroot_bin = which::which("chroot").map_err(LaunchError::ChrootMissing)?;
        let mut cmd = Command::new(chroot_bin);
        cmd.arg(target.path());
        cmd.arg(program);
        Ok(cmd)
    } else {
        Ok(Command::new(target.host_path(program)))
    }
}

fn spawn_reader<R>(stream: R, tx: Sender<Vec<u8>>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut stream = stream;
        let mut buf = [0u8; 8192];
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn drain_pending(
    rx: &Receiver<Vec<u8>>,
    captured: &mut Vec<u8>,
    limit: usize,
    truncated: &mut bool,
) {
    while let Ok(chunk) = rx.try_recv() {
        append_bounded(captured, &chunk, limit, truncated);
    }
}

fn append_bounded(captured: &mut Vec<u8>, chunk: &[u8], limit: usize, truncated: &mut bool) {
    let room = limit.saturating_sub(captured.len());
    if chunk.len() > room {
        *truncated = true;
    }
    captured.extend_from_slice(&chunk[..chunk.len().min(room)]);
}

/// Drop a multibyte sequence the capture bound cut in half, so the kept
/// prefix converts without a replacement character at the boundary.
/// Interior invalid bytes (binary tool output) are left for the lossy
/// conversion to mark.
fn trim_incomplete_utf8_tail(captured: &mut Vec<u8>) {
    // Walk back over at most 3 continuation bytes to the last lead byte.
    let mut start = captured.len();
    for _ in 0..4 {
        if start == 0 {
            return;
        }
        start -= 1;
        if captured[start] & 0xC0 != 0x80 {
            break;
        }
    }
    let lead = captured[start];
    let expected = match lead {
        b if b & 0x80 == 0x00 => 1,
        b if b & 0xE0 == 0xC0 => 2,
        b if b & 0xF0 == 0xE0 => 3,
        b if b & 0xF8 == 0xF0 => 4,
        // Not a lead byte: genuinely invalid input, nothing to trim.
        _ => return,
    };
    if captured.len() - start < expected {
        captured.truncate(start);
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn install_script(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn direct_target(root: &Path) -> TargetRoot {
        TargetRoot::new(root).without_chroot()
    }

    #[test]
    fn captures_output_and_exit_code() {
        let tmp = TempDir::new().unwrap();
        install_script(
            tmp.path(),
            "usr/sbin/tool",
            "#!/bin/sh\nprintf 'out'\nprintf 'err' >&2\nexit 0\n",
        );

        let out = run_in_target(
            &direct_target(tmp.path()),
            "/usr/sbin/tool",
            &[],
            &RunOptions::default(),
        )
        .unwrap();

        assert!(out.success());
        assert!(!out.truncated);
        // Both streams land in the merged capture.
        assert!(out.output.contains("out"), "{:?}", out.output);
        assert!(out.output.contains("err"), "{:?}", out.output);
    }

    #[test]
    fn nonzero_exit_is_not_a_launch_error() {
        let tmp = TempDir::new().unwrap();
        install_script(
            tmp.path(),
            "usr/sbin/tool",
            "#!/bin/sh\nprintf 'boom'\nexit 3\n",
        );

        let out = run_in_target(
            &direct_target(tmp.path()),
            "/usr/sbin/tool",
            &[],
            &RunOptions::default(),
        )
        .unwrap();

        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.output, "boom");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let tmp = TempDir::new().unwrap();
        let err = run_in_target(
            &direct_target(tmp.path()),
            "/usr/sbin/no-such-tool",
            &[],
            &RunOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }), "{err}");
    }

    #[test]
    fn capture_is_truncated_at_the_bound() {
        let tmp = TempDir::new().unwrap();
        install_script(
            tmp.path(),
            "usr/sbin/tool",
            "#!/bin/sh\nprintf 'aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa'\n",
        );

        let opts = RunOptions {
            capture_limit: Some(10),
            ..Default::default()
        };
        let out = run_in_target(&direct_target(tmp.path()), "/usr/sbin/tool", &[], &opts).unwrap();

        assert!(out.truncated);
        assert_eq!(out.output, "aaaaaaaaaa");
    }

    #[test]
    fn truncation_never_splits_a_multibyte_character() {
        let tmp = TempDir::new().unwrap();
        // "aé" is three bytes (61 C3 A9); a bound of 2 cuts "é" in half.
        install_script(tmp.path(), "usr/sbin/tool", "#!/bin/sh\nprintf 'aé'\n");

        let opts = RunOptions {
            capture_limit: Some(2),
            ..Default::default()
        };
        let out = run_in_target(&direct_target(tmp.path()), "/usr/sbin/tool", &[], &opts).unwrap();

        assert!(out.truncated);
        assert_eq!(out.output, "a");
        assert!(!out.output.contains('\u{FFFD}'));
    }

    #[test]
    fn utf8_tail_trim_only_drops_incomplete_sequences() {
        // Complete final character: untouched.
        let mut complete = "aé".as_bytes().to_vec();
        trim_incomplete_utf8_tail(&mut complete);
        assert_eq!(complete, "aé".as_bytes());

        // Four-byte sequence missing its last byte: dropped.
        let mut split = b"ok\xF0\x9F\x92".to_vec();
        trim_incomplete_utf8_tail(&mut split);
        assert_eq!(split, b"ok");

        // A lone continuation byte is invalid input, not a split; left for
        // the lossy conversion to mark.
        let mut invalid = b"ok\x80".to_vec();
        trim_incomplete_utf8_tail(&mut invalid);
        assert_eq!(invalid, b"ok\x80");
    }

    #[test]
    fn arguments_reach_the_tool() {
        let tmp = TempDir::new().unwrap();
        install_script(tmp.path(), "usr/sbin/tool", "#!/bin/sh\nprintf '%s ' \"$@\"\n");

        let args = vec!["-k".to_string(), "5.15.0-generic".to_string()];
        let out = run_in_target(
            &direct_target(tmp.path()),
            "/usr/sbin/tool",
            &args,
            &RunOptions::default(),
        )
        .unwrap();

        assert_eq!(out.output, "-k 5.15.0-generic ");
    }

    #[test]
    fn timeout_kills_the_subprocess() {
        let tmp = TempDir::new().unwrap();
        install_script(tmp.path(), "usr/sbin/tool", "#!/bin/sh\nsleep 30\n");

        let opts = RunOptions {
            timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        };
        let started = Instant::now();
        let err =
            run_in_target(&direct_target(tmp.path()), "/usr/sbin/tool", &[], &opts).unwrap_err();

        assert!(matches!(err, LaunchError::Timeout { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
