//! Shell invocation for build, clean and workload commands
//!
//! Every command runs through `sh -c` in its own process group with a fresh
//! environment map: the caller's environment plus per-invocation overrides.
//! Output is captured to a timestamped file under `.work/logs/` so a failing
//! command can be diagnosed after the pipeline has cleaned up.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

/// A shell command plus where and how to run it
#[derive(Debug, Clone)]
pub struct ShellCommand {
    /// Short name used in log file names (`build`, `workload`, ...)
    pub label: String,
    pub command: String,
    pub cwd: PathBuf,
    /// Variables set for this invocation only
    pub env: HashMap<OsString, OsString>,
}

impl ShellCommand {
    pub fn new(label: impl Into<String>, command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            cwd: cwd.into(),
            env: HashMap::new(),
        }
    }

    /// Add an environment override
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Environment the child receives: inherited variables plus overrides
    pub fn environment(&self) -> HashMap<OsString, OsString> {
        let mut env: HashMap<OsString, OsString> = std::env::vars_os().collect();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

/// Result of a completed command
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Exit code, or 128 + signal number when killed by a signal
    pub status: i32,
    pub elapsed: Duration,
    /// File holding the captured stdout and stderr
    pub log: PathBuf,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Unix timestamp in seconds, for log file names and report headers
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn log_path(logs_dir: &Path, label: &str) -> PathBuf {
    let seq = LOG_SEQ.fetch_add(1, Ordering::Relaxed);
    logs_dir.join(format!("{}-{}-{}.log", label, unix_timestamp(), seq))
}

fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => -1,
    }
}

/// Run `cmd` to completion, polling `cancel` while it runs
///
/// On cancellation the child's process group receives SIGTERM and is reaped
/// before `Error::Cancelled` is returned.
pub fn run_shell(cmd: &ShellCommand, logs_dir: &Path, cancel: &CancelToken) -> Result<CommandOutcome> {
    cancel.check()?;
    fs::create_dir_all(logs_dir).map_err(|e| Error::io(logs_dir, e))?;
    let log = log_path(logs_dir, &cmd.label);
    let stdout = File::create(&log).map_err(|e| Error::io(&log, e))?;
    let stderr = stdout.try_clone().map_err(|e| Error::io(&log, e))?;

    tracing::debug!(label = %cmd.label, cwd = %cmd.cwd.display(), "running `{}`", cmd.command);
    let started = Instant::now();
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&cmd.command)
        .current_dir(&cmd.cwd)
        .env_clear()
        .envs(cmd.environment())
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .process_group(0)
        .spawn()
        .map_err(|e| Error::io(&cmd.cwd, e))?;

    let status = loop {
        if let Some(status) = child.try_wait().map_err(|e| Error::io(&cmd.cwd, e))? {
            break status;
        }
        if cancel.is_cancelled() {
            tracing::warn!(label = %cmd.label, "interrupt received, terminating child");
            let pgid = Pid::from_raw(child.id() as i32);
            if let Err(e) = killpg(pgid, Signal::SIGTERM) {
                tracing::warn!("failed to signal process group {}: {}", pgid, e);
            }
            let _ = child.wait();
            return Err(Error::Cancelled);
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let outcome = CommandOutcome {
        status: exit_code(status),
        elapsed: started.elapsed(),
        log,
    };
    tracing::debug!(
        label = %cmd.label,
        status = outcome.status,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "command finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_captures_output_and_status() {
        let tmp = TempDir::new().unwrap();
        let cmd = ShellCommand::new("echo", "echo hello; echo oops >&2; exit 3", tmp.path());
        let outcome = run_shell(&cmd, &tmp.path().join("logs"), &CancelToken::new()).unwrap();
        assert_eq!(outcome.status, 3);
        assert!(!outcome.success());
        let log = fs::read_to_string(&outcome.log).unwrap();
        assert!(log.contains("hello"));
        assert!(log.contains("oops"));
    }

    #[test]
    fn test_env_override_reaches_child_only() {
        let tmp = TempDir::new().unwrap();
        let cmd = ShellCommand::new("env", "printf %s \"$AUTOPERF_TEST_VAR\" > out.txt", tmp.path())
            .with_env("AUTOPERF_TEST_VAR", "7");
        let outcome = run_shell(&cmd, tmp.path(), &CancelToken::new()).unwrap();
        assert!(outcome.success());
        assert_eq!(fs::read_to_string(tmp.path().join("out.txt")).unwrap(), "7");
        assert!(std::env::var("AUTOPERF_TEST_VAR").is_err());
    }

    #[test]
    fn test_non_utf8_environment_passes_through() {
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let raw = std::ffi::OsStr::from_bytes(b"caf\xe9");
        let cmd = ShellCommand::new("env", "printf %s \"$AUTOPERF_RAW_VAR\" > out.bin", tmp.path())
            .with_env("AUTOPERF_RAW_VAR", raw);
        let env = cmd.environment();
        assert_eq!(env.get(std::ffi::OsStr::new("AUTOPERF_RAW_VAR")).map(|v| v.as_os_str()), Some(raw));
        let outcome = run_shell(&cmd, tmp.path(), &CancelToken::new()).unwrap();
        assert!(outcome.success());
        assert_eq!(fs::read(tmp.path().join("out.bin")).unwrap(), b"caf\xe9");
    }

    #[test]
    fn test_cancelled_before_start() {
        let tmp = TempDir::new().unwrap();
        let token = CancelToken::new();
        token.cancel();
        let cmd = ShellCommand::new("noop", "true", tmp.path());
        assert!(matches!(run_shell(&cmd, tmp.path(), &token), Err(Error::Cancelled)));
    }

    #[test]
    fn test_cancel_terminates_running_child() {
        let tmp = TempDir::new().unwrap();
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            canceller.cancel();
        });
        let cmd = ShellCommand::new("sleep", "sleep 30", tmp.path());
        let started = Instant::now();
        let result = run_shell(&cmd, tmp.path(), &token);
        handle.join().unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
