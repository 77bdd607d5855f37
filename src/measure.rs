//! Build and HPC event sweep
//!
//! One measurement run executes the workload once per `COUNTERS` entry,
//! strictly one after the other, and files the probe library's output as
//! `out_dir/run_N/event_{i}_probe_data.csv`.

use crate::cancel::CancelToken;
use crate::config::RepoConfig;
use crate::counters::load_counters;
use crate::error::{Error, Result};
use crate::process::{run_shell, ShellCommand};
use crate::workdir::{next_run_index, run_dir, WorkDir, COUNTERS_FILE};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable selecting the active event for one workload invocation
pub const PROBE_EVENT_VAR: &str = "PROBE_EVENT_INDEX";

/// File the probe library writes into the workload's working directory
pub const PROBE_OUTPUT_FILE: &str = "probe_data.csv";

/// Name of the trace for event `i` inside a run directory
pub fn event_file_name(index: usize) -> String {
    format!("event_{}_{}", index, PROBE_OUTPUT_FILE)
}

/// What one run produced
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub index: usize,
    pub dir: PathBuf,
    /// Wall time of each event's workload invocation
    pub elapsed: Vec<Duration>,
    /// Events whose probe output was missing (empty placeholder written)
    pub missing: Vec<usize>,
}

/// Build and measurement driver bound to one repository
pub struct Measurement<'a> {
    config: &'a RepoConfig,
    work: &'a WorkDir,
    cancel: &'a CancelToken,
}

impl<'a> Measurement<'a> {
    pub fn new(config: &'a RepoConfig, work: &'a WorkDir, cancel: &'a CancelToken) -> Self {
        Self { config, work, cancel }
    }

    /// Run `clean.cmd` (when set) and then `build.cmd` in the repository root
    pub fn build(&self) -> Result<()> {
        let logs = self.work.logs_dir();
        let root = self.config.repo_root();

        if !self.config.clean.cmd.trim().is_empty() {
            let clean = ShellCommand::new("clean", &self.config.clean.cmd, root);
            let outcome = run_shell(&clean, &logs, self.cancel)?;
            if !outcome.success() {
                return Err(Error::CleanFailed {
                    status: outcome.status,
                    log: outcome.log,
                });
            }
        }

        let build = ShellCommand::new("build", &self.config.build.cmd, root);
        let outcome = run_shell(&build, &logs, self.cancel)?;
        if !outcome.success() {
            return Err(Error::BuildFailed {
                status: outcome.status,
                log: outcome.log,
            });
        }
        tracing::info!(elapsed_ms = outcome.elapsed.as_millis() as u64, "build finished");
        Ok(())
    }

    /// Perform `count` runs into `out_dir`, each at the next unused index
    pub fn runs(&self, out_dir: &Path, count: usize) -> Result<Vec<RunRecord>> {
        let mut records = Vec::with_capacity(count);
        for n in 0..count {
            self.cancel.check()?;
            tracing::info!("measurement run {}/{}", n + 1, count);
            records.push(self.run(out_dir, None)?);
        }
        Ok(records)
    }

    /// One event sweep into `out_dir/run_{index}` (next unused index when `None`)
    pub fn run(&self, out_dir: &Path, index: Option<usize>) -> Result<RunRecord> {
        let index = match index {
            Some(index) => index,
            None => next_run_index(out_dir)?,
        };
        let dir = run_dir(out_dir, index);
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let counters_src = self.work.counters();
        let events = load_counters(&counters_src)?;
        let counters_copy = dir.join(COUNTERS_FILE);
        fs::copy(&counters_src, &counters_copy).map_err(|e| Error::io(&counters_copy, e))?;
        tracing::info!(events = events.len(), "saving hardware telemetry to {}", dir.display());

        let result = self.sweep(&dir, index, events.len());
        if let Err(e) = fs::remove_file(&counters_copy) {
            tracing::warn!("could not remove {}: {}", counters_copy.display(), e);
        }
        result
    }

    fn sweep(&self, dir: &Path, index: usize, events: usize) -> Result<RunRecord> {
        let workload_dir = &self.config.workload.dir;
        let probe_output = workload_dir.join(PROBE_OUTPUT_FILE);
        let logs = self.work.logs_dir();
        let mut record = RunRecord {
            index,
            dir: dir.to_path_buf(),
            elapsed: Vec::with_capacity(events),
            missing: Vec::new(),
        };

        for event in 0..events {
            self.cancel.check()?;
            // a stale file from the previous event must not pass as this one's output
            match fs::remove_file(&probe_output) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(&probe_output, e)),
            }

            let cmd = ShellCommand::new("workload", &self.config.workload.cmd, workload_dir)
                .with_env(PROBE_EVENT_VAR, event.to_string());
            let outcome = run_shell(&cmd, &logs, self.cancel)?;
            if !outcome.success() {
                return Err(Error::WorkloadFailed {
                    status: outcome.status,
                    log: outcome.log,
                });
            }

            let data = match fs::read(&probe_output) {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("{}, writing empty placeholder", Error::ProbeOutputMissing(probe_output.clone()));
                    record.missing.push(event);
                    Vec::new()
                }
                Err(e) => return Err(Error::io(&probe_output, e)),
            };

            let target = dir.join(event_file_name(event));
            let mut file = fs::File::create(&target).map_err(|e| Error::io(&target, e))?;
            write!(
                file,
                "INPUT: {}\nTIME: {:.6}\n",
                self.config.workload.cmd,
                outcome.elapsed.as_secs_f64()
            )
            .and_then(|_| file.write_all(&data))
            .map_err(|e| Error::io(&target, e))?;

            tracing::debug!(event, elapsed_ms = outcome.elapsed.as_millis() as u64, "event traced");
            record.elapsed.push(outcome.elapsed);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(workload: &str, counters: &str) -> (TempDir, RepoConfig, WorkDir) {
        let tmp = TempDir::new().unwrap();
        let work = WorkDir::init(tmp.path(), false).unwrap();
        fs::write(work.counters(), counters).unwrap();
        let mut config = RepoConfig::template(tmp.path());
        config.build.cmd = "true".to_string();
        config.clean.cmd = String::new();
        config.workload.cmd = workload.to_string();
        config.workload.dir = tmp.path().to_path_buf();
        (tmp, config, work)
    }

    #[test]
    fn test_one_trace_per_event() {
        let (_tmp, config, work) = setup(
            "printf 'f,1,1,%s\\n' \"$PROBE_EVENT_INDEX\" > probe_data.csv",
            "E0\nE1\n# E2\nE3\n",
        );
        let cancel = CancelToken::new();
        let m = Measurement::new(&config, &work, &cancel);
        let record = m.run(&work.train_dir(), None).unwrap();

        assert_eq!(record.index, 0);
        assert_eq!(record.elapsed.len(), 3);
        assert!(record.missing.is_empty());
        let ev2 = fs::read_to_string(record.dir.join("event_2_probe_data.csv")).unwrap();
        let mut lines = ev2.lines();
        assert!(lines.next().unwrap().starts_with("INPUT: printf"));
        assert!(lines.next().unwrap().starts_with("TIME: "));
        assert_eq!(lines.next().unwrap(), "f,1,1,2");
        assert!(!record.dir.join(COUNTERS_FILE).exists());

        let second = m.run(&work.train_dir(), None).unwrap();
        assert_eq!(second.index, 1);
    }

    #[test]
    fn test_missing_output_writes_placeholder() {
        let (_tmp, config, work) = setup("true", "E0\n");
        let cancel = CancelToken::new();
        let record = Measurement::new(&config, &work, &cancel)
            .run(&work.detect_dir(), Some(4))
            .unwrap();
        assert_eq!(record.index, 4);
        assert_eq!(record.missing, vec![0]);
        let placeholder = fs::read_to_string(record.dir.join("event_0_probe_data.csv")).unwrap();
        assert_eq!(placeholder.lines().count(), 2);
    }

    #[test]
    fn test_empty_counters_is_noop_run() {
        let (_tmp, config, work) = setup("exit 1", "");
        let cancel = CancelToken::new();
        let record = Measurement::new(&config, &work, &cancel)
            .run(&work.train_dir(), None)
            .unwrap();
        assert!(record.elapsed.is_empty());
        assert!(record.dir.is_dir());
        assert_eq!(fs::read_dir(&record.dir).unwrap().count(), 0);
    }

    #[test]
    fn test_workload_failure_keeps_partial_traces() {
        let (_tmp, config, work) = setup(
            "if [ \"$PROBE_EVENT_INDEX\" = 1 ]; then exit 7; fi; echo 'f,1' > probe_data.csv",
            "E0\nE1\n",
        );
        let cancel = CancelToken::new();
        let err = Measurement::new(&config, &work, &cancel)
            .run(&work.train_dir(), None)
            .unwrap_err();
        assert!(matches!(err, Error::WorkloadFailed { status: 7, .. }));
        assert!(run_dir(&work.train_dir(), 0).join("event_0_probe_data.csv").exists());
    }

    #[test]
    fn test_build_and_clean_failures() {
        let (_tmp, mut config, work) = setup("true", "");
        let cancel = CancelToken::new();
        config.clean.cmd = "exit 3".to_string();
        let err = Measurement::new(&config, &work, &cancel).build().unwrap_err();
        assert!(matches!(err, Error::CleanFailed { status: 3, .. }));

        config.clean.cmd = String::new();
        config.build.cmd = "echo broken >&2; exit 2".to_string();
        match Measurement::new(&config, &work, &cancel).build().unwrap_err() {
            Error::BuildFailed { status, log } => {
                assert_eq!(status, 2);
                assert!(fs::read_to_string(log).unwrap().contains("broken"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_between_runs() {
        let (_tmp, config, work) = setup("true", "E0\n");
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Measurement::new(&config, &work, &cancel)
            .runs(&work.train_dir(), 3)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(!work.train_dir().exists());
    }
}
