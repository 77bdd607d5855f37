// Shared helpers for the integration tests
//
// Scratch repositories with a ready `.work/` and an in-memory version-control
// adapter that records what the pipeline asked of it.

#![allow(dead_code)]

use autoperf::config::RepoConfig;
use autoperf::hunkmap::HunkMap;
use autoperf::vcs::VersionControl;
use autoperf::workdir::WorkDir;
use autoperf::{Error, Result};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Two functions; `f` spans lines 2-6 and `g` lines 9-11
pub const A_C: &str = "int f(int x)
{
    if (x > 2)
        return x * 2;
    return x + 1;
}

int g(int y)
{
    return y - 1;
}
";

/// Workload emulating the probe library: ten calls of `f` and `g` per event
pub const PROBE_WORKLOAD: &str = "for i in 1 2 3 4 5 6 7 8 9 10; do \
echo \"f,$((i * 10 + ${PROBE_EVENT_INDEX}))\"; \
echo \"g,$((i + ${PROBE_EVENT_INDEX}))\"; \
done > probe_data.csv";

pub struct Scratch {
    pub tmp: TempDir,
    pub config: RepoConfig,
    pub work: WorkDir,
}

impl Scratch {
    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn source(&self) -> String {
        fs::read_to_string(self.root().join("a.c")).unwrap()
    }
}

/// Repository holding `a.c`, a fast config and the given `COUNTERS`
pub fn scratch_repo(workload: &str, counters: &str) -> Scratch {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.c"), A_C).unwrap();
    let work = WorkDir::init(tmp.path(), false).unwrap();
    fs::write(work.counters(), counters).unwrap();

    let mut config = RepoConfig::template(tmp.path());
    config.build.cmd = "true".to_string();
    config.clean.cmd = String::new();
    config.workload.cmd = workload.to_string();
    config.workload.dir = tmp.path().to_path_buf();
    config.model.hidden = vec![4];
    config.model.encoding = 1;
    config.training.epochs = 20;
    config.training.batch_size = 8;
    config.training.noise = 0.0;
    fs::write(work.config(), config.to_toml_string().unwrap()).unwrap();

    Scratch { tmp, config, work }
}

/// HunkMap touching `f` in `a.c`
pub fn f_changed() -> HunkMap {
    let mut map = HunkMap::new();
    map.insert("a.c", 3);
    map
}

/// Version control double: branch names only, no working tree changes
#[derive(Debug, Default)]
pub struct FakeVcs {
    pub current: String,
    pub previous: Option<String>,
    pub maps: (HunkMap, HunkMap),
    pub calls: Vec<String>,
    /// Stash succeeds, then the checkout fails
    pub fail_checkout: bool,
}

impl FakeVcs {
    pub fn on_branch(branch: &str, maps: (HunkMap, HunkMap)) -> Self {
        Self {
            current: branch.to_string(),
            maps,
            ..Self::default()
        }
    }
}

impl VersionControl for FakeVcs {
    fn current_branch(&self) -> Result<String> {
        Ok(self.current.clone())
    }

    fn hunkmaps(&self, base: &str, head: &str) -> Result<(HunkMap, HunkMap)> {
        if base == head {
            return Ok((HunkMap::new(), HunkMap::new()));
        }
        Ok(self.maps.clone())
    }

    fn stash_and_checkout(&mut self, target: &str) -> Result<()> {
        self.calls.push(format!("stash+checkout {}", target));
        if self.fail_checkout {
            self.previous = Some(self.current.clone());
            return Err(Error::Vcs(format!("git checkout {} failed", target)));
        }
        self.previous = Some(std::mem::replace(&mut self.current, target.to_string()));
        Ok(())
    }

    fn restore_previous(&mut self) -> Result<()> {
        self.calls.push("restore".to_string());
        if let Some(previous) = self.previous.take() {
            self.current = previous;
        }
        Ok(())
    }

    fn pop_stash(&mut self) -> Result<()> {
        self.calls.push("pop".to_string());
        Ok(())
    }
}
