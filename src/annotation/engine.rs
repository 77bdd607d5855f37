//! File discovery and the parallel annotation driver
//!
//! Files are queued deepest path first and drained by a fixed set of scoped
//! worker threads. Each worker owns the file it popped; results come back
//! through an append-only queue and are reported in queue order.

use super::inject::{erase, inject, EditKind, Selection};
use super::SourceParser;
use crate::error::{Error, Result};
use crate::hunkmap::HunkMap;
use crate::workdir::WORK_DIR;
use crossbeam::queue::SegQueue;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions treated as C/C++ sources when scanning directories
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "h", "cc", "hh", "cpp", "hpp", "cxx", "hxx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotateMode {
    Inject,
    Erase,
}

#[derive(Debug, Clone)]
pub struct AnnotateOptions {
    /// Files or directories, relative paths resolve against the repository root
    pub paths: Vec<PathBuf>,
    pub mode: AnnotateMode,
    pub recursive: bool,
    /// Restrict work to these files (and, on inject, to functions touching these lines)
    pub only: Option<HunkMap>,
    pub workers: usize,
}

impl AnnotateOptions {
    pub fn new(paths: Vec<PathBuf>, mode: AnnotateMode) -> Self {
        Self {
            paths,
            mode,
            recursive: false,
            only: None,
            workers: default_workers(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn only(mut self, only: Option<HunkMap>) -> Self {
        self.only = only;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// Worker count matching the machine's available cores
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// Path relative to the repository root
    pub path: PathBuf,
    /// Function definitions found (inject only)
    pub functions: usize,
    /// Functions that received markers (inject only)
    pub annotated: usize,
    /// Marker tokens inserted or removed
    pub markers: usize,
    pub parse_error: Option<String>,
}

impl FileOutcome {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            functions: 0,
            annotated: 0,
            markers: 0,
            parse_error: None,
        }
    }

    pub fn modified(&self) -> bool {
        self.markers > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    /// Outcomes in processing order (deepest path first)
    pub files: Vec<FileOutcome>,
}

impl AnnotationSummary {
    pub fn modified_files(&self) -> usize {
        self.files.iter().filter(|f| f.modified()).count()
    }

    pub fn markers(&self) -> usize {
        self.files.iter().map(|f| f.markers).sum()
    }

    pub fn annotated_functions(&self) -> usize {
        self.files.iter().map(|f| f.annotated).sum()
    }

    pub fn parse_failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.parse_error.is_some())
    }
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
}

fn is_skipped_dir(name: &str) -> bool {
    name == WORK_DIR || name == ".git"
}

/// Expand `paths` into the source files to process, deepest first
///
/// Explicit file arguments are kept whatever their extension; directories
/// contribute files with a C/C++ extension, descending only when
/// `recursive` is set.
pub fn discover_sources(root: &Path, paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();
    for path in paths {
        let path = if path.is_relative() { root.join(path) } else { path.clone() };
        let meta = fs::metadata(&path).map_err(|e| Error::io(&path, e))?;
        if meta.is_file() {
            found.insert(path);
            continue;
        }

        let depth = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&path)
            .max_depth(depth)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_str().is_some_and(is_skipped_dir));
        for entry in walker {
            let entry = entry.map_err(|e| {
                let at = e.path().unwrap_or(&path).to_path_buf();
                Error::io(at, e.into())
            })?;
            if entry.file_type().is_file() && has_source_extension(entry.path()) {
                found.insert(entry.into_path());
            }
        }
    }

    let mut files: Vec<PathBuf> = found.into_iter().collect();
    // Stable: equal depths keep path order
    files.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    Ok(files)
}

/// Key of `path` in a HunkMap: root-relative with `/` separators
pub fn hunk_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Run the annotation engine over `options.paths`
///
/// Parse failures are reported per file and skipped. The first I/O error
/// aborts the run once all workers have drained the queue.
pub fn annotate(root: &Path, options: &AnnotateOptions, parser: &dyn SourceParser) -> Result<AnnotationSummary> {
    let files = discover_sources(root, &options.paths, options.recursive)?;

    let jobs = SegQueue::new();
    let mut queued = 0;
    for path in files {
        let key = hunk_key(root, &path);
        if let Some(only) = &options.only {
            if !only.contains_file(&key) {
                continue;
            }
        }
        jobs.push((queued, path, key));
        queued += 1;
    }

    let workers = options.workers.clamp(1, queued.max(1));
    tracing::debug!(files = queued, workers, mode = ?options.mode, "annotating");

    let results = SegQueue::new();
    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                while let Some((idx, path, key)) = jobs.pop() {
                    let outcome = process_file(&path, &key, options, parser);
                    results.push((idx, outcome));
                }
            });
        }
    });

    let mut collected: Vec<(usize, Result<FileOutcome>)> = std::iter::from_fn(|| results.pop()).collect();
    collected.sort_by_key(|(idx, _)| *idx);

    let mut summary = AnnotationSummary::default();
    for (_, outcome) in collected {
        summary.files.push(outcome?);
    }
    Ok(summary)
}

fn process_file(path: &Path, key: &str, options: &AnnotateOptions, parser: &dyn SourceParser) -> Result<FileOutcome> {
    let source = fs::read(path).map_err(|e| Error::io(path, e))?;
    let mut outcome = FileOutcome::new(PathBuf::from(key));

    let rewritten = match options.mode {
        AnnotateMode::Erase => {
            let (output, removed) = erase(&source);
            outcome.markers = removed.len();
            output
        }
        AnnotateMode::Inject => {
            let functions = match parser.parse(&source) {
                Ok(functions) => functions,
                Err(e) => {
                    let err = Error::ParseFailed {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}, skipping", err);
                    outcome.parse_error = Some(e.to_string());
                    return Ok(outcome);
                }
            };
            let selection = match &options.only {
                Some(only) => Selection::Lines(only.lines(key).unwrap_or(&[])),
                None => Selection::All,
            };
            let (output, journal) = inject(&source, &functions, &selection);
            outcome.functions = functions.len();
            outcome.annotated = journal.iter().filter(|e| e.kind == EditKind::Start).count();
            outcome.markers = journal.len();
            output
        }
    };

    if outcome.modified() {
        fs::write(path, &rewritten).map_err(|e| Error::io(path, e))?;
        tracing::debug!(file = key, markers = outcome.markers, "rewrote");
    }
    Ok(outcome)
}
