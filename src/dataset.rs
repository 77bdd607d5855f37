//! Loading measurement runs into feature matrices
//!
//! Each `event_{i}_probe_data.csv` of a run holds one counter value per
//! probed call. Rows of the different events are aligned per function by
//! occurrence: the k-th call of `f` under event 0 lines up with the k-th
//! call of `f` under every other event. The result has one row per aligned
//! call and one column per event.

use crate::error::{Error, Result};
use crate::workdir::list_runs;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One probed call from an event trace
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    pub function: String,
    pub value: f64,
}

/// Parse the text of an event trace
///
/// `INPUT:`/`TIME:` header lines are skipped, as is any line whose last
/// comma-separated field is not a finite number (such as the CSV column header).
pub fn parse_trace(content: &str) -> Vec<TraceRow> {
    content
        .lines()
        .filter(|line| !line.starts_with("INPUT:") && !line.starts_with("TIME:"))
        .filter_map(|line| {
            let mut fields = line.split(',');
            let function = fields.next()?.trim();
            let value = fields
                .last()?
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())?;
            if function.is_empty() {
                return None;
            }
            Some(TraceRow {
                function: function.to_string(),
                value,
            })
        })
        .collect()
}

/// Rows of counter values labelled by function
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    functions: Vec<String>,
    rows: Vec<Vec<f64>>,
    columns: usize,
}

impl FeatureMatrix {
    pub fn new(columns: usize) -> Self {
        Self {
            functions: Vec::new(),
            rows: Vec::new(),
            columns,
        }
    }

    /// Build from labelled rows, which must all have the same width
    pub fn from_rows(functions: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let columns = rows.first().map(Vec::len).unwrap_or(0);
        if functions.len() != rows.len() {
            return Err(Error::Model(format!(
                "{} labels for {} rows",
                functions.len(),
                rows.len()
            )));
        }
        if let Some(bad) = rows.iter().position(|r| r.len() != columns) {
            return Err(Error::Model(format!(
                "row {} has {} columns, expected {}",
                bad,
                rows[bad].len(),
                columns
            )));
        }
        Ok(Self {
            functions,
            rows,
            columns,
        })
    }

    pub fn push(&mut self, function: impl Into<String>, row: Vec<f64>) {
        debug_assert_eq!(row.len(), self.columns);
        self.functions.push(function.into());
        self.rows.push(row);
    }

    /// Append the rows of `other`; an empty matrix adopts its width
    pub fn extend(&mut self, other: &FeatureMatrix) -> Result<()> {
        if self.rows.is_empty() && self.columns != other.columns {
            self.columns = other.columns;
        }
        if !other.rows.is_empty() && other.columns != self.columns {
            return Err(Error::NoTrainingData(format!(
                "runs disagree on event count ({} vs {})",
                self.columns, other.columns
            )));
        }
        self.functions.extend(other.functions.iter().cloned());
        self.rows.extend(other.rows.iter().cloned());
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    /// Same labels, new values (used after scaling)
    pub fn with_rows(&self, rows: Vec<Vec<f64>>) -> Self {
        Self {
            functions: self.functions.clone(),
            rows,
            columns: self.columns,
        }
    }
}

/// Align the traces of one run (index = event number) into a matrix
pub fn align(events: &[Vec<TraceRow>]) -> FeatureMatrix {
    let mut matrix = FeatureMatrix::new(events.len());
    if events.is_empty() {
        return matrix;
    }

    let per_event: Vec<BTreeMap<&str, Vec<f64>>> = events
        .iter()
        .map(|rows| {
            let mut by_function: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
            for row in rows {
                by_function.entry(row.function.as_str()).or_default().push(row.value);
            }
            by_function
        })
        .collect();

    for (function, first) in &per_event[0] {
        let mut occurrences = first.len();
        for other in &per_event[1..] {
            occurrences = occurrences.min(other.get(function).map_or(0, Vec::len));
        }
        for k in 0..occurrences {
            let row = per_event.iter().map(|event| event[function][k]).collect();
            matrix.push(*function, row);
        }
    }
    matrix
}

/// `event_{i}_*` files of a run directory, ordered by event index
pub fn event_files(run: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(run).map_err(|e| Error::io(run, e))? {
        let entry = entry.map_err(|e| Error::io(run, e))?;
        let name = entry.file_name();
        let Some(index) = name
            .to_str()
            .and_then(|n| n.strip_prefix("event_"))
            .and_then(|rest| rest.split('_').next())
            .and_then(|i| i.parse::<usize>().ok())
        else {
            continue;
        };
        files.push((index, entry.path()));
    }
    files.sort();
    Ok(files)
}

/// Load one run; `None` when it has the wrong event count or no aligned rows
pub fn load_run(run: &Path, expected_events: usize) -> Result<Option<FeatureMatrix>> {
    let files = event_files(run)?;
    if files.len() != expected_events {
        tracing::warn!(
            "skipping {}: {} event traces, expected {}",
            run.display(),
            files.len(),
            expected_events
        );
        return Ok(None);
    }
    let mut traces = Vec::with_capacity(files.len());
    for (_, path) in &files {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        traces.push(parse_trace(&content));
    }
    let matrix = align(&traces);
    if matrix.is_empty() {
        tracing::warn!("skipping {}: no aligned rows", run.display());
        return Ok(None);
    }
    Ok(Some(matrix))
}

/// A loaded run directory
#[derive(Debug, Clone)]
pub struct RunMatrix {
    pub index: usize,
    pub dir: PathBuf,
    pub matrix: FeatureMatrix,
}

/// All usable runs below a `train/`, `detect/` or evaluation directory
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub runs: Vec<RunMatrix>,
}

impl Dataset {
    /// Load every `run_N` below `dir`
    ///
    /// `expected_events` comes from `COUNTERS` when known; otherwise the
    /// largest event count among the runs is expected.
    pub fn load(dir: &Path, expected_events: Option<usize>) -> Result<Self> {
        let runs = list_runs(dir)?;
        let expected = match expected_events {
            Some(n) => n,
            None => {
                let mut most = 0;
                for (_, path) in &runs {
                    most = most.max(event_files(path)?.len());
                }
                most
            }
        };

        let mut dataset = Dataset::default();
        for (index, path) in runs {
            if let Some(matrix) = load_run(&path, expected)? {
                dataset.runs.push(RunMatrix {
                    index,
                    dir: path,
                    matrix,
                });
            }
        }
        tracing::debug!(dir = %dir.display(), runs = dataset.runs.len(), rows = dataset.n_rows(), "loaded dataset");
        Ok(dataset)
    }

    pub fn n_rows(&self) -> usize {
        self.runs.iter().map(|r| r.matrix.n_rows()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// All runs stacked into one matrix
    pub fn concat(&self) -> Result<FeatureMatrix> {
        let mut all = FeatureMatrix::default();
        for run in &self.runs {
            all.extend(&run.matrix)?;
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workdir::run_dir;
    use tempfile::TempDir;

    fn write_run(dir: &Path, index: usize, events: &[&str]) {
        let run = run_dir(dir, index);
        fs::create_dir_all(&run).unwrap();
        for (i, body) in events.iter().enumerate() {
            let text = format!("INPUT: ./bench\nTIME: 0.5\n{}", body);
            fs::write(run.join(format!("event_{}_probe_data.csv", i)), text).unwrap();
        }
    }

    #[test]
    fn test_parse_trace_skips_headers() {
        let text = "INPUT: ./w\nTIME: 1.25\nMark_id, NTHREADS,PAPI_TOT_INS, E0\nf,1,100,7\ng,1,90,not-a-number\n\nh, 2, 3, 4.5\n";
        let rows = parse_trace(text);
        assert_eq!(
            rows,
            vec![
                TraceRow {
                    function: "f".into(),
                    value: 7.0
                },
                TraceRow {
                    function: "h".into(),
                    value: 4.5
                },
            ]
        );
    }

    #[test]
    fn test_parse_trace_drops_non_finite_counters() {
        let rows = parse_trace("f,nan\nf,inf\nf,-inf\nf,NaN\nf,3\n");
        assert_eq!(
            rows,
            vec![TraceRow {
                function: "f".into(),
                value: 3.0
            }]
        );
    }

    #[test]
    fn test_alignment_by_occurrence() {
        let e0 = parse_trace("f,1\nf,2\ng,3\nonly0,9\n");
        let e1 = parse_trace("g,30\nf,10\nf,20\nf,40\n");
        let m = align(&[e0, e1]);
        assert_eq!(m.n_cols(), 2);
        assert_eq!(m.functions(), &["f", "f", "g"]);
        assert_eq!(m.rows(), &[vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]]);
    }

    #[test]
    fn test_dataset_skips_bad_runs() {
        let tmp = TempDir::new().unwrap();
        write_run(tmp.path(), 0, &["f,1\n", "f,2\n"]);
        write_run(tmp.path(), 1, &["f,1\n"]);
        write_run(tmp.path(), 2, &["", ""]);
        write_run(tmp.path(), 3, &["g,5\ng,6\n", "g,7\ng,8\n"]);

        let data = Dataset::load(tmp.path(), Some(2)).unwrap();
        let indices: Vec<usize> = data.runs.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 3]);
        assert_eq!(data.n_rows(), 3);
        let all = data.concat().unwrap();
        assert_eq!(all.n_cols(), 2);
        assert_eq!(all.functions(), &["f", "g", "g"]);
    }

    #[test]
    fn test_expected_events_inferred() {
        let tmp = TempDir::new().unwrap();
        write_run(tmp.path(), 0, &["f,1\n", "f,2\n", "f,3\n"]);
        write_run(tmp.path(), 1, &["f,1\n"]);
        let data = Dataset::load(tmp.path(), None).unwrap();
        assert_eq!(data.runs.len(), 1);
        assert_eq!(data.runs[0].matrix.n_cols(), 3);
    }

    #[test]
    fn test_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let data = Dataset::load(&tmp.path().join("missing"), None).unwrap();
        assert!(data.is_empty());
    }
}
