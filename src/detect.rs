//! Anomaly detection, labelled evaluation and report rendering
//!
//! Detection scores the candidate measurements under `detect/` with the
//! persisted model and judges each function by its mean reconstruction
//! error against θ. Evaluation classifies whole runs of two labelled
//! directories and derives precision, recall and F1.

use crate::config::RepoConfig;
use crate::dataset::{Dataset, FeatureMatrix};
use crate::error::{Error, Result};
use crate::model_persistence::model_status_line;
use crate::threshold::ErrorSummary;
use crate::train::{expected_events, TrainedArtifacts};
use crate::workdir::WorkDir;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Nominal,
    Anomalous,
}

impl Verdict {
    fn judge(error: f64, threshold: f64) -> Self {
        if error > threshold {
            Verdict::Anomalous
        } else {
            Verdict::Nominal
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Nominal => f.write_str("nominal"),
            Verdict::Anomalous => f.write_str("anomalous"),
        }
    }
}

/// Reconstruction errors of one function, accumulated over rows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorGroup {
    pub rows: usize,
    pub sum: f64,
    pub over_threshold: usize,
}

impl ErrorGroup {
    pub fn mean(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.sum / self.rows as f64
        }
    }
}

/// Group row errors by the function that produced each row
pub fn group_errors(functions: &[String], errors: &[f64], threshold: f64) -> BTreeMap<String, ErrorGroup> {
    let mut groups: BTreeMap<String, ErrorGroup> = BTreeMap::new();
    for (function, &error) in functions.iter().zip(errors) {
        let group = groups.entry(function.clone()).or_default();
        group.rows += 1;
        group.sum += error;
        if error > threshold {
            group.over_threshold += 1;
        }
    }
    groups
}

/// Row totals of one dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub rows: usize,
    pub over_threshold: usize,
}

impl RowCounts {
    fn of(errors: &[f64], threshold: f64) -> Self {
        Self {
            rows: errors.len(),
            over_threshold: errors.iter().filter(|&&e| e > threshold).count(),
        }
    }
}

/// Verdict for one function of the candidate
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionScore {
    pub function: String,
    /// Mean error on the training set; `None` for functions new in the candidate
    pub nominal_error: Option<f64>,
    pub candidate_error: f64,
    pub rows: usize,
    pub over_threshold: usize,
    pub verdict: Verdict,
}

impl FunctionScore {
    pub fn is_new(&self) -> bool {
        self.nominal_error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionReport {
    pub threshold: f64,
    pub functions: Vec<FunctionScore>,
    pub nominal: RowCounts,
    pub candidate: RowCounts,
}

impl DetectionReport {
    /// Judge every candidate function against `threshold`
    pub fn from_errors(
        threshold: f64,
        nominal: (&[String], &[f64]),
        candidate: (&[String], &[f64]),
    ) -> Self {
        let baseline = group_errors(nominal.0, nominal.1, threshold);
        let functions = group_errors(candidate.0, candidate.1, threshold)
            .into_iter()
            .map(|(function, group)| {
                let candidate_error = group.mean();
                FunctionScore {
                    nominal_error: baseline.get(&function).map(ErrorGroup::mean),
                    verdict: Verdict::judge(candidate_error, threshold),
                    candidate_error,
                    rows: group.rows,
                    over_threshold: group.over_threshold,
                    function,
                }
            })
            .collect();
        Self {
            threshold,
            functions,
            nominal: RowCounts::of(nominal.1, threshold),
            candidate: RowCounts::of(candidate.1, threshold),
        }
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &FunctionScore> {
        self.functions.iter().filter(|f| f.verdict == Verdict::Anomalous)
    }

    pub fn to_report_string(&self) -> String {
        let mut report = String::new();
        let anomalous: Vec<&str> = self.anomalies().map(|f| f.function.as_str()).collect();
        if anomalous.is_empty() {
            report.push_str("NO PERFORMANCE ANOMALY DETECTED\n\n");
        } else {
            report.push_str(&format!(
                "PERFORMANCE ANOMALY DETECTED ({} functions)\n\n",
                anomalous.len()
            ));
            report.push_str(&format!("Anomalous functions: {}\n", anomalous.join(", ")));
        }
        report.push_str(&format!("Threshold: {:.6e}\n", self.threshold));
        report.push_str(&format!(
            "Nominal rows above threshold: {}/{}\n",
            self.nominal.over_threshold, self.nominal.rows
        ));
        report.push_str(&format!(
            "Candidate rows above threshold: {}/{}\n",
            self.candidate.over_threshold, self.candidate.rows
        ));

        report.push_str(&format!("\nFunctions ({}):\n", self.functions.len()));
        if !self.functions.is_empty() {
            report.push_str(&format!(
                "  {:<32} {:>14} {:>14} {:>8} {:>8}  {}\n",
                "function", "nominal", "candidate", "rows", ">θ", "verdict"
            ));
        }
        for f in &self.functions {
            let nominal = f
                .nominal_error
                .map(|e| format!("{:.6e}", e))
                .unwrap_or_else(|| "-".to_string());
            let note = if f.is_new() { " (new in candidate)" } else { "" };
            report.push_str(&format!(
                "  {:<32} {:>14} {:>14.6e} {:>8} {:>8}  {}{}\n",
                f.function, nominal, f.candidate_error, f.rows, f.over_threshold, f.verdict, note
            ));
        }
        report
    }
}

/// Score `detect_dir` against `train_dir` with the persisted model
///
/// An empty candidate set yields an empty report without touching the
/// model, so a run with nothing annotated passes through cleanly.
pub fn detect(work: &WorkDir, train_dir: &Path, detect_dir: &Path) -> Result<DetectionReport> {
    let expected = expected_events(work)?;
    let candidate = Dataset::load(detect_dir, expected)?.concat()?;
    if candidate.is_empty() {
        tracing::info!(dir = %detect_dir.display(), "no candidate rows, nothing to judge");
        let threshold = if TrainedArtifacts::exists(work) {
            crate::threshold::read_threshold(&work.threshold())?
        } else {
            f64::NAN
        };
        return Ok(DetectionReport::from_errors(threshold, (&[], &[]), (&[], &[])));
    }

    let artifacts = TrainedArtifacts::load(work)?;
    tracing::info!("{}", model_status_line(&artifacts.metadata));
    let nominal = Dataset::load(train_dir, expected)?.concat()?;
    let nominal_errors = artifacts.errors(&nominal)?;
    let candidate_errors = artifacts.errors(&candidate)?;

    let report = DetectionReport::from_errors(
        artifacts.threshold,
        (nominal.functions(), &nominal_errors),
        (candidate.functions(), &candidate_errors),
    );
    for f in report.anomalies() {
        tracing::warn!(
            function = %f.function,
            error = f.candidate_error,
            threshold = report.threshold,
            "anomalous function"
        );
    }
    Ok(report)
}

/// Write a rendered report to `.work/report`
pub fn write_report(work: &WorkDir, text: &str) -> Result<PathBuf> {
    work.ensure()?;
    let path = work.report();
    fs::write(&path, text).map_err(|e| Error::io(&path, e))?;
    tracing::info!("report written to {}", path.display());
    Ok(path)
}

/// Classification of one labelled test run
#[derive(Debug, Clone, PartialEq)]
pub struct RunScore {
    pub dir: PathBuf,
    pub counts: RowCounts,
    pub labelled_anomalous: bool,
    pub predicted_anomalous: bool,
}

impl RunScore {
    /// Fraction of rows above θ
    pub fn ratio(&self) -> f64 {
        if self.counts.rows == 0 {
            0.0
        } else {
            self.counts.over_threshold as f64 / self.counts.rows as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn record(&mut self, labelled_anomalous: bool, predicted_anomalous: bool) {
        match (labelled_anomalous, predicted_anomalous) {
            (true, true) => self.true_positives += 1,
            (false, true) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (true, false) => self.false_negatives += 1,
        }
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub threshold: f64,
    pub run_ratio: f64,
    pub train: ErrorSummary,
    pub runs: Vec<RunScore>,
    pub matrix: ConfusionMatrix,
}

impl EvaluationReport {
    pub fn new(threshold: f64, run_ratio: f64, train: ErrorSummary) -> Self {
        Self {
            threshold,
            run_ratio,
            train,
            runs: Vec::new(),
            matrix: ConfusionMatrix::default(),
        }
    }

    /// Classify one run from its row errors
    pub fn add_run(&mut self, dir: PathBuf, errors: &[f64], labelled_anomalous: bool) {
        let counts = RowCounts::of(errors, self.threshold);
        let mut score = RunScore {
            dir,
            counts,
            labelled_anomalous,
            predicted_anomalous: false,
        };
        score.predicted_anomalous = score.ratio() > self.run_ratio;
        self.matrix.record(labelled_anomalous, score.predicted_anomalous);
        self.runs.push(score);
    }

    pub fn to_report_string(&self) -> String {
        let m = &self.matrix;
        let mut report = String::from("EVALUATION\n\n");
        report.push_str(&format!("Threshold: {:.6e}\n", self.threshold));
        report.push_str(&format!("Run ratio: {}\n", self.run_ratio));
        report.push_str(&format!(
            "Training errors: {} rows, mean {:.6e}, max {:.6e}\n",
            self.train.count, self.train.mean, self.train.max
        ));

        report.push_str(&format!("\nRuns ({}):\n", self.runs.len()));
        for run in &self.runs {
            let label = if run.labelled_anomalous { "anomalous" } else { "nominal" };
            let predicted = if run.predicted_anomalous { "anomalous" } else { "nominal" };
            report.push_str(&format!(
                "  {} [{}] {}/{} rows above threshold -> {}\n",
                run.dir.display(),
                label,
                run.counts.over_threshold,
                run.counts.rows,
                predicted
            ));
        }

        report.push_str("\nConfusion matrix:\n");
        report.push_str(&format!("  true positives:  {}\n", m.true_positives));
        report.push_str(&format!("  false positives: {}\n", m.false_positives));
        report.push_str(&format!("  true negatives:  {}\n", m.true_negatives));
        report.push_str(&format!("  false negatives: {}\n", m.false_negatives));
        report.push_str(&format!("\nPrecision: {:.4}\n", m.precision()));
        report.push_str(&format!("Recall: {:.4}\n", m.recall()));
        report.push_str(&format!("F1: {:.4}\n", m.f1()));
        report
    }
}

fn score_runs(
    report: &mut EvaluationReport,
    artifacts: &TrainedArtifacts,
    dir: &Path,
    expected: Option<usize>,
    labelled_anomalous: bool,
) -> Result<()> {
    for run in Dataset::load(dir, expected)?.runs {
        let errors = artifacts.errors(&run.matrix)?;
        report.add_run(run.dir, &errors, labelled_anomalous);
    }
    Ok(())
}

/// Evaluate the persisted model on labelled nominal and anomalous runs
pub fn evaluate(
    config: &RepoConfig,
    work: &WorkDir,
    train_dir: &Path,
    nominal_dir: &Path,
    anomalous_dir: &Path,
) -> Result<EvaluationReport> {
    let artifacts = TrainedArtifacts::load(work)?;
    tracing::info!("{}", model_status_line(&artifacts.metadata));
    let expected = expected_events(work)?;

    let train: FeatureMatrix = Dataset::load(train_dir, expected)?.concat()?;
    let train_errors = artifacts.errors(&train)?;
    let mut report = EvaluationReport::new(
        artifacts.threshold,
        config.detection.run_ratio,
        ErrorSummary::of(&train_errors),
    );
    score_runs(&mut report, &artifacts, nominal_dir, expected, false)?;
    score_runs(&mut report, &artifacts, anomalous_dir, expected, true)?;

    tracing::info!(
        precision = report.matrix.precision(),
        recall = report.matrix.recall(),
        f1 = report.matrix.f1(),
        "evaluation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_verdict_is_strictly_above_threshold() {
        let nominal = names(&["f", "g"]);
        let candidate = names(&["f", "f", "g", "h"]);
        let report = DetectionReport::from_errors(
            0.5,
            (&nominal, &[0.1, 0.2]),
            (&candidate, &[0.4, 0.8, 0.5, 0.9]),
        );
        let by_name: BTreeMap<&str, &FunctionScore> =
            report.functions.iter().map(|f| (f.function.as_str(), f)).collect();

        assert_eq!(by_name["f"].verdict, Verdict::Anomalous);
        assert!((by_name["f"].candidate_error - 0.6).abs() < 1e-12);
        assert_eq!(by_name["f"].over_threshold, 1);
        assert_eq!(by_name["g"].verdict, Verdict::Nominal);
        assert_eq!(by_name["h"].verdict, Verdict::Anomalous);
        assert!(by_name["h"].is_new());
        assert!(!by_name["f"].is_new());

        for f in report.anomalies() {
            assert!(f.candidate_error > report.threshold);
        }
        assert_eq!(report.candidate, RowCounts { rows: 4, over_threshold: 2 });
        assert_eq!(report.nominal, RowCounts { rows: 2, over_threshold: 0 });
    }

    #[test]
    fn test_report_text() {
        let candidate = names(&["solve"]);
        let report = DetectionReport::from_errors(0.01, (&[], &[]), (&candidate, &[0.02]));
        let text = report.to_report_string();
        assert!(text.starts_with("PERFORMANCE ANOMALY DETECTED (1 functions)"));
        assert!(text.contains("Anomalous functions: solve"));
        assert!(text.contains("(new in candidate)"));
        assert!(text.contains("Candidate rows above threshold: 1/1"));
    }

    #[test]
    fn test_empty_report() {
        let report = DetectionReport::from_errors(0.3, (&[], &[]), (&[], &[]));
        let text = report.to_report_string();
        assert!(text.starts_with("NO PERFORMANCE ANOMALY DETECTED"));
        assert!(text.contains("Functions (0):"));
        assert_eq!(report.functions.len(), 0);
    }

    #[test]
    fn test_perfect_separation() {
        let mut report = EvaluationReport::new(1.0, 0.05, ErrorSummary::default());
        for i in 0..10 {
            report.add_run(PathBuf::from(format!("nominal/run_{}", i)), &[0.2, 0.9, 1.0], false);
        }
        for i in 0..10 {
            report.add_run(PathBuf::from(format!("anomalous/run_{}", i)), &[1.5, 3.0], true);
        }
        let m = report.matrix;
        assert_eq!(m.true_positives, 10);
        assert_eq!(m.true_negatives, 10);
        assert_eq!(m.precision(), 1.0);
        assert_eq!(m.recall(), 1.0);
        assert_eq!(m.f1(), 1.0);
        assert!(report.to_report_string().contains("F1: 1.0000"));
    }

    #[test]
    fn test_run_ratio_boundary() {
        let mut report = EvaluationReport::new(1.0, 0.25, ErrorSummary::default());
        // exactly at the ratio is not anomalous
        report.add_run(PathBuf::from("a"), &[2.0, 0.0, 0.0, 0.0], true);
        report.add_run(PathBuf::from("b"), &[2.0, 2.0, 0.0, 0.0], true);
        assert!(!report.runs[0].predicted_anomalous);
        assert!(report.runs[1].predicted_anomalous);
        assert_eq!(report.matrix.false_negatives, 1);
        assert_eq!(report.matrix.true_positives, 1);
    }

    #[test]
    fn test_zero_denominators() {
        let m = ConfusionMatrix::default();
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.recall(), 0.0);
        assert_eq!(m.f1(), 0.0);
    }
}
