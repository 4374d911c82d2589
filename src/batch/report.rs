//! Batch results and their JSON report.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::algo::metrics::QualityMetrics;
use crate::error::Result;
use crate::io::write_atomic;

/// Final state of one file in a batch.
///
/// There are no queued or running states: a [`FileResult`] is built only once
/// its file is settled. While a batch runs, files still waiting are those
/// without a progress completion yet, and cancelling the batch turns them
/// into [`FileStatus::Skipped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Unwrapped and saved.
    Succeeded,
    /// Loading, unwrapping or saving failed, or the output path was taken.
    Failed,
    /// Never started because the batch was cancelled.
    Skipped,
}

/// Outcome of one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    /// Input path.
    pub file: PathBuf,
    /// Written output, for succeeded files.
    pub output: Option<PathBuf>,
    /// Final state.
    pub status: FileStatus,
    /// Input vertex count (0 if the file could not be loaded).
    pub vertices: usize,
    /// Input triangle count (0 if the file could not be loaded).
    pub triangles: usize,
    /// Number of islands.
    pub islands: usize,
    /// Wall time spent on this file, in seconds.
    pub time: f64,
    /// Quality of the unwrap, for succeeded files.
    pub metrics: Option<QualityMetrics>,
    /// Failure cause, for failed files.
    pub error: Option<String>,
}

impl FileResult {
    /// A file that was never processed.
    pub fn skipped(file: PathBuf) -> Self {
        Self {
            file,
            output: None,
            status: FileStatus::Skipped,
            vertices: 0,
            triangles: 0,
            islands: 0,
            time: 0.0,
            metrics: None,
            error: None,
        }
    }

    /// A file that failed with `error`.
    pub fn failed(file: PathBuf, error: String, time: f64) -> Self {
        Self {
            status: FileStatus::Failed,
            error: Some(error),
            time,
            ..Self::skipped(file)
        }
    }

    /// Whether the file succeeded.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Succeeded
    }
}

/// Aggregate over a batch.
///
/// Counts cover every file; times and quality averages cover succeeded files
/// only and are `None` when nothing succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Files submitted.
    pub total: usize,
    /// Files unwrapped and saved.
    pub succeeded: usize,
    /// Files that failed.
    pub failed: usize,
    /// Files not started because of cancellation.
    pub skipped: usize,
    /// Wall time of the whole batch, in seconds.
    pub total_time: f64,
    /// Mean per-file time over succeeded files.
    pub avg_time: Option<f64>,
    /// Mean of the per-file average stretch.
    pub avg_stretch: Option<f64>,
    /// Largest per-triangle stretch over all succeeded files.
    pub max_stretch: Option<f64>,
    /// Mean coverage.
    pub avg_coverage: Option<f64>,
}

impl BatchSummary {
    /// Aggregate per-file results. Independent of their order.
    pub fn from_results(files: &[FileResult], total_time: f64) -> Self {
        let count = |status: FileStatus| files.iter().filter(|f| f.status == status).count();
        let succeeded: Vec<&FileResult> = files.iter().filter(|f| f.is_success()).collect();

        let mean = |values: Vec<f64>| {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };
        let metrics: Vec<&QualityMetrics> =
            succeeded.iter().filter_map(|f| f.metrics.as_ref()).collect();

        Self {
            total: files.len(),
            succeeded: succeeded.len(),
            failed: count(FileStatus::Failed),
            skipped: count(FileStatus::Skipped),
            total_time,
            avg_time: mean(succeeded.iter().map(|f| f.time).collect()),
            avg_stretch: mean(metrics.iter().map(|m| m.stretch.avg).collect()),
            max_stretch: metrics.iter().map(|m| m.stretch.max).reduce(f64::max),
            avg_coverage: mean(metrics.iter().map(|m| m.coverage).collect()),
        }
    }
}

/// Everything a batch run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Aggregate statistics.
    pub summary: BatchSummary,
    /// One entry per input file, in input order.
    pub files: Vec<FileResult>,
}

impl BatchReport {
    /// Build a report from per-file results.
    pub fn new(files: Vec<FileResult>, total_time: f64) -> Self {
        Self {
            summary: BatchSummary::from_results(&files, total_time),
            files,
        }
    }

    /// Write the report as pretty-printed JSON.
    pub fn save_report<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomic(path.as_ref(), |w| {
            serde_json::to_writer_pretty(&mut *w, self)?;
            Ok(())
        })
    }

    /// Failed files.
    pub fn failures(&self) -> impl Iterator<Item = &FileResult> + '_ {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Failed)
    }
}
