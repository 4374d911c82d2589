//! Grid search over unwrap parameters.
//!
//! Every combination of angle threshold and minimum island size in a
//! [`SearchSpace`] is unwrapped and scored by one [`Metric`]. The search is
//! exhaustive and sequential; angles form the outer loop and island sizes the
//! inner one, and a later combination replaces the best only if it scores
//! strictly better, so repeated runs return the same answer.
//!
//! ```
//! use unfold::optimize::{optimize, Metric, SearchSpace};
//! use unfold::fixtures;
//!
//! let cube = fixtures::cube();
//! let space = SearchSpace::new(vec![30.0, 60.0], vec![1, 4]);
//! let result = optimize(&cube, Metric::Stretch, &space).unwrap();
//! assert_eq!(result.evaluations.len(), 4);
//! assert!(result.best_score >= 1.0);
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::algo::metrics::QualityMetrics;
use crate::algo::parameterize::SolverOptions;
use crate::algo::progress::Progress;
use crate::algo::unwrap::{unwrap_with, UnwrapParams};
use crate::batch::{BatchOptions, JobResult, WorkerPool};
use crate::error::{MeshError, Result};
use crate::io;
use crate::mesh::Mesh;

/// Quality measure to optimize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Average stretch, minimized.
    Stretch,
    /// Average area distortion, minimized.
    AreaDistortion,
    /// Mean angle error, minimized.
    AngleDistortion,
    /// Covered fraction of the unit square, maximized.
    Coverage,
}

impl Metric {
    /// Every metric.
    pub const ALL: [Metric; 4] = [
        Metric::Stretch,
        Metric::AreaDistortion,
        Metric::AngleDistortion,
        Metric::Coverage,
    ];

    /// Read this metric's value.
    pub fn score(self, metrics: &QualityMetrics) -> f64 {
        match self {
            Metric::Stretch => metrics.stretch.avg,
            Metric::AreaDistortion => metrics.area_distortion.avg,
            Metric::AngleDistortion => metrics.angle_distortion,
            Metric::Coverage => metrics.coverage,
        }
    }

    /// Score a result, or `None` if it cannot compete.
    ///
    /// A map without a single valid triangle reports neutral statistics
    /// that look ideal, so it is rejected here along with non-finite values.
    pub fn evaluate(self, metrics: &QualityMetrics) -> Option<f64> {
        if !metrics.is_meaningful() {
            return None;
        }
        let score = self.score(metrics);
        score.is_finite().then_some(score)
    }

    /// Whether larger values are better.
    #[inline]
    pub fn maximize(self) -> bool {
        self == Metric::Coverage
    }

    /// Whether `candidate` strictly improves on `incumbent`.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        if self.maximize() {
            candidate > incumbent
        } else {
            candidate < incumbent
        }
    }

    /// Name used on the command line and in reports.
    pub fn name(self) -> &'static str {
        match self {
            Metric::Stretch => "stretch",
            Metric::AreaDistortion => "area",
            Metric::AngleDistortion => "angle_distortion",
            Metric::Coverage => "coverage",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stretch" => Ok(Metric::Stretch),
            "area" | "area_distortion" => Ok(Metric::AreaDistortion),
            "angle" | "angle_distortion" => Ok(Metric::AngleDistortion),
            "coverage" => Ok(Metric::Coverage),
            other => Err(format!(
                "unknown metric '{}' (expected stretch, area, angle_distortion or coverage)",
                other
            )),
        }
    }
}

/// The parameter grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    /// Angle thresholds in degrees (outer loop).
    pub angle_thresholds: Vec<f64>,
    /// Minimum island sizes (inner loop).
    pub min_island_sizes: Vec<usize>,
    /// Packing settings shared by every combination.
    pub base: UnwrapParams,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new(vec![20.0, 30.0, 40.0, 50.0], vec![5, 10, 20, 50])
    }
}

impl SearchSpace {
    /// Grid over the given values with default packing.
    pub fn new(angle_thresholds: Vec<f64>, min_island_sizes: Vec<usize>) -> Self {
        Self {
            angle_thresholds,
            min_island_sizes,
            base: UnwrapParams::default(),
        }
    }

    /// Use different packing settings for every combination.
    pub fn with_base(mut self, base: UnwrapParams) -> Self {
        self.base = base;
        self
    }

    /// Number of combinations.
    pub fn len(&self) -> usize {
        self.angle_thresholds.len() * self.min_island_sizes.len()
    }

    /// Whether the grid is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Combinations in search order.
    pub fn combinations(&self) -> impl Iterator<Item = UnwrapParams> + '_ {
        self.angle_thresholds.iter().flat_map(move |&angle| {
            self.min_island_sizes.iter().map(move |&size| {
                self.base
                    .clone()
                    .with_angle_threshold(angle)
                    .with_min_island_faces(size)
            })
        })
    }
}

/// One tried combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Parameters tried.
    pub params: UnwrapParams,
    /// Metric value, `None` if the unwrap failed.
    pub score: Option<f64>,
    /// Islands produced, `None` if the unwrap failed.
    pub islands: Option<usize>,
}

/// Outcome of a grid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeResult {
    /// Best combination.
    pub best_params: UnwrapParams,
    /// Its score.
    pub best_score: f64,
    /// Metric the search optimized.
    pub metric: Metric,
    /// Every combination, in search order.
    pub evaluations: Vec<Evaluation>,
}

/// Search the grid for the parameters that score best on `mesh`.
pub fn optimize(mesh: &Mesh, metric: Metric, space: &SearchSpace) -> Result<OptimizeResult> {
    optimize_with_progress(mesh, metric, space, &SolverOptions::default(), &Progress::none())
}

/// [`optimize`] with explicit solver options and progress reporting.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] for an empty grid
/// - The last unwrap error if every combination failed
/// - [`MeshError::SingularSystem`] if every combination unwrapped but none
///   produced a valid triangle
pub fn optimize_with_progress(
    mesh: &Mesh,
    metric: Metric,
    space: &SearchSpace,
    solver: &SolverOptions,
    progress: &Progress,
) -> Result<OptimizeResult> {
    if space.is_empty() {
        return Err(MeshError::invalid_param(
            "search_space",
            "empty",
            "needs at least one angle and one island size",
        ));
    }

    let total = space.len();
    let mut evaluations = Vec::with_capacity(total);
    let mut best: Option<(usize, f64)> = None;
    let mut last_error = None;

    for (i, params) in space.combinations().enumerate() {
        let label = format!(
            "angle={} min_island={}",
            params.angle_threshold, params.min_island_faces
        );

        let evaluation = match unwrap_with(mesh, &params, solver, &Progress::none()) {
            Ok(result) => {
                let score = metric.evaluate(&result.metrics);
                match score {
                    Some(score) => {
                        debug!(%label, %metric, score, islands = result.num_islands, "evaluated");
                        if best.map_or(true, |(_, b)| metric.is_better(score, b)) {
                            best = Some((i, score));
                        }
                    }
                    None => warn!(
                        %label,
                        valid_triangles = result.metrics.valid_triangles,
                        "combination produced no usable map"
                    ),
                }
                Evaluation {
                    params,
                    score,
                    islands: Some(result.num_islands),
                }
            }
            Err(e) => {
                warn!(%label, error = %e, "combination failed");
                last_error = Some(e);
                Evaluation {
                    params,
                    score: None,
                    islands: None,
                }
            }
        };
        evaluations.push(evaluation);
        progress.report(i + 1, total, &label);
    }

    let Some((best_index, best_score)) = best else {
        return Err(last_error
            .unwrap_or_else(|| MeshError::singular("no combination produced a usable map")));
    };
    let best_params = evaluations[best_index].params.clone();

    info!(
        %metric,
        best_score,
        angle = best_params.angle_threshold,
        min_island = best_params.min_island_faces,
        "grid search finished"
    );

    Ok(OptimizeResult {
        best_params,
        best_score,
        metric,
        evaluations,
    })
}

/// Optimize several files in parallel, one file per worker.
///
/// Each file is searched sequentially on its worker. The result for each
/// path is independent; a file that cannot be loaded or optimized does not
/// affect the others.
pub fn optimize_many(
    paths: &[PathBuf],
    metric: Metric,
    space: &SearchSpace,
    options: &BatchOptions,
    progress: &Progress,
) -> Result<Vec<Result<OptimizeResult>>> {
    let pool = WorkerPool::new(options.threads)?;
    let results = pool.run(
        paths.to_vec(),
        &options.cancel,
        |path| {
            let mesh = io::load(path)?;
            optimize_with_progress(&mesh, metric, space, &options.solver, &Progress::none())
        },
        |done| {
            let name = paths[done.index].display().to_string();
            progress.report(done.completed, done.total, &name);
        },
    )?;

    Ok(results
        .into_iter()
        .map(|result| match result {
            JobResult::Finished(outcome) => outcome,
            JobResult::Panicked(message) => Err(MeshError::singular(format!("panic: {}", message))),
            JobResult::Skipped => Err(MeshError::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "cancelled before start",
            ))),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::metrics::Stats;
    use crate::fixtures;

    #[test]
    fn test_metric_direction() {
        assert!(Metric::Stretch.is_better(1.1, 1.2));
        assert!(!Metric::Stretch.is_better(1.2, 1.2));
        assert!(Metric::Coverage.is_better(0.6, 0.5));
        assert!(!Metric::AngleDistortion.is_better(3.0, 2.0));
    }

    #[test]
    fn test_metric_parsing() {
        for metric in Metric::ALL {
            assert_eq!(metric.name().parse::<Metric>().unwrap(), metric);
        }
        assert_eq!("Coverage".parse::<Metric>().unwrap(), Metric::Coverage);
        assert!("speed".parse::<Metric>().is_err());
    }

    fn metrics_with(valid_triangles: usize) -> QualityMetrics {
        QualityMetrics {
            stretch: Stats::NEUTRAL,
            area_distortion: Stats::NEUTRAL,
            angle_distortion: 0.0,
            coverage: 0.0,
            valid_triangles,
        }
    }

    #[test]
    fn test_collapsed_metrics_cannot_compete() {
        for metric in Metric::ALL {
            assert_eq!(metric.evaluate(&metrics_with(0)), None);
        }
        assert_eq!(Metric::Stretch.evaluate(&metrics_with(3)), Some(1.0));

        let mut nan = metrics_with(3);
        nan.angle_distortion = f64::NAN;
        assert_eq!(Metric::AngleDistortion.evaluate(&nan), None);
    }

    #[test]
    fn test_collapsed_unwraps_never_win() {
        // Both triangles sit below the metric area threshold, so every
        // combination reports neutral statistics with no valid triangle.
        let tiny = Mesh::new(
            vec![
                nalgebra::Point3::new(0.0, 0.0, 0.0),
                nalgebra::Point3::new(1e-6, 0.0, 0.0),
                nalgebra::Point3::new(1e-6, 1e-6, 0.0),
                nalgebra::Point3::new(0.0, 1e-6, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
        .unwrap();
        let space = SearchSpace::new(vec![20.0, 89.0], vec![5]);
        let err = optimize(&tiny, Metric::Stretch, &space).unwrap_err();
        assert!(matches!(err, MeshError::SingularSystem { .. }));
    }

    #[test]
    fn test_smooth_sphere_scores_real_maps() {
        let sphere = fixtures::uv_sphere(32, 16, 1.0);
        let space = SearchSpace::new(vec![20.0, 89.0], vec![5]);
        let result = optimize(&sphere, Metric::Coverage, &space).unwrap();
        for evaluation in &result.evaluations {
            assert!(evaluation.score.unwrap() > 0.0);
        }
        assert!(result.best_score > 0.0);
    }

    #[test]
    fn test_default_space_order() {
        let space = SearchSpace::default();
        assert_eq!(space.len(), 16);
        let combos: Vec<_> = space.combinations().collect();
        assert_eq!(combos[0].angle_threshold, 20.0);
        assert_eq!(combos[0].min_island_faces, 5);
        assert_eq!(combos[1].angle_threshold, 20.0);
        assert_eq!(combos[1].min_island_faces, 10);
        assert_eq!(combos[4].angle_threshold, 30.0);
        assert!(combos.iter().all(|p| p.pack_islands));
    }

    #[test]
    fn test_empty_space_rejected() {
        let space = SearchSpace::new(vec![], vec![5]);
        assert!(matches!(
            optimize(&fixtures::cube(), Metric::Stretch, &space),
            Err(MeshError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_best_is_the_minimum() {
        let sphere = fixtures::uv_sphere(8, 6, 1.0);
        let space = SearchSpace::new(vec![20.0, 50.0], vec![5, 20]);
        let result = optimize(&sphere, Metric::Stretch, &space).unwrap();

        let min = result
            .evaluations
            .iter()
            .filter_map(|e| e.score)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(result.best_score, min);
        // First combination reaching the minimum wins.
        let first = result
            .evaluations
            .iter()
            .find(|e| e.score == Some(min))
            .unwrap();
        assert_eq!(first.params, result.best_params);
    }

    #[test]
    fn test_failed_combinations_skipped() {
        let cube = fixtures::cube();
        let space = SearchSpace::new(vec![400.0, 45.0], vec![1]);
        let result = optimize(&cube, Metric::Coverage, &space).unwrap();
        assert_eq!(result.evaluations[0].score, None);
        assert_eq!(result.best_params.angle_threshold, 45.0);

        let all_bad = SearchSpace::new(vec![0.0, 200.0], vec![1]);
        assert!(matches!(
            optimize(&cube, Metric::Coverage, &all_bad),
            Err(MeshError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_progress_per_combination() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let progress = Progress::new(move |_, total, _| {
            assert_eq!(total, 4);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let space = SearchSpace::new(vec![30.0, 60.0], vec![1, 2]);
        optimize_with_progress(
            &fixtures::cube(),
            Metric::AngleDistortion,
            &space,
            &SolverOptions::default(),
            &progress,
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_optimize_many_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("cube.obj");
        io::save(&fixtures::cube(), &good).unwrap();
        let missing = dir.path().join("missing.obj");

        let space = SearchSpace::new(vec![45.0], vec![1, 4]);
        let results = optimize_many(
            &[good, missing],
            Metric::Stretch,
            &space,
            &BatchOptions::default().with_threads(2),
            &Progress::none(),
        )
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().evaluations.len(), 2);
        assert!(results[1].is_err());
    }
}
