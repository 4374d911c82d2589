//! Unwrapping many files in parallel.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::pool::{CancelToken, JobResult, WorkerPool};
use super::report::{BatchReport, FileResult, FileStatus};
use crate::algo::parameterize::SolverOptions;
use crate::algo::progress::Progress;
use crate::algo::unwrap::{unwrap_with, UnwrapParams};
use crate::error::{MeshError, Result};
use crate::io;

/// Options for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker threads (`None` = available parallelism).
    pub threads: Option<usize>,
    /// Appended to the input file stem to name the output.
    pub output_suffix: String,
    /// Solver settings used for every file.
    pub solver: SolverOptions,
    /// Stops the run from taking new files.
    pub cancel: CancelToken,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            threads: None,
            output_suffix: String::new(),
            // Files already run in parallel.
            solver: SolverOptions::default().with_parallel(false),
            cancel: CancelToken::new(),
        }
    }
}

impl BatchOptions {
    /// Set the number of worker threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Set the output name suffix.
    pub fn with_output_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.output_suffix = suffix.into();
        self
    }

    /// Set the solver options.
    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Where the output for `input` goes inside `out_dir`.
    pub fn output_path(&self, input: &Path, out_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mesh".to_string());
        out_dir.join(format!("{}{}.obj", stem, self.output_suffix))
    }
}

/// All `.obj` files directly inside `dir`, sorted by path.
pub fn collect_inputs<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.is_file() && io::Format::from_path(&path) == Some(io::Format::Obj) {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// Assign every input its output path before any work starts.
///
/// An input whose output would overwrite the input itself, or a path already
/// claimed by an earlier input (`m.obj` and `m.OBJ` both map to `m.obj`),
/// gets an error instead. The first claimant keeps the path.
pub fn plan_outputs(
    inputs: &[PathBuf],
    out_dir: &Path,
    options: &BatchOptions,
) -> Vec<Result<PathBuf>> {
    let mut claimed: HashMap<PathBuf, usize> = HashMap::with_capacity(inputs.len());
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let output = options.output_path(input, out_dir);
            if output == *input {
                return Err(MeshError::SaveError {
                    path: output,
                    message: "output would overwrite the input".to_string(),
                });
            }
            match claimed.entry(output.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(i);
                    Ok(output)
                }
                Entry::Occupied(owner) => Err(MeshError::SaveError {
                    message: format!(
                        "output already claimed by {}",
                        inputs[*owner.get()].display()
                    ),
                    path: output,
                }),
            }
        })
        .collect()
}

/// Unwrap every input into `out_dir`.
///
/// Each file is loaded, unwrapped and saved independently on the worker
/// pool; a failure is recorded in the report and does not affect the other
/// files. Outputs are assigned up front by [`plan_outputs`], so two inputs
/// never write the same file. `progress` is called on the calling thread after every file with
/// the completed count, the total and the file name.
///
/// # Errors
///
/// Only errors that would fail every file abort the run: invalid parameters,
/// an infeasible margin, a zero thread count or an output directory that
/// cannot be created.
pub fn process_batch(
    inputs: &[PathBuf],
    out_dir: &Path,
    params: &UnwrapParams,
    options: &BatchOptions,
    progress: &Progress,
) -> Result<BatchReport> {
    params.validate()?;
    let pool = WorkerPool::new(options.threads)?;
    fs::create_dir_all(out_dir)?;

    info!(
        files = inputs.len(),
        threads = pool.threads(),
        out_dir = %out_dir.display(),
        "starting batch"
    );
    let start = Instant::now();
    let outputs = plan_outputs(inputs, out_dir, options);

    let results = pool.run(
        (0..inputs.len()).collect(),
        &options.cancel,
        |&i| process_file(&inputs[i], &outputs[i], params, options),
        |done| {
            let name = inputs[done.index]
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            progress.report(done.completed, done.total, &name);
        },
    )?;

    let files: Vec<FileResult> = results
        .into_iter()
        .zip(inputs)
        .map(|(result, input)| match result {
            JobResult::Finished(file) => file,
            JobResult::Panicked(message) => {
                warn!(file = %input.display(), %message, "job panicked");
                FileResult::failed(input.clone(), format!("panic: {}", message), 0.0)
            }
            JobResult::Skipped => FileResult::skipped(input.clone()),
        })
        .collect();

    let report = BatchReport::new(files, start.elapsed().as_secs_f64());
    let summary = &report.summary;
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        seconds = summary.total_time,
        "batch finished"
    );
    Ok(report)
}

/// Run the pipeline on one file, turning any error into a failed record.
fn process_file(
    input: &Path,
    output: &Result<PathBuf>,
    params: &UnwrapParams,
    options: &BatchOptions,
) -> FileResult {
    let output = match output {
        Ok(output) => output,
        Err(e) => {
            warn!(file = %input.display(), error = %e, "file not scheduled");
            return FileResult::failed(input.to_path_buf(), e.to_string(), 0.0);
        }
    };
    let start = Instant::now();
    match try_process_file(input, output, params, options, start) {
        Ok(result) => result,
        Err(e) => {
            warn!(file = %input.display(), error = %e, kind = ?e.kind(), "file failed");
            FileResult::failed(input.to_path_buf(), e.to_string(), start.elapsed().as_secs_f64())
        }
    }
}

fn try_process_file(
    input: &Path,
    output: &Path,
    params: &UnwrapParams,
    options: &BatchOptions,
    start: Instant,
) -> Result<FileResult> {
    let mesh = io::load(input)?;
    let result = unwrap_with(&mesh, params, &options.solver, &Progress::none())?;
    io::save(&result.mesh, output)?;

    let time = start.elapsed().as_secs_f64();
    debug!(
        file = %input.display(),
        islands = result.num_islands,
        stretch = result.avg_stretch(),
        seconds = time,
        "file done"
    );

    Ok(FileResult {
        file: input.to_path_buf(),
        output: Some(output.to_path_buf()),
        status: FileStatus::Succeeded,
        vertices: mesh.num_vertices(),
        triangles: mesh.num_triangles(),
        islands: result.num_islands,
        time,
        metrics: Some(result.metrics),
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::sync::{Arc, Mutex};

    fn write_inputs(dir: &Path) -> Vec<PathBuf> {
        let a = dir.join("a_cube.obj");
        let b = dir.join("b_sphere.obj");
        io::save(&fixtures::cube(), &a).unwrap();
        io::save(&fixtures::uv_sphere(8, 6, 1.0), &b).unwrap();
        vec![a, b]
    }

    #[test]
    fn test_collect_inputs_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("z.OBJ"), "").unwrap();
        fs::write(dir.path().join("a.obj"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("sub.obj")).unwrap();

        let inputs = collect_inputs(dir.path()).unwrap();
        let names: Vec<_> = inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.obj", "z.OBJ"]);
    }

    #[test]
    fn test_output_path() {
        let options = BatchOptions::default().with_output_suffix("_uv");
        assert_eq!(
            options.output_path(Path::new("in/model.obj"), Path::new("out")),
            PathBuf::from("out/model_uv.obj")
        );
    }

    #[test]
    fn test_plan_outputs_rejects_collisions() {
        let options = BatchOptions::default();
        let inputs = vec![
            PathBuf::from("in/m.obj"),
            PathBuf::from("in/m.OBJ"),
            PathBuf::from("other/m.obj"),
            PathBuf::from("out/self.obj"),
            PathBuf::from("in/n.obj"),
        ];
        let plan = plan_outputs(&inputs, Path::new("out"), &options);

        assert_eq!(plan[0].as_ref().unwrap(), Path::new("out/m.obj"));
        for taken in &plan[1..3] {
            match taken {
                Err(MeshError::SaveError { path, message }) => {
                    assert_eq!(path, Path::new("out/m.obj"));
                    assert!(message.contains("in/m.obj"), "{message}");
                }
                other => panic!("unexpected plan: {other:?}"),
            }
        }
        assert!(matches!(plan[3], Err(MeshError::SaveError { .. })));
        assert_eq!(plan[4].as_ref().unwrap(), Path::new("out/n.obj"));
    }

    #[test]
    fn test_colliding_outputs_fail_the_later_file() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let lower = input_dir.path().join("m.obj");
        let upper = input_dir.path().join("m.OBJ");
        io::save(&fixtures::cube(), &lower).unwrap();
        fs::copy(&lower, &upper).unwrap();
        let inputs = vec![lower.clone(), upper.clone()];

        let report = process_batch(
            &inputs,
            out_dir.path(),
            &UnwrapParams::default(),
            &BatchOptions::default().with_threads(2),
            &Progress::none(),
        )
        .unwrap();

        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.files[0].status, FileStatus::Succeeded);
        assert_eq!(report.files[1].file, upper);
        assert_eq!(report.files[1].status, FileStatus::Failed);
        assert!(report.files[1].error.as_ref().unwrap().contains("already claimed"));

        let written: Vec<_> = fs::read_dir(out_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(written, vec![std::ffi::OsString::from("m.obj")]);
        assert_eq!(io::load(out_dir.path().join("m.obj")).unwrap().num_triangles(), 12);
    }

    #[test]
    fn test_batch_writes_outputs() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(input_dir.path());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |current, total, _| {
            sink.lock().unwrap().push((current, total));
        });

        let options = BatchOptions::default().with_threads(2);
        let report = process_batch(
            &inputs,
            out_dir.path(),
            &UnwrapParams::default(),
            &options,
            &progress,
        )
        .unwrap();

        assert_eq!(report.summary.succeeded, 2);
        for file in &report.files {
            let output = file.output.as_ref().unwrap();
            let unwrapped = io::load(output).unwrap();
            assert!(unwrapped.has_uvs());
            assert_eq!(unwrapped.num_triangles(), file.triangles);
        }
        assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_failure_is_isolated() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let mut inputs = write_inputs(input_dir.path());
        let broken = input_dir.path().join("broken.obj");
        fs::write(&broken, "v 0 0 0\nv 1 0 0\nf 1 2 3\n").unwrap();
        inputs.insert(1, broken.clone());
        inputs.push(input_dir.path().join("missing.obj"));

        let report = process_batch(
            &inputs,
            out_dir.path(),
            &UnwrapParams::default(),
            &BatchOptions::default().with_threads(3),
            &Progress::none(),
        )
        .unwrap();

        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.files[1].file, broken);
        assert_eq!(report.files[1].status, FileStatus::Failed);
        assert!(report.files[1].error.is_some());
        assert!(!out_dir.path().join("broken.obj").exists());
    }

    #[test]
    fn test_invalid_params_abort() {
        let out_dir = tempfile::tempdir().unwrap();
        let params = UnwrapParams::default().with_angle_threshold(0.0);
        let err = process_batch(
            &[],
            out_dir.path(),
            &params,
            &BatchOptions::default(),
            &Progress::none(),
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { .. }));
    }

    #[test]
    fn test_cancelled_batch_skips_everything() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(input_dir.path());

        let options = BatchOptions::default();
        options.cancel.cancel();
        let report = process_batch(
            &inputs,
            out_dir.path(),
            &UnwrapParams::default(),
            &options,
            &Progress::none(),
        )
        .unwrap();

        assert_eq!(report.summary.skipped, 2);
        assert_eq!(report.summary.avg_stretch, None);
        assert_eq!(fs::read_dir(out_dir.path()).unwrap().count(), 0);
    }
}
