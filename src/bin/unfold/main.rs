//! Unfold CLI - automatic UV unwrapping from the command line.
//!
//! Usage: unfold <COMMAND> [OPTIONS] <INPUT> [OUTPUT]
//!
//! Run `unfold --help` for available commands.
//!
//! # Logging
//!
//! `RUST_LOG` takes precedence when set; otherwise `-v` enables info output
//! from the library, `-vv` debug and `-vvv` trace.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use unfold::algo::parameterize::SolverOptions;
use unfold::algo::progress::Progress;
use unfold::algo::unwrap::{unwrap_with, UnwrapParams};
use unfold::batch::{self, BatchOptions};
use unfold::fixtures::topology_counts;
use unfold::io;
use unfold::mesh::{Adjacency, Mesh};
use unfold::optimize::{optimize_with_progress, Metric, SearchSpace};

#[derive(Parser)]
#[command(name = "unfold")]
#[command(author, version, about = "Automatic UV unwrapping CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Only print errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Overrides for the unwrap parameters shared by several commands.
#[derive(clap::Args, Clone)]
struct ParamArgs {
    /// Start from parameters saved with `optimize --save-params`
    #[arg(long)]
    params: Option<PathBuf>,

    /// Dihedral angle in degrees above which an edge becomes a seam
    #[arg(short, long)]
    angle_threshold: Option<f64>,

    /// Islands with fewer triangles are merged into a neighbour
    #[arg(long)]
    min_island: Option<usize>,

    /// Gap between packed islands in UV space
    #[arg(long)]
    margin: Option<f64>,
}

impl ParamArgs {
    fn resolve(&self) -> Result<UnwrapParams> {
        let mut params = match &self.params {
            Some(path) => io::load_params(path)
                .with_context(|| format!("reading parameters from {}", path.display()))?,
            None => UnwrapParams::default(),
        };
        if let Some(angle) = self.angle_threshold {
            params.angle_threshold = angle;
        }
        if let Some(size) = self.min_island {
            params.min_island_faces = size;
        }
        if let Some(margin) = self.margin {
            params.island_margin = margin;
        }
        params.validate()?;
        Ok(params)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Unwrap a single mesh
    Unwrap {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file (with UVs)
        output: PathBuf,

        #[command(flatten)]
        params: ParamArgs,

        /// Pack islands into the unit square (default)
        #[arg(long, overrides_with = "no_pack")]
        pack: bool,

        /// Normalize every island on its own instead of packing
        #[arg(long)]
        no_pack: bool,

        /// Solve islands one after another (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },

    /// Unwrap every OBJ file in a directory
    Batch {
        /// Directory with input meshes
        in_dir: PathBuf,

        /// Directory for the unwrapped meshes
        out_dir: PathBuf,

        #[command(flatten)]
        params: ParamArgs,

        /// Worker threads (default: available parallelism)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Appended to each output file name
        #[arg(long, default_value = "")]
        suffix: String,

        /// Write a JSON report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Search the parameter grid for the best unwrap of a mesh
    Optimize {
        /// Input mesh file
        input: PathBuf,

        /// Save the mesh unwrapped with the best parameters
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Metric to optimize: stretch, area, angle_distortion or coverage
        #[arg(short, long, default_value = "stretch")]
        metric: Metric,

        /// Angle thresholds to try
        #[arg(long, value_delimiter = ',', default_values_t = [20.0, 30.0, 40.0, 50.0])]
        angles: Vec<f64>,

        /// Minimum island sizes to try
        #[arg(long, value_delimiter = ',', default_values_t = [5, 10, 20, 50])]
        sizes: Vec<usize>,

        /// Save the best parameters as JSON
        #[arg(long)]
        save_params: Option<PathBuf>,
    },

    /// Print topology and, if the mesh has UVs, their quality
    Analyze {
        /// Input mesh file
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Install the subscriber. `RUST_LOG` wins over the flags.
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match (quiet, verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "unfold=info",
            (false, 2) => "unfold=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Unwrap {
            input,
            output,
            params,
            pack,
            no_pack,
            sequential,
        } => {
            let mut params = params.resolve()?;
            if *no_pack {
                params.pack_islands = false;
            } else if *pack {
                params.pack_islands = true;
            }
            cmd_unwrap(input, output, &params, *sequential, cli.quiet)
        }

        Commands::Batch {
            in_dir,
            out_dir,
            params,
            threads,
            suffix,
            report,
        } => {
            let params = params.resolve()?;
            cmd_batch(in_dir, out_dir, &params, *threads, suffix, report.as_deref(), cli.quiet)
        }

        Commands::Optimize {
            input,
            output,
            metric,
            angles,
            sizes,
            save_params,
        } => {
            let space = SearchSpace::new(angles.clone(), sizes.clone());
            cmd_optimize(
                input,
                output.as_deref(),
                *metric,
                &space,
                save_params.as_deref(),
                cli.quiet,
            )
        }

        Commands::Analyze { input } => cmd_analyze(input),
    }
}

/// Create a progress reporter that displays a progress bar on the terminal.
fn create_progress(quiet: bool) -> Progress {
    if quiet {
        return Progress::none();
    }

    // Highest percent drawn so far; the bar never moves backwards.
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        let previous = max_percent.fetch_max(raw_percent, Ordering::Relaxed);
        let percent = previous.max(raw_percent);
        if percent == previous && percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);

        // \x1b[K clears what is left of a longer previous message.
        eprint!("\r[{}{}] {:3}% {}\x1b[K", bar, space, percent, message);
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn load(input: &Path) -> Result<Mesh> {
    io::load(input).with_context(|| format!("loading {}", input.display()))
}

fn cmd_unwrap(
    input: &Path,
    output: &Path,
    params: &UnwrapParams,
    sequential: bool,
    quiet: bool,
) -> Result<()> {
    let mesh = load(input)?;
    if !quiet {
        println!(
            "Loaded: {} vertices, {} triangles",
            mesh.num_vertices(),
            mesh.num_triangles()
        );
    }

    let solver = SolverOptions::default().with_parallel(!sequential);
    let progress = create_progress(quiet);

    let start = Instant::now();
    let result = unwrap_with(&mesh, params, &solver, &progress)
        .with_context(|| format!("unwrapping {}", input.display()))?;
    let elapsed = start.elapsed();

    io::save(&result.mesh, output).with_context(|| format!("saving {}", output.display()))?;

    if !quiet {
        println!(
            "Islands: {} ({} small, {} planar fallback)",
            result.num_islands,
            result.small_islands.len(),
            result.fallback_islands.len()
        );
        print_metrics(&result.metrics);
        println!("Saved: {} ({:.2?})", output.display(), elapsed);
    }
    Ok(())
}

fn cmd_batch(
    in_dir: &Path,
    out_dir: &Path,
    params: &UnwrapParams,
    threads: Option<usize>,
    suffix: &str,
    report_path: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let inputs = batch::collect_inputs(in_dir)
        .with_context(|| format!("listing {}", in_dir.display()))?;
    if inputs.is_empty() {
        bail!("no .obj files in {}", in_dir.display());
    }

    let mut options = BatchOptions::default().with_output_suffix(suffix);
    options.threads = threads;

    let progress = create_progress(quiet);
    let report = batch::process_batch(&inputs, out_dir, params, &options, &progress)?;

    if let Some(path) = report_path {
        report
            .save_report(path)
            .with_context(|| format!("writing report {}", path.display()))?;
    }

    if !quiet {
        let s = &report.summary;
        println!(
            "Processed {} files: {} succeeded, {} failed ({:.2}s)",
            s.total, s.succeeded, s.failed, s.total_time
        );
        if let (Some(stretch), Some(coverage)) = (s.avg_stretch, s.avg_coverage) {
            println!("Average stretch: {:.4}", stretch);
            println!("Average coverage: {:.1}%", coverage * 100.0);
        }
        for failure in report.failures() {
            println!(
                "  failed: {} ({})",
                failure.file.display(),
                failure.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}

fn cmd_optimize(
    input: &Path,
    output: Option<&Path>,
    metric: Metric,
    space: &SearchSpace,
    save_params: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let mesh = load(input)?;
    if !quiet {
        println!(
            "Testing {} parameter combinations (metric: {})",
            space.len(),
            metric
        );
    }

    let solver = SolverOptions::default();
    let progress = create_progress(quiet);
    let result = optimize_with_progress(&mesh, metric, space, &solver, &progress)
        .with_context(|| format!("optimizing {}", input.display()))?;

    let best = &result.best_params;
    if !quiet {
        println!(
            "Best: angle_threshold={} min_island_faces={} -> {} = {:.4}",
            best.angle_threshold, best.min_island_faces, metric, result.best_score
        );
    }

    if let Some(path) = save_params {
        io::save_params(best, path)
            .with_context(|| format!("saving parameters to {}", path.display()))?;
    }

    if let Some(path) = output {
        let unwrapped = unwrap_with(&mesh, best, &solver, &Progress::none())?;
        io::save(&unwrapped.mesh, path).with_context(|| format!("saving {}", path.display()))?;
        if !quiet {
            println!("Saved: {}", path.display());
        }
    }
    Ok(())
}

fn cmd_analyze(input: &Path) -> Result<()> {
    let mesh = load(input)?;
    let counts = topology_counts(&mesh);
    let adjacency = Adjacency::build(&mesh);

    println!("File: {}", input.display());
    println!("Vertices: {}", counts.vertices);
    println!("Edges: {}", counts.edges);
    println!("Triangles: {}", counts.faces);
    println!("Euler characteristic: {}", counts.euler_characteristic());
    println!("Surface area: {:.6}", mesh.surface_area());

    if let Some((min, max)) = mesh.bounding_box() {
        let diag = max - min;
        println!("Dimensions: {:.3} x {:.3} x {:.3}", diag.x, diag.y, diag.z);
    }

    let boundary = adjacency.num_boundary_edges();
    if boundary == 0 {
        println!("Topology: Closed (no boundary)");
    } else {
        println!("Topology: Open ({} boundary edges)", boundary);
    }
    let non_manifold = adjacency.non_manifold_edges().count();
    if non_manifold > 0 {
        println!("Non-manifold edges: {}", non_manifold);
    }

    match mesh.quality() {
        Some(metrics) => {
            println!("\nUV quality:");
            print_metrics(&metrics);
        }
        None => println!("UVs: none"),
    }
    Ok(())
}

fn print_metrics(metrics: &unfold::algo::metrics::QualityMetrics) {
    println!(
        "  Stretch: avg={:.4}, max={:.4}",
        metrics.stretch.avg, metrics.stretch.max
    );
    println!(
        "  Area distortion: avg={:.4}, max={:.4}",
        metrics.area_distortion.avg, metrics.area_distortion.max
    );
    println!("  Angle distortion: {:.3} deg", metrics.angle_distortion);
    println!("  Coverage: {:.1}%", metrics.coverage * 100.0);
}
