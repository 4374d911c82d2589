//! # Unfold
//!
//! Automatic UV unwrapping for triangle meshes.
//!
//! Unfold cuts a mesh into charts along sharp edges, flattens every chart with
//! a least squares conformal map, packs the charts into the unit square and
//! scores the result with distortion and coverage metrics. On top of the
//! single-mesh pipeline it provides a parallel batch processor and a grid
//! search over the unwrap parameters.
//!
//! ## Features
//!
//! - **Validated mesh model**: indexed triangles with derived edge adjacency
//! - **Chart segmentation**: dihedral-angle seams, deterministic flood fill,
//!   merging of small charts
//! - **LSCM solver**: sparse normal equations solved with preconditioned
//!   conjugate gradients, planar fallback for degenerate charts
//! - **Shelf packing** with a margin and a final uniform fit
//! - **Quality metrics**: stretch, area and angle distortion, rasterized coverage
//! - **Batch processing** on a fixed-size worker pool with failure isolation
//!
//! ## Quick Start
//!
//! ```no_run
//! use unfold::prelude::*;
//!
//! let mesh = unfold::io::load("model.obj").unwrap();
//! let result = unwrap(&mesh, &UnwrapParams::default()).unwrap();
//!
//! println!("Islands: {}", result.num_islands);
//! println!("Stretch: avg={:.3} max={:.3}", result.avg_stretch(), result.max_stretch());
//! println!("Coverage: {:.1}%", result.coverage() * 100.0);
//!
//! unfold::io::save(&result.mesh, "unwrapped.obj").unwrap();
//! ```
//!
//! ## Building Meshes Programmatically
//!
//! ```
//! use unfold::prelude::*;
//! use nalgebra::Point3;
//!
//! let positions = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let triangles = vec![[0, 1, 2], [0, 2, 3]];
//!
//! let mesh = Mesh::new(positions, triangles).unwrap();
//! let params = UnwrapParams::default().with_min_island_faces(1);
//! let result = unwrap(&mesh, &params).unwrap();
//!
//! assert_eq!(result.num_islands, 1);
//! assert!((result.avg_stretch() - 1.0).abs() < 1e-6);
//! ```
//!
//! ## Parameter Search
//!
//! ```
//! use unfold::optimize::{optimize, Metric, SearchSpace};
//! use unfold::fixtures;
//!
//! let sphere = fixtures::uv_sphere(8, 6, 1.0);
//! let space = SearchSpace::new(vec![20.0, 40.0], vec![5, 10]);
//! let best = optimize(&sphere, Metric::Stretch, &space).unwrap();
//! assert_eq!(best.evaluations.len(), 4);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod batch;
pub mod error;
pub mod fixtures;
pub mod io;
pub mod mesh;
pub mod optimize;

/// Prelude module for convenient imports.
///
/// ```
/// use unfold::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::metrics::{QualityMetrics, Stats};
    pub use crate::algo::parameterize::{SolverOptions, UVMap};
    pub use crate::algo::progress::Progress;
    pub use crate::algo::unwrap::{unwrap, unwrap_with, UnwrapParams, UnwrapResult};
    pub use crate::error::{ErrorKind, MeshError, Result};
    pub use crate::mesh::{Adjacency, FaceId, IslandId, Mesh, VertexId};
}

// Re-export nalgebra types for convenience
pub use nalgebra;
