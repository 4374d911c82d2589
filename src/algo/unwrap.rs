//! The unwrapping pipeline.
//!
//! [`unwrap`] runs segmentation, the per-island conformal solve, packing and
//! the quality metrics in sequence and returns a new mesh carrying UVs. The
//! input mesh is only read.
//!
//! Vertices are duplicated per island in the output, so a vertex lying on a
//! seam gets one copy (and one UV) for every island that uses it. Triangle
//! count and order do not change, so per-triangle island ids refer to the
//! same triangles in the input and the output.
//!
//! # Example
//!
//! ```
//! use unfold::algo::unwrap::{unwrap, UnwrapParams};
//! use unfold::fixtures;
//!
//! let cube = fixtures::cube();
//! let params = UnwrapParams::default().with_min_island_faces(1);
//! let result = unwrap(&cube, &params).unwrap();
//!
//! assert_eq!(result.num_islands, 6);
//! assert_eq!(result.mesh.num_triangles(), 12);
//! assert!(result.metrics.coverage > 0.0);
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::island::{build_islands, Island};
use super::metrics::{compute_metrics, QualityMetrics};
use super::pack::{normalize_islands, pack_islands, validate_margin};
use super::parameterize::{lscm, planar_projection, SolverOptions, UVMap};
use super::progress::Progress;
use super::segment::segment;
use crate::error::{MeshError, Result};
use crate::mesh::{Adjacency, IslandId, Mesh};

/// Parameters of an unwrap.
///
/// Serialized as a flat record of its four fields; missing fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnwrapParams {
    /// Dihedral angle in degrees above which an edge becomes a seam.
    pub angle_threshold: f64,
    /// Islands with fewer triangles are merged into a neighbour or flagged.
    pub min_island_faces: usize,
    /// Pack islands into one atlas; otherwise each island fills [0,1]² alone.
    pub pack_islands: bool,
    /// UV-space gap between packed islands.
    pub island_margin: f64,
}

impl Default for UnwrapParams {
    fn default() -> Self {
        Self {
            angle_threshold: 30.0,
            min_island_faces: 10,
            pack_islands: true,
            island_margin: 0.02,
        }
    }
}

impl UnwrapParams {
    /// Set the seam angle threshold in degrees.
    pub fn with_angle_threshold(mut self, degrees: f64) -> Self {
        self.angle_threshold = degrees;
        self
    }

    /// Set the minimum island size.
    pub fn with_min_island_faces(mut self, faces: usize) -> Self {
        self.min_island_faces = faces;
        self
    }

    /// Enable or disable packing.
    pub fn with_pack_islands(mut self, pack: bool) -> Self {
        self.pack_islands = pack;
        self
    }

    /// Set the margin between packed islands.
    pub fn with_island_margin(mut self, margin: f64) -> Self {
        self.island_margin = margin;
        self
    }

    /// Check the parameter invariants.
    ///
    /// # Errors
    ///
    /// - [`MeshError::InvalidParameter`] if the angle is outside (0, 180) or
    ///   the margin is negative
    /// - [`MeshError::PackingOverflow`] if the margin exceeds 1.0
    pub fn validate(&self) -> Result<()> {
        if !(self.angle_threshold > 0.0 && self.angle_threshold < 180.0) {
            return Err(MeshError::invalid_param(
                "angle_threshold",
                self.angle_threshold,
                "must be in (0, 180) degrees",
            ));
        }
        validate_margin(self.island_margin)
    }
}

/// Everything an unwrap produces.
#[derive(Debug, Clone)]
pub struct UnwrapResult {
    /// Output mesh with split seams and per-vertex UVs.
    pub mesh: Mesh,
    /// Source vertex of every output vertex.
    pub vertex_map: Vec<usize>,
    /// Number of islands.
    pub num_islands: usize,
    /// Island id of every triangle.
    pub face_islands: Vec<IslandId>,
    /// The islands, with solved UVs and placements.
    pub islands: Vec<Island>,
    /// Islands below the minimum size that could not be merged.
    pub small_islands: Vec<IslandId>,
    /// Islands flattened by planar projection after the conformal solve failed.
    pub fallback_islands: Vec<IslandId>,
    /// Quality of the final UVs.
    pub metrics: QualityMetrics,
}

impl UnwrapResult {
    /// Average stretch over valid triangles.
    pub fn avg_stretch(&self) -> f64 {
        self.metrics.stretch.avg
    }

    /// Maximum stretch over valid triangles.
    pub fn max_stretch(&self) -> f64 {
        self.metrics.stretch.max
    }

    /// Covered fraction of the unit square.
    pub fn coverage(&self) -> f64 {
        self.metrics.coverage
    }
}

/// Unwrap a mesh with default solver options.
pub fn unwrap(mesh: &Mesh, params: &UnwrapParams) -> Result<UnwrapResult> {
    unwrap_with(mesh, params, &SolverOptions::default(), &Progress::none())
}

/// Unwrap a mesh.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] / [`MeshError::PackingOverflow`] for
///   parameters failing [`UnwrapParams::validate`]
///
/// A singular or non-converging island solve is not an error: that island
/// is flattened by planar projection and listed in
/// [`UnwrapResult::fallback_islands`].
pub fn unwrap_with(
    mesh: &Mesh,
    params: &UnwrapParams,
    solver: &SolverOptions,
    progress: &Progress,
) -> Result<UnwrapResult> {
    const STAGES: usize = 4;
    params.validate()?;

    progress.report(0, STAGES, "Segmenting");
    let adjacency = Adjacency::build(mesh);
    let segmentation = segment(
        mesh,
        &adjacency,
        params.angle_threshold,
        params.min_island_faces,
    )?;
    let mut islands = build_islands(mesh, &segmentation);

    progress.report(1, STAGES, "Solving islands");
    let solved: Vec<(UVMap, bool)> = if solver.parallel {
        islands
            .par_iter()
            .map(|island| solve_island(mesh, island, solver))
            .collect::<Result<_>>()?
    } else {
        islands
            .iter()
            .map(|island| solve_island(mesh, island, solver))
            .collect::<Result<_>>()?
    };
    for (island, (uvs, fallback)) in islands.iter_mut().zip(solved) {
        island.uvs = uvs;
        island.fallback = fallback;
    }

    progress.report(2, STAGES, "Packing");
    if params.pack_islands {
        pack_islands(&mut islands, params.island_margin)?;
    } else {
        normalize_islands(&mut islands);
    }

    progress.report(3, STAGES, "Measuring");
    let (output, vertex_map) = build_output_mesh(mesh, &islands)?;
    let metrics = compute_metrics(
        output.positions(),
        output.uvs().unwrap_or_default(),
        output.triangles(),
    );

    let fallback_islands: Vec<IslandId> = islands
        .iter()
        .filter(|i| i.fallback)
        .map(|i| i.id)
        .collect();

    info!(
        islands = islands.len(),
        small = segmentation.small_islands.len(),
        fallback = fallback_islands.len(),
        stretch = metrics.stretch.avg,
        coverage = metrics.coverage,
        "unwrapped mesh"
    );
    progress.report(STAGES, STAGES, "Done");

    Ok(UnwrapResult {
        mesh: output,
        vertex_map,
        num_islands: islands.len(),
        face_islands: segmentation.face_islands,
        small_islands: segmentation.small_islands,
        fallback_islands,
        islands,
        metrics,
    })
}

/// Conformal solve with planar fallback. The flag is set when the fallback was used.
fn solve_island(mesh: &Mesh, island: &Island, options: &SolverOptions) -> Result<(UVMap, bool)> {
    match lscm(mesh, island, options) {
        Ok(uvs) => {
            debug!(island = %island.id, faces = island.num_faces(), "solved island");
            Ok((uvs, false))
        }
        Err(e @ (MeshError::SingularSystem { .. } | MeshError::ConvergenceFailed { .. })) => {
            warn!(
                island = %island.id,
                faces = island.num_faces(),
                error = %e,
                "conformal solve failed, using planar projection"
            );
            Ok((planar_projection(mesh, island), true))
        }
        Err(e) => Err(e),
    }
}

/// Assemble the output mesh, one vertex copy per island vertex.
fn build_output_mesh(mesh: &Mesh, islands: &[Island]) -> Result<(Mesh, Vec<usize>)> {
    let total: usize = islands.iter().map(Island::num_vertices).sum();
    let mut positions = Vec::with_capacity(total);
    let mut uvs = Vec::with_capacity(total);
    let mut vertex_map = Vec::with_capacity(total);
    let mut triangles = vec![[0usize; 3]; mesh.num_triangles()];

    for island in islands {
        let base = vertex_map.len();
        for (&v, uv) in island.vertices.iter().zip(island.placed_uvs()) {
            positions.push(mesh.positions()[v]);
            uvs.push(uv);
            vertex_map.push(v);
        }
        for (&f, local) in island.faces.iter().zip(&island.local_triangles) {
            triangles[f.index()] = local.map(|l| base + l);
        }
    }

    let output = Mesh::new(positions, triangles)?.with_uvs(uvs)?;
    Ok((output, vertex_map))
}
