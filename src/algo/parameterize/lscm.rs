//! Least Squares Conformal Maps (LSCM) parameterization.
//!
//! LSCM computes a conformal (angle-preserving) parameterization of a
//! triangle patch. The algorithm minimizes the conformal energy, which
//! measures how far each triangle's map is from a similarity transform.
//!
//! Two vertices are pinned to remove the similarity null space, and the
//! reduced least-squares problem is solved through its normal equations with
//! preconditioned conjugate gradient.
//!
//! # References
//!
//! - Lévy, B., Petitjean, S., Ray, N., & Maillot, J. (2002). "Least squares
//!   conformal maps for automatic texture atlas generation." ACM SIGGRAPH.

use std::collections::HashMap;

use nalgebra::{DVector, Point2, Point3};
use tracing::trace;

use crate::algo::island::Island;
use crate::error::{MeshError, Result};
use crate::mesh::{triangle_area, EdgeKey, Mesh};

use super::sparse::{conjugate_gradient, CsrMatrix};
use super::uv::UVMap;

/// Triangles with a 3D area below this are left out of the energy.
pub const DEGENERATE_AREA: f64 = 1e-10;

/// A solution whose total UV area is below this fraction of the 3D area has
/// collapsed.
const COLLAPSE_RATIO: f64 = 1e-6;

/// Options for the conformal solver.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Maximum iterations for the conjugate gradient solver.
    pub max_iterations: usize,

    /// Convergence tolerance for the CG solver (relative residual).
    pub tolerance: f64,

    /// Solve islands on the rayon thread pool.
    pub parallel: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            tolerance: 1e-10,
            parallel: true,
        }
    }
}

impl SolverOptions {
    /// Set the maximum CG iterations.
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// Set the convergence tolerance.
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Enable or disable parallel island solves.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// A vertex pinned to a specific UV coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinnedVertex {
    /// The local vertex index to pin.
    pub vertex: usize,
    /// The fixed U coordinate.
    pub u: f64,
    /// The fixed V coordinate.
    pub v: f64,
}

impl PinnedVertex {
    /// Create a new pinned vertex.
    pub fn new(vertex: usize, u: f64, v: f64) -> Self {
        Self { vertex, u, v }
    }
}

/// Compute LSCM UV coordinates for one island.
///
/// Returns one UV per island vertex, in the island's local vertex order. The
/// result is fixed by the pins: the first pin sits at the origin and the
/// second at `(d, 0)` where `d` is their 3D distance, so UV scale matches
/// the surface. Vertices touched only by degenerate triangles are filled in
/// from their solved neighbours.
///
/// # Errors
///
/// - [`MeshError::SingularSystem`] if the island has no usable triangle, its
///   usable triangles are not edge-connected, the pins coincide, or the
///   solution collapsed (an island without boundary flattens to a point)
/// - [`MeshError::ConvergenceFailed`] if CG runs out of iterations
///
/// # Example
///
/// ```
/// use unfold::algo::island::Island;
/// use unfold::algo::parameterize::{lscm, SolverOptions};
/// use unfold::fixtures;
/// use unfold::mesh::IslandId;
///
/// let grid = fixtures::grid(3);
/// let island = Island::from_faces(&grid, IslandId::new(0), grid.face_ids().collect());
/// let uvs = lscm(&grid, &island, &SolverOptions::default()).unwrap();
/// assert_eq!(uvs.len(), 16);
/// ```
pub fn lscm(mesh: &Mesh, island: &Island, options: &SolverOptions) -> Result<UVMap> {
    let positions = island.local_positions(mesh);
    let n_vertices = positions.len();

    let valid: Vec<[usize; 3]> = island
        .local_triangles
        .iter()
        .copied()
        .filter(|t| {
            triangle_area(&positions[t[0]], &positions[t[1]], &positions[t[2]]) >= DEGENERATE_AREA
        })
        .collect();
    if valid.is_empty() {
        return Err(MeshError::singular("no non-degenerate triangles"));
    }

    let components = count_edge_components(&valid);
    if components > 1 {
        return Err(MeshError::singular(format!(
            "usable triangles form {} disconnected parts",
            components
        )));
    }

    let mut active = vec![false; n_vertices];
    for t in &valid {
        for &v in t {
            active[v] = true;
        }
    }

    let mut candidates = find_boundary_vertices(&valid, n_vertices);
    if candidates.is_empty() {
        candidates = (0..n_vertices).filter(|&v| active[v]).collect();
    }
    let (pin0, pin1) = select_farthest_pair(&positions, &candidates)?;

    // Free unknowns: active vertices other than the pins.
    let mut free_index = vec![None; n_vertices];
    let mut n_free = 0;
    for v in 0..n_vertices {
        if active[v] && v != pin0.vertex && v != pin1.vertex {
            free_index[v] = Some(n_free);
            n_free += 1;
        }
    }

    let mut uvs: Vec<Option<Point2<f64>>> = vec![None; n_vertices];
    uvs[pin0.vertex] = Some(Point2::new(pin0.u, pin0.v));
    uvs[pin1.vertex] = Some(Point2::new(pin1.u, pin1.v));

    if n_free > 0 {
        let (matrix, rhs) =
            build_lscm_system(&positions, &valid, &free_index, n_free, &[pin0, pin1]);
        trace!(unknowns = 2 * n_free, nnz = matrix.nnz(), "assembled conformal system");

        let solution =
            conjugate_gradient(&matrix, &rhs, None, options.max_iterations, options.tolerance)?;

        for v in 0..n_vertices {
            if let Some(k) = free_index[v] {
                uvs[v] = Some(Point2::new(solution[k], solution[n_free + k]));
            }
        }
    }

    let uvs = interpolate_missing(&island.local_triangles, uvs, Point2::new(pin0.u, pin0.v));
    check_not_collapsed(&positions, &uvs, &valid)?;
    Ok(UVMap::new(uvs))
}

/// Reject a solution whose UV triangles have (almost) no area.
///
/// If the total UV area clears the threshold, at least one triangle does
/// too, so this also catches the case where every triangle is degenerate.
fn check_not_collapsed(
    positions: &[Point3<f64>],
    uvs: &[Point2<f64>],
    triangles: &[[usize; 3]],
) -> Result<()> {
    let mut area_3d = 0.0;
    let mut area_uv = 0.0;
    for t in triangles {
        area_3d += triangle_area(&positions[t[0]], &positions[t[1]], &positions[t[2]]);
        area_uv += 0.5 * (uvs[t[1]] - uvs[t[0]]).perp(&(uvs[t[2]] - uvs[t[0]])).abs();
    }

    if !(area_uv >= COLLAPSE_RATIO * area_3d) {
        return Err(MeshError::singular(format!(
            "solution collapsed: UV area {:.3e} for surface area {:.3e}",
            area_uv, area_3d
        )));
    }
    Ok(())
}

/// Number of edge-connected components among triangles.
fn count_edge_components(triangles: &[[usize; 3]]) -> usize {
    let mut parent: Vec<usize> = (0..triangles.len()).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut first_on_edge: HashMap<EdgeKey, usize> = HashMap::new();
    for (ti, t) in triangles.iter().enumerate() {
        for i in 0..3 {
            let key = EdgeKey::new(t[i], t[(i + 1) % 3]);
            match first_on_edge.get(&key) {
                Some(&other) => {
                    let (a, b) = (find(&mut parent, ti), find(&mut parent, other));
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    first_on_edge.insert(key, ti);
                }
            }
        }
    }

    (0..triangles.len())
        .filter(|&t| find(&mut parent, t) == t)
        .count()
}

/// Find boundary vertices (endpoints of edges used by exactly one triangle), ascending.
fn find_boundary_vertices(faces: &[[usize; 3]], n_vertices: usize) -> Vec<usize> {
    let mut edge_count: HashMap<EdgeKey, usize> = HashMap::new();

    for face in faces {
        for i in 0..3 {
            *edge_count.entry(EdgeKey::new(face[i], face[(i + 1) % 3])).or_insert(0) += 1;
        }
    }

    let mut is_boundary = vec![false; n_vertices];
    for (EdgeKey(v0, v1), count) in edge_count {
        if count == 1 {
            is_boundary[v0] = true;
            is_boundary[v1] = true;
        }
    }

    (0..n_vertices).filter(|&v| is_boundary[v]).collect()
}

/// Pick two far-apart candidates and pin them along the U axis.
///
/// Double sweep: the candidate farthest from the first one, then the
/// candidate farthest from that. Linear in the candidate count, and exact
/// whenever the farthest pair includes an extreme point of the first sweep.
/// The lower vertex index goes to the origin.
fn select_farthest_pair(
    positions: &[Point3<f64>],
    candidates: &[usize],
) -> Result<(PinnedVertex, PinnedVertex)> {
    let farthest_from = |origin: usize| -> (usize, f64) {
        candidates
            .iter()
            .fold((origin, 0.0), |(best, best_dist), &v| {
                let dist = (positions[v] - positions[origin]).norm_squared();
                if dist > best_dist {
                    (v, dist)
                } else {
                    (best, best_dist)
                }
            })
    };

    let Some(&start) = candidates.first() else {
        return Err(MeshError::singular("no pin candidates"));
    };
    let (a, _) = farthest_from(start);
    let (b, dist) = farthest_from(a);
    let dist = dist.sqrt();
    if dist <= 1e-12 {
        return Err(MeshError::singular("pin vertices coincide"));
    }

    let (first, second) = if a < b { (a, b) } else { (b, a) };
    Ok((
        PinnedVertex::new(first, 0.0, 0.0),
        PinnedVertex::new(second, dist, 0.0),
    ))
}

/// Build the reduced LSCM normal equations.
///
/// Per triangle, with gradient coefficients `(ax_i, ay_i)` in the
/// triangle's own 2D frame, the conformal residuals are
///
/// ```text
/// r1 = sum(ax_i * u_i - ay_i * v_i)
/// r2 = sum(ay_i * u_i + ax_i * v_i)
/// ```
///
/// weighted by triangle area. Unknowns are ordered `[u_free.., v_free..]`;
/// pinned columns move to the right-hand side.
fn build_lscm_system(
    positions: &[Point3<f64>],
    faces: &[[usize; 3]],
    free_index: &[Option<usize>],
    n_free: usize,
    pins: &[PinnedVertex; 2],
) -> (CsrMatrix, DVector<f64>) {
    let n = n_free;
    let mut triplets: Vec<(usize, usize, f64)> = Vec::with_capacity(faces.len() * 36);
    let mut rhs = DVector::zeros(2 * n);

    let pin_uv = |v: usize| -> Option<(f64, f64)> {
        pins.iter().find(|p| p.vertex == v).map(|p| (p.u, p.v))
    };

    for face in faces {
        let [i, j, k] = *face;

        let pi = &positions[i];
        let e1 = positions[j] - pi;
        let e2 = positions[k] - pi;

        let e1_len = e1.norm();
        let normal = e1.cross(&e2);
        let area = normal.norm() * 0.5;
        if e1_len < 1e-300 || area < DEGENERATE_AREA {
            continue;
        }

        // Local frame: x along e1, y completing a right-handed frame with the normal.
        let x_axis = e1 / e1_len;
        let y_axis = normal.cross(&e1).normalize();

        let (qix, qiy) = (0.0, 0.0);
        let (qjx, qjy) = (e1_len, 0.0);
        let (qkx, qky) = (e2.dot(&x_axis), e2.dot(&y_axis));

        let inv_2a = 1.0 / (2.0 * area);
        let verts = [
            (i, (qjy - qky) * inv_2a, (qkx - qjx) * inv_2a),
            (j, (qky - qiy) * inv_2a, (qix - qkx) * inv_2a),
            (k, (qiy - qjy) * inv_2a, (qjx - qix) * inv_2a),
        ];

        let weight = area;

        for &(vi, ax_i, ay_i) in &verts {
            let Some(ri) = free_index[vi] else {
                continue;
            };
            for &(vj, ax_j, ay_j) in &verts {
                let uu = (ax_i * ax_j + ay_i * ay_j) * weight;
                let uv = (ay_i * ax_j - ax_i * ay_j) * weight;

                match free_index[vj] {
                    Some(cj) => {
                        triplets.push((ri, cj, uu));
                        triplets.push((n + ri, n + cj, uu));
                        triplets.push((ri, n + cj, uv));
                        triplets.push((n + ri, cj, -uv));
                    }
                    None => {
                        if let Some((pu, pv)) = pin_uv(vj) {
                            rhs[ri] -= uu * pu + uv * pv;
                            rhs[n + ri] -= -uv * pu + uu * pv;
                        }
                    }
                }
            }
        }
    }

    (CsrMatrix::from_triplets(2 * n, 2 * n, triplets), rhs)
}

/// Fill vertices the solve did not reach with the mean of their neighbours.
///
/// Repeats until nothing changes; anything still unreached gets `fallback`.
fn interpolate_missing(
    triangles: &[[usize; 3]],
    mut uvs: Vec<Option<Point2<f64>>>,
    fallback: Point2<f64>,
) -> Vec<Point2<f64>> {
    loop {
        let mut updates = Vec::new();
        for v in 0..uvs.len() {
            if uvs[v].is_some() {
                continue;
            }
            let mut sum = nalgebra::Vector2::zeros();
            let mut count = 0usize;
            for t in triangles.iter().filter(|t| t.contains(&v)) {
                for &w in t {
                    if let Some(uv) = uvs[w] {
                        sum += uv.coords;
                        count += 1;
                    }
                }
            }
            if count > 0 {
                updates.push((v, Point2::from(sum / count as f64)));
            }
        }
        if updates.is_empty() {
            break;
        }
        for (v, uv) in updates {
            uvs[v] = Some(uv);
        }
    }

    uvs.into_iter().map(|uv| uv.unwrap_or(fallback)).collect()
}
