//! Planar projection fallback.
//!
//! Used for islands the conformal solver cannot handle. The island is
//! projected onto the plane perpendicular to its area-weighted average
//! normal, which is exact for flat islands and keeps the layout readable for
//! nearly flat ones.

use nalgebra::{Point2, Vector3};

use super::uv::UVMap;
use crate::algo::island::Island;
use crate::mesh::Mesh;

/// Project an island onto the plane of its average normal.
///
/// Returns one UV per island vertex in local order. Units match the mesh, so
/// the result packs alongside conformally solved islands.
pub fn planar_projection(mesh: &Mesh, island: &Island) -> UVMap {
    let positions = island.local_positions(mesh);
    let normal = average_normal(mesh, island);
    let (tangent, bitangent) = orthonormal_basis(&normal);

    positions
        .iter()
        .map(|p| Point2::new(p.coords.dot(&tangent), p.coords.dot(&bitangent)))
        .collect::<Vec<_>>()
        .into()
}

/// Area-weighted average normal of an island.
///
/// Closed or strongly curved islands can sum to nearly zero; the normal of
/// the largest triangle is used then, and +Z if even that is unusable.
fn average_normal(mesh: &Mesh, island: &Island) -> Vector3<f64> {
    let mut sum = Vector3::zeros();
    let mut largest = (0.0, Vector3::z());

    for &f in &island.faces {
        let [p0, p1, p2] = mesh.face_positions(f);
        let n = (p1 - p0).cross(&(p2 - p0));
        let len = n.norm();
        sum += n;
        if len > largest.0 {
            largest = (len, n);
        }
    }

    sum.try_normalize(1e-12)
        .or_else(|| largest.1.try_normalize(1e-300))
        .unwrap_or_else(Vector3::z)
}

/// Orthonormal tangent frame for a unit normal.
///
/// Branchless construction from Duff et al. (2017), "Building an Orthonormal
/// Basis, Revisited". `(tangent, bitangent, n)` is right-handed.
fn orthonormal_basis(n: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let sign = if n.z >= 0.0 { 1.0 } else { -1.0 };
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;

    let tangent = Vector3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let bitangent = Vector3::new(b, sign + n.y * n.y * a, -n.y);

    (tangent, bitangent)
}
