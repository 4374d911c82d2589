//! Indexed triangle mesh.
//!
//! [`Mesh`] is the data model every pipeline stage reads: an ordered list of
//! 3D positions, an ordered list of triangles indexing into it, and optional
//! per-vertex UV coordinates. It is validated on construction and never
//! mutated by the unwrapping pipeline; stages produce new meshes instead.

use nalgebra::{Point2, Point3, Vector3};

use super::index::{FaceId, VertexId};
use crate::error::{MeshError, Result};

/// Triangles whose area is at or below this value are rejected as collapsed.
pub const ZERO_AREA_EPSILON: f64 = 1e-14;

/// A validated triangle mesh with optional per-vertex UVs.
///
/// # Invariants
///
/// - At least one triangle.
/// - Every triangle index is `< num_vertices()`.
/// - No triangle repeats a vertex index.
/// - No triangle has area `<= ZERO_AREA_EPSILON`.
/// - When present, `uvs().len() == num_vertices()`.
///
/// # Example
///
/// ```
/// use unfold::mesh::Mesh;
/// use nalgebra::Point3;
///
/// let mesh = Mesh::new(
///     vec![
///         Point3::new(0.0, 0.0, 0.0),
///         Point3::new(1.0, 0.0, 0.0),
///         Point3::new(0.0, 1.0, 0.0),
///     ],
///     vec![[0, 1, 2]],
/// )
/// .unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_triangles(), 1);
/// assert!(!mesh.has_uvs());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    positions: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
    uvs: Option<Vec<Point2<f64>>>,
}

impl Mesh {
    /// Build a mesh from positions and triangles, validating both.
    ///
    /// # Errors
    ///
    /// - [`MeshError::EmptyMesh`] if there are no triangles
    /// - [`MeshError::InvalidVertexIndex`] for an out-of-range index
    /// - [`MeshError::DegenerateFace`] for a repeated index within a triangle
    /// - [`MeshError::ZeroAreaFace`] for a collapsed triangle
    pub fn new(positions: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Result<Self> {
        validate(&positions, &triangles)?;
        Ok(Self {
            positions,
            triangles,
            uvs: None,
        })
    }

    /// Attach per-vertex UV coordinates, replacing any existing ones.
    pub fn with_uvs(mut self, uvs: Vec<Point2<f64>>) -> Result<Self> {
        self.set_uvs(uvs)?;
        Ok(self)
    }

    /// Replace the UV coordinates.
    pub fn set_uvs(&mut self, uvs: Vec<Point2<f64>>) -> Result<()> {
        if uvs.len() != self.positions.len() {
            return Err(MeshError::UvCountMismatch {
                vertices: self.positions.len(),
                uvs: uvs.len(),
            });
        }
        self.uvs = Some(uvs);
        Ok(())
    }

    /// Drop the UV coordinates.
    pub fn clear_uvs(&mut self) {
        self.uvs = None;
    }

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Whether UV coordinates are present.
    #[inline]
    pub fn has_uvs(&self) -> bool {
        self.uvs.is_some()
    }

    /// All vertex positions.
    #[inline]
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// All triangles.
    #[inline]
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// UV coordinates, if present.
    #[inline]
    pub fn uvs(&self) -> Option<&[Point2<f64>]> {
        self.uvs.as_deref()
    }

    /// Position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId) -> &Point3<f64> {
        &self.positions[v.index()]
    }

    /// Vertex indices of a triangle.
    #[inline]
    pub fn triangle(&self, f: FaceId) -> [usize; 3] {
        self.triangles[f.index()]
    }

    /// Iterate over all triangle ids.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        (0..self.triangles.len()).map(FaceId::new)
    }

    /// The three corner positions of a triangle.
    #[inline]
    pub fn face_positions(&self, f: FaceId) -> [Point3<f64>; 3] {
        let [a, b, c] = self.triangles[f.index()];
        [self.positions[a], self.positions[b], self.positions[c]]
    }

    /// Unit normal of a triangle (zero vector if degenerate).
    pub fn face_normal(&self, f: FaceId) -> Vector3<f64> {
        let [p0, p1, p2] = self.face_positions(f);
        (p1 - p0).cross(&(p2 - p0)).try_normalize(0.0).unwrap_or_else(Vector3::zeros)
    }

    /// Area of a triangle.
    pub fn face_area(&self, f: FaceId) -> f64 {
        let [p0, p1, p2] = self.face_positions(f);
        triangle_area(&p0, &p1, &p2)
    }

    /// Total surface area.
    pub fn surface_area(&self) -> f64 {
        self.face_ids().map(|f| self.face_area(f)).sum()
    }

    /// Axis-aligned bounding box of the positions.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.positions.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &self.positions {
            min = min.inf(p);
            max = max.sup(p);
        }
        Some((min, max))
    }

    /// Split into (positions, triangles, uvs).
    pub fn into_parts(self) -> (Vec<Point3<f64>>, Vec<[usize; 3]>, Option<Vec<Point2<f64>>>) {
        (self.positions, self.triangles, self.uvs)
    }
}

/// Area of a 3D triangle.
#[inline]
pub fn triangle_area(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
    0.5 * (p1 - p0).cross(&(p2 - p0)).norm()
}

fn validate(positions: &[Point3<f64>], triangles: &[[usize; 3]]) -> Result<()> {
    if triangles.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    for (fi, tri) in triangles.iter().enumerate() {
        for &vi in tri {
            if vi >= positions.len() {
                return Err(MeshError::InvalidVertexIndex {
                    face: fi,
                    vertex: vi,
                    vertex_count: positions.len(),
                });
            }
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return Err(MeshError::DegenerateFace { face: fi });
        }
        let area = triangle_area(&positions[tri[0]], &positions[tri[1]], &positions[tri[2]]);
        // NaN coordinates must fail here as well.
        if !(area > ZERO_AREA_EPSILON) {
            return Err(MeshError::ZeroAreaFace { face: fi, area });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_positions() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_valid_mesh() {
        let mesh = Mesh::new(square_positions(), vec![[0, 1, 2], [0, 2, 3]]).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_triangles(), 2);
        assert!((mesh.surface_area() - 1.0).abs() < 1e-12);
        let n = mesh.face_normal(FaceId::new(0));
        assert!((n.z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let err = Mesh::new(square_positions(), vec![]).unwrap_err();
        assert!(matches!(err, MeshError::EmptyMesh));
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let err = Mesh::new(square_positions(), vec![[0, 1, 4]]).unwrap_err();
        match err {
            MeshError::InvalidVertexIndex {
                face,
                vertex,
                vertex_count,
            } => {
                assert_eq!(face, 0);
                assert_eq!(vertex, 4);
                assert_eq!(vertex_count, 4);
            }
            e => panic!("Expected InvalidVertexIndex, got {:?}", e),
        }
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let err = Mesh::new(square_positions(), vec![[0, 1, 2], [3, 3, 1]]).unwrap_err();
        assert!(matches!(err, MeshError::DegenerateFace { face: 1 }));
    }

    #[test]
    fn test_zero_area_rejected() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let err = Mesh::new(positions, vec![[0, 1, 2]]).unwrap_err();
        assert!(matches!(err, MeshError::ZeroAreaFace { face: 0, .. }));
    }

    #[test]
    fn test_nan_position_rejected() {
        let mut positions = square_positions();
        positions[2] = Point3::new(f64::NAN, 1.0, 0.0);
        assert!(Mesh::new(positions, vec![[0, 1, 2]]).is_err());
    }

    #[test]
    fn test_uv_count_must_match() {
        let mesh = Mesh::new(square_positions(), vec![[0, 1, 2]]).unwrap();
        let err = mesh.clone().with_uvs(vec![Point2::origin(); 3]).unwrap_err();
        assert!(matches!(err, MeshError::UvCountMismatch { vertices: 4, uvs: 3 }));

        let mesh = mesh.with_uvs(vec![Point2::origin(); 4]).unwrap();
        assert!(mesh.has_uvs());
    }

    #[test]
    fn test_bounding_box() {
        let mesh = Mesh::new(square_positions(), vec![[0, 1, 2]]).unwrap();
        let (min, max) = mesh.bounding_box().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 0.0));
    }
}
