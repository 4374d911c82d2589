//! UV islands (charts).
//!
//! An [`Island`] is a set of triangles flattened together. Segmentation
//! creates it, the solver fills in its UV coordinates, the packer assigns its
//! placement and the metrics read the placed result. Each island keeps a
//! local vertex numbering so that it can be solved without touching any
//! other island's state.

use std::collections::{BTreeMap, HashMap};

use nalgebra::{Point2, Point3};

use super::pack::Placement;
use super::parameterize::UVMap;
use super::segment::Segmentation;
use crate::mesh::{EdgeKey, FaceId, IslandId, Mesh};

/// A connected group of triangles with its own UV patch.
#[derive(Debug, Clone, PartialEq)]
pub struct Island {
    /// Island id, contiguous from 0.
    pub id: IslandId,
    /// Triangles of the island, ascending.
    pub faces: Vec<FaceId>,
    /// Mesh vertices referenced by the island, ascending. Local vertex `i`
    /// is mesh vertex `vertices[i]`.
    pub vertices: Vec<usize>,
    /// Island triangles in local vertex indices, parallel to `faces`.
    pub local_triangles: Vec<[usize; 3]>,
    /// Boundary loops as ordered cycles of mesh vertex indices, longest first.
    pub boundary_loops: Vec<Vec<usize>>,
    /// Solved UV per local vertex (empty until solved).
    pub uvs: UVMap,
    /// Transform from solved UVs into the atlas.
    pub placement: Placement,
    /// Flagged by segmentation as below the minimum size with nothing to merge into.
    pub small: bool,
    /// UVs come from the planar fallback rather than the conformal solve.
    pub fallback: bool,
}

impl Island {
    /// Build an island from its triangles.
    pub fn from_faces(mesh: &Mesh, id: IslandId, faces: Vec<FaceId>) -> Self {
        let mut vertices: Vec<usize> = faces.iter().flat_map(|&f| mesh.triangle(f)).collect();
        vertices.sort_unstable();
        vertices.dedup();

        let local: HashMap<usize, usize> =
            vertices.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let local_triangles = faces
            .iter()
            .map(|&f| mesh.triangle(f).map(|v| local[&v]))
            .collect();

        let boundary_loops = boundary_loops(mesh, &faces);

        Self {
            id,
            faces,
            vertices,
            local_triangles,
            boundary_loops,
            uvs: UVMap::default(),
            placement: Placement::identity(),
            small: false,
            fallback: false,
        }
    }

    /// Number of triangles.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Number of referenced vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the island is a closed surface.
    pub fn is_closed(&self) -> bool {
        self.boundary_loops.is_empty()
    }

    /// Positions of the island's vertices in local order.
    pub fn local_positions(&self, mesh: &Mesh) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|&v| mesh.positions()[v]).collect()
    }

    /// Bounding box of the solved UVs, before placement.
    pub fn uv_bounds(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        self.uvs.bounding_box()
    }

    /// UVs with the placement applied.
    pub fn placed_uvs(&self) -> Vec<Point2<f64>> {
        self.uvs.iter().map(|uv| self.placement.apply(uv)).collect()
    }
}

/// Build one island per segment.
pub fn build_islands(mesh: &Mesh, segmentation: &Segmentation) -> Vec<Island> {
    segmentation
        .island_faces
        .iter()
        .enumerate()
        .map(|(i, faces)| {
            let id = IslandId::new(i);
            let mut island = Island::from_faces(mesh, id, faces.clone());
            island.small = segmentation.is_small(id);
            island
        })
        .collect()
}

/// Ordered boundary cycles of a set of triangles.
///
/// A boundary edge is used by exactly one of the triangles. Loops follow the
/// triangle winding. Where several boundary edges leave the same vertex the
/// smallest unused target is taken first.
pub fn boundary_loops(mesh: &Mesh, faces: &[FaceId]) -> Vec<Vec<usize>> {
    let mut use_count: HashMap<EdgeKey, usize> = HashMap::new();
    for &f in faces {
        let t = mesh.triangle(f);
        for i in 0..3 {
            *use_count.entry(EdgeKey::new(t[i], t[(i + 1) % 3])).or_insert(0) += 1;
        }
    }

    // Directed boundary edges, grouped by source vertex.
    let mut outgoing: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &f in faces {
        let t = mesh.triangle(f);
        for i in 0..3 {
            let (a, b) = (t[i], t[(i + 1) % 3]);
            if use_count[&EdgeKey::new(a, b)] == 1 {
                outgoing.entry(a).or_default().push(b);
            }
        }
    }
    for targets in outgoing.values_mut() {
        // Popped from the back, so keep the smallest last.
        targets.sort_unstable_by(|x, y| y.cmp(x));
    }

    let mut loops = Vec::new();
    loop {
        let Some(start) = outgoing
            .iter()
            .find(|(_, targets)| !targets.is_empty())
            .map(|(&v, _)| v)
        else {
            break;
        };

        let mut cycle = vec![start];
        let mut current = start;
        while let Some(next) = outgoing.get_mut(&current).and_then(|t| t.pop()) {
            if next == start {
                break;
            }
            cycle.push(next);
            current = next;
        }
        loops.push(cycle);
    }

    // Stable: equal lengths keep ascending start vertex.
    loops.sort_by(|a, b| b.len().cmp(&a.len()));
    loops
}
