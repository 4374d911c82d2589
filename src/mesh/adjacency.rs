//! Derived edge and vertex adjacency.
//!
//! [`Adjacency`] is computed from a [`Mesh`] on demand and answers the
//! incidence queries the segmentation and solver need: which triangles share
//! an edge, which triangles touch a vertex, and which edges are boundary or
//! non-manifold. Unlike a half-edge structure it represents non-manifold
//! edges (more than two incident triangles) faithfully, so they can be
//! detected and cut instead of rejected at load time.

use std::collections::HashMap;

use super::index::{EdgeKey, FaceId, VertexId};
use super::trimesh::Mesh;

/// Edge/vertex incidence tables for a mesh.
#[derive(Debug, Clone)]
pub struct Adjacency {
    /// Unique undirected edges, sorted.
    edges: Vec<EdgeKey>,
    /// Triangles incident to each edge, ascending.
    edge_faces: Vec<Vec<FaceId>>,
    /// Lookup from edge key to index into `edges`.
    edge_index: HashMap<EdgeKey, usize>,
    /// Triangles incident to each vertex, ascending.
    vertex_faces: Vec<Vec<FaceId>>,
    /// Edge index of each triangle side, side `i` running from corner `i` to `i + 1`.
    face_edges: Vec<[usize; 3]>,
}

impl Adjacency {
    /// Build the adjacency tables for a mesh.
    pub fn build(mesh: &Mesh) -> Self {
        let triangles = mesh.triangles();

        let mut incidences: Vec<(EdgeKey, usize)> = Vec::with_capacity(triangles.len() * 3);
        let mut vertex_faces = vec![Vec::new(); mesh.num_vertices()];

        for (fi, tri) in triangles.iter().enumerate() {
            for i in 0..3 {
                incidences.push((EdgeKey::new(tri[i], tri[(i + 1) % 3]), fi));
                vertex_faces[tri[i]].push(FaceId::new(fi));
            }
        }
        incidences.sort_unstable();

        let mut edges: Vec<EdgeKey> = Vec::new();
        let mut edge_faces: Vec<Vec<FaceId>> = Vec::new();
        for (key, fi) in incidences {
            if edges.last() != Some(&key) {
                edges.push(key);
                edge_faces.push(Vec::with_capacity(2));
            }
            if let Some(faces) = edge_faces.last_mut() {
                // A face lists an edge at most once since its corners are distinct.
                faces.push(FaceId::new(fi));
            }
        }

        let edge_index: HashMap<EdgeKey, usize> =
            edges.iter().enumerate().map(|(i, &e)| (e, i)).collect();

        let face_edges = triangles
            .iter()
            .map(|tri| {
                let mut sides = [0usize; 3];
                for (i, side) in sides.iter_mut().enumerate() {
                    *side = edge_index[&EdgeKey::new(tri[i], tri[(i + 1) % 3])];
                }
                sides
            })
            .collect();

        Self {
            edges,
            edge_faces,
            edge_index,
            vertex_faces,
            face_edges,
        }
    }

    /// Number of unique edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// All unique edges, sorted.
    #[inline]
    pub fn edges(&self) -> &[EdgeKey] {
        &self.edges
    }

    /// Index of the edge between two vertices, if it exists.
    pub fn find_edge(&self, a: usize, b: usize) -> Option<usize> {
        self.edge_index.get(&EdgeKey::new(a, b)).copied()
    }

    /// Triangles incident to an edge (by edge index), ascending.
    #[inline]
    pub fn edge_faces(&self, edge: usize) -> &[FaceId] {
        &self.edge_faces[edge]
    }

    /// Triangles incident to the edge between two vertices.
    ///
    /// Empty if the vertices are not connected by an edge.
    pub fn faces_of_edge(&self, a: usize, b: usize) -> &[FaceId] {
        match self.find_edge(a, b) {
            Some(e) => &self.edge_faces[e],
            None => &[],
        }
    }

    /// Triangles incident to a vertex, ascending.
    #[inline]
    pub fn faces_of_vertex(&self, v: VertexId) -> &[FaceId] {
        &self.vertex_faces[v.index()]
    }

    /// Edge indices of the three sides of a triangle.
    #[inline]
    pub fn face_edges(&self, f: FaceId) -> [usize; 3] {
        self.face_edges[f.index()]
    }

    /// Whether an edge belongs to exactly one triangle.
    #[inline]
    pub fn is_boundary_edge(&self, edge: usize) -> bool {
        self.edge_faces[edge].len() == 1
    }

    /// Whether an edge is shared by more than two triangles.
    #[inline]
    pub fn is_non_manifold_edge(&self, edge: usize) -> bool {
        self.edge_faces[edge].len() > 2
    }

    /// Indices of all non-manifold edges.
    pub fn non_manifold_edges(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.edges.len()).filter(move |&e| self.is_non_manifold_edge(e))
    }

    /// Number of boundary edges.
    pub fn num_boundary_edges(&self) -> usize {
        (0..self.edges.len())
            .filter(|&e| self.is_boundary_edge(e))
            .count()
    }

    /// Triangles sharing an edge with `f`, paired with the shared edge index.
    ///
    /// Sorted by neighbouring triangle, then edge. A triangle reachable over a
    /// non-manifold edge is included once per shared edge.
    pub fn face_neighbors(&self, f: FaceId) -> Vec<(FaceId, usize)> {
        let mut out = Vec::with_capacity(3);
        for e in self.face_edges[f.index()] {
            for &g in &self.edge_faces[e] {
                if g != f {
                    out.push((g, e));
                }
            }
        }
        out.sort_unstable();
        out
    }
}
