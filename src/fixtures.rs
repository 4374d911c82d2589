//! Test meshes with known topology.
//!
//! Small procedural meshes used by the tests, the benchmarks and the doc
//! examples, plus [`topology_counts`] for checking the Euler characteristic of
//! a generated surface.
//!
//! ```
//! use unfold::fixtures::{topology_counts, uv_sphere};
//!
//! let sphere = uv_sphere(8, 6, 1.0);
//! let counts = topology_counts(&sphere);
//! assert_eq!((counts.vertices, counts.edges, counts.faces), (42, 120, 80));
//! assert_eq!(counts.euler_characteristic(), 2);
//! ```

use std::collections::HashSet;
use std::f64::consts::PI;

use nalgebra::Point3;
use serde::Serialize;

use crate::mesh::{EdgeKey, Mesh};

/// Vertex, edge and face counts of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopologyCounts {
    /// Number of vertices.
    pub vertices: usize,
    /// Number of unique undirected edges.
    pub edges: usize,
    /// Number of triangles.
    pub faces: usize,
}

impl TopologyCounts {
    /// V - E + F. Equals 2 for a closed genus-0 surface.
    pub fn euler_characteristic(&self) -> i64 {
        self.vertices as i64 - self.edges as i64 + self.faces as i64
    }
}

/// Count vertices, unique edges and faces.
pub fn topology_counts(mesh: &Mesh) -> TopologyCounts {
    let edges: HashSet<EdgeKey> = mesh
        .triangles()
        .iter()
        .flat_map(|t| {
            [
                EdgeKey::new(t[0], t[1]),
                EdgeKey::new(t[1], t[2]),
                EdgeKey::new(t[2], t[0]),
            ]
        })
        .collect();

    TopologyCounts {
        vertices: mesh.num_vertices(),
        edges: edges.len(),
        faces: mesh.num_triangles(),
    }
}

/// Latitude/longitude sphere around the Y axis.
///
/// `segments` divisions around the equator, `rings` from pole to pole.
/// Layout: top pole, `rings - 1` rings of `segments` vertices, bottom pole.
/// Triangles: top cap, then two per quad band by band, then bottom cap.
///
/// # Panics
///
/// Panics if `segments < 3` or `rings < 2`.
pub fn uv_sphere(segments: usize, rings: usize, radius: f64) -> Mesh {
    assert!(segments >= 3 && rings >= 2, "sphere needs segments >= 3 and rings >= 2");

    let mut positions = Vec::with_capacity(segments * (rings - 1) + 2);
    positions.push(Point3::new(0.0, radius, 0.0));
    for ring in 1..rings {
        let theta = PI * ring as f64 / rings as f64;
        let (ring_radius, y) = (radius * theta.sin(), radius * theta.cos());
        for seg in 0..segments {
            let phi = 2.0 * PI * seg as f64 / segments as f64;
            positions.push(Point3::new(ring_radius * phi.cos(), y, ring_radius * phi.sin()));
        }
    }
    let bottom = positions.len();
    positions.push(Point3::new(0.0, -radius, 0.0));

    let ring_vertex = |ring: usize, seg: usize| 1 + ring * segments + seg % segments;

    let mut triangles = Vec::with_capacity(2 * segments * (rings - 1));
    for seg in 0..segments {
        triangles.push([0, ring_vertex(0, seg), ring_vertex(0, seg + 1)]);
    }
    for ring in 0..rings - 2 {
        for seg in 0..segments {
            let v0 = ring_vertex(ring, seg);
            let v1 = ring_vertex(ring + 1, seg);
            let v2 = ring_vertex(ring + 1, seg + 1);
            let v3 = ring_vertex(ring, seg + 1);
            triangles.push([v0, v1, v2]);
            triangles.push([v0, v2, v3]);
        }
    }
    for seg in 0..segments {
        triangles.push([
            ring_vertex(rings - 2, seg),
            bottom,
            ring_vertex(rings - 2, seg + 1),
        ]);
    }

    Mesh::new(positions, triangles).expect("sphere fixture is well-formed")
}

/// Flat `n` x `n` grid over the unit square in the z = 0 plane.
///
/// Vertex `(i, j)` has index `j * (n + 1) + i`. Every cell is split along its
/// diagonal into two counter-clockwise triangles.
///
/// # Panics
///
/// Panics if `n == 0`.
pub fn grid(n: usize) -> Mesh {
    assert!(n > 0, "grid needs at least one cell");

    let step = 1.0 / n as f64;
    let mut positions = Vec::with_capacity((n + 1) * (n + 1));
    for j in 0..=n {
        for i in 0..=n {
            positions.push(Point3::new(i as f64 * step, j as f64 * step, 0.0));
        }
    }

    let mut triangles = Vec::with_capacity(2 * n * n);
    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;
            triangles.push([v00, v10, v11]);
            triangles.push([v00, v11, v01]);
        }
    }

    Mesh::new(positions, triangles).expect("grid fixture is well-formed")
}

/// The unit square as two triangles.
pub fn unit_square() -> Mesh {
    Mesh::new(
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
    )
    .expect("square fixture is well-formed")
}

/// Unit cube with outward winding, two triangles per side.
pub fn cube() -> Mesh {
    let positions = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(0.0, 1.0, 1.0),
    ];
    let triangles = vec![
        // -z
        [0, 2, 1],
        [0, 3, 2],
        // +z
        [4, 5, 6],
        [4, 6, 7],
        // -y
        [0, 1, 5],
        [0, 5, 4],
        // +y
        [3, 7, 6],
        [3, 6, 2],
        // -x
        [0, 4, 7],
        [0, 7, 3],
        // +x
        [1, 2, 6],
        [1, 6, 5],
    ];

    Mesh::new(positions, triangles).expect("cube fixture is well-formed")
}
