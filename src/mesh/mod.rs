//! Core mesh data structures.
//!
//! This module provides the indexed triangle mesh used throughout the crate
//! and the adjacency tables derived from it.
//!
//! # Overview
//!
//! The primary type is [`Mesh`]: positions, triangles and optional per-vertex
//! UVs, validated once at construction. Incidence queries (triangles around
//! an edge or a vertex, boundary and non-manifold edges) live in
//! [`Adjacency`], which is derived on demand and never stored in the mesh.
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`FaceId`] - Identifies a triangle
//! - [`IslandId`] - Identifies a UV island (chart)
//! - [`EdgeKey`] - An unordered vertex pair
//!
//! # Construction
//!
//! ```
//! use unfold::mesh::{Adjacency, Mesh};
//! use nalgebra::Point3;
//!
//! let mesh = Mesh::new(
//!     vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(0.5, 1.0, 0.0),
//!     ],
//!     vec![[0, 1, 2]],
//! )
//! .unwrap();
//!
//! let adjacency = Adjacency::build(&mesh);
//! assert_eq!(adjacency.num_edges(), 3);
//! ```

mod adjacency;
mod index;
mod trimesh;

pub use adjacency::Adjacency;
pub use index::{EdgeKey, FaceId, IslandId, VertexId};
pub use trimesh::{triangle_area, Mesh, ZERO_AREA_EPSILON};
