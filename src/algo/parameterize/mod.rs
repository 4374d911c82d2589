//! UV parameterization algorithms.
//!
//! This module computes UV coordinates for single islands. Parameterization
//! maps a patch of the 3D surface to a 2D domain, which is what texture
//! mapping needs.
//!
//! # Available Algorithms
//!
//! - [`lscm`]: Least Squares Conformal Maps - minimizes angle distortion
//! - [`planar_projection`]: projection onto the island's average plane, used
//!   when the conformal system is singular
//!
//! # Example
//!
//! ```
//! use unfold::algo::island::Island;
//! use unfold::algo::parameterize::{lscm, SolverOptions};
//! use unfold::fixtures;
//! use unfold::mesh::IslandId;
//!
//! let grid = fixtures::grid(4);
//! let island = Island::from_faces(&grid, IslandId::new(0), grid.face_ids().collect());
//!
//! let uv_map = lscm(&grid, &island, &SolverOptions::default()).unwrap();
//! for (local, uv) in uv_map.iter().enumerate() {
//!     println!("vertex {}: u={:.3}, v={:.3}", island.vertices[local], uv.x, uv.y);
//! }
//! ```
//!
//! # References
//!
//! - Lévy, B., Petitjean, S., Ray, N., & Maillot, J. (2002). "Least squares
//!   conformal maps for automatic texture atlas generation." ACM SIGGRAPH.

mod lscm;
mod planar;
mod sparse;
mod uv;

pub use lscm::{lscm, PinnedVertex, SolverOptions, DEGENERATE_AREA};
pub use planar::planar_projection;
pub use sparse::{conjugate_gradient, CsrMatrix};
pub use uv::UVMap;
