//! UV unwrapping algorithms.
//!
//! The pipeline stages, leaf first:
//!
//! - **Segmentation** ([`segment`]): cut the mesh into islands along sharp,
//!   boundary and non-manifold edges
//! - **Parameterization** ([`parameterize`]): flatten each island with
//!   least squares conformal maps, with a planar fallback
//! - **Packing** ([`pack`]): lay the islands out in the unit square
//! - **Metrics** ([`metrics`]): stretch, area and angle distortion, coverage
//!
//! [`unwrap`] strings them together.

pub mod island;
pub mod metrics;
pub mod pack;
pub mod parameterize;
pub mod progress;
pub mod segment;
pub mod unwrap;
