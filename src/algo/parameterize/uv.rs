//! UV coordinate storage.
//!
//! This module provides the [`UVMap`] type holding the 2D coordinates of an
//! island's vertices in the island's local vertex order.

use std::ops::Index;

use nalgebra::Point2;

/// UV coordinates for the vertices of one island.
///
/// Index `i` holds the UV of local vertex `i`. Coordinates straight out of a
/// solver are in surface units and are not confined to [0, 1].
///
/// # Example
///
/// ```
/// use unfold::algo::parameterize::UVMap;
/// use nalgebra::Point2;
///
/// let mut uvs = UVMap::new(vec![Point2::new(0.0, 0.0), Point2::new(4.0, 2.0)]);
/// uvs.normalize();
/// assert_eq!(uvs.get(1), Point2::new(1.0, 0.5));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UVMap {
    coords: Vec<Point2<f64>>,
}

impl UVMap {
    /// Create a new UV map with the given coordinates.
    pub fn new(coords: Vec<Point2<f64>>) -> Self {
        Self { coords }
    }

    /// Get the UV coordinates of a local vertex.
    #[inline]
    pub fn get(&self, v: usize) -> Point2<f64> {
        self.coords[v]
    }

    /// Get the number of UV coordinates.
    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Iterate over all UV coordinates.
    pub fn iter(&self) -> impl Iterator<Item = &Point2<f64>> + '_ {
        self.coords.iter()
    }

    /// Get the raw coordinates slice.
    pub fn as_slice(&self) -> &[Point2<f64>] {
        &self.coords
    }

    /// Compute the bounding box of the UV coordinates.
    ///
    /// Returns `None` if the UV map is empty.
    pub fn bounding_box(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        let first = self.coords.first()?;
        let mut min = *first;
        let mut max = *first;

        for uv in &self.coords {
            min = min.inf(uv);
            max = max.sup(uv);
        }

        Some((min, max))
    }

    /// Normalize UV coordinates to fit within [0, 1] range.
    ///
    /// Maintains aspect ratio by scaling uniformly based on the larger
    /// dimension. A map with no extent is moved to the origin.
    pub fn normalize(&mut self) {
        if let Some((min, max)) = self.bounding_box() {
            let scale = (max.x - min.x).max(max.y - min.y);
            let inv = if scale > 1e-12 { 1.0 / scale } else { 0.0 };

            for uv in &mut self.coords {
                uv.x = (uv.x - min.x) * inv;
                uv.y = (uv.y - min.y) * inv;
            }
        }
    }

    /// Compute the total area in UV space.
    ///
    /// `faces` index into this map.
    pub fn total_area(&self, faces: &[[usize; 3]]) -> f64 {
        faces
            .iter()
            .map(|face| {
                let p0 = self.coords[face[0]];
                let p1 = self.coords[face[1]];
                let p2 = self.coords[face[2]];
                0.5 * (p1 - p0).perp(&(p2 - p0)).abs()
            })
            .sum()
    }
}

impl From<Vec<Point2<f64>>> for UVMap {
    fn from(coords: Vec<Point2<f64>>) -> Self {
        Self::new(coords)
    }
}

impl Index<usize> for UVMap {
    type Output = Point2<f64>;

    #[inline]
    fn index(&self, v: usize) -> &Point2<f64> {
        &self.coords[v]
    }
}
