//! Island packing.
//!
//! Lays the solved islands out in the unit square with a shelf heuristic:
//! islands are sorted by decreasing bounding-box area and placed left to
//! right on horizontal shelves, a new shelf starting whenever the next island
//! would cross `u = 1`. A final uniform scale fits the whole layout into
//! [0,1]², so packing never fails for a feasible margin.
//!
//! Islands are first brought to a common scale so that their total
//! bounding-box area is about one unit. The margin is applied at that scale;
//! the final fit scales it along with everything else, and the gap actually
//! left between islands is reported in [`Packing::margin`].

use nalgebra::{Point2, Vector2};
use tracing::{debug, warn};

use super::island::Island;
use crate::error::{MeshError, Result};

/// Similarity (uniform scale + translation) taking solved UVs into the atlas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Translation applied after scaling.
    pub offset: Vector2<f64>,
    /// Uniform scale factor.
    pub scale: f64,
}

impl Placement {
    /// Create a placement.
    pub fn new(offset: Vector2<f64>, scale: f64) -> Self {
        Self { offset, scale }
    }

    /// The placement that leaves coordinates unchanged.
    pub fn identity() -> Self {
        Self::new(Vector2::zeros(), 1.0)
    }

    /// Map a solved UV into the atlas.
    #[inline]
    pub fn apply(&self, uv: &Point2<f64>) -> Point2<f64> {
        Point2::from(uv.coords * self.scale + self.offset)
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::identity()
    }
}

/// Result of packing.
#[derive(Debug, Clone, PartialEq)]
pub struct Packing {
    /// One placement per input box, in input order.
    pub placements: Vec<Placement>,
    /// Gap left between neighbouring boxes after the final fit.
    pub margin: f64,
    /// Uniform factor of the final fit (below 1 means the layout was shrunk).
    pub fit_scale: f64,
}

/// Check a margin value before packing.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] for a negative or non-finite margin
/// - [`MeshError::PackingOverflow`] for a margin above 1.0
pub fn validate_margin(margin: f64) -> Result<()> {
    if !margin.is_finite() || margin < 0.0 {
        return Err(MeshError::invalid_param(
            "island_margin",
            margin,
            "must be a finite value >= 0",
        ));
    }
    if margin > 1.0 {
        return Err(MeshError::PackingOverflow { margin });
    }
    Ok(())
}

/// Pack axis-aligned boxes into the unit square.
///
/// `bounds` holds the `(min, max)` corners of each island's solved UVs.
/// Boxes are placed in order of decreasing area, ties by ascending index.
///
/// # Errors
///
/// See [`validate_margin`].
pub fn pack_boxes(bounds: &[(Point2<f64>, Point2<f64>)], margin: f64) -> Result<Packing> {
    validate_margin(margin)?;

    if bounds.is_empty() {
        return Ok(Packing {
            placements: Vec::new(),
            margin,
            fit_scale: 1.0,
        });
    }

    let sizes: Vec<Vector2<f64>> = bounds.iter().map(|(min, max)| max - min).collect();

    // Common scale: total box area about 1, and no box wider or taller than 1.
    let total_area: f64 = sizes.iter().map(|s| s.x * s.y).sum();
    let max_dim = sizes.iter().fold(0.0f64, |m, s| m.max(s.x).max(s.y));
    let reference = total_area.sqrt().max(max_dim);
    let pre_scale = if reference > 1e-12 { 1.0 / reference } else { 1.0 };

    let mut order: Vec<usize> = (0..bounds.len()).collect();
    order.sort_by(|&a, &b| {
        let area_a = sizes[a].x * sizes[a].y;
        let area_b = sizes[b].x * sizes[b].y;
        area_b.total_cmp(&area_a).then(a.cmp(&b))
    });

    // Shelf placement at the common scale.
    let mut targets = vec![Vector2::zeros(); bounds.len()];
    let mut cursor_x = 0.0;
    let mut shelf_y = 0.0;
    let mut shelf_height = 0.0f64;
    let mut extent = Vector2::<f64>::zeros();

    for &i in &order {
        let w = sizes[i].x * pre_scale;
        let h = sizes[i].y * pre_scale;

        if cursor_x > 0.0 && cursor_x + w > 1.0 {
            shelf_y += shelf_height + margin;
            cursor_x = 0.0;
            shelf_height = 0.0;
        }

        targets[i] = Vector2::new(cursor_x, shelf_y);
        extent.x = extent.x.max(cursor_x + w);
        extent.y = extent.y.max(shelf_y + h);

        cursor_x += w + margin;
        shelf_height = shelf_height.max(h);
    }

    // Uniform fit of the whole layout into the unit square.
    let largest = extent.x.max(extent.y);
    let fit_scale = if largest > 1e-12 { 1.0 / largest } else { 1.0 };
    if fit_scale < 1.0 {
        warn!(
            extent = largest,
            fit_scale, "packed layout exceeds the unit square, rescaling"
        );
    }

    let placements = bounds
        .iter()
        .zip(&targets)
        .map(|((min, _), target)| {
            let scale = pre_scale * fit_scale;
            let offset = (target - min.coords * pre_scale) * fit_scale;
            Placement::new(offset, scale)
        })
        .collect();

    debug!(
        boxes = bounds.len(),
        shelves_height = extent.y,
        fit_scale,
        "packed islands"
    );

    Ok(Packing {
        placements,
        margin: margin * fit_scale,
        fit_scale,
    })
}

/// Pack solved islands, writing each island's placement.
///
/// Islands without UVs are treated as a point at the origin.
pub fn pack_islands(islands: &mut [Island], margin: f64) -> Result<Packing> {
    let bounds: Vec<(Point2<f64>, Point2<f64>)> = islands
        .iter()
        .map(|island| {
            island
                .uv_bounds()
                .unwrap_or((Point2::origin(), Point2::origin()))
        })
        .collect();

    let packing = pack_boxes(&bounds, margin)?;
    for (island, placement) in islands.iter_mut().zip(&packing.placements) {
        island.placement = *placement;
    }
    Ok(packing)
}

/// Normalize every island into [0,1]² on its own, preserving aspect.
///
/// Used when packing is disabled; islands overlap.
pub fn normalize_islands(islands: &mut [Island]) {
    for island in islands {
        island.uvs.normalize();
        island.placement = Placement::identity();
    }
}
