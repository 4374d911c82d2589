//! UV quality metrics.
//!
//! Stateless functions scoring a parameterization against its 3D surface.
//! All of them take the same three slices (3D positions, UVs indexed like
//! the positions, and triangles) and skip triangles that are degenerate in
//! either space. When nothing valid is left they return a neutral value
//! instead of failing: stretch and area distortion 1.0, angle error 0.0.
//!
//! | Metric | Ideal | Meaning |
//! |--------|-------|---------|
//! | stretch | 1.0 | ratio of the Jacobian's singular values |
//! | area distortion | 1.0 | UV/3D area ratio relative to the global scale |
//! | angle distortion | 0° | mean corner-angle error |
//! | coverage | 1.0 | fraction of the unit square covered |

use nalgebra::{Matrix2, Matrix3x2, Point2, Point3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::mesh::{triangle_area, Mesh};

/// Default grid resolution for [`coverage`].
pub const COVERAGE_RESOLUTION: usize = 1024;

/// Triangles below this area (3D or UV) are skipped.
const MIN_AREA: f64 = 1e-10;

/// Edges shorter than this do not define a corner angle.
const MIN_EDGE: f64 = 1e-10;

/// Average and maximum of a per-triangle measure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Mean value.
    pub avg: f64,
    /// Largest value.
    pub max: f64,
}

impl Stats {
    /// The value reported when no triangle qualifies.
    pub const NEUTRAL: Stats = Stats { avg: 1.0, max: 1.0 };

    fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::NEUTRAL;
        }
        let sum: f64 = samples.iter().sum();
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            avg: sum / samples.len() as f64,
            max,
        }
    }
}

/// All quality metrics of one parameterization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Singular-value ratio of the UV-to-3D Jacobian.
    pub stretch: Stats,
    /// Scale-normalized area ratio, symmetric around 1.
    pub area_distortion: Stats,
    /// Mean absolute corner-angle error in degrees.
    pub angle_distortion: f64,
    /// Covered fraction of the unit square.
    pub coverage: f64,
    /// Triangles non-degenerate in both 3D and UV.
    pub valid_triangles: usize,
}

impl QualityMetrics {
    /// Whether at least one triangle was valid.
    ///
    /// With no valid triangle every statistic is the neutral value, which
    /// would otherwise read as a perfect result.
    #[inline]
    pub fn is_meaningful(&self) -> bool {
        self.valid_triangles > 0
    }
}

/// Compute every metric.
pub fn compute_metrics(
    positions: &[Point3<f64>],
    uvs: &[Point2<f64>],
    triangles: &[[usize; 3]],
) -> QualityMetrics {
    let valid_triangles = triangles
        .iter()
        .filter(|t| triangle_stretch(&corners3(positions, t), &corners2(uvs, t)).is_some())
        .count();
    if valid_triangles == 0 && !triangles.is_empty() {
        warn!(
            triangles = triangles.len(),
            "no triangle is valid in both 3D and UV, metrics fall back to neutral values"
        );
    }

    QualityMetrics {
        stretch: stretch(positions, uvs, triangles),
        area_distortion: area_distortion(positions, uvs, triangles),
        angle_distortion: angle_distortion(positions, uvs, triangles),
        coverage: coverage(uvs, triangles),
        valid_triangles,
    }
}

impl Mesh {
    /// Quality metrics of the mesh's UVs, or `None` without UVs.
    pub fn quality(&self) -> Option<QualityMetrics> {
        let uvs = self.uvs()?;
        Some(compute_metrics(self.positions(), uvs, self.triangles()))
    }
}

#[inline]
fn corners3(positions: &[Point3<f64>], t: &[usize; 3]) -> [Point3<f64>; 3] {
    [positions[t[0]], positions[t[1]], positions[t[2]]]
}

#[inline]
fn corners2(uvs: &[Point2<f64>], t: &[usize; 3]) -> [Point2<f64>; 3] {
    [uvs[t[0]], uvs[t[1]], uvs[t[2]]]
}

#[inline]
fn uv_area(uv: &[Point2<f64>; 3]) -> f64 {
    0.5 * (uv[1] - uv[0]).perp(&(uv[2] - uv[0])).abs()
}

/// Stretch of a single triangle.
///
/// Solves `[dp1 dp2] = J * [duv1 duv2]` for the 3x2 Jacobian `J` and returns
/// `s1 / s2` for its singular values `s1 >= s2`. `None` if the triangle is
/// degenerate in either space.
pub fn triangle_stretch(p: &[Point3<f64>; 3], uv: &[Point2<f64>; 3]) -> Option<f64> {
    if triangle_area(&p[0], &p[1], &p[2]) < MIN_AREA || uv_area(uv) < MIN_AREA {
        return None;
    }

    let dp1 = p[1] - p[0];
    let dp2 = p[2] - p[0];
    let duv1 = uv[1] - uv[0];
    let duv2 = uv[2] - uv[0];

    let dp = Matrix3x2::from_columns(&[dp1, dp2]);
    let duv = Matrix2::from_columns(&[duv1, duv2]);
    let j = dp * duv.try_inverse()?;

    // Singular values from the eigenvalues of the 2x2 JᵀJ.
    let jtj = j.transpose() * j;
    let (a, b, c) = (jtj[(0, 0)], jtj[(0, 1)], jtj[(1, 1)]);
    let mean = 0.5 * (a + c);
    let spread = (0.25 * (a - c) * (a - c) + b * b).sqrt();
    let s1 = (mean + spread).max(0.0).sqrt();
    let s2 = (mean - spread).max(0.0).sqrt();

    if s2 < 1e-300 || !s1.is_finite() {
        return None;
    }
    Some(s1 / s2)
}

/// Per-triangle stretch, averaged and maxed over valid triangles.
pub fn stretch(
    positions: &[Point3<f64>],
    uvs: &[Point2<f64>],
    triangles: &[[usize; 3]],
) -> Stats {
    let samples: Vec<f64> = triangles
        .iter()
        .filter_map(|t| triangle_stretch(&corners3(positions, t), &corners2(uvs, t)))
        .collect();
    Stats::from_samples(&samples)
}

/// Area distortion.
///
/// Each triangle's UV/3D area ratio is divided by the squared median
/// edge-length ratio, which removes the global UV scale, and reported as
/// `max(r, 1/r)` so that both growth and shrinkage count as distortion.
pub fn area_distortion(
    positions: &[Point3<f64>],
    uvs: &[Point2<f64>],
    triangles: &[[usize; 3]],
) -> Stats {
    let mut ratios = Vec::new();
    let mut edge_ratios = Vec::new();

    for t in triangles {
        let p = corners3(positions, t);
        let uv = corners2(uvs, t);
        let area_3d = triangle_area(&p[0], &p[1], &p[2]);
        let area_uv = uv_area(&uv);
        if area_3d < MIN_AREA || area_uv < MIN_AREA {
            continue;
        }
        ratios.push(area_uv / area_3d);

        for i in 0..3 {
            let j = (i + 1) % 3;
            let len_3d = (p[j] - p[i]).norm();
            let len_uv = (uv[j] - uv[i]).norm();
            if len_3d > MIN_EDGE && len_uv > MIN_EDGE {
                edge_ratios.push(len_uv / len_3d);
            }
        }
    }

    let scale = match median(&mut edge_ratios) {
        Some(m) if m > MIN_EDGE => m * m,
        _ => return Stats::NEUTRAL,
    };

    let samples: Vec<f64> = ratios
        .into_iter()
        .map(|r| {
            let r = r / scale;
            r.max(1.0 / r)
        })
        .collect();
    Stats::from_samples(&samples)
}

/// Mean absolute difference, in degrees, between 3D and UV corner angles.
pub fn angle_distortion(
    positions: &[Point3<f64>],
    uvs: &[Point2<f64>],
    triangles: &[[usize; 3]],
) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;

    for t in triangles {
        let p = corners3(positions, t);
        let uv = corners2(uvs, t);

        for i in 0..3 {
            let (j, k) = ((i + 1) % 3, (i + 2) % 3);
            let angle_3d = corner_angle((p[j] - p[i]).as_slice(), (p[k] - p[i]).as_slice());
            let angle_uv = corner_angle((uv[j] - uv[i]).as_slice(), (uv[k] - uv[i]).as_slice());
            if let (Some(a3), Some(a2)) = (angle_3d, angle_uv) {
                total += (a3 - a2).abs().to_degrees();
                count += 1;
            }
        }
    }

    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Angle between two edge vectors of any dimension, in radians.
fn corner_angle(e1: &[f64], e2: &[f64]) -> Option<f64> {
    let dot: f64 = e1.iter().zip(e2).map(|(a, b)| a * b).sum();
    let len1 = e1.iter().map(|a| a * a).sum::<f64>().sqrt();
    let len2 = e2.iter().map(|a| a * a).sum::<f64>().sqrt();
    if len1 <= MIN_EDGE || len2 <= MIN_EDGE {
        return None;
    }
    Some((dot / (len1 * len2)).clamp(-1.0, 1.0).acos())
}

/// Fraction of the unit square covered by UV triangles, on a 1024² grid.
pub fn coverage(uvs: &[Point2<f64>], triangles: &[[usize; 3]]) -> f64 {
    coverage_with_resolution(uvs, triangles, COVERAGE_RESOLUTION)
}

/// Fraction of the unit square covered by UV triangles.
///
/// Rasterizes onto a `resolution`² grid and tests each pixel centre inside
/// the triangle's bounding box with barycentric signs. Either winding
/// counts; points on an edge count as inside. Overlaps are counted once.
pub fn coverage_with_resolution(
    uvs: &[Point2<f64>],
    triangles: &[[usize; 3]],
    resolution: usize,
) -> f64 {
    if resolution == 0 {
        return 0.0;
    }

    let res = resolution as f64;
    let mut covered = vec![false; resolution * resolution];
    let mut count = 0usize;

    let pixel_range = |lo: f64, hi: f64| -> Option<(usize, usize)> {
        // Pixel i has its centre at (i + 0.5) / res.
        let first = (lo * res - 0.5).ceil().max(0.0);
        let last = (hi * res - 0.5).floor().min(res - 1.0);
        (first <= last).then(|| (first as usize, last as usize))
    };

    for t in triangles {
        let [a, b, c] = corners2(uvs, t);
        if ![a, b, c].iter().all(|p| p.x.is_finite() && p.y.is_finite()) {
            continue;
        }
        if (b - a).perp(&(c - a)).abs() < 1e-300 {
            continue;
        }

        let min = a.inf(&b).inf(&c);
        let max = a.sup(&b).sup(&c);
        let (Some((x0, x1)), Some((y0, y1))) = (pixel_range(min.x, max.x), pixel_range(min.y, max.y))
        else {
            continue;
        };

        for y in y0..=y1 {
            let py = (y as f64 + 0.5) / res;
            for x in x0..=x1 {
                let idx = y * resolution + x;
                if covered[idx] {
                    continue;
                }
                let p = Point2::new((x as f64 + 0.5) / res, py);
                let d0 = (b - a).perp(&(p - a));
                let d1 = (c - b).perp(&(p - b));
                let d2 = (a - c).perp(&(p - c));
                let inside = (d0 >= 0.0 && d1 >= 0.0 && d2 >= 0.0)
                    || (d0 <= 0.0 && d1 <= 0.0 && d2 <= 0.0);
                if inside {
                    covered[idx] = true;
                    count += 1;
                }
            }
        }
    }

    (count as f64 / (res * res)).clamp(0.0, 1.0)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(0.5 * (values[mid - 1] + values[mid]))
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_3d() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    fn square_uv() -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ]
    }

    const TRIS: [[usize; 3]; 2] = [[0, 1, 2], [0, 2, 3]];

    #[test]
    fn test_identity_is_ideal() {
        let m = compute_metrics(&square_3d(), &square_uv(), &TRIS);
        assert!((m.stretch.avg - 1.0).abs() < 1e-12);
        assert!((m.stretch.max - 1.0).abs() < 1e-12);
        assert!((m.area_distortion.avg - 1.0).abs() < 1e-12);
        assert!(m.angle_distortion.abs() < 1e-9);
        assert!((m.coverage - 1.0).abs() < 1e-12);
        assert_eq!(m.valid_triangles, 2);
    }

    #[test]
    fn test_uniform_scale_is_not_distortion() {
        let uvs: Vec<_> = square_uv().iter().map(|p| Point2::from(p.coords * 0.25)).collect();
        let m = compute_metrics(&square_3d(), &uvs, &TRIS);
        assert!((m.stretch.avg - 1.0).abs() < 1e-12);
        assert!((m.area_distortion.max - 1.0).abs() < 1e-12);
        assert!(m.angle_distortion.abs() < 1e-9);
    }

    #[test]
    fn test_compressed_axis_increases_distortion() {
        let squashed: Vec<_> = square_uv().iter().map(|p| Point2::new(p.x * 0.5, p.y)).collect();
        let ideal = compute_metrics(&square_3d(), &square_uv(), &TRIS);
        let m = compute_metrics(&square_3d(), &squashed, &TRIS);

        assert!((m.stretch.avg - 2.0).abs() < 1e-12);
        assert!(m.stretch.avg > ideal.stretch.avg);
        assert!((m.area_distortion.avg - 1.25).abs() < 1e-12);
        assert!(m.area_distortion.avg > ideal.area_distortion.avg);
        assert!(m.angle_distortion > 1.0);
    }

    #[test]
    fn test_neutral_without_valid_triangles() {
        let collapsed = vec![Point2::new(0.5, 0.5); 4];
        let m = compute_metrics(&square_3d(), &collapsed, &TRIS);
        assert_eq!(m.stretch, Stats::NEUTRAL);
        assert_eq!(m.area_distortion, Stats::NEUTRAL);
        assert_eq!(m.angle_distortion, 0.0);
        assert_eq!(m.coverage, 0.0);
        assert_eq!(m.valid_triangles, 0);
        assert!(!m.is_meaningful());
        assert!(compute_metrics(&square_3d(), &square_uv(), &TRIS).is_meaningful());

        let empty = compute_metrics(&[], &[], &[]);
        assert_eq!(empty.stretch, Stats::NEUTRAL);
    }

    #[test]
    fn test_triangle_stretch_flipped_winding() {
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let uv = [Point2::new(0.0, 0.0), Point2::new(0.0, 1.0), Point2::new(1.0, 0.0)];
        assert!((triangle_stretch(&p, &uv).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_coverage_half_square() {
        let uvs = square_uv();
        let c = coverage_with_resolution(&uvs, &[[0, 1, 2]], 64);
        // Diagonal pixels count for the triangle: 64 * 65 / 2 of 64².
        assert!((c - (64.0 * 65.0 / 2.0) / (64.0 * 64.0)).abs() < 1e-12);
    }

    #[test]
    fn test_coverage_counts_overlap_once() {
        let uvs = square_uv();
        let once = coverage_with_resolution(&uvs, &TRIS, 32);
        let twice = coverage_with_resolution(&uvs, &[[0, 1, 2], [0, 2, 3], [0, 1, 2]], 32);
        assert_eq!(once, twice);
        assert_eq!(once, 1.0);
    }

    #[test]
    fn test_coverage_clips_outside() {
        let uvs = vec![
            Point2::new(-5.0, -5.0),
            Point2::new(5.0, -5.0),
            Point2::new(0.0, 5.0),
        ];
        let c = coverage_with_resolution(&uvs, &[[0, 1, 2]], 16);
        assert!(c > 0.0 && c <= 1.0);
        let far = vec![
            Point2::new(3.0, 3.0),
            Point2::new(4.0, 3.0),
            Point2::new(3.0, 4.0),
        ];
        assert_eq!(coverage_with_resolution(&far, &[[0, 1, 2]], 16), 0.0);
        assert_eq!(coverage_with_resolution(&uvs, &[[0, 1, 2]], 0), 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }

    #[test]
    fn test_mesh_quality_requires_uvs() {
        let mesh = Mesh::new(square_3d(), TRIS.to_vec()).unwrap();
        assert!(mesh.quality().is_none());
        let mesh = mesh.with_uvs(square_uv()).unwrap();
        let q = mesh.quality().unwrap();
        assert!((q.stretch.avg - 1.0).abs() < 1e-12);
    }
}
