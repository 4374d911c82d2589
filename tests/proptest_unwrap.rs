//! Property-based tests for the unwrap pipeline.
//!
//! Run with: cargo test --test proptest_unwrap

use nalgebra::{Point2, Point3};
use proptest::prelude::*;
use unfold::algo::metrics::coverage_with_resolution;
use unfold::algo::pack::pack_boxes;
use unfold::algo::segment::segment;
use unfold::fixtures;
use unfold::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

fn arb_uv() -> impl Strategy<Value = Point2<f64>> {
    (-0.5..1.5f64, -0.5..1.5f64).prop_map(|(u, v)| Point2::new(u, v))
}

/// Random UV triangles over a fixed pool of coordinates.
fn arb_uv_triangles() -> impl Strategy<Value = (Vec<Point2<f64>>, Vec<[usize; 3]>)> {
    prop::collection::vec(arb_uv(), 3..24).prop_flat_map(|uvs| {
        let n = uvs.len();
        let tris = prop::collection::vec(prop::array::uniform3(0..n), 0..16);
        (Just(uvs), tris)
    })
}

/// `(min, max)` corners of a box with positive extent.
fn arb_box() -> impl Strategy<Value = (Point2<f64>, Point2<f64>)> {
    (-10.0..10.0f64, -10.0..10.0f64, 0.01..5.0f64, 0.01..5.0f64)
        .prop_map(|(x, y, w, h)| (Point2::new(x, y), Point2::new(x + w, y + h)))
}

/// A grid with jittered heights and arbitrary UVs.
fn arb_textured_grid() -> impl Strategy<Value = Mesh> {
    (1usize..6).prop_flat_map(|n| {
        let count = (n + 1) * (n + 1);
        (
            Just(n),
            prop::collection::vec(-0.2..0.2f64, count),
            prop::collection::vec((0.0..1.0f64, 0.0..1.0f64), count),
        )
            .prop_map(|(n, heights, uvs)| {
                let (positions, triangles, _) = fixtures::grid(n).into_parts();
                let positions = positions
                    .iter()
                    .zip(&heights)
                    .map(|(p, &z)| Point3::new(p.x, p.y, z))
                    .collect();
                let uvs = uvs.into_iter().map(|(u, v)| Point2::new(u, v)).collect();
                Mesh::new(positions, triangles)
                    .and_then(|m| m.with_uvs(uvs))
                    .unwrap()
            })
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn coverage_stays_in_unit_range((uvs, tris) in arb_uv_triangles()) {
        let c = coverage_with_resolution(&uvs, &tris, 64);
        prop_assert!((0.0..=1.0).contains(&c), "coverage {}", c);
    }

    #[test]
    fn obj_round_trip_is_exact(mesh in arb_textured_grid()) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.obj");
        unfold::io::save(&mesh, &path).unwrap();
        let loaded = unfold::io::load(&path).unwrap();
        prop_assert_eq!(loaded, mesh);
    }

    #[test]
    fn segmentation_is_deterministic_and_partitions_faces(
        angle in 5.0..175.0f64,
        min_faces in 1usize..20,
    ) {
        let sphere = fixtures::uv_sphere(10, 7, 1.0);
        let first = segment(&sphere, &Adjacency::build(&sphere), angle, min_faces).unwrap();
        let second = segment(&sphere, &Adjacency::build(&sphere), angle, min_faces).unwrap();
        prop_assert_eq!(&first, &second);

        let mut seen = vec![false; sphere.num_triangles()];
        for (island, faces) in first.island_faces.iter().enumerate() {
            prop_assert!(!faces.is_empty());
            for face in faces {
                prop_assert!(!seen[face.index()]);
                seen[face.index()] = true;
                prop_assert_eq!(first.face_islands[face.index()].index(), island);
            }
        }
        prop_assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn packed_boxes_fit_and_do_not_overlap(
        boxes in prop::collection::vec(arb_box(), 1..12),
        margin in 0.0..0.2f64,
    ) {
        let packing = pack_boxes(&boxes, margin).unwrap();
        prop_assert_eq!(packing.placements.len(), boxes.len());

        let eps = 1e-9;
        let placed: Vec<_> = boxes
            .iter()
            .zip(&packing.placements)
            .map(|((min, max), p)| (p.apply(min), p.apply(max)))
            .collect();

        for (min, max) in &placed {
            prop_assert!(min.x >= -eps && min.y >= -eps);
            prop_assert!(max.x <= 1.0 + eps && max.y <= 1.0 + eps);
        }
        for i in 0..placed.len() {
            for j in i + 1..placed.len() {
                let (a, b) = (&placed[i], &placed[j]);
                let separated = a.1.x <= b.0.x + eps
                    || b.1.x <= a.0.x + eps
                    || a.1.y <= b.0.y + eps
                    || b.1.y <= a.0.y + eps;
                prop_assert!(separated, "boxes {} and {} overlap", i, j);
            }
        }
    }
}
