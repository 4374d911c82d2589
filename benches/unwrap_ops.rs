//! Benchmarks for the unwrap pipeline stages.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use unfold::algo::island::build_islands;
use unfold::algo::metrics::{compute_metrics, coverage};
use unfold::algo::parameterize::{lscm, SolverOptions};
use unfold::algo::segment::segment;
use unfold::fixtures;
use unfold::mesh::Adjacency;
use unfold::prelude::*;

fn bench_segmentation(c: &mut Criterion) {
    let sphere = fixtures::uv_sphere(64, 32, 1.0);

    c.bench_function("adjacency_sphere_64x32", |b| {
        b.iter(|| Adjacency::build(black_box(&sphere)))
    });

    let adjacency = Adjacency::build(&sphere);
    c.bench_function("segment_sphere_64x32", |b| {
        b.iter(|| segment(black_box(&sphere), &adjacency, 30.0, 10).unwrap())
    });
}

fn bench_lscm(c: &mut Criterion) {
    let grid = fixtures::grid(40);
    let adjacency = Adjacency::build(&grid);
    let segmentation = segment(&grid, &adjacency, 30.0, 1).unwrap();
    let islands = build_islands(&grid, &segmentation);
    let options = SolverOptions::default();

    c.bench_function("lscm_grid_40", |b| {
        b.iter(|| lscm(black_box(&grid), &islands[0], &options).unwrap())
    });
}

fn bench_unwrap(c: &mut Criterion) {
    let sphere = fixtures::uv_sphere(32, 16, 1.0);
    let params = UnwrapParams::default();

    c.bench_function("unwrap_sphere_parallel", |b| {
        b.iter(|| unwrap(black_box(&sphere), &params).unwrap())
    });

    let sequential = SolverOptions::default().with_parallel(false);
    c.bench_function("unwrap_sphere_sequential", |b| {
        b.iter(|| unwrap_with(black_box(&sphere), &params, &sequential, &Progress::none()).unwrap())
    });
}

fn bench_metrics(c: &mut Criterion) {
    let sphere = fixtures::uv_sphere(32, 16, 1.0);
    let result = unwrap(&sphere, &UnwrapParams::default()).unwrap();
    let mesh = &result.mesh;
    let uvs = mesh.uvs().unwrap();

    c.bench_function("metrics_sphere", |b| {
        b.iter(|| compute_metrics(mesh.positions(), black_box(uvs), mesh.triangles()))
    });

    c.bench_function("coverage_1024", |b| {
        b.iter(|| coverage(black_box(uvs), mesh.triangles()))
    });
}

criterion_group!(benches, bench_segmentation, bench_lscm, bench_unwrap, bench_metrics);
criterion_main!(benches);
