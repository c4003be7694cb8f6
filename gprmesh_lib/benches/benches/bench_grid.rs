use criterion::{Criterion, criterion_group};
use gprmesh_lib::grid::{
    FillValue, Grid2d, Lattice, ScalarField, gaussian_smooth, interpolate_linear,
};
use gprmesh_lib::surface::generate_surface_mesh;
use std::time::Duration;

use super::data::uniform_points;

pub fn linear_interpolation(c: &mut Criterion) {
    let points = uniform_points(50_000, 3);
    let positions = points.iter().map(|p| p.horizontal()).collect::<Vec<_>>();
    let depths = points.iter().map(|p| p.position.z).collect::<Vec<_>>();
    let lattice = Lattice::new(&points.horizontal_bounds().unwrap(), 100);

    let mut group = c.benchmark_group("grid");
    group.sample_size(10);
    group.warm_up_time(Duration::from_secs(3));
    group.measurement_time(Duration::from_secs(15));

    group.bench_function("interpolate_linear_50k_100x100", |b| {
        b.iter(|| {
            interpolate_linear(
                &positions,
                &[ScalarField::new(&depths, FillValue::Mean)],
                &lattice,
            )
        })
    });

    group.finish();
}

pub fn smoothing(c: &mut Criterion) {
    let grid = Grid2d::from_fn(500, 500, |i, j| ((i * 7 + j * 13) % 17) as f64);

    let mut group = c.benchmark_group("grid");
    group.sample_size(50);
    group.warm_up_time(Duration::from_secs(3));
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("gaussian_smooth_500x500", |b| {
        b.iter(|| gaussian_smooth(&grid, 1.0))
    });

    group.finish();
}

pub fn surface(c: &mut Criterion) {
    let points = uniform_points(20_000, 4);

    let mut group = c.benchmark_group("grid");
    group.sample_size(10);
    group.warm_up_time(Duration::from_secs(3));
    group.measurement_time(Duration::from_secs(15));

    group.bench_function("generate_surface_mesh_20k", |b| {
        b.iter(|| generate_surface_mesh(&points, 100).unwrap())
    });

    group.finish();
}

criterion_group!(bench_grid, linear_interpolation, smoothing, surface);
