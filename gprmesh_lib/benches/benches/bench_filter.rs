use criterion::{Criterion, criterion_group};
use gprmesh_lib::filter::{build_iso_layers, filter_by_amplitude};
use std::time::Duration;

use super::data::uniform_points;

pub fn amplitude_threshold(c: &mut Criterion) {
    let points = uniform_points(1_000_000, 1);

    let mut group = c.benchmark_group("filter");
    group.sample_size(20);
    group.warm_up_time(Duration::from_secs(3));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("filter_by_amplitude_1m", |b| {
        b.iter(|| filter_by_amplitude(&points, 0.95).unwrap())
    });

    group.finish();
}

pub fn iso_layers(c: &mut Criterion) {
    let points = uniform_points(1_000_000, 2);

    let mut group = c.benchmark_group("filter");
    group.sample_size(20);
    group.warm_up_time(Duration::from_secs(3));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("build_iso_layers_1m", |b| {
        b.iter(|| build_iso_layers(&points, 5, 100_000))
    });

    group.finish();
}

criterion_group!(bench_filter, amplitude_threshold, iso_layers);
