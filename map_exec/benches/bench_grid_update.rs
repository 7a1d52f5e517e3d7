//! # Grid Update Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use map_lib::{
    loc::Pose,
    map::{GridParams, OccupancyGridMap, RangeLimits},
    rangefinder::{ScanFrame, ScanSample},
};

fn grid_update_benchmark(c: &mut Criterion) {
    // ---- Build a map and a full frame ----

    let mut map = OccupancyGridMap::new(GridParams {
        resolution_m: 0.05,
        width_m: 20.0,
        height_m: 20.0,
        ..Default::default()
    })
    .unwrap();

    let limits = RangeLimits {
        min_range_m: 0.02,
        max_range_m: 12.0,
        max_samples_per_frame: 2000,
    };

    // One rotation of a 10 Hz head, ranges varying between 1 and 7 m
    let frame = ScanFrame::from(
        (0..450)
            .map(|i| {
                let angle_rad = (i as f64) * std::f64::consts::TAU / 450.0;
                ScanSample {
                    angle_rad,
                    distance_m: 4.0 + 3.0 * (3.0 * angle_rad).sin(),
                    quality: 200,
                    timestamp_ms: 0,
                }
            })
            .collect::<Vec<_>>(),
    );

    let pose = Pose::new(0.5, -0.25, 0.3);

    c.bench_function("OccupancyGridMap::update", |b| {
        b.iter(|| map.update(&pose, &frame, &limits))
    });

    c.bench_function("OccupancyGridMap::snapshot", |b| {
        b.iter(|| map.snapshot(pose, chrono::Utc::now()))
    });

    let snapshot = map.snapshot(pose, chrono::Utc::now());
    c.bench_function("GridSnapshot::to_image", |b| b.iter(|| snapshot.to_image()));
}

criterion_group!(benches, grid_update_benchmark);
criterion_main!(benches);
