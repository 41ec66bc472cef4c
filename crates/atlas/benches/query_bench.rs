use atlas::{Bounds, Grid, RadiusQuery};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Vec2;

fn populated_grid(count: u64, extent: f32, cell_size: f32) -> Grid<u64> {
    let mut grid = Grid::new(Bounds::new(extent, extent), cell_size).expect("valid grid");
    // Deterministic scatter without pulling in an RNG
    for i in 0..count {
        let x = (i.wrapping_mul(7_919) % 10_000) as f32 / 10_000.0 * extent;
        let y = (i.wrapping_mul(104_729) % 10_000) as f32 / 10_000.0 * extent;
        grid.upsert(i, Vec2::new(x, y));
    }
    grid
}

fn bench_encounter_radius_query(c: &mut Criterion) {
    let grid = populated_grid(10_000, 1_000.0, 10.0);
    let query = RadiusQuery::new(Vec2::new(500.0, 500.0), 5.0);

    c.bench_function("query_encounter_radius", |b| {
        b.iter(|| black_box(grid.query(black_box(&query))))
    });
}

fn bench_visibility_radius_query(c: &mut Criterion) {
    let grid = populated_grid(10_000, 1_000.0, 10.0);
    let query = RadiusQuery::new(Vec2::new(500.0, 500.0), 50.0);

    c.bench_function("query_visibility_radius", |b| {
        b.iter(|| black_box(grid.query(black_box(&query))))
    });
}

fn bench_upsert_moves(c: &mut Criterion) {
    let mut grid = populated_grid(10_000, 1_000.0, 10.0);
    let mut step = 0.0_f32;

    c.bench_function("upsert_moves", |b| {
        b.iter(|| {
            step = (step + 1.0) % 900.0;
            for i in 0..100_u64 {
                grid.upsert(i, Vec2::new(step, i as f32));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_encounter_radius_query,
    bench_visibility_radius_query,
    bench_upsert_moves
);
criterion_main!(benches);
