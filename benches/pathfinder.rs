//! Benchmarks for route search, scoring and breeding.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::{SeedableRng, rngs::StdRng};

use rescue_ga::{
    compute::{FitnessModel, Grid, RouteRng, find_path, greedy_route, sort_by_fitness},
    schema::{Coordinate, FitnessWeights, GeneticConfig, GridConfig},
};

const SIZES: [(usize, usize, usize); 3] = [(10, 10, 3), (20, 20, 5), (50, 50, 10)];

fn grid(width: usize, height: usize, depth: usize) -> Grid {
    let config = GridConfig {
        width,
        height,
        depth,
        num_survivors: 10,
        obstacle_percent: 20,
        start: Coordinate::ORIGIN,
    };
    let mut rng = StdRng::seed_from_u64(7);
    match Grid::generate(&config, &mut rng) {
        Ok(grid) => grid,
        Err(e) => panic!("benchmark grid: {e}"),
    }
}

fn bench_find_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_path");

    for (w, h, d) in SIZES {
        let grid = grid(w, h, d);
        let goal = Coordinate::new(w as i32 - 1, h as i32 - 1, d as i32 - 1);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{w}x{h}x{d}")),
            &grid,
            |b, grid| {
                b.iter(|| find_path(black_box(grid), grid.start(), black_box(goal)));
            },
        );
    }

    group.finish();
}

fn bench_greedy_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("greedy_route");

    for (w, h, d) in SIZES {
        let grid = grid(w, h, d);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{w}x{h}x{d}")),
            &grid,
            |b, grid| {
                b.iter(|| greedy_route(black_box(grid), 1000));
            },
        );
    }

    group.finish();
}

fn bench_fitness(c: &mut Criterion) {
    let mut group = c.benchmark_group("fitness");
    let grid = grid(20, 20, 5);
    let model = FitnessModel::new(FitnessWeights::default(), 1000);
    let mut rng = RouteRng::new(11);

    for len in [50, 200, 1000] {
        let route = rng.random_route(&grid, len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &route, |b, route| {
            b.iter(|| model.evaluate_coordinates(black_box(route.coordinates()), &grid));
        });
    }

    group.finish();
}

fn bench_next_generation(c: &mut Criterion) {
    let grid = grid(20, 20, 5);
    let model = FitnessModel::new(FitnessWeights::default(), 1000);
    let config = GeneticConfig::default();

    let mut rng = RouteRng::new(3);
    let mut population =
        rng.initial_population(&grid, config.population_size, config.max_route_length);
    model.score_population(&mut population, &grid);
    sort_by_fitness(&mut population);

    c.bench_function("next_generation", |b| {
        b.iter(|| rng.next_generation(black_box(&population), &grid, &config));
    });
}

criterion_group!(
    benches,
    bench_find_path,
    bench_greedy_route,
    bench_fitness,
    bench_next_generation
);
criterion_main!(benches);
