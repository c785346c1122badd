//! Rescue route planner CLI - evolve routes from a JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use rescue_ga::{
    compute::EvolutionEngine,
    report::RunReport,
    schema::{GenerationStats, RescueConfig},
};

fn print_usage(program: &str) {
    eprintln!("Usage: {program} [config.json] [--output DIR]");
    eprintln!("       {program} --example");
    eprintln!();
    eprintln!("Plan rescue routes through a 3D debris grid with a genetic algorithm.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.json   Run configuration (default settings when omitted)");
    eprintln!("  --output DIR  Directory for reports (default: output)");
    eprintln!("  --example     Print an example configuration and exit");
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("rescue-ga");

    let mut config_path: Option<PathBuf> = None;
    let mut output_dir = PathBuf::from("output");

    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--example" => {
                print_example_config();
                return;
            }
            "-h" | "--help" => {
                print_usage(program);
                return;
            }
            "--output" | "-o" => match rest.next() {
                Some(dir) => output_dir = PathBuf::from(dir),
                None => {
                    eprintln!("Missing directory after {arg}");
                    process::exit(1);
                }
            },
            path if config_path.is_none() && !path.starts_with('-') => {
                config_path = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("Unexpected argument: {other}");
                print_usage(program);
                process::exit(1);
            }
        }
    }

    let config = match &config_path {
        Some(path) => {
            let config_str = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading config file {}: {}", path.display(), e);
                process::exit(1);
            });
            serde_json::from_str::<RescueConfig>(&config_str).unwrap_or_else(|e| {
                eprintln!("Error parsing config: {}", e);
                process::exit(1);
            })
        }
        None => RescueConfig::default(),
    };

    let mut engine = EvolutionEngine::new(config).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });

    let config = engine.config().clone();
    let grid = engine.grid();
    println!("Rescue Route Planner");
    println!("====================");
    println!(
        "Grid: {}x{}x{}, {} survivors, {} obstacles",
        grid.width(),
        grid.height(),
        grid.depth(),
        grid.survivor_count(),
        grid.obstacle_count()
    );
    println!(
        "Population: {}, generations: {}, workers: {}",
        config.genetic.population_size, config.genetic.max_generations, config.workers.num_workers
    );
    println!(
        "Mutation: {:.2}, crossover: {:.2}, elitism: {}%",
        config.genetic.mutation_rate, config.genetic.crossover_rate, config.genetic.elitism_percent
    );
    println!();

    let progress_every = (config.genetic.max_generations / 10).max(1);
    let start = Instant::now();
    println!("Evolving...");

    let result = engine
        .run_with_callback(|stats: &GenerationStats| {
            if stats.generation % progress_every == 0 {
                println!(
                    "  Gen {:>5}: best={:.4} avg={:.4} survivors={} ({:.1}s)",
                    stats.generation,
                    stats.best_fitness,
                    stats.average_fitness,
                    stats.best_survivors,
                    start.elapsed().as_secs_f32()
                );
            }
        })
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        });

    let stats = &result.stats;
    println!();
    println!("Stopped: {:?} after {} generations", stats.stop_reason, stats.generations);
    println!("Evaluations: {}", stats.total_evaluations);
    println!(
        "Best route: fitness {:.4}, survivors {}/{}, length {}, collisions {}, coverage {:.1}%",
        result.best.fitness,
        result.best.survivors_reached,
        result.total_survivors,
        result.best.coordinates.len(),
        result.best.collision_count,
        result.best.coverage_percent
    );
    println!("Time: {:.2}s", stats.elapsed_seconds);

    let written =
        RunReport::create(&output_dir).and_then(|report| report.save_all(&result, engine.grid()));
    match written {
        Ok(paths) => {
            println!();
            println!("Reports written to {}:", output_dir.display());
            for path in paths {
                println!("  {}", path.display());
            }
        }
        Err(e) => {
            eprintln!("Error writing reports to {}: {}", output_dir.display(), e);
            process::exit(1);
        }
    }
}

fn print_example_config() {
    match serde_json::to_string_pretty(&RescueConfig::default()) {
        Ok(json) => {
            println!("Example configuration (config.json):");
            println!("{json}");
        }
        Err(e) => {
            eprintln!("Error serializing example config: {}", e);
            process::exit(1);
        }
    }
}
