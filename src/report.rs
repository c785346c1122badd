//! On-disk run output: grid layout, routes, per-generation stats and summary.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::compute::Grid;
use crate::schema::{EvolutionResult, GenerationStats, RouteSnapshot};

/// Header row of the generation statistics CSV.
pub const GENERATION_STATS_HEADER: &str =
    "generation,best,average,worst,avg_survivors,avg_length";

/// Writes run artifacts into one output directory.
#[derive(Debug, Clone)]
pub struct RunReport {
    dir: PathBuf,
}

impl RunReport {
    /// Use `dir` for output, creating it if needed.
    pub fn create<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn writer(&self, name: &str) -> io::Result<(PathBuf, BufWriter<File>)> {
        let path = self.dir.join(name);
        let file = File::create(&path)?;
        Ok((path, BufWriter::new(file)))
    }

    /// Floor-by-floor map of the grid.
    pub fn save_grid_layout(&self, grid: &Grid) -> io::Result<PathBuf> {
        let (path, mut w) = self.writer("grid_layout.txt")?;

        writeln!(
            w,
            "Grid {}x{}x{}, start {}, {} survivors, {} obstacles ({:.1}%)",
            grid.width(),
            grid.height(),
            grid.depth(),
            grid.start(),
            grid.survivor_count(),
            grid.obstacle_count(),
            grid.obstacle_density() * 100.0
        )?;
        writeln!(w, "Legend: R start, S survivor, # debris, . empty")?;

        for z in 0..grid.depth() {
            if let Some(layer) = grid.render_layer(z) {
                writeln!(w)?;
                writeln!(w, "Floor {z}:")?;
                write!(w, "{layer}")?;
            }
        }

        w.flush()?;
        Ok(path)
    }

    /// One route with its metrics, survivors marked along the way.
    pub fn save_route(
        &self,
        name: &str,
        route: &RouteSnapshot,
        grid: &Grid,
    ) -> io::Result<PathBuf> {
        let (path, mut w) = self.writer(name)?;
        write_route(&mut w, route, grid)?;
        w.flush()?;
        Ok(path)
    }

    /// Several routes, fittest first.
    pub fn save_top_routes(&self, routes: &[RouteSnapshot], grid: &Grid) -> io::Result<PathBuf> {
        let (path, mut w) = self.writer("top_routes.txt")?;
        for (rank, route) in routes.iter().enumerate() {
            writeln!(w, "=== Route #{} ===", rank + 1)?;
            write_route(&mut w, route, grid)?;
            writeln!(w)?;
        }
        w.flush()?;
        Ok(path)
    }

    /// Per-generation statistics as CSV.
    pub fn save_generation_stats(&self, history: &[GenerationStats]) -> io::Result<PathBuf> {
        let (path, mut w) = self.writer("generation_stats.csv")?;
        writeln!(w, "{GENERATION_STATS_HEADER}")?;
        for s in history {
            writeln!(
                w,
                "{},{:.4},{:.4},{:.4},{:.2},{:.2}",
                s.generation,
                s.best_fitness,
                s.average_fitness,
                s.worst_fitness,
                s.average_survivors,
                s.average_length
            )?;
        }
        w.flush()?;
        Ok(path)
    }

    /// Whole result as pretty JSON.
    pub fn save_summary(&self, result: &EvolutionResult) -> io::Result<PathBuf> {
        let path = self.dir.join("summary.json");
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    /// Everything at once. Returns the written paths.
    pub fn save_all(&self, result: &EvolutionResult, grid: &Grid) -> io::Result<Vec<PathBuf>> {
        Ok(vec![
            self.save_grid_layout(grid)?,
            self.save_route("best_route.txt", &result.best, grid)?,
            self.save_top_routes(&result.top, grid)?,
            self.save_generation_stats(&result.history)?,
            self.save_summary(result)?,
        ])
    }
}

fn write_route<W: Write>(w: &mut W, route: &RouteSnapshot, grid: &Grid) -> io::Result<()> {
    writeln!(w, "Fitness: {:.4}", route.fitness)?;
    writeln!(
        w,
        "Survivors: {}/{}",
        route.survivors_reached,
        grid.survivor_count()
    )?;
    writeln!(w, "Length: {}", route.coordinates.len())?;
    writeln!(w, "Collisions: {}", route.collision_count)?;
    writeln!(w, "Coverage: {:.2}%", route.coverage_percent)?;
    writeln!(w, "Coordinates:")?;
    for (i, c) in route.coordinates.iter().enumerate() {
        match grid.survivor_at(*c) {
            Some(s) => writeln!(w, "  {i:>4}: {c} <- survivor #{}", s + 1)?,
            None => writeln!(w, "  {i:>4}: {c}")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Coordinate, RunStats, StopReason};
    use tempfile::tempdir;

    fn sample() -> (Grid, EvolutionResult) {
        let mut grid = Grid::new(3, 2, 2).unwrap();
        grid.add_survivor(Coordinate::new(1, 0, 0));

        let route = RouteSnapshot {
            fitness: 3.25,
            survivors_reached: 1,
            collision_count: 0,
            coverage_percent: 75.0,
            coordinates: vec![Coordinate::ORIGIN, Coordinate::new(1, 0, 0)],
        };
        let stats = GenerationStats {
            generation: 0,
            best_fitness: 3.25,
            average_fitness: 1.5,
            worst_fitness: -0.5,
            average_survivors: 0.5,
            average_length: 12.0,
            best_survivors: 1,
            elapsed_seconds: 0.01,
        };
        let result = EvolutionResult {
            best: route.clone(),
            top: vec![route.clone(), route],
            total_survivors: 1,
            history: vec![stats, GenerationStats { generation: 1, ..stats }],
            stats: RunStats {
                generations: 1,
                total_evaluations: 20,
                best_fitness: 3.25,
                final_average_fitness: 1.5,
                elapsed_seconds: 0.02,
                stop_reason: StopReason::MaxGenerations,
            },
        };
        (grid, result)
    }

    #[test]
    fn test_creates_nested_dir() {
        let dir = tempdir().unwrap();
        let report = RunReport::create(dir.path().join("a/b")).unwrap();
        assert!(report.dir().is_dir());
    }

    #[test]
    fn test_generation_stats_csv() {
        let dir = tempdir().unwrap();
        let (_, result) = sample();
        let report = RunReport::create(dir.path()).unwrap();

        let path = report.save_generation_stats(&result.history).unwrap();
        let csv = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], GENERATION_STATS_HEADER);
        assert_eq!(lines[1], "0,3.2500,1.5000,-0.5000,0.50,12.00");
        assert!(lines[2].starts_with("1,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_route_marks_survivors() {
        let dir = tempdir().unwrap();
        let (grid, result) = sample();
        let report = RunReport::create(dir.path()).unwrap();

        let text = fs::read_to_string(report.save_route("best.txt", &result.best, &grid).unwrap())
            .unwrap();
        assert!(text.contains("Survivors: 1/1"));
        assert!(text.contains("(1, 0, 0) <- survivor #1"));

        let top = fs::read_to_string(report.save_top_routes(&result.top, &grid).unwrap()).unwrap();
        assert!(top.contains("=== Route #2 ==="));
    }

    #[test]
    fn test_save_all() {
        let dir = tempdir().unwrap();
        let (grid, result) = sample();
        let report = RunReport::create(dir.path()).unwrap();

        let paths = report.save_all(&result, &grid).unwrap();
        assert_eq!(paths.len(), 5);
        assert!(paths.iter().all(|p| p.exists()));

        let layout = fs::read_to_string(dir.path().join("grid_layout.txt")).unwrap();
        assert!(layout.contains("Floor 1:"));
        assert!(layout.contains("R S . \n"));

        let json = fs::read_to_string(dir.path().join("summary.json")).unwrap();
        let parsed: EvolutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.best, result.best);
        assert_eq!(parsed.stats.stop_reason, StopReason::MaxGenerations);
    }
}
