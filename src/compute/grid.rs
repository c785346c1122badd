//! 3D rescue environment: debris, survivors and the robot start cell.

use std::collections::HashMap;

use rand::Rng;

use crate::schema::{Coordinate, GridConfig};

/// Contents of a single cell. Exactly one type per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellType {
    #[default]
    Empty,
    /// Debris. Not walkable.
    Obstacle,
    Survivor,
    /// The robot's starting position.
    Start,
}

impl CellType {
    /// Character used by [`Grid::render_layer`].
    pub fn symbol(self) -> char {
        match self {
            CellType::Empty => '.',
            CellType::Obstacle => '#',
            CellType::Survivor => 'S',
            CellType::Start => 'R',
        }
    }
}

/// Grid construction errors.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("Grid dimensions ({width}, {height}, {depth}) must be non-zero")]
    InvalidDimensions {
        width: usize,
        height: usize,
        depth: usize,
    },
}

/// Immutable-after-construction 3D cell map.
///
/// Cells are stored flat as `[z * height * width + y * width + x]`.
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    depth: usize,
    cells: Vec<CellType>,
    start: Coordinate,
    survivors: Vec<Coordinate>,
    survivor_index: HashMap<Coordinate, usize>,
    obstacle_count: usize,
}

impl Grid {
    /// Create an empty grid with the start cell at the origin.
    pub fn new(width: usize, height: usize, depth: usize) -> Result<Self, GridError> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(GridError::InvalidDimensions {
                width,
                height,
                depth,
            });
        }

        let mut cells = vec![CellType::Empty; width * height * depth];
        cells[0] = CellType::Start;

        Ok(Self {
            width,
            height,
            depth,
            cells,
            start: Coordinate::ORIGIN,
            survivors: Vec::new(),
            survivor_index: HashMap::new(),
            obstacle_count: 0,
        })
    }

    /// Build and randomly populate a grid from configuration.
    pub fn generate<R: Rng + ?Sized>(config: &GridConfig, rng: &mut R) -> Result<Self, GridError> {
        let mut grid = Self::new(config.width, config.height, config.depth)?;
        grid.set_start(config.start);
        grid.place_obstacles(config.obstacle_percent, rng);
        grid.place_survivors(config.num_survivors, rng);
        Ok(grid)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Total number of cells.
    #[inline]
    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn start(&self) -> Coordinate {
        self.start
    }

    #[inline]
    pub(crate) fn index(&self, coord: Coordinate) -> Option<usize> {
        if !self.in_bounds(coord) {
            return None;
        }
        let (x, y, z) = (coord.x as usize, coord.y as usize, coord.z as usize);
        Some(z * self.height * self.width + y * self.width + x)
    }

    /// True when the coordinate lies inside the grid.
    #[inline]
    pub fn in_bounds(&self, coord: Coordinate) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && (coord.x as usize) < self.width
            && (coord.y as usize) < self.height
            && (coord.z as usize) < self.depth
    }

    /// Cell type at a coordinate. Out-of-bounds reads as an obstacle.
    pub fn cell(&self, coord: Coordinate) -> CellType {
        self.index(coord)
            .map_or(CellType::Obstacle, |i| self.cells[i])
    }

    /// In bounds and not debris.
    pub fn is_walkable(&self, coord: Coordinate) -> bool {
        self.in_bounds(coord) && self.cell(coord) != CellType::Obstacle
    }

    pub fn is_obstacle(&self, coord: Coordinate) -> bool {
        self.cell(coord) == CellType::Obstacle
    }

    pub fn is_survivor(&self, coord: Coordinate) -> bool {
        self.cell(coord) == CellType::Survivor
    }

    /// In-bounds face neighbors.
    pub fn neighbors(&self, coord: Coordinate) -> impl Iterator<Item = Coordinate> + '_ {
        coord.neighbors().filter(|n| self.in_bounds(*n))
    }

    /// Walkable face neighbors.
    pub fn walkable_neighbors(&self, coord: Coordinate) -> impl Iterator<Item = Coordinate> + '_ {
        coord.neighbors().filter(|n| self.is_walkable(*n))
    }

    /// Index of the survivor at a coordinate.
    pub fn survivor_at(&self, coord: Coordinate) -> Option<usize> {
        self.survivor_index.get(&coord).copied()
    }

    /// Position of the survivor with the given index.
    pub fn survivor_position(&self, index: usize) -> Option<Coordinate> {
        self.survivors.get(index).copied()
    }

    pub fn survivors(&self) -> &[Coordinate] {
        &self.survivors
    }

    pub fn survivor_count(&self) -> usize {
        self.survivors.len()
    }

    /// Survivors within a Manhattan radius of `center`.
    pub fn survivors_in_area(&self, center: Coordinate, radius: u32) -> usize {
        self.survivors
            .iter()
            .filter(|s| center.manhattan_distance(**s) <= radius)
            .count()
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacle_count
    }

    pub fn empty_cell_count(&self) -> usize {
        self.cells.iter().filter(|c| **c == CellType::Empty).count()
    }

    /// Fraction of cells that are debris.
    pub fn obstacle_density(&self) -> f32 {
        self.obstacle_count as f32 / self.total_cells() as f32
    }

    /// Overwrite a cell. Out-of-bounds writes are ignored.
    ///
    /// Survivor bookkeeping follows the cell: writing `Survivor` registers a
    /// survivor, overwriting one removes it.
    pub fn set_cell(&mut self, coord: Coordinate, cell: CellType) {
        let Some(i) = self.index(coord) else {
            return;
        };
        let previous = self.cells[i];
        if previous == cell {
            return;
        }

        match previous {
            CellType::Obstacle => self.obstacle_count -= 1,
            CellType::Survivor => self.remove_survivor(coord),
            _ => {}
        }
        match cell {
            CellType::Obstacle => self.obstacle_count += 1,
            CellType::Survivor => {
                self.survivor_index.insert(coord, self.survivors.len());
                self.survivors.push(coord);
            }
            _ => {}
        }
        self.cells[i] = cell;
    }

    fn remove_survivor(&mut self, coord: Coordinate) {
        if let Some(idx) = self.survivor_index.remove(&coord) {
            self.survivors.remove(idx);
            for (i, s) in self.survivors.iter().enumerate().skip(idx) {
                self.survivor_index.insert(*s, i);
            }
        }
    }

    /// Move the start cell. An out-of-bounds position falls back to the origin.
    pub fn set_start(&mut self, start: Coordinate) {
        let start = if self.in_bounds(start) {
            start
        } else {
            log::warn!("Invalid start position {start}, using the origin");
            Coordinate::ORIGIN
        };

        if self.cell(self.start) == CellType::Start {
            self.set_cell(self.start, CellType::Empty);
        }
        self.start = start;
        self.set_cell(start, CellType::Start);
    }

    /// Add a survivor on an empty cell. Returns false if the cell is occupied.
    pub fn add_survivor(&mut self, coord: Coordinate) -> bool {
        if self.cell(coord) != CellType::Empty || !self.in_bounds(coord) {
            return false;
        }
        self.set_cell(coord, CellType::Survivor);
        true
    }

    /// Turn `percent` of all cells into debris, never touching the start cell.
    pub fn place_obstacles<R: Rng + ?Sized>(&mut self, percent: u32, rng: &mut R) {
        let percent = if percent > 100 {
            log::warn!("Invalid obstacle percentage {percent}, using 25%");
            25
        } else {
            percent
        };

        // Only empty cells can take debris; cap so the loop always terminates.
        let target = (self.total_cells() * percent as usize / 100).min(self.empty_cell_count());
        let mut placed = 0;
        while placed < target {
            let coord = self.random_cell(rng);
            if self.cell(coord) == CellType::Empty {
                self.set_cell(coord, CellType::Obstacle);
                placed += 1;
            }
        }
    }

    /// Place up to `count` survivors on random empty cells.
    pub fn place_survivors<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) {
        let max_attempts = self.total_cells() * 2;
        let mut placed = 0;
        let mut attempts = 0;

        while placed < count && attempts < max_attempts {
            let coord = self.random_cell(rng);
            if self.add_survivor(coord) {
                placed += 1;
            }
            attempts += 1;
        }

        if placed < count {
            log::warn!("Could only place {placed} of {count} survivors due to grid constraints");
        }
    }

    fn random_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Coordinate {
        Coordinate::new(
            rng.gen_range(0..self.width) as i32,
            rng.gen_range(0..self.height) as i32,
            rng.gen_range(0..self.depth) as i32,
        )
    }

    /// Text rendering of one floor, one row per line.
    pub fn render_layer(&self, z: usize) -> Option<String> {
        if z >= self.depth {
            return None;
        }

        let mut out = String::with_capacity(self.height * (self.width * 2 + 1));
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(self.cell(Coordinate::new(x as i32, y as i32, z as i32)).symbol());
                out.push(' ');
            }
            out.push('\n');
        }
        Some(out)
    }
}
