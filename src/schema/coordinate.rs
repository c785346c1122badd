//! Integer grid coordinates.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Offsets of the six face-adjacent neighbors in 3D (+x, -x, +y, -y, +z, -z).
pub const NEIGHBOR_OFFSETS: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// Weight applied to the squared vertical distance in [`Coordinate::heuristic`].
pub const VERTICAL_HEURISTIC_WEIGHT: f32 = 1.5;

/// A cell position in the 3D grid. `z` is the floor.
///
/// Laid out as three packed `i32`s so it can live inside the fixed-size
/// evaluation records shared with workers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Pod, Zeroable,
)]
#[repr(C)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coordinate {
    /// Create a coordinate.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The grid origin.
    pub const ORIGIN: Self = Self::new(0, 0, 0);

    /// Translate by an offset.
    #[inline]
    pub const fn offset(self, (dx, dy, dz): (i32, i32, i32)) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Sum of absolute axis differences.
    #[inline]
    pub fn manhattan_distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y) + self.z.abs_diff(other.z)
    }

    /// Straight-line distance.
    pub fn euclidean_distance(self, other: Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        let dz = (self.z - other.z) as f32;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Search heuristic: Euclidean distance with the squared vertical term
    /// weighted by [`VERTICAL_HEURISTIC_WEIGHT`].
    ///
    /// Not admissible: a purely vertical gap is overestimated, which steers
    /// A* toward staying on the current floor.
    pub fn heuristic(self, other: Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        let dz = (self.z - other.z) as f32;
        (dx * dx + dy * dy + dz * dz * VERTICAL_HEURISTIC_WEIGHT).sqrt()
    }

    /// True when the two coordinates differ by exactly one step along one axis.
    #[inline]
    pub fn is_adjacent(self, other: Self) -> bool {
        self.manhattan_distance(other) == 1
    }

    /// The six face neighbors, without any bounds check.
    pub fn neighbors(self) -> impl Iterator<Item = Coordinate> {
        NEIGHBOR_OFFSETS.into_iter().map(move |o| self.offset(o))
    }
}

impl From<(i32, i32, i32)> for Coordinate {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self::new(x, y, z)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
