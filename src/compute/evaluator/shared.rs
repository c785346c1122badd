//! State shared between the dispatcher and the fitness workers.

use std::sync::{Mutex, MutexGuard};

use bytemuck::{Pod, Zeroable};

use crate::compute::Route;
use crate::schema::{Coordinate, MAX_POPULATION, MAX_ROUTE_LENGTH};

/// Fixed-capacity route record exchanged with workers.
///
/// Holds at most [`MAX_ROUTE_LENGTH`] coordinates; longer routes are cut
/// when stored. The layout is internal and carries no compatibility promise.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SharedRoute {
    coordinates: [Coordinate; MAX_ROUTE_LENGTH],
    length: u32,
    pub survivors_reached: u32,
    pub collision_count: u32,
    pub fitness: f32,
}

impl SharedRoute {
    /// Copy a route in. Returns true if it had to be truncated.
    pub fn store(&mut self, route: &Route) -> bool {
        let coords = route.coordinates();
        let len = coords.len().min(MAX_ROUTE_LENGTH);
        self.coordinates[..len].copy_from_slice(&coords[..len]);
        self.length = len as u32;
        self.survivors_reached = route.survivors_reached as u32;
        self.collision_count = route.collision_count as u32;
        self.fitness = route.fitness;
        len < coords.len()
    }

    /// Copy the stored coordinates and metrics back into a route.
    pub fn load_into(&self, route: &mut Route) {
        let coords = route.coordinates_mut();
        coords.clear();
        coords.extend_from_slice(self.coordinates());
        route.survivors_reached = self.survivors_reached as usize;
        route.collision_count = self.collision_count as usize;
        route.fitness = self.fitness;
    }

    #[inline]
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates[..self.length as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Contiguous, half-open slice of the population owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerAssignment {
    pub worker_id: usize,
    pub start: usize,
    pub end: usize,
}

impl WorkerAssignment {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split `[0, population_size)` into one contiguous range per worker.
///
/// Every worker gets `population_size / num_workers` indices and the first
/// `population_size % num_workers` workers get one more.
pub fn partition(population_size: usize, num_workers: usize) -> Vec<WorkerAssignment> {
    let num_workers = num_workers.max(1);
    let base = population_size / num_workers;
    let remainder = population_size % num_workers;

    let mut start = 0;
    (0..num_workers)
        .map(|worker_id| {
            let len = base + usize::from(worker_id < remainder);
            let assignment = WorkerAssignment {
                worker_id,
                start,
                end: start + len,
            };
            start += len;
            assignment
        })
        .collect()
}

/// Coordination fields. Only read or written under the state lock.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub population_size: usize,
    pub assignments: Vec<WorkerAssignment>,
    pub work_ready: bool,
    pub completed: usize,
    pub generation: usize,
    /// Bumped on every dispatch so a worker never evaluates one batch twice.
    pub epoch: u64,
    pub best_fitness: f32,
    pub best_index: Option<usize>,
    pub terminate: bool,
}

impl SharedState {
    fn new() -> Self {
        Self {
            population_size: 0,
            assignments: Vec::new(),
            work_ready: false,
            completed: 0,
            generation: 0,
            epoch: 0,
            best_fitness: f32::NEG_INFINITY,
            best_index: None,
            terminate: false,
        }
    }

    /// Record a candidate for the generation's best if it beats the current one.
    pub fn offer_best(&mut self, fitness: f32, index: usize) {
        if self.best_index.is_none() || fitness > self.best_fitness {
            self.best_fitness = fitness;
            self.best_index = Some(index);
        }
    }
}

/// The region every worker holds a handle to.
///
/// Route slots have their own locks; worker ranges are disjoint, so a slot
/// is only ever contended between the dispatcher and its single owner, and
/// never while a batch is in flight.
pub(crate) struct SharedRegion {
    state: Mutex<SharedState>,
    routes: Box<[Mutex<SharedRoute>]>,
}

impl SharedRegion {
    pub fn new() -> Self {
        let routes = (0..MAX_POPULATION)
            .map(|_| Mutex::new(SharedRoute::zeroed()))
            .collect();
        Self {
            state: Mutex::new(SharedState::new()),
            routes,
        }
    }

    /// Lock the coordination state. A poisoned lock is taken over as is;
    /// the panicking worker is reported through liveness checks instead.
    pub fn lock_state(&self) -> MutexGuard<'_, SharedState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock one route slot. `index` must be below [`MAX_POPULATION`].
    pub fn lock_route(&self, index: usize) -> MutexGuard<'_, SharedRoute> {
        self.routes[index]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_record_layout() {
        let record = SharedRoute::zeroed();
        assert_eq!(
            bytemuck::bytes_of(&record).len(),
            MAX_ROUTE_LENGTH * 12 + 16
        );
        assert!(record.is_empty());
    }

    #[test]
    fn test_store_truncates() {
        let coords: Vec<Coordinate> = (0..MAX_ROUTE_LENGTH as i32 + 5)
            .map(|i| Coordinate::new(i, 0, 0))
            .collect();
        let mut route = Route::from_coordinates(coords);
        route.fitness = 1.5;

        let mut record = SharedRoute::zeroed();
        assert!(record.store(&route));
        assert_eq!(record.len(), MAX_ROUTE_LENGTH);

        let mut back = Route::default();
        record.load_into(&mut back);
        assert_eq!(back.len(), MAX_ROUTE_LENGTH);
        assert_eq!(back.last(), Some(Coordinate::new(MAX_ROUTE_LENGTH as i32 - 1, 0, 0)));
        assert_eq!(back.fitness, 1.5);
    }

    #[test]
    fn test_store_replaces_previous_contents() {
        let mut record = SharedRoute::zeroed();
        record.store(&Route::from_coordinates(vec![Coordinate::new(1, 1, 1); 8]));
        assert!(!record.store(&Route::from_coordinates(vec![Coordinate::ORIGIN; 2])));
        assert_eq!(record.coordinates(), &[Coordinate::ORIGIN; 2]);
    }

    #[test]
    fn test_partition_remainder() {
        let ranges = partition(10, 4);
        let bounds: Vec<_> = ranges.iter().map(|a| (a.start, a.end)).collect();
        assert_eq!(bounds, vec![(0, 3), (3, 6), (6, 8), (8, 10)]);

        let ranges = partition(2, 4);
        assert_eq!(ranges.iter().filter(|a| a.is_empty()).count(), 2);
    }

    #[test]
    fn test_offer_best() {
        let mut state = SharedState::new();
        state.offer_best(-5.0, 3);
        assert_eq!(state.best_index, Some(3));
        state.offer_best(-5.0, 1);
        assert_eq!(state.best_index, Some(3));
        state.offer_best(2.0, 7);
        assert_eq!((state.best_fitness, state.best_index), (2.0, Some(7)));
    }

    proptest! {
        #[test]
        fn prop_partition_covers_population(size in 0usize..600, workers in 1usize..17) {
            let ranges = partition(size, workers);
            prop_assert_eq!(ranges.len(), workers);

            let mut next = 0;
            for (i, a) in ranges.iter().enumerate() {
                prop_assert_eq!(a.worker_id, i);
                prop_assert_eq!(a.start, next);
                prop_assert!(a.len() == size / workers || a.len() == size / workers + 1);
                next = a.end;
            }
            prop_assert_eq!(next, size);
        }
    }
}
