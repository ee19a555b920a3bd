use rand::Rng;
use serde::{Deserialize, Serialize};
use simulation_common::{check_probability, SimError};

/// One road cell: `None` when empty, otherwise the velocity (cells/step) of the vehicle in it.
pub type Cell = Option<u32>;

/// Occupancy and velocity of every cell on a closed multi-lane loop.
///
/// All lanes share the same length and index `length - 1` is adjacent to index `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadState {
    lanes: Vec<Vec<Cell>>,
}

impl RoadState {
    /// An empty road.
    pub fn empty(length: usize, n_lanes: usize) -> Result<Self, SimError> {
        check_geometry(length, n_lanes)?;
        Ok(RoadState {
            lanes: vec![vec![None; length]; n_lanes],
        })
    }

    /// Random initial placement: each cell is independently occupied (at rest)
    /// with probability `density`.
    pub fn initialize<R: Rng + ?Sized>(
        length: usize,
        density: f64,
        n_lanes: usize,
        rng: &mut R,
    ) -> Result<Self, SimError> {
        check_probability("density", density)?;
        check_geometry(length, n_lanes)?;

        let lanes: Vec<Vec<Cell>> = (0..n_lanes)
            .map(|_| {
                (0..length)
                    .map(|_| if rng.random::<f64>() < density { Some(0) } else { None })
                    .collect()
            })
            .collect();
        Ok(RoadState { lanes })
    }

    /// Builds a road from explicit lane contents. Lanes must be non-empty and of equal length.
    pub fn from_lanes(lanes: Vec<Vec<Cell>>) -> Result<Self, SimError> {
        let length = lanes.first().map_or(0, Vec::len);
        check_geometry(length, lanes.len())?;
        if lanes.iter().any(|lane| lane.len() != length) {
            return Err(SimError::invalid("all lanes must have the same length"));
        }
        Ok(RoadState { lanes })
    }

    /// Convenience for tests and scenarios: vehicles at rest at the given positions of one lane.
    pub fn single_lane_with_vehicles(length: usize, positions: &[usize]) -> Result<Self, SimError> {
        let mut road = Self::empty(length, 1)?;
        for &pos in positions {
            if pos >= length {
                return Err(SimError::invalid(format!(
                    "vehicle position {} outside road of length {}",
                    pos, length
                )));
            }
            road.lanes[0][pos] = Some(0);
        }
        Ok(road)
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.lanes[0].len()
    }

    #[inline]
    pub fn n_lanes(&self) -> usize {
        self.lanes.len()
    }

    #[inline]
    pub fn lane(&self, lane: usize) -> &[Cell] {
        &self.lanes[lane]
    }

    #[inline]
    pub fn lane_mut(&mut self, lane: usize) -> &mut [Cell] {
        &mut self.lanes[lane]
    }

    pub fn lanes(&self) -> &[Vec<Cell>] {
        &self.lanes
    }

    #[inline]
    pub fn cell(&self, lane: usize, pos: usize) -> Cell {
        self.lanes[lane][pos]
    }

    pub fn lane_vehicle_count(&self, lane: usize) -> usize {
        self.lanes[lane].iter().filter(|c| c.is_some()).count()
    }

    pub fn vehicle_count(&self) -> usize {
        (0..self.n_lanes()).map(|l| self.lane_vehicle_count(l)).sum()
    }

    /// Mean velocity over all vehicles, `None` on an empty road.
    pub fn mean_velocity(&self) -> Option<f64> {
        let (sum, count) = self
            .lanes
            .iter()
            .flatten()
            .flatten()
            .fold((0u64, 0u64), |(s, n), &v| (s + v as u64, n + 1));
        (count > 0).then(|| sum as f64 / count as f64)
    }

    /// Highest velocity present on the road.
    pub fn max_velocity(&self) -> Option<u32> {
        self.lanes.iter().flatten().flatten().copied().max()
    }

    /// Moves the vehicle at `(from_lane, pos)` sideways to `(to_lane, pos)`.
    /// Returns `false` and leaves the road untouched when the source is empty
    /// or the target is taken.
    pub(crate) fn shift_lane(&mut self, from_lane: usize, to_lane: usize, pos: usize) -> bool {
        match (self.lanes[from_lane][pos], self.lanes[to_lane][pos]) {
            (Some(v), None) => {
                self.lanes[to_lane][pos] = Some(v);
                self.lanes[from_lane][pos] = None;
                true
            }
            _ => false,
        }
    }
}

fn check_geometry(length: usize, n_lanes: usize) -> Result<(), SimError> {
    if length == 0 {
        return Err(SimError::invalid("road length must be positive"));
    }
    if n_lanes == 0 {
        return Err(SimError::invalid("road must have at least one lane"));
    }
    Ok(())
}

/// Distance from `pos` to the next occupied cell ahead, searching circularly.
///
/// Returns the lane length when no other vehicle is found, including on an
/// empty lane and on a lane whose only vehicle sits at `pos`.
pub fn distance_to_next(lane: &[Cell], pos: usize) -> usize {
    let length = lane.len();
    (1..length)
        .find(|d| lane[(pos + d) % length].is_some())
        .unwrap_or(length)
}

/// Flattens history into `steps * lanes` rows of `length` integers,
/// `-1` for an empty cell and the velocity otherwise.
pub fn history_to_rows(history: &[RoadState]) -> Vec<Vec<i64>> {
    history
        .iter()
        .flat_map(|state| state.lanes.iter())
        .map(|lane| lane.iter().map(|c| c.map_or(-1, i64::from)).collect())
        .collect()
}
