use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Order in which collected lane-change decisions are applied.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LaneChangeOrder {
    /// Lane-major, position-ascending. The first evaluated vehicle wins a contested cell.
    #[default]
    Sequential,
    /// Decisions are shuffled with the run's RNG before being applied.
    Shuffled,
}

/// Tuning constants for the two-lane (NaSch-CL) variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaneChangeParams {
    /// Probability that a driver with a valid opportunity actually changes lane.
    pub p_change: f64,
    /// Minimum speed gain (cells/step) that motivates a change.
    pub v_strat: f64,
    /// Extra rear safety margin in cells on top of the follower's velocity.
    pub gap_rear: u32,
    pub order: LaneChangeOrder,
}

/// Runtime parameters of one simulation run. Immutable for the duration of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    /// Maximum velocity in cells/step.
    pub v_max: u32,
    /// Random slowdown probability.
    pub p: f64,
    /// Road length in cells.
    pub length: usize,
    pub n_lanes: usize,
    /// Probability that any given cell starts occupied.
    pub initial_density: f64,
    /// `None` disables lane changing; lanes then evolve independently.
    pub lane_change: Option<LaneChangeParams>,
}

impl SimParams {
    /// Single-lane parameters without lane changing.
    pub fn single_lane(v_max: u32, p: f64, length: usize, initial_density: f64) -> Self {
        SimParams {
            v_max,
            p,
            length,
            n_lanes: 1,
            initial_density,
            lane_change: None,
        }
    }

    pub fn with_density(&self, initial_density: f64) -> Self {
        SimParams {
            initial_density,
            ..self.clone()
        }
    }

    /// Checks every parameter against the range the model is defined for.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.v_max == 0 {
            return Err(SimError::invalid("v_max must be at least 1"));
        }
        check_probability("p", self.p)?;
        check_probability("initial_density", self.initial_density)?;
        if self.length == 0 {
            return Err(SimError::invalid("road length must be positive"));
        }
        if self.n_lanes == 0 {
            return Err(SimError::invalid("road must have at least one lane"));
        }
        if let Some(lc) = &self.lane_change {
            if self.n_lanes != 2 {
                return Err(SimError::invalid(format!(
                    "lane changing requires exactly 2 lanes, got {}",
                    self.n_lanes
                )));
            }
            check_probability("p_change", lc.p_change)?;
            if !lc.v_strat.is_finite() || lc.v_strat < 0.0 {
                return Err(SimError::invalid(format!(
                    "v_strat must be a non-negative number, got {}",
                    lc.v_strat
                )));
            }
        }
        Ok(())
    }
}

/// Rejects NaN and anything outside [0, 1].
pub fn check_probability(name: &str, value: f64) -> Result<(), SimError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimError::invalid(format!(
            "{} must be in [0, 1], got {}",
            name, value
        )))
    }
}
