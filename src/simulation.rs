use crate::road::RoadState;
use crate::sampler::flow_per_hour;
use crate::step::{advance, StepOutcome};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use simulation_common::{SimError, SimParams};

/// Everything a finished run hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Road state before each step, one entry per step.
    pub history: Vec<RoadState>,
    /// Boundary crossings per step.
    pub flow_series: Vec<u32>,
}

/// Aggregate figures of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: u32,
    pub vehicles: usize,
    pub total_flow: u64,
    /// Mean boundary crossings per step.
    pub mean_flow_per_step: f64,
    /// Mean flow converted to vehicles/hour.
    pub flow_veh_per_h: f64,
    pub total_lane_changes: usize,
    /// Mean velocity of the current state, cells/step.
    pub mean_velocity: Option<f64>,
}

/// Manages the road state and drives it step by step.
pub struct Simulation<R: Rng = StdRng> {
    params: SimParams,
    /// Current road state. Read by every phase, written by motion.
    road: RoadState,
    /// Second buffer holding post-update velocities between the speed and motion phases.
    scratch: RoadState,
    rng: R,
    current_step: u32,
    record_history: bool,
    history: Vec<RoadState>,
    flow_series: Vec<u32>,
    total_lane_changes: usize,
}

impl Simulation<StdRng> {
    /// Creates a simulation with its own `StdRng` seeded from `seed`.
    pub fn from_seed(params: SimParams, seed: u64) -> Result<Self, SimError> {
        Self::new(params, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Simulation<R> {
    /// Validates `params` and places the initial vehicles at random.
    pub fn new(params: SimParams, mut rng: R) -> Result<Self, SimError> {
        params.validate()?;
        let road = RoadState::initialize(params.length, params.initial_density, params.n_lanes, &mut rng)?;
        debug!(
            "Initialized road: {} lanes x {} cells, {} vehicles (density {:.3})",
            params.n_lanes,
            params.length,
            road.vehicle_count(),
            params.initial_density
        );
        Ok(Self::assemble(params, road, rng))
    }

    /// Starts from an explicit road, which must match the geometry in `params`.
    pub fn with_road(params: SimParams, road: RoadState, rng: R) -> Result<Self, SimError> {
        params.validate()?;
        if road.length() != params.length || road.n_lanes() != params.n_lanes {
            return Err(SimError::invalid(format!(
                "road is {} lanes x {} cells but parameters expect {} x {}",
                road.n_lanes(),
                road.length(),
                params.n_lanes,
                params.length
            )));
        }
        if let Some(v) = road.max_velocity().filter(|v| *v > params.v_max) {
            return Err(SimError::invalid(format!(
                "initial velocity {} exceeds v_max {}",
                v, params.v_max
            )));
        }
        Ok(Self::assemble(params, road, rng))
    }

    fn assemble(params: SimParams, road: RoadState, rng: R) -> Self {
        let scratch = road.clone();
        Self {
            params,
            road,
            scratch,
            rng,
            current_step: 0,
            record_history: true,
            history: Vec::new(),
            flow_series: Vec::new(),
            total_lane_changes: 0,
        }
    }

    /// Whether a snapshot is kept before every step. On by default.
    pub fn record_history(mut self, record: bool) -> Self {
        self.record_history = record;
        self
    }

    /// Advances the simulation by one time step.
    pub fn step(&mut self) -> StepOutcome {
        if self.record_history {
            self.history.push(self.road.clone());
        }
        let outcome = advance(&mut self.road, &mut self.scratch, &self.params, &mut self.rng);
        self.flow_series.push(outcome.flow);
        self.total_lane_changes += outcome.lane_changes;
        self.current_step += 1;
        outcome
    }

    /// Runs `steps` further steps.
    pub fn run(&mut self, steps: u32) {
        if self.record_history {
            self.history.reserve(steps as usize);
        }
        self.flow_series.reserve(steps as usize);
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn road(&self) -> &RoadState {
        &self.road
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn flow_series(&self) -> &[u32] {
        &self.flow_series
    }

    pub fn history(&self) -> &[RoadState] {
        &self.history
    }

    pub fn summary(&self, time_step_s: f64) -> RunSummary {
        let total_flow: u64 = self.flow_series.iter().map(|&f| f as u64).sum();
        let mean_flow_per_step = if self.current_step > 0 {
            total_flow as f64 / self.current_step as f64
        } else {
            0.0
        };
        RunSummary {
            steps: self.current_step,
            vehicles: self.road.vehicle_count(),
            total_flow,
            mean_flow_per_step,
            flow_veh_per_h: flow_per_hour(total_flow, self.current_step, time_step_s),
            total_lane_changes: self.total_lane_changes,
            mean_velocity: self.road.mean_velocity(),
        }
    }

    /// Hands history and flow series over to the caller.
    pub fn into_output(self) -> RunOutput {
        RunOutput {
            history: self.history,
            flow_series: self.flow_series,
        }
    }
}

/// Initializes a road from `params` and runs it for `steps` steps, recording history.
pub fn run_simulation<R: Rng + ?Sized>(
    steps: u32,
    params: &SimParams,
    rng: &mut R,
) -> Result<RunOutput, SimError> {
    let mut sim = Simulation::new(params.clone(), rng)?;
    sim.run(steps);
    Ok(sim.into_output())
}
