use crate::lane_change::resolve_lane_changes;
use crate::motion::move_vehicles_into;
use crate::road::RoadState;
use crate::speed::update_speeds_into;
use log::trace;
use rand::Rng;
use simulation_common::SimParams;

/// What happened during one discrete time step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Vehicles that crossed the periodic boundary, summed over lanes.
    pub flow: u32,
    /// Lane changes actually performed.
    pub lane_changes: usize,
}

/// Advances `road` by one step.
///
/// Phases run in a fixed order: lane changes (two-lane roads with lane
/// changing enabled), then the speed update of every lane into `scratch`,
/// then movement of every lane from `scratch` back into `road`.
/// `scratch` must have the same shape as `road`; its contents are overwritten.
pub fn advance<R: Rng + ?Sized>(
    road: &mut RoadState,
    scratch: &mut RoadState,
    params: &SimParams,
    rng: &mut R,
) -> StepOutcome {
    debug_assert_eq!(road.n_lanes(), scratch.n_lanes());
    debug_assert_eq!(road.length(), scratch.length());
    let n_lanes = road.n_lanes();

    // --- 1. Lane changes against pre-acceleration positions ---
    let lane_changes = match &params.lane_change {
        Some(lc) if n_lanes > 1 => resolve_lane_changes(road, params.v_max, lc, rng),
        _ => 0,
    };

    // --- 2. Speed update (road -> scratch) ---
    for lane in 0..n_lanes {
        update_speeds_into(road.lane(lane), scratch.lane_mut(lane), params.v_max, params.p, rng);
    }

    // --- 3. Motion (scratch -> road) ---
    let mut flow = 0;
    for lane in 0..n_lanes {
        flow += move_vehicles_into(scratch.lane(lane), road.lane_mut(lane));
    }

    trace!("Step done: flow={} lane_changes={}", flow, lane_changes);
    StepOutcome { flow, lane_changes }
}

/// Single step with a temporary scratch buffer.
pub fn step_once<R: Rng + ?Sized>(road: &mut RoadState, params: &SimParams, rng: &mut R) -> StepOutcome {
    let mut scratch = road.clone();
    advance(road, &mut scratch, params, rng)
}
