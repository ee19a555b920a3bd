//! Two-lane lane-changing rule (NaSch-CL).
//!
//! Every decision of a step is taken against the same road snapshot. The
//! decisions are then applied one at a time, re-checking that the target cell
//! is still free.

use crate::road::{distance_to_next, RoadState};
use log::trace;
use rand::seq::SliceRandom;
use rand::Rng;
use simulation_common::{LaneChangeOrder, LaneChangeParams};

/// A vehicle at `(lane, pos)` that decided to move to the adjacent lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneChange {
    pub lane: usize,
    pub pos: usize,
}

/// The lane a vehicle in `lane` may change into. Only defined for two-lane roads.
#[inline]
pub fn adjacent_lane(lane: usize, n_lanes: usize) -> Option<usize> {
    match (n_lanes, lane) {
        (2, 0) => Some(1),
        (2, 1) => Some(0),
        _ => None,
    }
}

/// Whether the vehicle at `(lane, pos)` changes lane this step.
///
/// All of incentive, benefit, availability and rear safety must hold; the
/// change then happens with probability `p_change`. The RNG is only consulted
/// when the deterministic criteria pass.
pub fn wants_to_change<R: Rng + ?Sized>(
    road: &RoadState,
    lane: usize,
    pos: usize,
    v_max: u32,
    params: &LaneChangeParams,
    rng: &mut R,
) -> bool {
    let Some(other) = adjacent_lane(lane, road.n_lanes()) else {
        return false;
    };
    if road.cell(lane, pos).is_none() {
        return false;
    }

    // Incentive: the vehicle ahead holds us well below v_max.
    let gap_front = distance_to_next(road.lane(lane), pos);
    let max_v_possible = (gap_front - 1) as f64;
    if v_max as f64 - max_v_possible < params.v_strat {
        return false;
    }

    // Benefit: the other lane must allow a clearly higher speed.
    let gap_front_other = distance_to_next(road.lane(other), pos);
    if (gap_front_other - 1) as f64 <= max_v_possible + params.v_strat {
        return false;
    }

    // Availability
    if road.cell(other, pos).is_some() {
        return false;
    }

    if !rear_is_safe(road.lane(other), pos, params.gap_rear) {
        return false;
    }

    rng.random_bool(params.p_change)
}

/// The nearest follower in `lane` behind `pos` must be at least `v_rear + gap_rear` cells away.
/// An empty lane behind `pos` is always safe.
pub fn rear_is_safe(lane: &[Option<u32>], pos: usize, gap_rear: u32) -> bool {
    let length = lane.len();
    for distance in 1..length {
        let behind = (pos + length - distance) % length;
        if let Some(v_rear) = lane[behind] {
            return distance as u64 >= v_rear as u64 + gap_rear as u64;
        }
    }
    true
}

/// Read-only pass: every vehicle's decision, lane-major and position-ascending.
pub fn decide_lane_changes<R: Rng + ?Sized>(
    road: &RoadState,
    v_max: u32,
    params: &LaneChangeParams,
    rng: &mut R,
) -> Vec<LaneChange> {
    let mut decisions = Vec::new();
    for lane in 0..road.n_lanes() {
        for pos in 0..road.length() {
            if road.cell(lane, pos).is_some() && wants_to_change(road, lane, pos, v_max, params, rng) {
                decisions.push(LaneChange { lane, pos });
            }
        }
    }
    decisions
}

/// Applies collected decisions. A change whose target cell has been taken in
/// the meantime is skipped. Returns the number of changes performed.
pub fn apply_lane_changes<R: Rng + ?Sized>(
    road: &mut RoadState,
    mut decisions: Vec<LaneChange>,
    order: LaneChangeOrder,
    rng: &mut R,
) -> usize {
    if order == LaneChangeOrder::Shuffled {
        decisions.shuffle(rng);
    }

    let n_lanes = road.n_lanes();
    let mut applied = 0;
    for change in decisions {
        let Some(target) = adjacent_lane(change.lane, n_lanes) else {
            continue;
        };
        if road.shift_lane(change.lane, target, change.pos) {
            applied += 1;
        } else {
            trace!(
                "Lane change from lane {} at {} skipped, target taken",
                change.lane,
                change.pos
            );
        }
    }
    applied
}

/// Decides and applies all lane changes for one step.
pub fn resolve_lane_changes<R: Rng + ?Sized>(
    road: &mut RoadState,
    v_max: u32,
    params: &LaneChangeParams,
    rng: &mut R,
) -> usize {
    let decisions = decide_lane_changes(road, v_max, params, rng);
    apply_lane_changes(road, decisions, params.order, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(p_change: f64) -> LaneChangeParams {
        LaneChangeParams {
            p_change,
            v_strat: 1.0,
            gap_rear: 2,
            order: LaneChangeOrder::Sequential,
        }
    }

    /// Lane 0 has a vehicle at 5 stuck behind a blocker at 6.
    fn blocked_road(other: &[(usize, u32)]) -> RoadState {
        let mut lanes = vec![vec![None; 20], vec![None; 20]];
        lanes[0][5] = Some(0);
        lanes[0][6] = Some(0);
        for &(pos, v) in other {
            lanes[1][pos] = Some(v);
        }
        RoadState::from_lanes(lanes).unwrap()
    }

    #[test]
    fn test_adjacent_lane() {
        assert_eq!(adjacent_lane(0, 2), Some(1));
        assert_eq!(adjacent_lane(1, 2), Some(0));
        assert_eq!(adjacent_lane(0, 1), None);
        assert_eq!(adjacent_lane(1, 3), None);
    }

    #[test]
    fn test_blocked_vehicle_changes() {
        let mut rng = StdRng::seed_from_u64(3);
        let road = blocked_road(&[]);
        assert!(wants_to_change(&road, 0, 5, 5, &params(1.0), &mut rng));
    }

    #[test]
    fn test_no_incentive_at_free_flow() {
        let mut rng = StdRng::seed_from_u64(3);
        let road = blocked_road(&[]);
        // The blocker at 6 has 18 free cells ahead.
        assert!(!wants_to_change(&road, 0, 6, 5, &params(1.0), &mut rng));
    }

    #[test]
    fn test_no_benefit_when_other_lane_also_blocked() {
        let mut rng = StdRng::seed_from_u64(3);
        let road = blocked_road(&[(7, 0)]);
        assert!(!wants_to_change(&road, 0, 5, 5, &params(1.0), &mut rng));
    }

    #[test]
    fn test_target_cell_must_be_free() {
        let mut rng = StdRng::seed_from_u64(3);
        let road = blocked_road(&[(5, 0)]);
        assert!(!wants_to_change(&road, 0, 5, 5, &params(1.0), &mut rng));
    }

    #[test]
    fn test_rear_safety() {
        let mut rng = StdRng::seed_from_u64(3);
        // Follower two cells back at v=2 needs 4 cells.
        let unsafe_road = blocked_road(&[(3, 2)]);
        assert!(!wants_to_change(&unsafe_road, 0, 5, 5, &params(1.0), &mut rng));

        let safe_road = blocked_road(&[(1, 2)]);
        assert!(wants_to_change(&safe_road, 0, 5, 5, &params(1.0), &mut rng));
    }

    #[test]
    fn test_rear_is_safe_wraps() {
        let mut lane = vec![None; 10];
        lane[8] = Some(3);
        // From position 1 the follower at 8 is 3 cells back.
        assert!(!rear_is_safe(&lane, 1, 1));
        assert!(rear_is_safe(&lane, 1, 0));
        assert!(rear_is_safe(&vec![None; 10], 4, 5));
    }

    #[test]
    fn test_zero_probability_never_changes() {
        let mut rng = StdRng::seed_from_u64(3);
        let road = blocked_road(&[]);
        for _ in 0..50 {
            assert!(!wants_to_change(&road, 0, 5, 5, &params(0.0), &mut rng));
        }
    }

    #[test]
    fn test_single_lane_never_changes() {
        let mut rng = StdRng::seed_from_u64(3);
        let road = RoadState::single_lane_with_vehicles(10, &[0, 1]).unwrap();
        assert!(decide_lane_changes(&road, 5, &params(1.0), &mut rng).is_empty());
    }

    #[test]
    fn test_apply_skips_taken_target() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut road = blocked_road(&[]);
        let decisions = vec![LaneChange { lane: 0, pos: 5 }, LaneChange { lane: 0, pos: 6 }];
        // Occupy the target of the second decision after deciding.
        road.lane_mut(1)[6] = Some(1);
        let applied = apply_lane_changes(&mut road, decisions, LaneChangeOrder::Sequential, &mut rng);
        assert_eq!(applied, 1);
        assert_eq!(road.cell(1, 5), Some(0));
        assert_eq!(road.cell(0, 5), None);
        assert_eq!(road.cell(0, 6), Some(0));
        assert_eq!(road.vehicle_count(), 3);
    }

    #[test]
    fn test_resolve_moves_blocked_vehicle() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut road = blocked_road(&[]);
        let applied = resolve_lane_changes(&mut road, 5, &params(1.0), &mut rng);
        assert_eq!(applied, 1);
        assert_eq!(road.cell(1, 5), Some(0));
        assert_eq!(road.vehicle_count(), 2);
    }

    #[test]
    fn test_accepted_changes_were_safe_in_snapshot() {
        let lc = LaneChangeParams {
            p_change: 0.8,
            v_strat: 0.5,
            gap_rear: 1,
            order: LaneChangeOrder::Shuffled,
        };
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut road = RoadState::initialize(60, 0.35, 2, &mut rng).unwrap();
            // Give vehicles some velocity so rear safety matters.
            for lane in 0..2 {
                for cell in road.lane_mut(lane).iter_mut().flatten() {
                    *cell = rng.random_range(0..=4);
                }
            }
            let snapshot = road.clone();
            let decisions = decide_lane_changes(&snapshot, 4, &lc, &mut rng);
            for d in &decisions {
                let other = 1 - d.lane;
                assert!(snapshot.cell(d.lane, d.pos).is_some());
                assert!(snapshot.cell(other, d.pos).is_none());
                assert!(rear_is_safe(snapshot.lane(other), d.pos, lc.gap_rear));
            }
            let before = road.vehicle_count();
            let applied = apply_lane_changes(&mut road, decisions.clone(), lc.order, &mut rng);
            assert_eq!(applied, decisions.len());
            assert_eq!(road.vehicle_count(), before);
        }
    }
}
