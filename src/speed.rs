//! NaSch velocity rules for a single lane.

use crate::road::{distance_to_next, Cell};
use rand::Rng;

/// Applies acceleration, safety braking and random slowdown to every vehicle in `input`,
/// writing the result to `output`.
///
/// Gaps are measured on `input` only, so the outcome does not depend on the
/// order in which vehicles are visited.
pub fn update_speeds_into<R: Rng + ?Sized>(
    input: &[Cell],
    output: &mut [Cell],
    v_max: u32,
    p: f64,
    rng: &mut R,
) {
    debug_assert_eq!(input.len(), output.len());
    for (pos, (cell_in, cell_out)) in input.iter().zip(output.iter_mut()).enumerate() {
        *cell_out = cell_in.map(|v| {
            // 1. Acceleration
            let mut v = (v + 1).min(v_max);
            // 2. Braking: never reach the cell of the vehicle ahead
            let gap = distance_to_next(input, pos);
            v = v.min((gap - 1) as u32);
            // 3. Randomization
            if v > 0 && rng.random_bool(p) {
                v -= 1;
            }
            v
        });
    }
}

/// Allocating form of [`update_speeds_into`].
pub fn update_speeds<R: Rng + ?Sized>(lane: &[Cell], v_max: u32, p: f64, rng: &mut R) -> Vec<Cell> {
    let mut out = vec![None; lane.len()];
    update_speeds_into(lane, &mut out, v_max, p, rng);
    out
}
